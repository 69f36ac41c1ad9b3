use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::net::UdpSocket;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use radar_api::{OverflowPolicy, TrackBroadcaster, TrackEvent, TrackStorage};

use crate::annotator::Annotator;
use crate::decoder;
use crate::error::{DecodeError, IngestError, Stage};
use crate::stats::IngestStats;

const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(100);

// ═══════════════════════════════════════════════════════════════
//  Config
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Размер буфера приёма. Datagram, заполнивший его целиком,
    /// считается обрезанным.
    pub max_datagram: usize,
    /// Сколько datagram'ов одновременно могут ждать append.
    pub workers: usize,
    /// Что делать, когда все worker'ы заняты.
    pub overflow: OverflowPolicy,
    pub persist_timeout: Duration,
    /// Сколько ждать in-flight worker'ов при остановке.
    pub drain_timeout: Duration,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_datagram: 65_536,
            workers: 256,
            overflow: OverflowPolicy::BackPressure,
            persist_timeout: Duration::from_secs(2),
            drain_timeout: Duration::from_secs(5),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Completion — append → mark_stored → publish (внутри worker'а)
// ═══════════════════════════════════════════════════════════════

#[derive(Clone)]
struct Completion {
    storage: Arc<dyn TrackStorage>,
    broadcaster: Arc<dyn TrackBroadcaster>,
    annotator: Arc<Annotator>,
    stats: Arc<IngestStats>,
    persist_timeout: Duration,
}

impl Completion {
    async fn persist_and_publish(&self, mut record: TrackEvent) -> Result<Arc<TrackEvent>, IngestError> {
        let id = match tokio::time::timeout(self.persist_timeout, self.storage.append(&record)).await {
            Ok(Ok(id)) => id,
            Ok(Err(e)) => return Err(IngestError::Persistence(e)),
            Err(_) => return Err(IngestError::Timeout(self.persist_timeout)),
        };
        self.stats.inc_persisted();
        record.id = Some(id);
        self.annotator.mark_stored(&mut record);

        // Broadcast только после успешного append: неподтверждённая
        // запись не должна стать видимой подписчикам.
        let record = Arc::new(record);
        self.broadcaster.publish(record.clone());
        self.stats.inc_broadcast();
        Ok(record)
    }

    async fn run(self, record: TrackEvent, peer: Option<SocketAddr>) {
        let track_id = record.track_id.clone();
        match self.persist_and_publish(record).await {
            Ok(stored) => {
                tracing::debug!(
                    track_id = ?stored.track_id,
                    id = ?stored.id,
                    net_delay_ms = ?stored.network_delay_ms(),
                    stage = ?Stage::Done,
                    "track stored and broadcast"
                );
            }
            Err(e) => {
                self.stats.inc_persist_failed();
                tracing::warn!(?peer, ?track_id, stage = ?e.stage(), error = %e, "track rejected");
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  IngestPipeline
// ═══════════════════════════════════════════════════════════════

/// UDP → decode → mark_received → [worker: append → mark_stored → publish].
///
/// Decode и `mark_received` выполняются прямо в receive loop, всё что
/// ждёт хранилище — в отдельной задаче, число которых ограничено
/// семафором на `workers` разрешений. Ни одна ошибка не останавливает
/// цикл: datagram уходит в `Rejected`, счётчик растёт, цикл читает дальше.
pub struct IngestPipeline {
    completion: Completion,
    permits: Arc<Semaphore>,
    config: IngestConfig,
}

impl IngestPipeline {
    pub fn new(
        storage: Arc<dyn TrackStorage>,
        broadcaster: Arc<dyn TrackBroadcaster>,
        mut config: IngestConfig,
    ) -> Self {
        config.workers = config.workers.clamp(1, u32::MAX as usize);
        config.max_datagram = config.max_datagram.max(1);
        Self {
            completion: Completion {
                storage,
                broadcaster,
                annotator: Arc::new(Annotator::new()),
                stats: Arc::new(IngestStats::new()),
                persist_timeout: config.persist_timeout,
            },
            permits: Arc::new(Semaphore::new(config.workers)),
            config,
        }
    }

    /// Использовать общие с кем-то ещё часы.
    pub fn with_annotator(mut self, annotator: Arc<Annotator>) -> Self {
        self.completion.annotator = annotator;
        self
    }

    pub fn annotator(&self) -> Arc<Annotator> {
        self.completion.annotator.clone()
    }

    pub fn stats(&self) -> Arc<IngestStats> {
        self.completion.stats.clone()
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Receive loop. Владеет сокетом до отмены `token`, затем ждёт
    /// in-flight worker'ов (не дольше `drain_timeout`).
    pub async fn run(&self, socket: UdpSocket, token: CancellationToken) {
        let local = socket
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "?".into());
        tracing::info!(
            addr = %local,
            workers = self.config.workers,
            overflow = ?self.config.overflow,
            "ingest loop started"
        );

        let mut buf = vec![0u8; self.config.max_datagram];
        loop {
            let received = tokio::select! {
                res = socket.recv_from(&mut buf) => res,
                _ = token.cancelled() => break,
            };
            let arrived_at = self.completion.annotator.now();

            let (len, peer) = match received {
                Ok(r) => r,
                Err(e) => {
                    tracing::error!(addr = %local, error = %e, "udp receive error");
                    tokio::time::sleep(RECV_ERROR_BACKOFF).await;
                    continue;
                }
            };

            if let Err(e) = self.ingest(&buf[..len], arrived_at, Some(peer)).await {
                tracing::warn!(%peer, len, stage = ?e.stage(), error = %e, "datagram rejected");
            }
        }

        tracing::info!(addr = %local, "ingest loop stopping, draining workers");
        if !self.drain().await {
            tracing::warn!(timeout = ?self.config.drain_timeout, "workers still busy after drain timeout");
        }
        tracing::info!(stats = ?self.completion.stats.snapshot(), "ingest loop finished");
    }

    /// Обработать один datagram: decode и `mark_received` сразу,
    /// остальное — в worker'е. `Ok` означает «передан worker'у»;
    /// результат append виден только в счётчиках и логах.
    pub async fn ingest(
        &self,
        payload: &[u8],
        arrived_at: DateTime<Utc>,
        peer: Option<SocketAddr>,
    ) -> Result<(), IngestError> {
        let stats = &self.completion.stats;
        stats.inc_received();

        let mut record = match self.decode(payload) {
            Ok(record) => record,
            Err(e) => {
                stats.inc_malformed();
                return Err(e.into());
            }
        };
        self.completion.annotator.mark_received(&mut record, arrived_at);

        let Some(permit) = self.acquire().await else {
            stats.inc_overloaded();
            return Err(IngestError::Overloaded);
        };

        let completion = self.completion.clone();
        tokio::spawn(async move {
            let _permit = permit;
            completion.run(record, peer).await;
        });
        Ok(())
    }

    /// Дождаться завершения всех запущенных worker'ов.
    /// `false` — не уложились в `drain_timeout`.
    pub async fn drain(&self) -> bool {
        let all = self.config.workers as u32;
        match tokio::time::timeout(self.config.drain_timeout, self.permits.acquire_many(all)).await {
            Ok(Ok(_permits)) => true,
            Ok(Err(_closed)) => true,
            Err(_) => false,
        }
    }

    fn decode(&self, payload: &[u8]) -> Result<TrackEvent, DecodeError> {
        if payload.len() >= self.config.max_datagram {
            return Err(DecodeError::Oversized {
                len: payload.len(),
                limit: self.config.max_datagram,
            });
        }
        decoder::decode(payload)
    }

    async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        match self.config.overflow {
            OverflowPolicy::Drop => self.permits.clone().try_acquire_owned().ok(),
            OverflowPolicy::BackPressure => self.permits.clone().acquire_owned().await.ok(),
        }
    }
}
