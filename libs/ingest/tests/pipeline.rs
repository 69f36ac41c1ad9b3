//! Сквозные тесты receive loop через настоящий loopback UDP.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use radar_api::{OverflowPolicy, StorageError, StoredId, TrackBroadcaster, TrackEvent, TrackStorage};
use radar_ingest::{IngestConfig, IngestPipeline, StatsSnapshot, TrackHistory, TrackHub};
use storage_memory::MemoryStorage;

// ═══════════════════════════════════════════════════════════════
//  Fakes
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Append(String),
    Publish(String, Option<StoredId>),
}

type Journal = Arc<Mutex<Vec<Event>>>;

fn name(record: &TrackEvent) -> String {
    record.track_id.clone().unwrap_or_default()
}

/// Как хранилище ведёт себя на одном track_id.
#[derive(Clone, Copy)]
enum Fault {
    Healthy,
    /// Append отвечает ошибкой.
    FailOn(&'static str),
    /// Append никогда не завершается.
    StallOn(&'static str),
}

/// Пишет каждый append в общий журнал.
struct RecordingStorage {
    inner: MemoryStorage,
    journal: Journal,
    fault: Fault,
}

impl TrackStorage for RecordingStorage {
    fn append(
        &self,
        record: &TrackEvent,
    ) -> Pin<Box<dyn Future<Output = Result<StoredId, StorageError>> + Send + '_>> {
        let record = record.clone();
        Box::pin(async move {
            let track = name(&record);
            self.journal.lock().unwrap().push(Event::Append(track.clone()));
            match self.fault {
                Fault::FailOn(t) if t == track => Err(StorageError::unavailable("write rejected")),
                Fault::StallOn(t) if t == track => std::future::pending().await,
                _ => self.inner.append(&record).await,
            }
        })
    }

    fn fetch_recent(
        &self,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<TrackEvent>, StorageError>> + Send + '_>> {
        self.inner.fetch_recent(limit)
    }
}

struct RecordingBroadcaster {
    journal: Journal,
    published: Mutex<Vec<Arc<TrackEvent>>>,
}

impl TrackBroadcaster for RecordingBroadcaster {
    fn publish(&self, record: Arc<TrackEvent>) {
        self.journal
            .lock()
            .unwrap()
            .push(Event::Publish(name(&record), record.id));
        self.published.lock().unwrap().push(record);
    }
}

// ═══════════════════════════════════════════════════════════════
//  Harness
// ═══════════════════════════════════════════════════════════════

struct Harness {
    pipeline: Arc<IngestPipeline>,
    storage: Arc<RecordingStorage>,
    broadcaster: Arc<RecordingBroadcaster>,
    journal: Journal,
    sender: UdpSocket,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl Harness {
    async fn start(fault: Fault, config: IngestConfig) -> Self {
        let journal: Journal = Arc::default();
        let storage = Arc::new(RecordingStorage {
            inner: MemoryStorage::new(1_000),
            journal: journal.clone(),
            fault,
        });
        let broadcaster = Arc::new(RecordingBroadcaster {
            journal: journal.clone(),
            published: Mutex::new(Vec::new()),
        });
        let pipeline = Arc::new(IngestPipeline::new(storage.clone(), broadcaster.clone(), config));

        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.connect(addr).await.unwrap();

        let token = CancellationToken::new();
        let task = {
            let pipeline = pipeline.clone();
            let token = token.clone();
            tokio::spawn(async move { pipeline.run(socket, token).await })
        };

        Self { pipeline, storage, broadcaster, journal, sender, token, task }
    }

    async fn send(&self, payload: &str) {
        self.sender.send(payload.as_bytes()).await.unwrap();
    }

    /// Ждать, пока `settled` datagram'ов дойдут до конечного состояния.
    async fn wait_settled(&self, settled: u64) -> StatsSnapshot {
        for _ in 0..500 {
            let stats = self.pipeline.stats().snapshot();
            if stats.settled() >= settled {
                return stats;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("pipeline did not settle: {:?}", self.pipeline.stats().snapshot());
    }

    fn published(&self, track: &str) -> bool {
        self.journal
            .lock()
            .unwrap()
            .iter()
            .any(|e| matches!(e, Event::Publish(t, _) if t == track))
    }

    async fn stop(self) -> Journal {
        self.token.cancel();
        self.task.await.unwrap();
        self.journal
    }
}

fn single_worker() -> IngestConfig {
    IngestConfig {
        workers: 1,
        ..Default::default()
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn append_precedes_publish_exactly_once() {
    let h = Harness::start(Fault::Healthy, IngestConfig::default()).await;
    let start = h.pipeline.annotator().now();

    for i in 0..20 {
        h.send(&format!(r#"{{"track_id":"T-{i}","freq_mhz":9410.5}}"#)).await;
    }
    let stats = h.wait_settled(20).await;
    assert_eq!((stats.received, stats.persisted, stats.broadcast), (20, 20, 20));

    let published = h.broadcaster.published.lock().unwrap().clone();
    for record in &published {
        let received = record.ts_received.unwrap();
        let stored = record.ts_stored.unwrap();
        assert!(start < received && received < stored, "{record:?}");
        assert_eq!(record.freq_mhz.as_ref().and_then(|n| n.as_f64()), Some(9410.5));
    }

    let journal = h.stop().await;
    let journal = journal.lock().unwrap();
    for i in 0..20 {
        let track = format!("T-{i}");
        let append = journal.iter().position(|e| *e == Event::Append(track.clone()));
        let publish: Vec<_> = journal
            .iter()
            .enumerate()
            .filter(|(_, e)| matches!(e, Event::Publish(t, _) if *t == track))
            .collect();
        assert_eq!(publish.len(), 1, "{track} published {} times", publish.len());
        assert!(append.unwrap() < publish[0].0, "{track} published before append");
        assert!(matches!(publish[0].1, Event::Publish(_, Some(_))));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_append_is_not_published_and_next_datagram_flows() {
    let h = Harness::start(Fault::FailOn("bad"), single_worker()).await;

    h.send(r#"{"track_id":"bad"}"#).await;
    h.send(r#"{"track_id":"good"}"#).await;
    let stats = h.wait_settled(2).await;
    assert_eq!((stats.persist_failed, stats.broadcast), (1, 1));

    let journal = h.stop().await;
    let journal = journal.lock().unwrap();
    assert!(journal.contains(&Event::Append("bad".into())));
    assert!(!journal.iter().any(|e| matches!(e, Event::Publish(t, _) if t == "bad")));
    assert!(journal.iter().any(|e| matches!(e, Event::Publish(t, _) if t == "good")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stalled_append_times_out_while_next_datagram_is_published() {
    let persist_timeout = Duration::from_millis(1_500);
    let config = IngestConfig {
        workers: 4,
        persist_timeout,
        ..Default::default()
    };
    let h = Harness::start(Fault::StallOn("stuck"), config).await;

    h.send(r#"{"track_id":"stuck"}"#).await;
    h.send(r#"{"track_id":"next"}"#).await;

    let sent_at = std::time::Instant::now();
    while !h.published("next") {
        assert!(sent_at.elapsed() < persist_timeout, "next waited for the stalled append");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(!h.published("stuck"));
    assert_eq!(h.pipeline.stats().snapshot().persisted, 1);

    let stats = h.wait_settled(2).await;
    assert_eq!((stats.persisted, stats.persist_failed, stats.broadcast), (1, 1, 1));
    assert!(h.pipeline.drain().await);

    let journal = h.stop().await;
    let journal = journal.lock().unwrap();
    assert!(journal.contains(&Event::Append("stuck".into())));
    assert!(!journal.iter().any(|e| matches!(e, Event::Publish(t, _) if t == "stuck")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn nulls_and_integers_survive_persist_and_query() {
    let h = Harness::start(Fault::Healthy, single_worker()).await;
    let sent = serde_json::json!({
        "track_id": "N",
        "scan_type": null,
        "freq_mhz": 9410,
        "prf_hz": 1200,
        "pw_us": 0.5,
        "amplitude_db": null,
        "own_position": { "latitude_degdec": 59, "longitude_degdec": null },
        "emitter": { "class": null, "mode": 3 },
        "note": null
    });
    h.send(&sent.to_string()).await;
    h.wait_settled(1).await;

    let history = TrackHistory::new(h.storage.clone());
    let stored = history.recent(Some(1)).await.unwrap().remove(0);
    assert!(stored.id.is_some() && stored.ts_received.is_some());
    assert!(back_without_server_fields(&stored)["freq_mhz"].is_u64());
    assert_eq!(back_without_server_fields(&stored), sent);

    let published = h.broadcaster.published.lock().unwrap()[0].clone();
    assert_eq!(published.id, stored.id);
    assert!(published.ts_stored.is_some());
    assert_eq!(back_without_server_fields(&published), sent);
    h.stop().await;
}

/// Документ без полей, которые проставляет сервер.
fn back_without_server_fields(record: &TrackEvent) -> serde_json::Value {
    let mut back = serde_json::to_value(record).unwrap();
    if let Some(fields) = back.as_object_mut() {
        for server_field in ["_id", "ts_received", "ts_stored"] {
            fields.remove(server_field);
        }
    }
    back
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn malformed_between_good_datagrams() {
    let h = Harness::start(Fault::Healthy, single_worker()).await;

    h.send(r#"{"track_id":"A","scan_type":"circular","emitter":{"class":"nav"}}"#).await;
    h.send(r#"{"track_id":"B","#).await;
    h.send(r#"{"track_id":"C","amplitude_db":-41.5}"#).await;

    let stats = h.wait_settled(3).await;
    assert_eq!(
        (stats.received, stats.malformed, stats.persisted, stats.broadcast),
        (3, 1, 2, 2)
    );

    let history = TrackHistory::new(h.storage.clone());
    let recent = history.recent(Some(2)).await.unwrap();
    let names: Vec<_> = recent.iter().map(name).collect();
    assert_eq!(names, ["C", "A"]);
    assert_eq!(recent[1].extra["emitter"]["class"], "nav");
    assert_eq!(recent[1].scan_type.as_deref(), Some("circular"));
    assert_eq!(history.recent(Some(2)).await.unwrap(), recent);

    let journal = h.stop().await;
    let published = journal
        .lock()
        .unwrap()
        .iter()
        .filter(|e| matches!(e, Event::Publish(..)))
        .count();
    assert_eq!(published, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn hub_subscribers_receive_live_tracks() {
    let storage = Arc::new(MemoryStorage::new(100));
    let hub = Arc::new(TrackHub::new());
    let pipeline = Arc::new(IngestPipeline::new(storage, hub.clone(), IngestConfig::default()));
    let mut fast = hub.subscribe(16, OverflowPolicy::Drop);
    let closed = hub.subscribe(16, OverflowPolicy::Drop);
    drop(closed);

    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    let token = CancellationToken::new();
    let task = {
        let pipeline = pipeline.clone();
        let token = token.clone();
        tokio::spawn(async move { pipeline.run(socket, token).await })
    };

    let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    sender.send_to(br#"{"track_id":"live"}"#, addr).await.unwrap();

    let got = tokio::time::timeout(Duration::from_secs(5), fast.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(got.track_id.as_deref(), Some("live"));
    assert_eq!(got.id, Some(StoredId(1)));
    assert_eq!(hub.subscriber_count(), 1);

    token.cancel();
    task.await.unwrap();
}
