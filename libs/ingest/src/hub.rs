use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;

use radar_api::{OverflowPolicy, TrackBroadcaster, TrackEvent};

// ═══════════════════════════════════════════════════════════════
//  Subscriber
// ═══════════════════════════════════════════════════════════════

struct Subscriber {
    tx: mpsc::Sender<Arc<TrackEvent>>,
    overflow: OverflowPolicy,
    /// Отложенные отправки `BackPressure`, ещё ждущие места в канале.
    pending: Arc<AtomicUsize>,
    /// Потолок `pending`, равен `buffer`; сверх него запись отбрасывается.
    max_pending: usize,
}

enum Delivery {
    Sent,
    Full,
    Closed,
}

impl Subscriber {
    fn deliver(&self, record: &Arc<TrackEvent>) -> Delivery {
        match self.overflow {
            OverflowPolicy::Drop => self.try_deliver(record),
            OverflowPolicy::BackPressure => {
                // Пока есть отложенные отправки, новые встают за ними.
                if self.pending.load(Ordering::Acquire) == 0 {
                    match self.try_deliver(record) {
                        Delivery::Full => {}
                        done => return done,
                    }
                }
                self.defer(record)
            }
        }
    }

    fn try_deliver(&self, record: &Arc<TrackEvent>) -> Delivery {
        match self.tx.try_send(record.clone()) {
            Ok(()) => Delivery::Sent,
            Err(mpsc::error::TrySendError::Full(_)) => Delivery::Full,
            Err(mpsc::error::TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    /// Отправка в фоне, не больше `max_pending` одновременно.
    fn defer(&self, record: &Arc<TrackEvent>) -> Delivery {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return Delivery::Full;
        };
        let reserved = self
            .pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.max_pending).then_some(n + 1)
            })
            .is_ok();
        if !reserved {
            return Delivery::Full;
        }

        let tx = self.tx.clone();
        let pending = self.pending.clone();
        let record = record.clone();
        runtime.spawn(async move {
            if tx.send(record).await.is_err() {
                tracing::debug!("subscriber closed during backpressure send");
            }
            pending.fetch_sub(1, Ordering::AcqRel);
        });
        Delivery::Sent
    }
}

// ═══════════════════════════════════════════════════════════════
//  TrackSubscription — приёмная сторона одного подписчика
// ═══════════════════════════════════════════════════════════════

pub struct TrackSubscription {
    rx: mpsc::Receiver<Arc<TrackEvent>>,
}

impl TrackSubscription {
    /// `None` — hub уничтожен.
    pub async fn recv(&mut self) -> Option<Arc<TrackEvent>> {
        self.rx.recv().await
    }

    /// Забрать уже доставленную запись, не дожидаясь новой.
    pub fn try_recv(&mut self) -> Option<Arc<TrackEvent>> {
        self.rx.try_recv().ok()
    }
}

// ═══════════════════════════════════════════════════════════════
//  TrackHub
// ═══════════════════════════════════════════════════════════════

/// Fan-out новых треков всем живым подписчикам (WS-клиентам).
///
/// У каждого подписчика свой bounded mpsc канал и своя overflow policy,
/// поэтому медленный клиент теряет только свои сообщения и никогда
/// не тормозит publish.
#[derive(Default)]
pub struct TrackHub {
    subscribers: Mutex<Vec<Subscriber>>,
    dropped: AtomicU64,
}

impl TrackHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Подписаться на новые треки.
    pub fn subscribe(&self, buffer: usize, overflow: OverflowPolicy) -> TrackSubscription {
        let buffer = buffer.max(1);
        let (tx, rx) = mpsc::channel(buffer);
        self.lock().push(Subscriber {
            tx,
            overflow,
            pending: Arc::new(AtomicUsize::new(0)),
            max_pending: buffer,
        });
        TrackSubscription { rx }
    }

    /// Число подписчиков, ещё не отключившихся к последнему publish.
    pub fn subscriber_count(&self) -> usize {
        let mut subs = self.lock();
        subs.retain(|s| !s.tx.is_closed());
        subs.len()
    }

    /// Сколько доставок было отброшено из-за переполнения.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Subscriber>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TrackBroadcaster for TrackHub {
    fn publish(&self, record: Arc<TrackEvent>) {
        let mut subs = self.lock();
        let mut i = 0;
        while i < subs.len() {
            if subs[i].tx.is_closed() {
                subs.swap_remove(i);
                continue;
            }
            match subs[i].deliver(&record) {
                Delivery::Sent => {}
                Delivery::Full => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(track_id = ?record.track_id, "subscriber channel full, dropping");
                }
                Delivery::Closed => {
                    subs.swap_remove(i);
                    continue;
                }
            }
            i += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(id: &str) -> Arc<TrackEvent> {
        Arc::new(TrackEvent {
            track_id: Some(id.into()),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn every_subscriber_gets_the_record() {
        let hub = TrackHub::new();
        let mut a = hub.subscribe(8, OverflowPolicy::Drop);
        let mut b = hub.subscribe(8, OverflowPolicy::BackPressure);

        hub.publish(track("T-1"));

        assert_eq!(a.recv().await.unwrap().track_id.as_deref(), Some("T-1"));
        assert_eq!(b.recv().await.unwrap().track_id.as_deref(), Some("T-1"));
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_a_noop() {
        let hub = TrackHub::new();
        hub.publish(track("T-1"));
        assert_eq!(hub.subscriber_count(), 0);
        assert_eq!(hub.dropped(), 0);
    }

    #[tokio::test]
    async fn full_subscriber_drops_and_does_not_block() {
        let hub = TrackHub::new();
        let mut slow = hub.subscribe(1, OverflowPolicy::Drop);
        let mut fast = hub.subscribe(16, OverflowPolicy::Drop);

        for i in 0..5 {
            hub.publish(track(&format!("T-{i}")));
        }

        assert_eq!(hub.dropped(), 4);
        assert_eq!(slow.recv().await.unwrap().track_id.as_deref(), Some("T-0"));
        for i in 0..5 {
            let got = fast.recv().await.unwrap();
            assert_eq!(got.track_id, Some(format!("T-{i}")));
        }
    }

    #[tokio::test]
    async fn closed_subscribers_are_pruned() {
        let hub = TrackHub::new();
        let gone = hub.subscribe(4, OverflowPolicy::Drop);
        let _kept = hub.subscribe(4, OverflowPolicy::Drop);
        drop(gone);

        hub.publish(track("T-1"));
        assert_eq!(hub.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn stalled_back_pressure_subscriber_is_bounded() {
        let hub = TrackHub::new();
        let mut stalled = hub.subscribe(2, OverflowPolicy::BackPressure);

        for i in 0..10_000 {
            hub.publish(track(&format!("T-{i}")));
        }

        // 2 в канале и 2 отложенные отправки, остальное отброшено.
        assert_eq!(hub.dropped(), 10_000 - 4);
        {
            let subs = hub.lock();
            assert_eq!(subs[0].pending.load(Ordering::Acquire), 2);
        }

        assert_eq!(stalled.recv().await.unwrap().track_id.as_deref(), Some("T-0"));
        assert_eq!(stalled.recv().await.unwrap().track_id.as_deref(), Some("T-1"));
        let mut deferred = vec![
            stalled.recv().await.unwrap().track_id.clone().unwrap(),
            stalled.recv().await.unwrap().track_id.clone().unwrap(),
        ];
        deferred.sort();
        assert_eq!(deferred, ["T-2", "T-3"]);
        tokio::task::yield_now().await;
        assert_eq!(hub.lock()[0].pending.load(Ordering::Acquire), 0);
        assert!(stalled.try_recv().is_none());
    }

    #[tokio::test]
    async fn back_pressure_delivers_everything_to_a_reader() {
        let hub = Arc::new(TrackHub::new());
        let mut sub = hub.subscribe(4, OverflowPolicy::BackPressure);

        let reader = tokio::spawn(async move {
            let mut got = Vec::new();
            while got.len() < 6 {
                got.push(sub.recv().await.unwrap().track_id.clone().unwrap());
            }
            got
        });
        for i in 0..6 {
            hub.publish(track(&format!("T-{i}")));
            tokio::task::yield_now().await;
        }

        let got = reader.await.unwrap();
        assert_eq!(got, ["T-0", "T-1", "T-2", "T-3", "T-4", "T-5"]);
        assert_eq!(hub.dropped(), 0);
    }

    #[test]
    fn back_pressure_outside_runtime_falls_back_to_try_send() {
        let hub = TrackHub::new();
        let mut sub = hub.subscribe(4, OverflowPolicy::BackPressure);
        hub.publish(track("T-1"));
        let got = sub.try_recv().unwrap();
        assert_eq!(got.track_id.as_deref(), Some("T-1"));
    }
}
