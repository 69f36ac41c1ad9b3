use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};

use radar_api::TrackEvent;

/// Проставляет метки `ts_received` / `ts_stored`.
///
/// Часы строго монотонны: каждое чтение `now()` больше предыдущего
/// хотя бы на 1 нс, даже если системное время шагнуло назад.
/// Один экземпляр разделяется между receive loop и worker'ами.
#[derive(Debug, Default)]
pub struct Annotator {
    last_ns: AtomicI64,
}

impl Annotator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Текущее время стены, строго больше любого ранее выданного.
    pub fn now(&self) -> DateTime<Utc> {
        self.advance(i64::MIN)
    }

    /// Как `now()`, но результат не меньше `floor_ns`. Выданное значение
    /// запоминается, поэтому следующие `now()` будут строго больше.
    fn advance(&self, floor_ns: i64) -> DateTime<Utc> {
        let wall = Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX).max(floor_ns);
        let mut prev = self.last_ns.load(Ordering::Acquire);
        loop {
            let next = wall.max(prev.saturating_add(1));
            match self
                .last_ns
                .compare_exchange_weak(prev, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return DateTime::from_timestamp_nanos(next),
                Err(actual) => prev = actual,
            }
        }
    }

    /// `arrived_at` — момент чтения из сокета, снятый до разбора payload'а.
    pub fn mark_received(&self, record: &mut TrackEvent, arrived_at: DateTime<Utc>) {
        record.ts_received = Some(arrived_at);
    }

    /// Вызывается только после успешного append.
    pub fn mark_stored(&self, record: &mut TrackEvent) {
        let floor = record
            .ts_received
            .and_then(|received| received.timestamp_nanos_opt())
            .map_or(i64::MIN, |ns| ns.saturating_add(1));
        record.ts_stored = Some(self.advance(floor));
    }
}
