use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Счётчики receive loop и worker'ов. Только для диагностики.
#[derive(Debug, Default)]
pub struct IngestStats {
    received: AtomicU64,
    malformed: AtomicU64,
    overloaded: AtomicU64,
    persisted: AtomicU64,
    persist_failed: AtomicU64,
    broadcast: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub received: u64,
    pub malformed: u64,
    pub overloaded: u64,
    pub persisted: u64,
    pub persist_failed: u64,
    pub broadcast: u64,
}

impl StatsSnapshot {
    /// Datagram'ы, которые уже дошли до конечного состояния.
    pub fn settled(&self) -> u64 {
        self.malformed + self.overloaded + self.persist_failed + self.broadcast
    }
}

impl IngestStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            overloaded: self.overloaded.load(Ordering::Relaxed),
            persisted: self.persisted.load(Ordering::Relaxed),
            persist_failed: self.persist_failed.load(Ordering::Relaxed),
            broadcast: self.broadcast.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn inc_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_overloaded(&self) {
        self.overloaded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_persisted(&self) {
        self.persisted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_persist_failed(&self) {
        self.persist_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_broadcast(&self) {
        self.broadcast.fetch_add(1, Ordering::Relaxed);
    }
}
