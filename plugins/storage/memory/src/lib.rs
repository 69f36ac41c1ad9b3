use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;

use tokio::sync::RwLock;

use radar_api::{StorageError, StoredId, TrackEvent, TrackStorage};

// ═══════════════════════════════════════════════════════════════
//  MemoryStorageConfig
// ═══════════════════════════════════════════════════════════════

fn default_max_records() -> usize {
    100_000
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct MemoryStorageConfig {
    #[serde(default = "default_max_records")]
    pub max_records: usize,
}

impl Default for MemoryStorageConfig {
    fn default() -> Self {
        Self {
            max_records: default_max_records(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  MemoryStorage
// ═══════════════════════════════════════════════════════════════

struct Ring {
    records: VecDeque<TrackEvent>,
    next_id: u64,
}

/// In-memory ring-buffer storage. Для запуска без диска и для тестов:
/// переживает только процесс, при переполнении вытесняет самые старые.
pub struct MemoryStorage {
    ring: RwLock<Ring>,
    max_records: usize,
}

impl MemoryStorage {
    pub fn new(max_records: usize) -> Self {
        let max_records = max_records.max(1);
        Self {
            ring: RwLock::new(Ring {
                records: VecDeque::with_capacity(max_records.min(65536)),
                next_id: 1,
            }),
            max_records,
        }
    }

    pub fn from_config(config: &MemoryStorageConfig) -> Self {
        Self::new(config.max_records)
    }

    pub async fn len(&self) -> usize {
        self.ring.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl TrackStorage for MemoryStorage {
    fn append(
        &self,
        record: &TrackEvent,
    ) -> Pin<Box<dyn Future<Output = Result<StoredId, StorageError>> + Send + '_>> {
        let mut record = record.clone();
        Box::pin(async move {
            let mut ring = self.ring.write().await;
            let id = StoredId(ring.next_id);
            ring.next_id += 1;
            record.id = Some(id);
            if ring.records.len() >= self.max_records {
                ring.records.pop_front();
            }
            ring.records.push_back(record);
            Ok(id)
        })
    }

    fn fetch_recent(
        &self,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<TrackEvent>, StorageError>> + Send + '_>> {
        Box::pin(async move {
            let ring = self.ring.read().await;
            Ok(ring.records.iter().rev().take(limit).cloned().collect())
        })
    }
}
