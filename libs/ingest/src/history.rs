use std::sync::Arc;
use std::time::Duration;

use radar_api::{TrackEvent, TrackStorage};

use crate::error::QueryError;

/// Ограниченное чтение последних сохранённых треков.
///
/// Тонкая прослойка над `TrackStorage::fetch_recent`: подставляет лимит
/// по умолчанию, режет слишком большие лимиты и ограничивает время
/// ожидания хранилища. Работает параллельно с ingest без блокировок.
pub struct TrackHistory {
    storage: Arc<dyn TrackStorage>,
    default_limit: usize,
    max_limit: usize,
    timeout: Duration,
}

impl TrackHistory {
    pub const DEFAULT_LIMIT: usize = 50;
    pub const MAX_LIMIT: usize = 1000;

    pub fn new(storage: Arc<dyn TrackStorage>) -> Self {
        Self {
            storage,
            default_limit: Self::DEFAULT_LIMIT,
            max_limit: Self::MAX_LIMIT,
            timeout: Duration::from_secs(2),
        }
    }

    pub fn with_limits(mut self, default_limit: usize, max_limit: usize) -> Self {
        self.max_limit = max_limit;
        self.default_limit = default_limit.min(max_limit);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// До `limit` (по умолчанию 50) последних записей, от новых к старым.
    ///
    /// Пустой вектор — записей нет. Сбой хранилища всегда `Err`.
    pub async fn recent(&self, limit: Option<usize>) -> Result<Vec<TrackEvent>, QueryError> {
        let limit = limit.unwrap_or(self.default_limit).min(self.max_limit);
        if limit == 0 {
            return Ok(Vec::new());
        }

        match tokio::time::timeout(self.timeout, self.storage.fetch_recent(limit)).await {
            Ok(Ok(mut records)) => {
                records.truncate(limit);
                Ok(records)
            }
            Ok(Err(e)) => Err(QueryError::Storage(e)),
            Err(_) => Err(QueryError::Timeout(self.timeout)),
        }
    }
}
