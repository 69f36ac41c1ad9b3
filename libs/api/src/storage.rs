use std::future::Future;
use std::pin::Pin;

use crate::error::StorageError;
use crate::record::{StoredId, TrackEvent};

/// Граница с хранилищем треков.
///
/// Ядро знает о хранилище только этот trait. Реализация обязана
/// допускать конкурентные `append` и `fetch_recent` через общий `Arc`
/// без внешних блокировок.
pub trait TrackStorage: Send + Sync {
    /// Сохранить одну запись. Возвращает идентификатор, присвоенный
    /// хранилищем. `Ok` означает, что запись сохранена, а не поставлена
    /// в очередь. Pipeline никогда не повторяет append.
    fn append(
        &self,
        record: &TrackEvent,
    ) -> Pin<Box<dyn Future<Output = Result<StoredId, StorageError>> + Send + '_>>;

    /// До `limit` последних сохранённых записей, от новых к старым,
    /// без дубликатов. Каждая запись несёт свой `_id`.
    fn fetch_recent(
        &self,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<TrackEvent>, StorageError>> + Send + '_>>;

    /// Сбросить буферы при остановке.
    fn flush(&self) -> Pin<Box<dyn Future<Output = Result<(), StorageError>> + Send + '_>> {
        Box::pin(async { Ok(()) })
    }
}
