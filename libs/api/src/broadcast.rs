use std::sync::Arc;

use crate::record::TrackEvent;

/// Граница с транспортом подписчиков.
///
/// `publish` синхронный и не должен ждать ни одного подписчика:
/// доставка best-effort, ошибки поглощаются внутри реализации.
/// Запись передаётся как `Arc` — после публикации её никто не меняет.
pub trait TrackBroadcaster: Send + Sync {
    fn publish(&self, record: Arc<TrackEvent>);
}
