pub mod broadcast;
pub mod error;
pub mod record;
pub mod storage;
pub mod time;

use serde::{Deserialize, Serialize};

pub use broadcast::TrackBroadcaster;
pub use error::{ErrorKind, StorageError};
pub use record::{OwnPosition, StoredId, TrackEvent, STORED_ID_FIELD};
pub use storage::TrackStorage;
pub use time::{format_instant, parse_instant};

// ════════════════════════════════════════════════════════════════
//  Overflow Policy
// ════════════════════════════════════════════════════════════════

/// Стратегия поведения при переполнении bounded канала или пула.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Если места нет — дропнуть сообщение, залогировать.
    Drop,
    /// Ждать пока появится место (back-pressure).
    #[serde(alias = "backpressure")]
    BackPressure,
}
