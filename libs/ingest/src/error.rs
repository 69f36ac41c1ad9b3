use std::time::Duration;

use radar_api::StorageError;

/// Неразбираемый datagram (MalformedPayload).
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("empty payload")]
    Empty,

    #[error("payload of {len} bytes fills the {limit}-byte receive buffer (possibly truncated)")]
    Oversized { len: usize, limit: usize },

    #[error("json: {0}")]
    Syntax(serde_json::Error),

    #[error("expected a JSON object, got {0}")]
    NotAnObject(&'static str),

    #[error("field: {0}")]
    Field(serde_json::Error),
}

/// Этап обработки datagram'а.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Decoded,
    AnnotatedReceived,
    Persisted,
    AnnotatedStored,
    Broadcast,
    Done,
}

/// Причина, по которой datagram ушёл в `Rejected`.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("malformed payload: {0}")]
    Malformed(#[from] DecodeError),

    #[error("worker pool saturated")]
    Overloaded,

    #[error("persistence: {0}")]
    Persistence(StorageError),

    #[error("persistence timed out after {0:?}")]
    Timeout(Duration),
}

impl IngestError {
    /// Этап, из которого datagram ушёл в отказ.
    pub fn stage(&self) -> Stage {
        match self {
            IngestError::Malformed(_) | IngestError::Overloaded => Stage::Received,
            IngestError::Persistence(_) | IngestError::Timeout(_) => Stage::AnnotatedReceived,
        }
    }
}

/// Ошибка запроса истории. Пустой результат — это не ошибка.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("storage: {0}")]
    Storage(StorageError),

    #[error("storage did not answer within {0:?}")]
    Timeout(Duration),
}
