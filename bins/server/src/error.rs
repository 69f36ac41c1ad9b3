#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("config ({context}): {detail}")]
    Config { context: &'static str, detail: String },

    #[error("storage: {0}")]
    Storage(#[from] radar_api::StorageError),

    #[error("bind udp {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("signal: {0}")]
    Signal(#[from] std::io::Error),
}
