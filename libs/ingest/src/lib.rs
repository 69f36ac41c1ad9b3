pub mod annotator;
pub mod decoder;
pub mod error;
pub mod history;
pub mod hub;
pub mod pipeline;
pub mod stats;

pub use annotator::Annotator;
pub use decoder::decode;
pub use error::{DecodeError, IngestError, QueryError, Stage};
pub use history::TrackHistory;
pub use hub::{TrackHub, TrackSubscription};
pub use pipeline::{IngestConfig, IngestPipeline};
pub use stats::{IngestStats, StatsSnapshot};
