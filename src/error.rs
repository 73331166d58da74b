/// Error types shared across the timeline
///
/// Every failure inside the thumbnail pipeline is converted at the component
/// boundary where it happens (placeholder, skip, or empty-state message).
/// These variants only cross module boundaries internally.
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TimelineError {
    #[error("catalog query failed: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error("invalid configuration value `{field}`: {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    #[error("failed to decode {}: {reason}", path.display())]
    Decode { path: PathBuf, reason: String },

    #[error("viewport mapping failed: {0}")]
    ViewportMapping(String),

    #[error("thumbnail loader has been shut down")]
    LoaderClosed,
}

pub type Result<T> = std::result::Result<T, TimelineError>;

impl TimelineError {
    pub fn decode(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        TimelineError::Decode {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
