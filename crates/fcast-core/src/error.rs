//! Error types for fcast-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid timeframe tag: {0:?}")]
    InvalidTimeframe(String),

    #[error("Invalid model identifier: {0:?}")]
    InvalidModel(String),

    #[error("Invalid file name: {0:?}")]
    InvalidFileName(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
