//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Core error: {0}")]
    Core(#[from] fcast_core::CoreError),

    #[error("Store error: {0}")]
    Store(#[from] fcast_store::StoreError),

    #[error("Signal error: {0}")]
    Signal(#[from] fcast_signal::SignalError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] fcast_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Report serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type AppResult<T> = Result<T, AppError>;
