//! Prometheus metrics, structured logging and progress tracking for fcast.
//!
//! - Structured logging with tracing (pretty for development, JSON in production)
//! - Prometheus counters for fed lines and generator invocations
//! - `ProgressBoard`: per-file progress counters behind a shared lock

pub mod error;
pub mod logging;
pub mod metrics;
pub mod progress;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
pub use progress::{FileProgress, ProgressBoard};
