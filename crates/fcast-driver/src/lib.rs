//! Incremental forecast generation driver.
//!
//! Feeds growing bar files to the signal generator one line at a time, for
//! every configured model, and appends the generator's last output line to a
//! per-file, per-model result file:
//! - Directory preparation and reset of the requested timeframes
//! - One task per input file; a process slot pool shared by all of them
//! - A barrier per line across models
//! - Resume from existing working buffers

pub mod app;
pub mod config;
pub mod error;
pub mod file_worker;

pub use app::Application;
pub use config::{AppConfig, CliOverrides, FailurePolicy, RunSettings};
pub use error::{AppError, AppResult};
pub use file_worker::FileWorker;
