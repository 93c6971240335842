//! Signal invocation error types.
//!
//! Per-invocation failures are `fcast_core::InvocationFailure` values; these
//! errors cover setup problems only.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SignalError {
    #[error("Signal generator not found: {}", .0.display())]
    BinaryNotFound(PathBuf),

    #[error("Process slot pool is closed")]
    SlotPoolClosed,
}

pub type SignalResult<T> = Result<T, SignalError>;
