//! Core domain types for the incremental forecast driver.
//!
//! This crate provides the vocabulary shared by every other crate:
//! - `Timeframe`, `ModelId`: validated tags used to select inputs and models
//! - `TrackedFile`: one input bar file selected for processing
//! - `ResultRecord`: one persisted forecast row per (file, model, line)
//! - Outcome types collected into the final `RunReport`

pub mod error;
pub mod outcome;
pub mod types;

pub use error::{CoreError, Result};
pub use outcome::{
    FailedInvocation, FileOutcome, FileStatus, InvocationFailure, RunReport, RunSummary,
    EXIT_FAILED, EXIT_INTERRUPTED, EXIT_OK,
};
pub use types::{ModelId, ResultRecord, Timeframe, TrackedFile};
