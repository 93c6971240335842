//! Store error types.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Source file not found: {}", .0.display())]
    SourceMissing(PathBuf),

    #[error("Input directory not found: {}", .0.display())]
    InputDirMissing(PathBuf),

    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("Working buffer {} has more lines than its source (first extra line {line})", .buffer.display())]
    BufferAhead { buffer: PathBuf, line: u64 },

    #[error("Working buffer {} differs from its source at line {line}", .buffer.display())]
    BufferMismatch { buffer: PathBuf, line: u64 },

    #[error("Source {} shrank to {len} bytes after {consumed} bytes were read", .path.display())]
    SourceTruncated { path: PathBuf, consumed: u64, len: u64 },
}

impl StoreError {
    /// Errors that mean persisted state no longer matches its source and
    /// needs manual attention (or a reset).
    pub fn is_state_mismatch(&self) -> bool {
        matches!(
            self,
            Self::BufferAhead { .. } | Self::BufferMismatch { .. } | Self::SourceTruncated { .. }
        )
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
