//! Append-only result file writer.
//!
//! One writer per (file, model). Rows are appended in arrival order and
//! flushed immediately; the file is opened lazily in append mode so earlier
//! runs' rows are kept on resume.

use crate::error::StoreResult;
use fcast_core::ResultRecord;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Writer for one `<stem>x<model>.csv` result file.
pub struct ResultWriter {
    path: PathBuf,
    file: Option<File>,
    records_written: u64,
    sync_writes: bool,
}

impl ResultWriter {
    pub fn new(path: impl Into<PathBuf>, sync_writes: bool) -> Self {
        Self {
            path: path.into(),
            file: None,
            records_written: 0,
            sync_writes,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows appended by this writer.
    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    /// Append one row, terminated by a newline, and flush it.
    pub async fn append(&mut self, record: &ResultRecord) -> StoreResult<()> {
        let file = match &mut self.file {
            Some(file) => file,
            slot @ None => {
                debug!(path = %self.path.display(), "Opening result file (append mode)");
                let opened = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&self.path)
                    .await?;
                slot.insert(opened)
            }
        };

        let mut row = Vec::with_capacity(record.line.len() + 1);
        row.extend_from_slice(record.line.trim_end_matches(['\r', '\n']).as_bytes());
        row.push(b'\n');

        file.write_all(&row).await?;
        file.flush().await?;
        if self.sync_writes {
            file.sync_data().await?;
        }
        self.records_written += 1;
        Ok(())
    }

    /// Flush and close the file. Further appends reopen it.
    pub async fn close(&mut self) -> StoreResult<()> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
            debug!(
                path = %self.path.display(),
                records = self.records_written,
                "Closed result file"
            );
        }
        Ok(())
    }
}
