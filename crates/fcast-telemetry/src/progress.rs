//! Per-file progress tracking.
//!
//! Each file task owns its counters and publishes them here after every line.
//! The lock only guards the board used for rendering; no business state lives
//! behind it.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;
use tracing::info;

/// Snapshot of one file's progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileProgress {
    /// Lines in the working buffer.
    pub consumed: u64,
    /// Lines for which a forecast round completed.
    pub rounds: u64,
    /// Invocations that produced no result row.
    pub failed: u64,
    /// The task has finished.
    pub done: bool,
}

/// Shared progress display for all file tasks.
pub struct ProgressBoard {
    /// Log a progress line every `every` consumed lines (0 disables).
    every: u64,
    files: Mutex<BTreeMap<String, FileProgress>>,
}

impl ProgressBoard {
    pub fn new(every: u64) -> Self {
        Self {
            every,
            files: Mutex::new(BTreeMap::new()),
        }
    }

    /// Register a file with its starting line count.
    pub fn register(&self, file: &str, consumed: u64) {
        self.files.lock().insert(
            file.to_string(),
            FileProgress {
                consumed,
                ..FileProgress::default()
            },
        );
    }

    /// Publish a file's counters after a line was handled.
    pub fn update(&self, file: &str, consumed: u64, rounds: u64, failed: u64) {
        {
            let mut files = self.files.lock();
            let entry = files.entry(file.to_string()).or_default();
            entry.consumed = consumed;
            entry.rounds = rounds;
            entry.failed = failed;
        }

        if self.every > 0 && consumed % self.every == 0 {
            info!(rounds, failed, "{} processed line {}", file_stem(file), consumed);
        }
    }

    /// Mark a file as finished.
    pub fn finish(&self, file: &str) {
        self.files.lock().entry(file.to_string()).or_default().done = true;
    }

    pub fn get(&self, file: &str) -> Option<FileProgress> {
        self.files.lock().get(file).copied()
    }

    /// Number of files still running.
    pub fn active(&self) -> usize {
        self.files.lock().values().filter(|p| !p.done).count()
    }

    /// Render the board as a small table, one file per line.
    pub fn render(&self) -> String {
        let files = self.files.lock();
        let width = files.keys().map(String::len).max().unwrap_or(4).max(4);
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:<width$}  {:>10}  {:>8}  {:>6}  state",
            "file", "consumed", "rounds", "failed"
        );
        for (name, p) in files.iter() {
            let state = if p.done { "done" } else { "running" };
            let _ = writeln!(
                out,
                "{:<width$}  {:>10}  {:>8}  {:>6}  {}",
                name, p.consumed, p.rounds, p.failed, state
            );
        }
        out
    }
}

/// File name without its extension.
fn file_stem(file: &str) -> &str {
    Path::new(file)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(file)
}
