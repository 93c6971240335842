//! Invocation, per-file and per-run outcomes.
//!
//! Failures are values here, not errors: a failed invocation is recorded in its
//! file's outcome and the file keeps going (or stops, depending on policy),
//! while sibling files are never affected.

use crate::types::ModelId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Every file completed and every invocation succeeded.
pub const EXIT_OK: i32 = 0;
/// At least one file or invocation failed.
pub const EXIT_FAILED: i32 = 2;
/// Run was interrupted before all files completed.
pub const EXIT_INTERRUPTED: i32 = 130;

/// Why a single signal-generator invocation failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InvocationFailure {
    /// The process could not be started.
    Spawn { message: String },
    /// The process exited unsuccessfully. `code` is `None` when killed by a signal.
    Exit { code: Option<i32>, stderr: String },
    /// The process exceeded its deadline and was killed.
    Timeout { after_ms: u64 },
    /// The process succeeded but left no output line.
    EmptyOutput,
    /// Reading the raw output failed.
    Io { message: String },
}

impl InvocationFailure {
    /// Short label used for metrics and summaries.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Spawn { .. } => "spawn",
            Self::Exit { .. } => "exit",
            Self::Timeout { .. } => "timeout",
            Self::EmptyOutput => "empty_output",
            Self::Io { .. } => "io",
        }
    }
}

impl fmt::Display for InvocationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spawn { message } => write!(f, "failed to spawn: {message}"),
            Self::Exit { code: Some(code), stderr } if stderr.is_empty() => {
                write!(f, "exited with status {code}")
            }
            Self::Exit { code: Some(code), stderr } => {
                write!(f, "exited with status {code}: {stderr}")
            }
            Self::Exit { code: None, .. } => write!(f, "terminated by signal"),
            Self::Timeout { after_ms } => write!(f, "timed out after {after_ms}ms"),
            Self::EmptyOutput => write!(f, "produced no output"),
            Self::Io { message } => write!(f, "output unreadable: {message}"),
        }
    }
}

/// Identity and reason of an invocation that did not produce a result row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedInvocation {
    pub file: String,
    pub model: ModelId,
    /// Zero-based source line index.
    pub line_index: u64,
    /// Attempts made, including retries.
    pub attempts: u32,
    pub reason: InvocationFailure,
}

impl fmt::Display for FailedInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} line {} ({} attempt(s)): {}",
            self.file,
            self.model,
            self.line_index + 1,
            self.attempts,
            self.reason
        )
    }
}

/// Terminal state of a file task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileStatus {
    /// Source exhausted (snapshot mode) or follow mode ended cleanly.
    Completed,
    /// The task stopped on a fatal per-file error.
    Failed { reason: String },
    /// Shutdown was requested before the source was exhausted.
    Interrupted,
}

/// Outcome of one file task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOutcome {
    pub file: String,
    pub status: FileStatus,
    /// Lines already in the working buffer when the task started.
    pub start_line: u64,
    /// Lines in the working buffer when the task ended.
    pub lines_consumed: u64,
    /// Lines copied during this run without invoking the generator.
    pub lines_seeded: u64,
    /// Lines for which the generator was invoked (one round per line).
    pub rounds: u64,
    /// Result rows appended across all models.
    pub records_written: u64,
    pub failed_invocations: Vec<FailedInvocation>,
}

impl FileOutcome {
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            status: FileStatus::Completed,
            start_line: 0,
            lines_consumed: 0,
            lines_seeded: 0,
            rounds: 0,
            records_written: 0,
            failed_invocations: Vec::new(),
        }
    }

    /// Outcome for a task that never got going.
    pub fn failed(file: impl Into<String>, reason: impl Into<String>) -> Self {
        let mut outcome = Self::new(file);
        outcome.status = FileStatus::Failed {
            reason: reason.into(),
        };
        outcome
    }

    pub fn is_completed(&self) -> bool {
        self.status == FileStatus::Completed
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, FileStatus::Failed { .. })
    }

    pub fn is_interrupted(&self) -> bool {
        self.status == FileStatus::Interrupted
    }
}

/// Aggregate counts over a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub files_total: usize,
    pub files_completed: usize,
    pub files_failed: usize,
    pub files_interrupted: usize,
    pub rounds: u64,
    pub records_written: u64,
    pub failed_invocations: usize,
}

/// Final report of one driver run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub files: Vec<FileOutcome>,
}

impl RunReport {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            files: Vec::new(),
        }
    }

    pub fn push(&mut self, outcome: FileOutcome) {
        self.files.push(outcome);
    }

    pub fn finish(&mut self) {
        self.files.sort_by(|a, b| a.file.cmp(&b.file));
        self.finished_at = Some(Utc::now());
    }

    pub fn summary(&self) -> RunSummary {
        self.files.iter().fold(
            RunSummary {
                files_total: self.files.len(),
                ..RunSummary::default()
            },
            |mut acc, f| {
                match f.status {
                    FileStatus::Completed => acc.files_completed += 1,
                    FileStatus::Failed { .. } => acc.files_failed += 1,
                    FileStatus::Interrupted => acc.files_interrupted += 1,
                }
                acc.rounds += f.rounds;
                acc.records_written += f.records_written;
                acc.failed_invocations += f.failed_invocations.len();
                acc
            },
        )
    }

    /// All failed invocations across files.
    pub fn failed_invocations(&self) -> impl Iterator<Item = &FailedInvocation> {
        self.files.iter().flat_map(|f| f.failed_invocations.iter())
    }

    /// Process exit code for this report.
    ///
    /// Failures take precedence over interruption.
    pub fn exit_code(&self) -> i32 {
        let summary = self.summary();
        if summary.files_failed > 0 || summary.failed_invocations > 0 {
            EXIT_FAILED
        } else if summary.files_interrupted > 0 {
            EXIT_INTERRUPTED
        } else {
            EXIT_OK
        }
    }
}

impl Default for RunReport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed_invocation(file: &str) -> FailedInvocation {
        FailedInvocation {
            file: file.to_string(),
            model: ModelId::new("FDS1").unwrap(),
            line_index: 9,
            attempts: 2,
            reason: InvocationFailure::Timeout { after_ms: 1500 },
        }
    }

    #[test]
    fn test_empty_report_is_ok() {
        let report = RunReport::new();
        assert_eq!(report.summary().files_total, 0);
        assert_eq!(report.exit_code(), EXIT_OK);
    }

    #[test]
    fn test_summary_counts() {
        let mut report = RunReport::new();

        let mut done = FileOutcome::new("X-60.csv");
        done.rounds = 3;
        done.records_written = 6;
        report.push(done);

        report.push(FileOutcome::failed("Y-60.csv", "working buffer ahead of source"));

        let mut interrupted = FileOutcome::new("Z-60.csv");
        interrupted.status = FileStatus::Interrupted;
        report.push(interrupted);

        let summary = report.summary();
        assert_eq!(summary.files_total, 3);
        assert_eq!(summary.files_completed, 1);
        assert_eq!(summary.files_failed, 1);
        assert_eq!(summary.files_interrupted, 1);
        assert_eq!(summary.rounds, 3);
        assert_eq!(summary.records_written, 6);
        assert_eq!(report.exit_code(), EXIT_FAILED);
    }

    #[test]
    fn test_failed_invocation_marks_run_failed() {
        let mut report = RunReport::new();
        let mut outcome = FileOutcome::new("X-60.csv");
        outcome.failed_invocations.push(failed_invocation("X-60.csv"));
        report.push(outcome);

        assert_eq!(report.exit_code(), EXIT_FAILED);
        let failed: Vec<_> = report.failed_invocations().collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(
            failed[0].to_string(),
            "X-60.csv FDS1 line 10 (2 attempt(s)): timed out after 1500ms"
        );
    }

    #[test]
    fn test_interrupted_exit_code() {
        let mut report = RunReport::new();
        let mut outcome = FileOutcome::new("X-60.csv");
        outcome.status = FileStatus::Interrupted;
        report.push(outcome);
        assert_eq!(report.exit_code(), EXIT_INTERRUPTED);
    }

    #[test]
    fn test_finish_sorts_and_stamps() {
        let mut report = RunReport::new();
        report.push(FileOutcome::new("b-60.csv"));
        report.push(FileOutcome::new("a-60.csv"));
        report.finish();
        assert_eq!(report.files[0].file, "a-60.csv");
        assert!(report.finished_at.is_some());
    }

    #[test]
    fn test_report_json_shape() {
        let mut report = RunReport::new();
        let mut outcome = FileOutcome::new("X-60.csv");
        outcome.failed_invocations.push(failed_invocation("X-60.csv"));
        report.push(outcome);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["files"][0]["status"]["status"], "completed");
        assert_eq!(
            json["files"][0]["failed_invocations"][0]["reason"]["kind"],
            "timeout"
        );
    }

    #[test]
    fn test_failure_display() {
        let exit = InvocationFailure::Exit {
            code: Some(3),
            stderr: "bad input".to_string(),
        };
        assert_eq!(exit.to_string(), "exited with status 3: bad input");
        assert_eq!(exit.label(), "exit");
        assert_eq!(InvocationFailure::EmptyOutput.to_string(), "produced no output");
    }
}
