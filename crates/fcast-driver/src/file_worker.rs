//! Per-file task.
//!
//! Feeds one source file into its working buffer line by line. Lines inside
//! the warm-up window are only copied. Every later line starts one round: the
//! generator runs once per model, all in parallel, and the worker waits for the
//! whole round before the results are appended and the next line is read.
//!
//! A worker owns its buffer, result files and counters outright. It never
//! returns an error: whatever happens ends up in its `FileOutcome`.

use crate::config::{FailurePolicy, RunSettings};
use crate::error::AppResult;
use fcast_core::{FileOutcome, FileStatus, TrackedFile};
use fcast_signal::{SignalInvoker, SignalRunner};
use fcast_store::{FedLine, LineFeeder, ResultWriter};
use fcast_telemetry::{Metrics, ProgressBoard};
use futures_util::future::join_all;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How the feed loop ended, when it did not fail.
enum LoopEnd {
    /// Source exhausted, or follow mode stopped by shutdown.
    Finished,
    /// Shutdown requested with source lines still unread.
    Interrupted,
    /// `abort_file` policy after a failed invocation.
    Aborted { line: u64 },
}

pub struct FileWorker<R: SignalRunner> {
    file: TrackedFile,
    settings: Arc<RunSettings>,
    invoker: Arc<SignalInvoker<R>>,
    progress: Arc<ProgressBoard>,
    shutdown: CancellationToken,
}

impl<R: SignalRunner + 'static> FileWorker<R> {
    pub fn new(
        file: TrackedFile,
        settings: Arc<RunSettings>,
        invoker: Arc<SignalInvoker<R>>,
        progress: Arc<ProgressBoard>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            file,
            settings,
            invoker,
            progress,
            shutdown,
        }
    }

    pub fn file(&self) -> &TrackedFile {
        &self.file
    }

    /// Run the task to its end.
    pub async fn run(self) -> FileOutcome {
        Metrics::file_task_started();
        let mut outcome = FileOutcome::new(self.file.name());

        if let Err(e) = self.process(&mut outcome).await {
            error!(file = %self.file, error = %e, "File task failed");
            outcome.status = FileStatus::Failed {
                reason: e.to_string(),
            };
        }

        self.progress.finish(self.file.name());
        Metrics::file_task_finished();
        info!(
            file = %self.file,
            status = ?outcome.status,
            lines = outcome.lines_consumed,
            rounds = outcome.rounds,
            records = outcome.records_written,
            failed = outcome.failed_invocations.len(),
            "File task finished"
        );
        outcome
    }

    async fn process(&self, outcome: &mut FileOutcome) -> AppResult<()> {
        let layout = &self.settings.layout;
        let mut feeder = LineFeeder::open(
            &layout.source_path(&self.file),
            &layout.buffer_path(&self.file),
            self.settings.sync_writes,
        )
        .await?;

        outcome.start_line = feeder.start_line();
        outcome.lines_consumed = feeder.start_line();
        self.progress.register(self.file.name(), feeder.start_line());
        info!(
            file = %self.file,
            start_line = feeder.start_line(),
            resumed = feeder.start_line() > 0,
            "Starting file task"
        );

        let mut writers: Vec<ResultWriter> = self
            .settings
            .models
            .iter()
            .map(|model| {
                ResultWriter::new(
                    layout.result_path(&self.file, model),
                    self.settings.sync_writes,
                )
            })
            .collect();

        let result = self.feed(&mut feeder, &mut writers, outcome).await;

        for writer in &mut writers {
            if let Err(e) = writer.close().await {
                warn!(path = %writer.path().display(), error = %e, "Failed to close result file");
            }
        }
        outcome.lines_consumed = feeder.lines_consumed();
        if feeder.pending_fragment() > 0 {
            warn!(
                file = %self.file,
                bytes = feeder.pending_fragment(),
                "Unterminated last line left for a later run"
            );
        }

        match result? {
            LoopEnd::Finished => {}
            LoopEnd::Interrupted => {
                info!(file = %self.file, line = feeder.lines_consumed(), "File task interrupted");
                outcome.status = FileStatus::Interrupted;
            }
            LoopEnd::Aborted { line } => {
                outcome.status = FileStatus::Failed {
                    reason: format!("invocation failed at line {line}"),
                };
            }
        }
        Ok(())
    }

    async fn feed(
        &self,
        feeder: &mut LineFeeder,
        writers: &mut [ResultWriter],
        outcome: &mut FileOutcome,
    ) -> AppResult<LoopEnd> {
        loop {
            if self.shutdown.is_cancelled() {
                // Follow mode only ends through shutdown.
                return Ok(if self.settings.follow || feeder.is_exhausted() {
                    LoopEnd::Finished
                } else {
                    LoopEnd::Interrupted
                });
            }

            let Some(line) = feeder.next_line().await? else {
                if !self.settings.follow {
                    return Ok(LoopEnd::Finished);
                }
                tokio::select! {
                    _ = self.shutdown.cancelled() => return Ok(LoopEnd::Finished),
                    _ = tokio::time::sleep(self.settings.poll_interval) => {}
                }
                if feeder.refresh().await? {
                    debug!(file = %self.file, "Source grew");
                }
                continue;
            };

            if line.index < self.settings.skip_rows {
                Metrics::line_seeded(self.file.name());
                outcome.lines_seeded += 1;
            } else {
                Metrics::line_fed(self.file.name());
                let failed_before = outcome.failed_invocations.len();
                self.round(feeder.buffer_path(), &line, writers, outcome)
                    .await?;
                outcome.rounds += 1;

                if self.settings.failure_policy == FailurePolicy::AbortFile
                    && outcome.failed_invocations.len() > failed_before
                {
                    outcome.lines_consumed = feeder.lines_consumed();
                    return Ok(LoopEnd::Aborted {
                        line: line.number(),
                    });
                }
            }

            outcome.lines_consumed = feeder.lines_consumed();
            self.progress.update(
                self.file.name(),
                outcome.lines_consumed,
                outcome.rounds,
                outcome.failed_invocations.len() as u64,
            );
        }
    }

    /// One forecast round: every model on the current buffer, then append.
    ///
    /// Nothing is appended until all models have finished, so result files
    /// of one file never disagree about which line they have reached.
    async fn round(
        &self,
        buffer: &Path,
        line: &FedLine,
        writers: &mut [ResultWriter],
        outcome: &mut FileOutcome,
    ) -> AppResult<()> {
        let calls = self
            .settings
            .models
            .iter()
            .map(|model| self.invoker.invoke(&self.file, model, buffer, line.index));
        let results = join_all(calls).await;

        for (writer, result) in writers.iter_mut().zip(results) {
            match result {
                Ok(record) => {
                    writer.append(&record).await?;
                    outcome.records_written += 1;
                }
                Err(failed) => outcome.failed_invocations.push(failed),
            }
        }
        Ok(())
    }
}
