//! Run orchestration.
//!
//! Prepares the workspace, discovers input files, runs one `FileWorker` per
//! file and collects their outcomes into a `RunReport`:
//! - Directory preparation and optional reset
//! - One task per file, all sharing the process slot pool
//! - Periodic progress board rendering
//! - Per-file isolation: a failed or panicked task never stops its siblings

use crate::config::{AppConfig, RunSettings};
use crate::error::AppResult;
use crate::file_worker::FileWorker;
use fcast_core::{FileOutcome, RunReport};
use fcast_signal::{ProcessRunner, SignalInvoker, SignalRunner, SlotPool};
use fcast_telemetry::ProgressBoard;
use futures_util::future::join_all;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Main application.
pub struct Application<R: SignalRunner> {
    settings: Arc<RunSettings>,
    invoker: Arc<SignalInvoker<R>>,
    progress: Arc<ProgressBoard>,
    shutdown: CancellationToken,
}

impl Application<ProcessRunner> {
    /// Create an application running the configured generator binary.
    pub fn new(config: &AppConfig) -> AppResult<Self> {
        let settings = config.validate()?;
        let runner =
            ProcessRunner::resolve(&settings.binary, settings.incremental_flag.as_str())?;
        info!(program = %runner.program().display(), "Using signal generator");
        Ok(Self::with_runner(settings, Arc::new(runner)))
    }
}

impl<R: SignalRunner + 'static> Application<R> {
    /// Create an application with a custom runner.
    pub fn with_runner(settings: RunSettings, runner: Arc<R>) -> Self {
        let slots = SlotPool::new(settings.max_processes);
        let invoker = SignalInvoker::new(
            runner,
            slots,
            settings.layout.raw_dir.clone(),
            settings.invoker.clone(),
        );
        let progress = ProgressBoard::new(settings.progress_every);
        Self {
            settings: Arc::new(settings),
            invoker: Arc::new(invoker),
            progress: Arc::new(progress),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    pub fn progress(&self) -> &ProgressBoard {
        &self.progress
    }

    /// Token that stops every file task at its next line boundary.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run every eligible file to its end.
    ///
    /// Errors only on setup problems (directories, discovery). Per-file
    /// problems are reported in the returned `RunReport`.
    pub async fn run(&self) -> AppResult<RunReport> {
        let mut report = RunReport::new();
        let settings = &self.settings;
        info!(
            run_id = %report.run_id,
            timeframes = ?settings.timeframes.iter().map(|t| t.as_str()).collect::<Vec<_>>(),
            models = ?settings.models.iter().map(|m| m.as_str()).collect::<Vec<_>>(),
            skip_rows = settings.skip_rows,
            reset = settings.reset,
            max_processes = settings.max_processes,
            follow = settings.follow,
            "Starting run"
        );

        let removed = settings
            .layout
            .prepare(&settings.timeframes, &settings.models, settings.reset)
            .await?;
        if settings.reset {
            info!(removed = removed.len(), "Reset working state");
        }

        let files = settings.layout.discover(&settings.timeframes).await?;
        if files.is_empty() {
            warn!(
                dir = %settings.layout.input_dir.display(),
                "No input files match the requested timeframes"
            );
        }
        info!(files = files.len(), "Spawning file tasks");

        let ticker = self.spawn_progress_ticker();

        let (names, handles): (Vec<String>, Vec<JoinHandle<FileOutcome>>) = files
            .into_iter()
            .map(|file| {
                let name = file.name().to_string();
                let worker = FileWorker::new(
                    file,
                    self.settings.clone(),
                    self.invoker.clone(),
                    self.progress.clone(),
                    self.shutdown.child_token(),
                );
                (name, tokio::spawn(worker.run()))
            })
            .unzip();

        for (name, joined) in names.into_iter().zip(join_all(handles).await) {
            match joined {
                Ok(outcome) => report.push(outcome),
                Err(e) => {
                    error!(file = %name, error = %e, "File task aborted");
                    report.push(FileOutcome::failed(name, format!("task aborted: {e}")));
                }
            }
        }

        if let Some(ticker) = ticker {
            ticker.abort();
        }
        report.finish();
        self.log_summary(&report);
        Ok(report)
    }

    fn spawn_progress_ticker(&self) -> Option<JoinHandle<()>> {
        let interval = self.settings.progress_interval;
        if interval.is_zero() {
            return None;
        }
        let progress = self.progress.clone();
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                info!(active = progress.active(), "Progress\n{}", progress.render());
            }
        }))
    }

    fn log_summary(&self, report: &RunReport) {
        let summary = report.summary();
        info!("Final progress\n{}", self.progress.render());

        for outcome in report.files.iter().filter(|f| f.is_failed()) {
            error!(file = %outcome.file, status = ?outcome.status, "File failed");
        }
        for failed in report.failed_invocations() {
            warn!(failure = %failed, "Failed invocation");
        }

        info!(
            run_id = %report.run_id,
            files = summary.files_total,
            completed = summary.files_completed,
            failed = summary.files_failed,
            interrupted = summary.files_interrupted,
            rounds = summary.rounds,
            records = summary.records_written,
            failed_invocations = summary.failed_invocations,
            exit_code = report.exit_code(),
            "Run finished"
        );
    }
}
