//! Signal invocation with deadline, retry and last-line capture.
//!
//! One `invoke` call turns "run the generator on this buffer for this model"
//! into either a `ResultRecord` or a `FailedInvocation`. It never returns a
//! partial record, and a failure never touches the result files.

use crate::output::{output_len, read_last_line_after};
use crate::runner::{SignalJob, SignalRunner};
use crate::slots::SlotPool;
use fcast_core::{FailedInvocation, InvocationFailure, ModelId, ResultRecord, TrackedFile};
use fcast_telemetry::Metrics;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Upper bound for a single retry delay.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Invocation tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokerSettings {
    /// Deadline for one attempt. The process is killed when it passes.
    pub timeout: Duration,
    /// Extra attempts after the first failure.
    pub max_retries: u32,
    /// Delay before the first retry; doubles for each further retry.
    pub retry_base_delay: Duration,
    /// Remove the raw output file before each attempt.
    pub truncate_raw_output: bool,
}

impl Default for InvokerSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(600),
            max_retries: 0,
            retry_base_delay: Duration::from_millis(1000),
            truncate_raw_output: true,
        }
    }
}

/// Runs the generator for one (file, model, line) and captures its result.
pub struct SignalInvoker<R: SignalRunner> {
    runner: Arc<R>,
    slots: SlotPool,
    raw_dir: PathBuf,
    settings: InvokerSettings,
}

impl<R: SignalRunner> SignalInvoker<R> {
    pub fn new(
        runner: Arc<R>,
        slots: SlotPool,
        raw_dir: impl Into<PathBuf>,
        settings: InvokerSettings,
    ) -> Self {
        Self {
            runner,
            slots,
            raw_dir: raw_dir.into(),
            settings,
        }
    }

    pub fn slots(&self) -> &SlotPool {
        &self.slots
    }

    pub fn settings(&self) -> &InvokerSettings {
        &self.settings
    }

    pub fn runner(&self) -> &Arc<R> {
        &self.runner
    }

    /// Raw output path for `(file, model)`: `<raw_dir>/<stem>x<model>.csv`.
    pub fn raw_path(&self, file: &TrackedFile, model: &ModelId) -> PathBuf {
        self.raw_dir.join(file.result_file_name(model))
    }

    /// Invoke the generator on `buffer_path` after line `line_index` was fed.
    pub async fn invoke(
        &self,
        file: &TrackedFile,
        model: &ModelId,
        buffer_path: &Path,
        line_index: u64,
    ) -> Result<ResultRecord, FailedInvocation> {
        let job = SignalJob {
            buffer_path: buffer_path.to_path_buf(),
            output_path: self.raw_path(file, model),
            model: model.clone(),
        };

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.attempt(&job).await {
                Ok(line) => {
                    Metrics::invocation(model.as_str(), "success");
                    debug!(
                        file = %file,
                        model = %model,
                        line = line_index + 1,
                        attempt,
                        "Captured forecast"
                    );
                    return Ok(ResultRecord {
                        file: file.name().to_string(),
                        model: model.clone(),
                        line_index,
                        line,
                    });
                }
                Err(reason) if attempt <= self.settings.max_retries => {
                    Metrics::invocation(model.as_str(), "retry");
                    let delay = self.retry_delay(attempt);
                    warn!(
                        file = %file,
                        model = %model,
                        line = line_index + 1,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        reason = %reason,
                        "Signal generator failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(reason) => {
                    let outcome = match reason {
                        InvocationFailure::Timeout { .. } => "timeout",
                        _ => "failed",
                    };
                    Metrics::invocation(model.as_str(), outcome);
                    let failed = FailedInvocation {
                        file: file.name().to_string(),
                        model: model.clone(),
                        line_index,
                        attempts: attempt,
                        reason,
                    };
                    warn!(failure = %failed, "Signal generator failed");
                    return Err(failed);
                }
            }
        }
    }

    /// One attempt. The slot is held only while the process runs.
    ///
    /// Only output written by this attempt counts: without truncation the
    /// raw file's previous length is the start of this attempt's output.
    async fn attempt(&self, job: &SignalJob) -> Result<String, InvocationFailure> {
        let io_failure = |e: std::io::Error| InvocationFailure::Io {
            message: format!("{}: {e}", job.output_path.display()),
        };

        let offset = if self.settings.truncate_raw_output {
            match tokio::fs::remove_file(&job.output_path).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(io_failure(e)),
            }
            0
        } else {
            output_len(&job.output_path).await.map_err(io_failure)?
        };

        let permit = self
            .slots
            .acquire()
            .await
            .map_err(|e| InvocationFailure::Spawn {
                message: e.to_string(),
            })?;
        let started = Instant::now();
        let result = tokio::time::timeout(self.settings.timeout, self.runner.run(job)).await;
        Metrics::invocation_duration(job.model.as_str(), started.elapsed().as_secs_f64());
        drop(permit);

        match result {
            Err(_) => {
                return Err(InvocationFailure::Timeout {
                    after_ms: self.settings.timeout.as_millis() as u64,
                })
            }
            Ok(Err(failure)) => return Err(failure),
            Ok(Ok(())) => {}
        }

        match read_last_line_after(&job.output_path, offset).await {
            Ok(Some(line)) => Ok(line),
            Ok(None) => Err(InvocationFailure::EmptyOutput),
            Err(e) => Err(io_failure(e)),
        }
    }

    /// Exponential backoff: base * 2^(attempt-1), capped.
    fn retry_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.settings
            .retry_base_delay
            .saturating_mul(1u32 << exponent)
            .min(MAX_RETRY_DELAY)
    }
}
