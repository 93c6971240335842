//! Mock signal runner for testing.
//!
//! Behaves like a well-mannered generator: on success it appends
//! `<model>,<buffer line count>` to the job's output path. Per-model delays,
//! failures and silent (no output) runs can be injected, and every start and
//! finish is recorded in order for barrier assertions.

use crate::runner::{BoxFuture, SignalJob, SignalRunner};
use fcast_core::{InvocationFailure, ModelId};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// Recorded runner activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEvent {
    Started {
        buffer: PathBuf,
        model: ModelId,
        buffer_lines: u64,
    },
    Finished {
        buffer: PathBuf,
        model: ModelId,
        buffer_lines: u64,
    },
}

impl MockEvent {
    pub fn buffer(&self) -> &PathBuf {
        match self {
            Self::Started { buffer, .. } | Self::Finished { buffer, .. } => buffer,
        }
    }

    pub fn buffer_lines(&self) -> u64 {
        match self {
            Self::Started { buffer_lines, .. } | Self::Finished { buffer_lines, .. } => {
                *buffer_lines
            }
        }
    }
}

#[derive(Debug, Clone)]
struct FailurePlan {
    failure: InvocationFailure,
    /// `None` fails forever.
    remaining: Option<u32>,
}

/// Mock signal runner.
#[derive(Debug, Default)]
pub struct MockSignalRunner {
    calls: Mutex<Vec<SignalJob>>,
    events: Mutex<Vec<MockEvent>>,
    delays: Mutex<HashMap<ModelId, Duration>>,
    failures: Mutex<HashMap<ModelId, FailurePlan>>,
    silent: Mutex<HashSet<ModelId>>,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

impl MockSignalRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every run of `model`.
    pub fn set_delay(&self, model: &ModelId, delay: Duration) {
        self.delays.lock().insert(model.clone(), delay);
    }

    /// Fail every run of `model`.
    pub fn set_failure(&self, model: &ModelId, failure: InvocationFailure) {
        self.failures.lock().insert(
            model.clone(),
            FailurePlan {
                failure,
                remaining: None,
            },
        );
    }

    /// Fail the next `times` runs of `model`, then succeed.
    pub fn fail_times(&self, model: &ModelId, failure: InvocationFailure, times: u32) {
        self.failures.lock().insert(
            model.clone(),
            FailurePlan {
                failure,
                remaining: Some(times),
            },
        );
    }

    /// Exit successfully without writing output.
    pub fn set_silent(&self, model: &ModelId) {
        self.silent.lock().insert(model.clone());
    }

    /// Recorded jobs.
    pub fn calls(&self) -> Vec<SignalJob> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Recorded start/finish events in order.
    pub fn events(&self) -> Vec<MockEvent> {
        self.events.lock().clone()
    }

    /// Highest number of runs observed in flight at once.
    pub fn max_concurrent(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    fn take_failure(&self, model: &ModelId) -> Option<InvocationFailure> {
        let mut failures = self.failures.lock();
        let plan = failures.get_mut(model)?;
        match plan.remaining.as_mut() {
            None => Some(plan.failure.clone()),
            Some(0) => None,
            Some(n) => {
                *n -= 1;
                Some(plan.failure.clone())
            }
        }
    }

    async fn execute(&self, job: &SignalJob) -> Result<(), InvocationFailure> {
        let buffer_lines = count_lines(job).await?;
        self.calls.lock().push(job.clone());
        self.events.lock().push(MockEvent::Started {
            buffer: job.buffer_path.clone(),
            model: job.model.clone(),
            buffer_lines,
        });

        let delay = self.delays.lock().get(&job.model).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let result = match self.take_failure(&job.model) {
            Some(failure) => Err(failure),
            None if self.silent.lock().contains(&job.model) => Ok(()),
            None => write_output(job, buffer_lines).await,
        };

        self.events.lock().push(MockEvent::Finished {
            buffer: job.buffer_path.clone(),
            model: job.model.clone(),
            buffer_lines,
        });
        result
    }
}

impl SignalRunner for MockSignalRunner {
    fn run<'a>(&'a self, job: &'a SignalJob) -> BoxFuture<'a, Result<(), InvocationFailure>> {
        Box::pin(async move {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(now, Ordering::SeqCst);
            let _guard = RunningGuard(&self.running);
            self.execute(job).await
        })
    }
}

/// Decrements the in-flight count even when the run future is dropped.
struct RunningGuard<'a>(&'a AtomicUsize);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn count_lines(job: &SignalJob) -> Result<u64, InvocationFailure> {
    let bytes = tokio::fs::read(&job.buffer_path)
        .await
        .map_err(|e| InvocationFailure::Io {
            message: e.to_string(),
        })?;
    Ok(bytes.iter().filter(|&&b| b == b'\n').count() as u64)
}

async fn write_output(job: &SignalJob, buffer_lines: u64) -> Result<(), InvocationFailure> {
    let io_err = |e: std::io::Error| InvocationFailure::Io {
        message: e.to_string(),
    };
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&job.output_path)
        .await
        .map_err(io_err)?;
    file.write_all(format!("{},{}\n", job.model, buffer_lines).as_bytes())
        .await
        .map_err(io_err)?;
    file.flush().await.map_err(io_err)
}
