//! Signal runner trait and the subprocess implementation.

use crate::error::{SignalError, SignalResult};
use fcast_core::{InvocationFailure, ModelId};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;
use tokio::process::Command;
use tracing::trace;

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Bytes of stderr kept in a failure reason.
const STDERR_TAIL_BYTES: usize = 512;

/// One generator run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalJob {
    /// Up-to-date working buffer.
    pub buffer_path: PathBuf,
    /// Where the generator writes its output.
    pub output_path: PathBuf,
    pub model: ModelId,
}

/// Runs the signal generator once.
///
/// Implementations only start the computation and wait for it; deadlines,
/// retries and output capture belong to `SignalInvoker`. Dropping the returned
/// future must stop the computation.
pub trait SignalRunner: Send + Sync {
    fn run<'a>(&'a self, job: &'a SignalJob) -> BoxFuture<'a, Result<(), InvocationFailure>>;
}

/// Runs the external generator binary as a child process.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    program: PathBuf,
    incremental_flag: String,
}

impl ProcessRunner {
    pub fn new(program: impl Into<PathBuf>, incremental_flag: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            incremental_flag: incremental_flag.into(),
        }
    }

    /// Like `new`, but fails early when the program cannot be found.
    ///
    /// A bare name is looked up in `PATH`; anything with a directory part
    /// must exist as a file.
    pub fn resolve(
        program: impl Into<PathBuf>,
        incremental_flag: impl Into<String>,
    ) -> SignalResult<Self> {
        let program = program.into();
        let found = if program.components().count() > 1 {
            program.is_file()
        } else {
            search_path(program.as_os_str()).is_some()
        };
        if !found {
            return Err(SignalError::BinaryNotFound(program));
        }
        Ok(Self::new(program, incremental_flag))
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Build the command for `job`. Arguments are passed as a list, never
    /// through a shell.
    pub fn command(&self, job: &SignalJob) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg(&job.buffer_path)
            .arg(&job.output_path)
            .arg(job.model.as_str())
            .arg(&self.incremental_flag)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

impl SignalRunner for ProcessRunner {
    fn run<'a>(&'a self, job: &'a SignalJob) -> BoxFuture<'a, Result<(), InvocationFailure>> {
        Box::pin(async move {
            trace!(
                program = %self.program.display(),
                buffer = %job.buffer_path.display(),
                model = %job.model,
                "Spawning signal generator"
            );

            let child = self
                .command(job)
                .spawn()
                .map_err(|e| InvocationFailure::Spawn {
                    message: format!("{}: {e}", self.program.display()),
                })?;

            let output = child
                .wait_with_output()
                .await
                .map_err(|e| InvocationFailure::Io {
                    message: e.to_string(),
                })?;

            if output.status.success() {
                Ok(())
            } else {
                Err(InvocationFailure::Exit {
                    code: output.status.code(),
                    stderr: stderr_tail(&output.stderr),
                })
            }
        })
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let start = stderr.len().saturating_sub(STDERR_TAIL_BYTES);
    String::from_utf8_lossy(&stderr[start..]).trim().to_string()
}

fn search_path(name: &OsStr) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}
