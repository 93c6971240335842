//! Application configuration.
//!
//! `AppConfig` mirrors the TOML file and is loosely typed; `validate` turns it
//! into the immutable `RunSettings` every component is built from.

use crate::error::{AppError, AppResult};
use fcast_core::{ModelId, Timeframe};
use fcast_signal::InvokerSettings;
use fcast_store::WorkspaceLayout;
use fcast_telemetry::logging::DEFAULT_FILTER;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "FCAST_CONFIG";

/// Config file used when neither the flag nor the env var is set.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// What a file task does after an invocation failed for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Record the failure and keep feeding lines.
    #[default]
    Continue,
    /// Finish the current line, then stop this file as failed.
    AbortFile,
}

/// Directory layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Input bar files (`<symbol>-<timeframe>.csv`).
    #[serde(default = "default_input_dir")]
    pub input_dir: PathBuf,
    /// Working buffers.
    #[serde(default = "default_buffer_dir")]
    pub buffer_dir: PathBuf,
    /// Per-model result files.
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,
    /// Raw generator output.
    #[serde(default = "default_raw_dir")]
    pub raw_dir: PathBuf,
}

fn default_input_dir() -> PathBuf {
    PathBuf::from("bars")
}

fn default_buffer_dir() -> PathBuf {
    PathBuf::from("bars/Temp")
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("incr")
}

fn default_raw_dir() -> PathBuf {
    PathBuf::from("incr/Temp")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            input_dir: default_input_dir(),
            buffer_dir: default_buffer_dir(),
            results_dir: default_results_dir(),
            raw_dir: default_raw_dir(),
        }
    }
}

/// Signal generator invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalConfig {
    /// Generator binary; a bare name is looked up in `PATH`.
    #[serde(default = "default_binary")]
    pub binary: PathBuf,
    /// Models run for every fed line.
    #[serde(default = "default_models")]
    pub models: Vec<String>,
    /// Fourth generator argument. `false` makes it reprocess the whole buffer.
    #[serde(default = "default_incremental_flag")]
    pub incremental_flag: String,
    /// Generator processes allowed at once across all files. Default: 8.
    #[serde(default = "default_max_processes")]
    pub max_processes: usize,
    /// Deadline per attempt (seconds). Default: 600.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Extra attempts after a failure. Default: 0.
    #[serde(default)]
    pub max_retries: u32,
    /// First retry delay (ms), doubled per retry. Default: 1,000.
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Remove raw output before each attempt. Default: true.
    #[serde(default = "default_true")]
    pub truncate_raw_output: bool,
}

fn default_binary() -> PathBuf {
    PathBuf::from("fdisignalgenerator")
}

fn default_models() -> Vec<String> {
    vec!["FDS2".to_string(), "FDS1".to_string()]
}

fn default_incremental_flag() -> String {
    "false".to_string()
}

fn default_max_processes() -> usize {
    8
}

fn default_timeout_secs() -> u64 {
    600
}

fn default_retry_base_delay_ms() -> u64 {
    1_000
}

fn default_true() -> bool {
    true
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            models: default_models(),
            incremental_flag: default_incremental_flag(),
            max_processes: default_max_processes(),
            timeout_secs: default_timeout_secs(),
            max_retries: 0,
            retry_base_delay_ms: default_retry_base_delay_ms(),
            truncate_raw_output: true,
        }
    }
}

/// Run behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Timeframe tags to process. Required (here or on the command line).
    #[serde(default)]
    pub timeframes: Vec<String>,
    /// Leading lines copied without invoking the generator. Default: 500.
    #[serde(default = "default_skip_rows")]
    pub skip_rows: u64,
    /// Resume from existing working buffers instead of resetting. Default: false.
    #[serde(default)]
    pub continue_prev: bool,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    /// Keep polling sources for new lines after they are exhausted.
    #[serde(default)]
    pub follow: bool,
    /// Source poll interval in follow mode (ms). Default: 1,000.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// `sync_data` after every buffer and result write. Default: false.
    #[serde(default)]
    pub sync_writes: bool,
    /// Log a progress line every N consumed lines (0 disables). Default: 100.
    #[serde(default = "default_progress_every")]
    pub progress_every: u64,
}

fn default_skip_rows() -> u64 {
    500
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_progress_every() -> u64 {
    100
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            timeframes: Vec::new(),
            skip_rows: default_skip_rows(),
            continue_prev: false,
            failure_policy: FailurePolicy::default(),
            follow: false,
            poll_interval_ms: default_poll_interval_ms(),
            sync_writes: false,
            progress_every: default_progress_every(),
        }
    }
}

/// Logging and run outputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    /// Progress board render interval (seconds, 0 disables). Default: 30.
    #[serde(default = "default_progress_interval_secs")]
    pub progress_interval_secs: u64,
    /// Prometheus textfile written at the end of the run.
    #[serde(default)]
    pub metrics_file: Option<PathBuf>,
    /// JSON run report written at the end of the run.
    #[serde(default)]
    pub report_file: Option<PathBuf>,
}

fn default_log_filter() -> String {
    DEFAULT_FILTER.to_string()
}

fn default_progress_interval_secs() -> u64 {
    30
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
            progress_interval_secs: default_progress_interval_secs(),
            metrics_file: None,
            report_file: None,
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub signal: SignalConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// Load configuration.
    ///
    /// An explicit path must exist. Without one, `FCAST_CONFIG` is tried, then
    /// `config/default.toml`; if neither exists the built-in defaults are used.
    pub fn load(explicit: Option<&Path>) -> AppResult<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Self::from_file(Path::new(&path));
        }

        let path = Path::new(DEFAULT_CONFIG_PATH);
        if path.exists() {
            Self::from_file(path)
        } else {
            tracing::debug!(path = %path.display(), "Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load from a specific file.
    pub fn from_file(path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config {}: {e}", path.display()))
        })?;

        toml::from_str(&content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))
    }

    /// Apply command-line overrides.
    pub fn apply(&mut self, overrides: CliOverrides) {
        if !overrides.timeframes.is_empty() {
            self.run.timeframes = overrides.timeframes;
        }
        if let Some(skip_rows) = overrides.skip_rows {
            self.run.skip_rows = skip_rows;
        }
        if overrides.continue_prev {
            self.run.continue_prev = true;
        }
        if let Some(max_processes) = overrides.max_processes {
            self.signal.max_processes = max_processes;
        }
        if let Some(models) = overrides.models {
            self.signal.models = models;
        }
        if let Some(binary) = overrides.signal_bin {
            self.signal.binary = binary;
        }
        if let Some(timeout_secs) = overrides.timeout_secs {
            self.signal.timeout_secs = timeout_secs;
        }
        if overrides.follow {
            self.run.follow = true;
        }
        if overrides.report.is_some() {
            self.telemetry.report_file = overrides.report;
        }
        if overrides.metrics_file.is_some() {
            self.telemetry.metrics_file = overrides.metrics_file;
        }
    }

    /// Check the configuration and build the run settings.
    pub fn validate(&self) -> AppResult<RunSettings> {
        if self.run.timeframes.is_empty() {
            return Err(AppError::Config(
                "at least one timeframe is required".to_string(),
            ));
        }
        let mut timeframes = Vec::with_capacity(self.run.timeframes.len());
        for tag in &self.run.timeframes {
            let tf = Timeframe::new(tag.as_str())?;
            if !timeframes.contains(&tf) {
                timeframes.push(tf);
            }
        }

        if self.signal.models.is_empty() {
            return Err(AppError::Config("at least one model is required".to_string()));
        }
        let mut seen = HashSet::new();
        let mut models = Vec::with_capacity(self.signal.models.len());
        for id in &self.signal.models {
            let model = ModelId::new(id.as_str())?;
            if !seen.insert(model.clone()) {
                return Err(AppError::Config(format!("duplicate model: {model}")));
            }
            models.push(model);
        }

        if self.signal.max_processes == 0 {
            return Err(AppError::Config("max_processes must be positive".to_string()));
        }
        if self.signal.timeout_secs == 0 {
            return Err(AppError::Config("timeout_secs must be positive".to_string()));
        }
        if self.run.follow && self.run.poll_interval_ms == 0 {
            return Err(AppError::Config(
                "poll_interval_ms must be positive in follow mode".to_string(),
            ));
        }

        Ok(RunSettings {
            layout: WorkspaceLayout::new(
                &self.paths.input_dir,
                &self.paths.buffer_dir,
                &self.paths.results_dir,
                &self.paths.raw_dir,
            ),
            timeframes,
            models,
            skip_rows: self.run.skip_rows,
            reset: !self.run.continue_prev,
            max_processes: self.signal.max_processes,
            binary: self.signal.binary.clone(),
            incremental_flag: self.signal.incremental_flag.clone(),
            invoker: InvokerSettings {
                timeout: Duration::from_secs(self.signal.timeout_secs),
                max_retries: self.signal.max_retries,
                retry_base_delay: Duration::from_millis(self.signal.retry_base_delay_ms),
                truncate_raw_output: self.signal.truncate_raw_output,
            },
            failure_policy: self.run.failure_policy,
            follow: self.run.follow,
            poll_interval: Duration::from_millis(self.run.poll_interval_ms),
            sync_writes: self.run.sync_writes,
            progress_every: self.run.progress_every,
            progress_interval: Duration::from_secs(self.telemetry.progress_interval_secs),
        })
    }
}

/// Command-line values that override the file.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub timeframes: Vec<String>,
    pub skip_rows: Option<u64>,
    pub continue_prev: bool,
    pub max_processes: Option<usize>,
    pub models: Option<Vec<String>>,
    pub signal_bin: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
    pub follow: bool,
    pub report: Option<PathBuf>,
    pub metrics_file: Option<PathBuf>,
}

/// Immutable settings for one run.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub layout: WorkspaceLayout,
    /// Deduplicated, in request order.
    pub timeframes: Vec<Timeframe>,
    /// Unique, in request order.
    pub models: Vec<ModelId>,
    pub skip_rows: u64,
    /// Reset working state of the requested timeframes before starting.
    pub reset: bool,
    pub max_processes: usize,
    pub binary: PathBuf,
    pub incremental_flag: String,
    pub invoker: InvokerSettings,
    pub failure_policy: FailurePolicy,
    pub follow: bool,
    pub poll_interval: Duration,
    pub sync_writes: bool,
    pub progress_every: u64,
    /// Zero disables the periodic board render.
    pub progress_interval: Duration,
}

impl RunSettings {
    /// Settings for a run rooted at `root` (`bars/`, `incr/`, ...).
    ///
    /// Used by tests and embedding callers that skip the config file.
    pub fn under(root: &Path, timeframes: Vec<Timeframe>, models: Vec<ModelId>) -> Self {
        Self {
            layout: WorkspaceLayout::under(root),
            timeframes,
            models,
            skip_rows: default_skip_rows(),
            reset: true,
            max_processes: default_max_processes(),
            binary: default_binary(),
            incremental_flag: default_incremental_flag(),
            invoker: InvokerSettings::default(),
            failure_policy: FailurePolicy::Continue,
            follow: false,
            poll_interval: Duration::from_millis(default_poll_interval_ms()),
            sync_writes: false,
            progress_every: default_progress_every(),
            progress_interval: Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.paths.input_dir, PathBuf::from("bars"));
        assert_eq!(config.paths.buffer_dir, PathBuf::from("bars/Temp"));
        assert_eq!(config.paths.results_dir, PathBuf::from("incr"));
        assert_eq!(config.paths.raw_dir, PathBuf::from("incr/Temp"));
        assert_eq!(config.signal.models, vec!["FDS2", "FDS1"]);
        assert_eq!(config.signal.max_processes, 8);
        assert_eq!(config.signal.timeout_secs, 600);
        assert_eq!(config.run.skip_rows, 500);
        assert!(!config.run.continue_prev);
        assert_eq!(config.run.failure_policy, FailurePolicy::Continue);
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: AppConfig = toml::from_str(
            r#"
            [signal]
            models = ["M1", "M2"]
            max_retries = 2

            [run]
            timeframes = ["60", "30"]
            failure_policy = "abort_file"
            "#,
        )
        .unwrap();

        assert_eq!(config.signal.models, vec!["M1", "M2"]);
        assert_eq!(config.signal.max_retries, 2);
        assert_eq!(config.signal.timeout_secs, 600);
        assert_eq!(config.run.failure_policy, FailurePolicy::AbortFile);
        assert_eq!(config.run.skip_rows, 500);
        assert_eq!(config.paths.results_dir, PathBuf::from("incr"));
    }

    #[test]
    fn test_overrides() {
        let mut config = AppConfig::default();
        config.run.timeframes = vec!["30".to_string()];
        config.apply(CliOverrides {
            timeframes: vec!["60".to_string()],
            skip_rows: Some(2),
            continue_prev: true,
            max_processes: Some(3),
            models: Some(vec!["M1".to_string()]),
            ..CliOverrides::default()
        });

        let settings = config.validate().unwrap();
        assert_eq!(settings.timeframes, vec![Timeframe::new("60").unwrap()]);
        assert_eq!(settings.skip_rows, 2);
        assert!(!settings.reset);
        assert_eq!(settings.max_processes, 3);
        assert_eq!(settings.models, vec![ModelId::new("M1").unwrap()]);
    }

    #[test]
    fn test_validate_rejects() {
        let mut config = AppConfig::default();
        assert!(matches!(config.validate(), Err(AppError::Config(_))));

        config.run.timeframes = vec!["60".to_string()];
        assert!(config.validate().is_ok());

        config.signal.models = vec!["M1".to_string(), "M1".to_string()];
        assert!(matches!(config.validate(), Err(AppError::Config(_))));

        config.signal.models = vec!["M1".to_string()];
        config.signal.max_processes = 0;
        assert!(matches!(config.validate(), Err(AppError::Config(_))));

        config.signal.max_processes = 1;
        config.run.timeframes = vec!["6/0".to_string()];
        assert!(matches!(config.validate(), Err(AppError::Core(_))));
    }

    #[test]
    fn test_duplicate_timeframes_collapsed() {
        let mut config = AppConfig::default();
        config.run.timeframes = vec!["60".to_string(), "30".to_string(), "60".to_string()];
        let settings = config.validate().unwrap();
        assert_eq!(settings.timeframes.len(), 2);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("fcast.toml");
        std::fs::write(&path, "[run]\ntimeframes = [\"60\"]\nskip_rows = 10\n").unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.run.skip_rows, 10);
        assert!(AppConfig::load(Some(&dir.path().join("missing.toml"))).is_err());
    }
}
