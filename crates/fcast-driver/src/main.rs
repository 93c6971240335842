//! fcast-incr: incremental forecast generation entry point.

use anyhow::{Context, Result};
use clap::Parser;
use fcast_core::EXIT_OK;
use fcast_driver::{AppConfig, Application, CliOverrides};
use fcast_telemetry::Metrics;
use std::path::PathBuf;
use tracing::{error, info, warn};

/// Exit code for setup failures (bad config, unusable directories).
const EXIT_SETUP: i32 = 1;

/// Feed bar files line by line to the signal generator for each model.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Timeframe tags to process (files named `<symbol>-<tag>.csv`)
    #[arg(short, long, num_args = 1.., required = true)]
    timeframes: Vec<String>,

    /// Leading rows copied without forecasting [default: 500]
    #[arg(short, long)]
    skip_rows: Option<u64>,

    /// Continue from existing working buffers instead of resetting
    #[arg(short = 'c', long)]
    continue_prev: bool,

    /// Maximum concurrent generator processes [default: 8]
    #[arg(short, long)]
    max_processes: Option<usize>,

    /// Configuration file path (can also be set via FCAST_CONFIG env var)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Comma-separated model list [default: FDS2,FDS1]
    #[arg(long, value_delimiter = ',')]
    models: Option<Vec<String>>,

    /// Signal generator binary
    #[arg(long)]
    signal_bin: Option<PathBuf>,

    /// Deadline per generator attempt in seconds [default: 600]
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Keep polling sources for new lines until interrupted
    #[arg(long)]
    follow: bool,

    /// Write the JSON run report here
    #[arg(long)]
    report: Option<PathBuf>,

    /// Write Prometheus metrics (textfile format) here
    #[arg(long)]
    metrics_file: Option<PathBuf>,
}

impl Args {
    fn overrides(self) -> CliOverrides {
        CliOverrides {
            timeframes: self.timeframes,
            skip_rows: self.skip_rows,
            continue_prev: self.continue_prev,
            max_processes: self.max_processes,
            models: self.models,
            signal_bin: self.signal_bin,
            timeout_secs: self.timeout_secs,
            follow: self.follow,
            report: self.report,
            metrics_file: self.metrics_file,
        }
    }
}

#[tokio::main]
async fn main() {
    let code = match run().await {
        Ok(code) => code,
        Err(e) => {
            // Logging may not be up yet.
            eprintln!("fcast-incr: {e:#}");
            error!(error = %format!("{e:#}"), "Run aborted");
            EXIT_SETUP
        }
    };
    std::process::exit(code);
}

async fn run() -> Result<i32> {
    let mut args = Args::parse();
    let config_path = args.config.take();

    let mut config = AppConfig::load(config_path.as_deref())?;
    config.apply(args.overrides());

    fcast_telemetry::init_logging(&config.telemetry.log_filter)?;
    info!("Starting fcast-incr v{}", env!("CARGO_PKG_VERSION"));

    let app = Application::new(&config)?;

    let shutdown = app.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Shutdown signal received, finishing current lines");
            shutdown.cancel();
        }
    });

    let report = app.run().await?;

    if let Some(path) = &config.telemetry.report_file {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json)
            .with_context(|| format!("writing run report {}", path.display()))?;
        info!(path = %path.display(), "Wrote run report");
    }
    if let Some(path) = &config.telemetry.metrics_file {
        Metrics::write_textfile(path)?;
        info!(path = %path.display(), "Wrote metrics");
    }

    let code = report.exit_code();
    if code != EXIT_OK {
        warn!(exit_code = code, "Run finished with problems");
    }
    Ok(code)
}
