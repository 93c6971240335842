//! Prometheus metrics for the forecast driver.
//!
//! Covers:
//! - Lines fed into working buffers (seeded vs. forecast)
//! - Generator invocations by model and outcome
//! - Invocation latency
//! - Process-slot and file-task occupancy
//!
//! # Panics
//!
//! Metric registration uses `unwrap()`. A registration failure means duplicate
//! metric names, which is a programming error caught on first use.

use crate::error::TelemetryResult;
use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge, Encoder,
    HistogramVec, IntCounterVec, IntGauge, TextEncoder,
};
use std::path::Path;

/// Lines appended to working buffers that triggered a forecast round.
pub static LINES_FED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "fcast_lines_fed_total",
        "Source lines fed to the signal generator",
        &["file"]
    )
    .unwrap()
});

/// Lines copied into working buffers during the warm-up window.
pub static LINES_SEEDED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "fcast_lines_seeded_total",
        "Source lines copied without invoking the signal generator",
        &["file"]
    )
    .unwrap()
});

/// Generator invocations.
/// Labels: model, outcome (success/failed/timeout/retry)
pub static INVOCATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "fcast_invocations_total",
        "Signal generator invocations by outcome",
        &["model", "outcome"]
    )
    .unwrap()
});

/// Wall time of a single generator attempt in seconds.
pub static INVOCATION_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "fcast_invocation_duration_seconds",
        "Signal generator attempt duration in seconds",
        &["model"],
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0]
    )
    .unwrap()
});

/// Process slots currently held.
pub static PROCESS_SLOTS_IN_USE: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "fcast_process_slots_in_use",
        "External process slots currently held"
    )
    .unwrap()
});

/// File tasks currently running.
pub static FILE_TASKS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("fcast_file_tasks_active", "File tasks currently running").unwrap()
});

/// Metrics helper.
pub struct Metrics;

impl Metrics {
    /// Record a line that started a forecast round.
    pub fn line_fed(file: &str) {
        LINES_FED_TOTAL.with_label_values(&[file]).inc();
    }

    /// Record a warm-up line.
    pub fn line_seeded(file: &str) {
        LINES_SEEDED_TOTAL.with_label_values(&[file]).inc();
    }

    /// Record an invocation result.
    pub fn invocation(model: &str, outcome: &str) {
        INVOCATIONS_TOTAL.with_label_values(&[model, outcome]).inc();
    }

    /// Record attempt latency.
    pub fn invocation_duration(model: &str, seconds: f64) {
        INVOCATION_DURATION_SECONDS
            .with_label_values(&[model])
            .observe(seconds);
    }

    pub fn slot_acquired() {
        PROCESS_SLOTS_IN_USE.inc();
    }

    pub fn slot_released() {
        PROCESS_SLOTS_IN_USE.dec();
    }

    pub fn file_task_started() {
        FILE_TASKS_ACTIVE.inc();
    }

    pub fn file_task_finished() {
        FILE_TASKS_ACTIVE.dec();
    }

    /// Current count for `(model, outcome)`.
    pub fn invocation_count(model: &str, outcome: &str) -> u64 {
        INVOCATIONS_TOTAL.with_label_values(&[model, outcome]).get()
    }

    /// Encode the default registry in Prometheus text format.
    pub fn render() -> TelemetryResult<String> {
        let encoder = TextEncoder::new();
        let mut buf = Vec::new();
        encoder.encode(&prometheus::gather(), &mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Write the default registry to a textfile-collector file.
    ///
    /// Writes to a sibling temp file first and renames, so scrapers never see
    /// a half-written file.
    pub fn write_textfile(path: &Path) -> TelemetryResult<()> {
        let body = Self::render()?;
        let tmp = path.with_extension("prom.tmp");
        std::fs::write(&tmp, body)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}
