//! Prometheus metrics for the worker.

use std::net::SocketAddr;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::{WorkerError, WorkerResult};

/// Install the Prometheus recorder with an HTTP listener on `addr`.
///
/// Must be called from within the Tokio runtime. Without it the metric
/// macros below are no-ops.
pub fn install_exporter(addr: SocketAddr) -> WorkerResult<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| WorkerError::config_error(format!("Failed to install Prometheus exporter on {}: {}", addr, e)))
}

/// Metric names as constants for consistency.
pub mod names {
    pub const RUNS_TOTAL: &str = "vframe_runs_total";
    pub const FRAMES_EXTRACTED_TOTAL: &str = "vframe_frames_extracted_total";
    pub const STAGE_DURATION_SECONDS: &str = "vframe_stage_duration_seconds";
    pub const CLEANUP_FAILURES_TOTAL: &str = "vframe_cleanup_failures_total";
}

/// Record the end of a run. `outcome` is `completed` or the failed stage.
pub fn record_run(outcome: &str) {
    let labels = [("outcome", outcome.to_string())];
    counter!(names::RUNS_TOTAL, &labels).increment(1);
}

pub fn record_frames_extracted(count: usize) {
    counter!(names::FRAMES_EXTRACTED_TOTAL).increment(count as u64);
}

/// Record how long one pipeline stage took.
pub fn record_stage_duration(stage: &str, duration_secs: f64) {
    let labels = [("stage", stage.to_string())];
    histogram!(names::STAGE_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_cleanup_failures(count: usize) {
    if count > 0 {
        counter!(names::CLEANUP_FAILURES_TOTAL).increment(count as u64);
    }
}
