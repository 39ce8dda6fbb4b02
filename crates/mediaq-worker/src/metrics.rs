//! Prometheus metrics for the worker.

use std::net::SocketAddr;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;

use crate::error::{WorkerError, WorkerResult};

/// Start the Prometheus exporter listening on `addr`.
///
/// Must be called from inside the tokio runtime.
pub fn init_metrics(addr: &str) -> WorkerResult<()> {
    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| WorkerError::config_error(format!("invalid METRICS_ADDR {}: {}", addr, e)))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| WorkerError::Metrics(e.to_string()))?;

    info!("Serving metrics on http://{}/metrics", addr);
    Ok(())
}

/// Metric names as constants for consistency.
pub mod names {
    // Job metrics
    pub const JOBS_COMPLETED_TOTAL: &str = "mediaq_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "mediaq_jobs_failed_total";
    pub const JOB_ERRORS_TOTAL: &str = "mediaq_job_errors_total";

    // Processing metrics
    pub const TRANSCODE_DURATION_SECONDS: &str = "mediaq_transcode_duration_seconds";
    pub const UPLOAD_DURATION_SECONDS: &str = "mediaq_upload_duration_seconds";
    pub const CLEANUP_WARNINGS_TOTAL: &str = "mediaq_cleanup_warnings_total";
}

/// Record job completed.
pub fn record_job_completed(kind: &str) {
    let labels = [("kind", kind.to_string())];
    counter!(names::JOBS_COMPLETED_TOTAL, &labels).increment(1);
}

/// Record job failed, labelled with what the broker did with it.
pub fn record_job_failed(kind: &str, outcome: &str) {
    let labels = [("kind", kind.to_string()), ("outcome", outcome.to_string())];
    counter!(names::JOBS_FAILED_TOTAL, &labels).increment(1);
}

/// Record the pipeline step a failed attempt stopped at.
pub fn record_job_error(stage: &str) {
    let labels = [("stage", stage.to_string())];
    counter!(names::JOB_ERRORS_TOTAL, &labels).increment(1);
}

/// Record transcoder run duration.
pub fn record_transcode_duration(success: bool, duration_secs: f64) {
    let labels = [("success", success.to_string())];
    histogram!(names::TRANSCODE_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record upload duration.
pub fn record_upload_duration(duration_secs: f64) {
    histogram!(names::UPLOAD_DURATION_SECONDS).record(duration_secs);
}

/// Record a staging file that could not be removed.
pub fn record_cleanup_warning() {
    counter!(names::CLEANUP_WARNINGS_TOTAL).increment(1);
}
