//! Prometheus metrics for the pipeline.

use std::net::SocketAddr;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use mpipe_models::Stage;

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_COMPLETED_TOTAL: &str = "mpipe_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "mpipe_jobs_failed_total";
    pub const NORMALIZE_FALLBACKS_TOTAL: &str = "mpipe_normalize_fallbacks_total";
    pub const STAGE_DURATION_SECONDS: &str = "mpipe_stage_duration_seconds";
}

/// Install the Prometheus recorder with a scrape endpoint on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()
}

pub fn record_job_completed(mode: &str) {
    let labels = [("mode", mode.to_string())];
    counter!(names::JOBS_COMPLETED_TOTAL, &labels).increment(1);
}

pub fn record_job_failed(mode: &str, stage: Stage) {
    let labels = [
        ("mode", mode.to_string()),
        ("stage", stage.as_str().to_string()),
    ];
    counter!(names::JOBS_FAILED_TOTAL, &labels).increment(1);
}

pub fn record_normalize_fallback() {
    counter!(names::NORMALIZE_FALLBACKS_TOTAL).increment(1);
}

pub fn record_stage_duration(stage: Stage, duration_secs: f64) {
    let labels = [("stage", stage.as_str().to_string())];
    histogram!(names::STAGE_DURATION_SECONDS, &labels).record(duration_secs);
}
