//! Worker metrics.
//!
//! - Tasks processed by outcome
//! - Sweeps aborted on quota
//! - Upload counts and durations
//! - Scheduler promotions

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{info, warn};

// =============================================================================
// Metric Names
// =============================================================================

pub mod names {
    /// Tasks finished by a sweep, by outcome.
    pub const TASKS_PROCESSED_TOTAL: &str = "ytpub_tasks_processed_total";

    /// Sweeps stopped early because the upload quota was hit.
    pub const SWEEPS_ABORTED_TOTAL: &str = "ytpub_sweeps_aborted_total";

    /// Upload attempts by status.
    pub const UPLOADS_TOTAL: &str = "ytpub_uploads_total";

    /// Upload duration in seconds.
    pub const UPLOAD_DURATION_SECONDS: &str = "ytpub_upload_duration_seconds";

    /// Scheduled tasks moved into the live queue, by result.
    pub const SCHEDULER_PROMOTIONS_TOTAL: &str = "ytpub_scheduler_promotions_total";
}

// =============================================================================
// Recording Functions
// =============================================================================

pub fn record_task(outcome: &'static str) {
    counter!(names::TASKS_PROCESSED_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_sweep_aborted() {
    counter!(names::SWEEPS_ABORTED_TOTAL).increment(1);
}

pub fn record_upload(status: &'static str, duration: Duration) {
    counter!(names::UPLOADS_TOTAL, "status" => status).increment(1);
    histogram!(names::UPLOAD_DURATION_SECONDS, "status" => status).record(duration.as_secs_f64());
}

pub fn record_promotion(result: &'static str) {
    counter!(names::SCHEDULER_PROMOTIONS_TOTAL, "result" => result).increment(1);
}

/// Serve Prometheus metrics on `addr`. Must run inside the tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => info!(addr = %addr, "Prometheus exporter listening"),
        Err(e) => warn!(addr = %addr, "Failed to install Prometheus exporter: {}", e),
    }
}
