//! Task client metrics.
//!
//! Provides standardized metrics for the remote job API:
//! - Request counters by operation and status
//! - Latency histograms
//! - Transient poll failures and terminal outcomes
//!
//! Nothing is exported unless the host process installs a recorder.

use metrics::{counter, histogram};

/// Metric name constants for consistency.
pub mod names {
    /// Total remote API requests by operation and status.
    pub const REQUESTS_TOTAL: &str = "wmr_api_requests_total";

    /// Request latency in seconds by operation.
    pub const LATENCY_SECONDS: &str = "wmr_api_latency_seconds";

    /// Status queries that failed and were retried.
    pub const TRANSIENT_FAILURES_TOTAL: &str = "wmr_poll_transient_failures_total";

    /// Jobs that reached a terminal state, by state.
    pub const JOBS_TERMINAL_TOTAL: &str = "wmr_jobs_terminal_total";
}

/// Record metrics for a completed remote request.
///
/// `status` is `0` when the request never produced a status code.
pub fn record_request(operation: &str, status: u16, latency_ms: f64) {
    counter!(
        names::REQUESTS_TOTAL,
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        names::LATENCY_SECONDS,
        "operation" => operation.to_string()
    )
    .record(latency_ms / 1000.0);
}

/// Record a status query that failed transiently.
pub fn record_transient_failure() {
    counter!(names::TRANSIENT_FAILURES_TOTAL).increment(1);
}

/// Record a job reaching a terminal state.
pub fn record_terminal(state: &str) {
    counter!(names::JOBS_TERMINAL_TOTAL, "state" => state.to_string()).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names() {
        assert!(names::REQUESTS_TOTAL.contains("requests"));
        assert!(names::LATENCY_SECONDS.contains("latency"));
        assert!(names::TRANSIENT_FAILURES_TOTAL.starts_with("wmr_"));
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_request("submit", 200, 12.0);
        record_transient_failure();
        record_terminal("success");
    }
}
