//! Metrics collection and exposition.
//!
//! # Metrics
//! - `server_requests_total` (counter): requests by server, method, status
//! - `server_request_duration_seconds` (histogram): latency distribution
//!
//! The `metrics` crate records against a process-global recorder, so the
//! Prometheus handle is installed exactly once and shared by every module
//! that exposes a `/metrics` endpoint.

use std::sync::OnceLock;
use std::time::Duration;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::error::Error;

static HANDLE: OnceLock<Result<PrometheusHandle, String>> = OnceLock::new();

/// Returns the process-wide Prometheus handle, installing the recorder on
/// first use.
pub fn recorder_handle() -> Result<PrometheusHandle, Error> {
    HANDLE
        .get_or_init(|| {
            PrometheusBuilder::new()
                .install_recorder()
                .map_err(|err| err.to_string())
        })
        .clone()
        .map_err(Error::Metrics)
}

/// Record one served request. Used by the RPC and HTTP server middleware.
pub fn record_request(server: &'static str, method: &str, status: u16, elapsed: Duration) {
    metrics::counter!(
        "server_requests_total",
        "server" => server,
        "method" => method.to_string(),
        "status" => status.to_string(),
    )
    .increment(1);

    metrics::histogram!(
        "server_request_duration_seconds",
        "server" => server,
    )
    .record(elapsed.as_secs_f64());
}
