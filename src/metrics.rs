//! Prometheus metrics for the playback relay.
//!
//! Recording goes through the `metrics` facade and is a no-op until
//! [`install_recorder`] runs, so library code and tests can call the
//! `record_*` helpers unconditionally.

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

/// Install the global Prometheus recorder.
///
/// Returns `None` (and logs) when a recorder is already installed.
pub fn install_recorder() -> Option<PrometheusHandle> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!("Prometheus recorder not installed: {}", e);
            None
        }
    }
}

/// Count a relay response by endpoint and status code
pub fn record_request(endpoint: &'static str, status: u16) {
    counter!("hls_shim_requests_total", "endpoint" => endpoint, "status" => status.to_string())
        .increment(1);
}

/// Record request latency in seconds
pub fn record_duration(endpoint: &'static str, start: Instant) {
    histogram!("hls_shim_request_duration_seconds", "endpoint" => endpoint)
        .record(start.elapsed().as_secs_f64());
}

/// Count a completed load, split by whether it went through an artifact
pub fn record_load(indirected: bool) {
    let path = if indirected { "indirected" } else { "direct" };
    counter!("hls_shim_loads_total", "path" => path).increment(1);
}

/// Count a failed load by error kind
pub fn record_load_error(kind: &'static str) {
    counter!("hls_shim_load_errors_total", "kind" => kind).increment(1);
}
