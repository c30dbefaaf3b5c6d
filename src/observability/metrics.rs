//! Metrics collection and exposition.
//!
//! # Metrics
//! - `emulator_requests_total` (counter): requests by method, status
//! - `emulator_request_duration_seconds` (histogram): latency distribution
//! - `emulator_rejections_total` (counter): normalization failures by kind
//! - `emulator_backend_errors_total` (counter): backend failures by upstream status
//!
//! Recording is a no-op until `init_metrics` installs the exporter.

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Start the Prometheus scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
    ];
    counter!("emulator_requests_total", &labels).increment(1);
    histogram!("emulator_request_duration_seconds", &labels).record(start.elapsed().as_secs_f64());
}

pub fn record_rejection(kind: &'static str) {
    counter!("emulator_rejections_total", "kind" => kind).increment(1);
}

pub fn record_backend_error(upstream_status: u16) {
    counter!("emulator_backend_errors_total", "upstream_status" => upstream_status.to_string()).increment(1);
}
