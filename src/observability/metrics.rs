//! Metrics collection and exposition.
//!
//! # Metrics
//! - `admin_requests_total` (counter): API requests by route
//! - `admin_responses_total` (counter): responses by status code
//! - `admin_config_changes_total` (counter): config changes by outcome
//!
//! Without an installed recorder the macros are no-ops.

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder with its own scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(route: &'static str) {
    metrics::counter!("admin_requests_total", "route" => route).increment(1);
}

pub fn record_response(status: u16) {
    metrics::counter!("admin_responses_total", "status" => status.to_string()).increment(1);
}

pub fn record_config_change(outcome: &'static str) {
    metrics::counter!("admin_config_changes_total", "outcome" => outcome).increment(1);
}
