//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define router metrics (requests, latency, auth failures, tunnel sessions)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `router_requests_total` (counter): total requests by route, method, status
//! - `router_request_duration_seconds` (histogram): latency by route
//! - `router_auth_failures_total` (counter): gate rejections by reason
//! - `router_tunnel_sessions` (gauge): currently open tunnel sessions
//!
//! # Design Decisions
//! - Route label is the matched outer pattern, never the raw path (bounded cardinality)
//! - Recording is a no-op until a recorder is installed, so tests need no setup

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics recorder"),
    }
}

pub fn record_request(method: &str, route: &str, status: u16, start: Instant) {
    counter!(
        "router_requests_total",
        "method" => method.to_string(),
        "route" => route.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("router_request_duration_seconds", "route" => route.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_auth_failure(reason: &'static str) {
    counter!("router_auth_failures_total", "reason" => reason).increment(1);
}

pub fn set_tunnel_sessions(count: usize) {
    gauge!("router_tunnel_sessions").set(count as f64);
}
