//! Metrics collection and exposition.
//!
//! # Metrics
//! - `router_dispatch_total` (counter): dispatch decisions by outcome
//! - `router_dispatch_duration_seconds` (histogram): selection latency
//! - `router_descriptor_cache_total` (counter): lookups by tier and result
//! - `router_bound_routes` (gauge): bindings currently in the table
//! - `router_http_requests_total` (counter): responses by method and status
//!
//! # Design Decisions
//! - Recording is a no-op until an exporter is installed
//! - Prometheus exposition on its own listener, off the request path

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_dispatch(outcome: &'static str, start: Instant) {
    counter!("router_dispatch_total", "outcome" => outcome).increment(1);
    histogram!("router_dispatch_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_descriptor_lookup(tier: &'static str, hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!("router_descriptor_cache_total", "tier" => tier, "result" => result).increment(1);
}

pub fn record_bound_routes(count: usize) {
    gauge!("router_bound_routes").set(count as f64);
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        "router_http_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("router_http_request_duration_seconds").record(start.elapsed().as_secs_f64());
}
