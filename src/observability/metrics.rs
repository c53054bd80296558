//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): forwarded requests by status
//! - `proxy_rejected_total` (counter): requests refused with 503
//! - `proxy_request_duration_seconds` (histogram): latency to response headers
//! - `proxy_active_connections` (gauge): in-flight requests, all backends
//! - `proxy_backend_active_connections` (gauge): in-flight requests per backend
//! - `proxy_backend_health` (gauge): 1=healthy, 0=unhealthy

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder with its own HTTP listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(status: u16, backend_id: u64, start: Instant) {
    counter!(
        "proxy_requests_total",
        "status" => status.to_string(),
        "backend" => backend_id.to_string()
    )
    .increment(1);
    histogram!("proxy_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_rejected() {
    counter!("proxy_rejected_total").increment(1);
}

pub fn record_active_connections(backend_id: u64, backend_active: usize, total_active: usize) {
    gauge!("proxy_backend_active_connections", "backend" => backend_id.to_string())
        .set(backend_active as f64);
    gauge!("proxy_active_connections").set(total_active as f64);
}

pub fn record_backend_health(backend_id: u64, healthy: bool) {
    gauge!("proxy_backend_health", "backend" => backend_id.to_string())
        .set(if healthy { 1.0 } else { 0.0 });
}
