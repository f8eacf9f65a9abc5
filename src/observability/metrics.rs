//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by method, status, upstream
//! - `proxy_request_duration_seconds` (histogram): latency distribution
//! - `proxy_routing_table_rebuilds_total` (counter): installed tables
//! - `proxy_routing_table_routes` / `_certificates` / `_warnings` (gauges):
//!   shape of the current table
//! - `proxy_tls_handshakes_rejected_total` (counter): handshakes without a
//!   certificate, by reason
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade and is a no-op until a
//!   recorder is installed
//! - The Prometheus endpoint is opt-in (`observability.metrics_enabled`)

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its HTTP listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// Record one proxied (or rejected) request.
pub fn record_request(method: &str, status: u16, upstream: &str, start: Instant) {
    metrics::counter!(
        "proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "upstream" => upstream.to_string()
    )
    .increment(1);
    metrics::histogram!("proxy_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

/// Record an installed routing table.
pub fn record_table_installed(routes: usize, certificates: usize, warnings: usize) {
    metrics::counter!("proxy_routing_table_rebuilds_total").increment(1);
    metrics::gauge!("proxy_routing_table_routes").set(routes as f64);
    metrics::gauge!("proxy_routing_table_certificates").set(certificates as f64);
    metrics::gauge!("proxy_routing_table_warnings").set(warnings as f64);
}

/// Record a handshake that found no certificate.
pub fn record_handshake_rejected(reason: &'static str) {
    metrics::counter!("proxy_tls_handshakes_rejected_total", "reason" => reason).increment(1);
}
