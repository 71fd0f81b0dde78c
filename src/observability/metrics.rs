//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define gateway metrics (requests, latency, backend session, streams)
//! - Expose a Prometheus-compatible scrape endpoint
//!
//! # Metrics
//! - `gateway_requests_total` (counter): proxied requests by method, status
//! - `gateway_request_duration_seconds` (histogram): end-to-end latency
//! - `gateway_backend_connected` (gauge): 1 while a backend session is registered
//! - `gateway_backend_sessions_total` (counter): installed / superseded / disconnected
//! - `gateway_active_streams` (gauge): backend streams held by in-flight requests
//! - `gateway_accept_errors_total` (counter): failed QUIC accepts
//! - `gateway_rate_limited_total` (counter): requests denied admission
//!
//! # Design Decisions
//! - Recording without an installed recorder is a no-op, so tests need no setup

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one finished proxy request.
pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("gateway_request_duration_seconds", "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}

/// Record a backend session lifecycle event.
pub fn record_backend_session(event: &'static str) {
    counter!("gateway_backend_sessions_total", "event" => event).increment(1);
}

pub fn set_backend_connected(connected: bool) {
    gauge!("gateway_backend_connected").set(if connected { 1.0 } else { 0.0 });
}

pub fn record_stream_opened() {
    gauge!("gateway_active_streams").increment(1.0);
}

pub fn record_stream_closed() {
    gauge!("gateway_active_streams").decrement(1.0);
}

pub fn record_accept_error() {
    counter!("gateway_accept_errors_total").increment(1);
}

pub fn record_rate_limited() {
    counter!("gateway_rate_limited_total").increment(1);
}
