//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define the edge server metrics
//! - Expose a Prometheus-compatible endpoint when enabled
//!
//! # Metrics
//! - `frontend_requests_total` (counter): requests by kind, status
//! - `frontend_request_duration_seconds` (histogram): latency by kind
//! - `frontend_proxy_requests_total` (counter): upstream calls by service, status
//! - `frontend_token_refresh_total` (counter): refreshes by outcome
//! - `frontend_logins_total` (counter): login callbacks by outcome
//! - `frontend_sessions_active` (gauge): live sessions
//! - `frontend_bundle_builds_total` (counter): development builds by outcome
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

use crate::http::request::RequestKind;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(kind: RequestKind, status: u16, start: Instant) {
    let kind = kind.as_str();
    counter!("frontend_requests_total", "kind" => kind, "status" => status.to_string()).increment(1);
    histogram!("frontend_request_duration_seconds", "kind" => kind)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_proxy(service: &str, status: u16) {
    counter!(
        "frontend_proxy_requests_total",
        "service" => service.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

pub fn record_token_refresh(outcome: &'static str) {
    counter!("frontend_token_refresh_total", "outcome" => outcome).increment(1);
}

pub fn record_login(outcome: &'static str) {
    counter!("frontend_logins_total", "outcome" => outcome).increment(1);
}

pub fn record_sessions_active(count: usize) {
    gauge!("frontend_sessions_active").set(count as f64);
}

pub fn record_bundle_build(outcome: &'static str) {
    counter!("frontend_bundle_builds_total", "outcome" => outcome).increment(1);
}
