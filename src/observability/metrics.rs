//! Metrics collection and exposition.
//!
//! # Metrics
//! - `frontdoor_proxied_requests_total` (counter): proxied requests by status
//! - `frontdoor_backend_teardowns_total` (counter): backend legs closed, by
//!   teardown kind (`clean`, `benign`, `failed`)
//!
//! Without an installed recorder the macros are no-ops.

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::proxy::TeardownKind;

pub const PROXIED_REQUESTS: &str = "frontdoor_proxied_requests_total";
pub const BACKEND_TEARDOWNS: &str = "frontdoor_backend_teardowns_total";

/// Install the Prometheus recorder and its scrape endpoint on `addr`.
///
/// Must be called from within the tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// Count one proxied request answered with `status`.
pub fn record_proxied(status: u16) {
    ::metrics::counter!(PROXIED_REQUESTS, "status" => status.to_string()).increment(1);
}

/// Count one backend leg teardown.
pub fn record_teardown(kind: TeardownKind) {
    ::metrics::counter!(BACKEND_TEARDOWNS, "kind" => kind.as_str()).increment(1);
}
