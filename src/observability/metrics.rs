//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define query server metrics (connections, rejections, handshake failures)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `spanquery_connections_total` (counter): accepted connections by protocol
//! - `spanquery_connections_rejected_total` (counter): connections closed before serving, by reason
//! - `spanquery_tls_handshake_failures_total` (counter): failed handshakes by protocol
//! - `spanquery_tenancy_rejections_total` (counter): requests refused for a missing tenant, by protocol
//!
//! # Design Decisions
//! - Without an installed recorder every update is a no-op
//! - Labels are static strings

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::net::Protocol;

pub const CONNECTIONS_TOTAL: &str = "spanquery_connections_total";
pub const CONNECTIONS_REJECTED_TOTAL: &str = "spanquery_connections_rejected_total";
pub const TLS_HANDSHAKE_FAILURES_TOTAL: &str = "spanquery_tls_handshake_failures_total";
pub const TENANCY_REJECTIONS_TOTAL: &str = "spanquery_tenancy_rejections_total";

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_connection(protocol: Protocol) {
    metrics::counter!(CONNECTIONS_TOTAL, "protocol" => protocol.as_str()).increment(1);
}

pub fn record_connection_rejected(reason: &'static str) {
    metrics::counter!(CONNECTIONS_REJECTED_TOTAL, "reason" => reason).increment(1);
}

pub fn record_handshake_failure(protocol: Protocol) {
    metrics::counter!(TLS_HANDSHAKE_FAILURES_TOTAL, "protocol" => protocol.as_str()).increment(1);
}

pub fn record_tenancy_rejection(protocol: Protocol) {
    metrics::counter!(TENANCY_REJECTIONS_TOTAL, "protocol" => protocol.as_str()).increment(1);
}
