//! Metrics collection and export for the relay client.
//!
//! Uses the `metrics` crate for instrumentation. Without an installed
//! recorder every call is a no-op; `relay-watch` can export to Prometheus.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const INBOUND_MESSAGES_TOTAL: &str = "relay_inbound_messages_total";
    pub const INBOUND_BYTES_TOTAL: &str = "relay_inbound_bytes_total";
    pub const DECODE_ERRORS_TOTAL: &str = "relay_decode_errors_total";
    pub const PUBLISHES_TOTAL: &str = "relay_publishes_total";
    pub const PUBLISH_BYTES_TOTAL: &str = "relay_publish_bytes_total";
    pub const RECONNECT_ATTEMPTS_TOTAL: &str = "relay_reconnect_attempts_total";
    pub const CONNECTED: &str = "relay_connected";
}

/// Describe every metric.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::INBOUND_MESSAGES_TOTAL,
        "Total number of inbound frames"
    );
    metrics::describe_counter!(names::INBOUND_BYTES_TOTAL, "Total bytes of inbound frames");
    metrics::describe_counter!(
        names::DECODE_ERRORS_TOTAL,
        "Inbound frames dropped as malformed"
    );
    metrics::describe_counter!(names::PUBLISHES_TOTAL, "Total number of publishes queued");
    metrics::describe_counter!(names::PUBLISH_BYTES_TOTAL, "Total bytes of publishes queued");
    metrics::describe_counter!(
        names::RECONNECT_ATTEMPTS_TOTAL,
        "Total number of scheduled reconnection attempts"
    );
    metrics::describe_gauge!(names::CONNECTED, "1 while the transport is connected");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics endpoint.
///
/// # Errors
///
/// Returns an error if the exporter cannot be installed.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record an inbound frame.
pub fn record_inbound(bytes: usize) {
    counter!(names::INBOUND_MESSAGES_TOTAL).increment(1);
    counter!(names::INBOUND_BYTES_TOTAL).increment(bytes as u64);
}

/// Record a dropped inbound frame.
pub fn record_decode_error(kind: &'static str) {
    counter!(names::DECODE_ERRORS_TOTAL, "kind" => kind).increment(1);
}

/// Record a queued publish.
pub fn record_publish(bytes: usize) {
    counter!(names::PUBLISHES_TOTAL).increment(1);
    counter!(names::PUBLISH_BYTES_TOTAL).increment(bytes as u64);
}

/// Record a scheduled reconnection.
pub fn record_reconnect_attempt() {
    counter!(names::RECONNECT_ATTEMPTS_TOTAL).increment(1);
}

/// Holds the connected gauge at 1 for the lifetime of a session.
pub struct ConnectedGuard;

impl ConnectedGuard {
    /// Mark the transport connected.
    #[must_use]
    pub fn new() -> Self {
        gauge!(names::CONNECTED).set(1.0);
        Self
    }
}

impl Default for ConnectedGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectedGuard {
    fn drop(&mut self) {
        gauge!(names::CONNECTED).set(0.0);
    }
}
