//! Prometheus Metrics Module
//!
//! Exposes gateway metrics in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Pushes**: upstream pushes received, dropped at the dispatch queue
//! - **Fan-out**: messages sent to clients, evicted connections, broadcast time
//! - **State**: connected clients, subscribed symbols
//! - **Upstream**: command errors and reconnects
//!
//! # Integration
//!
//! Metrics are rendered at `/metrics` on the HTTP server. Recording before
//! [`init_metrics`] is a no-op.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::domain::streaming::PushKind;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder, or return the already installed handle.
///
/// # Errors
///
/// Returns an error if a different global recorder is already installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "quote_gateway_pushes_received_total",
        "Upstream pushes handed to the dispatcher"
    );
    describe_counter!(
        "quote_gateway_pushes_dropped_total",
        "Upstream pushes dropped because the dispatch queue was full"
    );
    describe_counter!(
        "quote_gateway_messages_sent_total",
        "Envelopes delivered to client connections"
    );
    describe_counter!(
        "quote_gateway_connections_evicted_total",
        "Client connections removed after a failed send"
    );

    describe_gauge!(
        "quote_gateway_ws_clients",
        "Connected WebSocket clients"
    );
    describe_gauge!(
        "quote_gateway_subscribed_symbols",
        "Symbols currently subscribed upstream"
    );

    describe_counter!(
        "quote_gateway_upstream_command_errors_total",
        "Failed upstream commands by command"
    );
    describe_counter!(
        "quote_gateway_upstream_reconnects_total",
        "Upstream feed reconnection attempts"
    );

    describe_histogram!(
        "quote_gateway_broadcast_seconds",
        "Time to fan one envelope out to every client"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a push handed to the dispatcher.
pub fn record_push_received(kind: PushKind) {
    counter!("quote_gateway_pushes_received_total", "kind" => kind.as_str()).increment(1);
}

/// Record a push dropped at the dispatch queue.
pub fn record_push_dropped(kind: PushKind) {
    counter!("quote_gateway_pushes_dropped_total", "kind" => kind.as_str()).increment(1);
}

/// Record envelopes delivered to clients.
pub fn record_messages_sent(kind: PushKind, count: u64) {
    counter!("quote_gateway_messages_sent_total", "kind" => kind.as_str()).increment(count);
}

/// Record connections evicted after failed sends.
pub fn record_connections_evicted(count: u64) {
    counter!("quote_gateway_connections_evicted_total").increment(count);
}

/// Update the connected client count.
#[allow(clippy::cast_precision_loss)]
pub fn set_ws_clients(count: usize) {
    gauge!("quote_gateway_ws_clients").set(count as f64);
}

/// Update the subscribed symbol count.
#[allow(clippy::cast_precision_loss)]
pub fn set_subscribed_symbols(count: usize) {
    gauge!("quote_gateway_subscribed_symbols").set(count as f64);
}

/// Record a failed upstream command.
pub fn record_upstream_command_error(command: &'static str) {
    counter!("quote_gateway_upstream_command_errors_total", "command" => command).increment(1);
}

/// Record an upstream reconnection attempt.
pub fn record_reconnect() {
    counter!("quote_gateway_upstream_reconnects_total").increment(1);
}

/// Record one broadcast's duration.
pub fn record_broadcast_duration(duration: Duration) {
    histogram!("quote_gateway_broadcast_seconds").record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================
