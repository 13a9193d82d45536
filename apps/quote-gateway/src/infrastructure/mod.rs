//! Infrastructure Layer - Adapters and external integrations.
//!
//! Concrete implementations behind the application ports, plus the HTTP
//! surface and process-wide concerns.

/// Client connection set and fan-out.
pub mod broadcast;

/// Environment-driven configuration.
pub mod config;

/// Upstream feed bridge client.
pub mod feed;

/// HTTP routes and the WebSocket endpoint.
pub mod http;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Logging and OpenTelemetry tracing.
pub mod telemetry;

/// JSON-file watchlist.
pub mod watchlist;
