#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements,
        clippy::panic
    )
)]

//! Quote Gateway - Market Data Fan-out
//!
//! Keeps one upstream market data session, reconciles client
//! subscribe/unsubscribe requests against it, and fans normalized pushes out
//! to every connected WebSocket client.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Pure types and logic
//!   - `subscription`: Subscription set and deltas
//!   - `streaming`: Upstream push schema, client envelope, normalizer
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: `FeedAdapter` command surface
//!   - `services`: Registry, dispatcher, client commands
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `feed`: WebSocket client for the upstream feed bridge
//!   - `broadcast`: Connection hub
//!   - `http`: WebSocket endpoint, REST routes, health and metrics
//!   - `config`, `watchlist`, `metrics`, `telemetry`
//!
//! # Data Flow
//!
//! ```text
//!                        subscribe / unsubscribe
//! WS / REST clients ───────────────────────────► SubscriptionRegistry
//!        ▲                                               │ commands
//!        │                                               ▼
//! ConnectionHub ◄── Dispatcher ◄── DispatchHandle ◄── FeedClient ◄──► feed bridge
//!   (fan-out)       (one task)     (normalize, try_send)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Subscription state and market data types.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

/// Component wiring.
pub mod gateway;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::streaming::{PushEnvelope, PushKind, PushPayload, RawPush};
pub use domain::subscription::{SubscriptionDelta, SubscriptionSet, Symbol};

// Application
pub use application::ports::{CandlePeriod, Channel, FeedAdapter, FeedError};
pub use application::services::{
    CommandReply, DispatchHandle, Dispatcher, RegistryError, SubscriptionRegistry,
    dispatch_channel, handle_command,
};

// Infrastructure
pub use infrastructure::broadcast::{ChannelSink, ConnectionHub, ConnectionId, SendError};
pub use infrastructure::config::{ConfigError, Credentials, GatewayConfig};
pub use infrastructure::feed::{FeedClient, FeedClientConfig, FeedClientError, FeedState};
pub use infrastructure::http::{AppState, HttpServer, ServerError};
pub use infrastructure::metrics::init_metrics;
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
pub use infrastructure::watchlist::{WatchlistError, WatchlistStore};

pub use gateway::Gateway;
