//! Application Layer - Use cases and port definitions.
//!
//! Services that turn client requests and upstream pushes into registry
//! updates and broadcasts, plus the port the upstream adapter implements.

/// Port interfaces for the upstream feed.
pub mod ports;

/// Subscription registry, push dispatch, and client commands.
pub mod services;
