//! Domain Layer - Subscription state and market data types.
//!
//! Pure types and logic: no I/O, no async. Everything here can be
//! exercised from plain unit tests.

/// Upstream push schema, client envelope, and normalization.
pub mod streaming;

/// Subscription set and delta arithmetic.
pub mod subscription;
