//! Upstream Feed Integration
//!
//! WebSocket client for the market data feed bridge.
//!
//! # Components
//!
//! - [`messages`]: Command frames and bridge message types
//! - [`codec`]: JSON decoding of bridge frames
//! - [`client`]: Session management, command correlation, [`FeedAdapter`] impl
//! - [`reconnect`]: Exponential backoff with jitter
//! - [`state`]: Connection status reported by `/health`
//!
//! [`FeedAdapter`]: crate::application::ports::FeedAdapter

pub mod client;
pub mod codec;
pub mod messages;
pub mod reconnect;
pub mod state;

pub use client::{FeedClient, FeedClientConfig, FeedClientError};
pub use codec::{CodecError, JsonCodec};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use state::{FeedState, FeedStatus};
