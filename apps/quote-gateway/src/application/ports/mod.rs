//! Port Interfaces
//!
//! Contracts between the gateway core and the upstream market data feed,
//! following the Hexagonal Architecture pattern.
//!
//! ## Driven Ports (Outbound)
//!
//! - `FeedAdapter`: subscription commands sent to the upstream feed
//!
//! Push delivery in the other direction goes through
//! [`DispatchHandle`](crate::application::services::DispatchHandle), which
//! adapters call from their own receive loop.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::subscription::Symbol;

// =============================================================================
// Channels
// =============================================================================

/// Upstream push channel subscribed as one batch per symbol list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Real-time quotes.
    Quote,
    /// Tick-by-tick trades.
    Trade,
    /// Order book depth.
    Depth,
}

impl Channel {
    /// Channels every subscribed symbol streams.
    pub const PRIMARY: [Self; 3] = [Self::Quote, Self::Trade, Self::Depth];

    /// Wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Quote => "quote",
            Self::Trade => "trade",
            Self::Depth => "depth",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Candlestick period; candlesticks are subscribed per symbol.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum CandlePeriod {
    /// Daily bars.
    #[default]
    Day,
}

// =============================================================================
// Errors
// =============================================================================

/// Failure of an upstream feed command.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FeedError {
    /// No live upstream connection.
    #[error("upstream feed not connected")]
    NotConnected,

    /// Upstream refused the command.
    #[error("upstream rejected command ({code}): {message}")]
    Rejected {
        /// Upstream error code.
        code: i64,
        /// Upstream error message.
        message: String,
    },

    /// No reply within the command timeout.
    #[error("upstream command timed out after {0:?}")]
    Timeout(Duration),

    /// Transport-level failure.
    #[error("upstream transport error: {0}")]
    Transport(String),
}

// =============================================================================
// Feed Adapter
// =============================================================================

/// Command surface of the upstream feed.
///
/// Each call resolves once the upstream acknowledged or refused the
/// command.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FeedAdapter: Send + Sync {
    /// Subscribe `symbols` to `channels` as a single batch.
    async fn subscribe_channels(
        &self,
        symbols: &[Symbol],
        channels: &[Channel],
    ) -> Result<(), FeedError>;

    /// Unsubscribe `symbols` from `channels` as a single batch.
    async fn unsubscribe_channels(
        &self,
        symbols: &[Symbol],
        channels: &[Channel],
    ) -> Result<(), FeedError>;

    /// Subscribe one symbol to candlestick pushes.
    async fn subscribe_candles(&self, symbol: &str, period: CandlePeriod)
    -> Result<(), FeedError>;

    /// Unsubscribe one symbol from candlestick pushes.
    async fn unsubscribe_candles(
        &self,
        symbol: &str,
        period: CandlePeriod,
    ) -> Result<(), FeedError>;
}
