//! Feed Bridge Message Types
//!
//! Wire types for the JSON protocol spoken with the upstream feed bridge.
//!
//! # Commands (gateway -> bridge)
//!
//! ```json
//! {"id": 1, "action": "auth", "app_key": "...", "app_secret": "...", "access_token": "..."}
//! {"id": 2, "action": "subscribe", "symbols": ["AAPL.US"], "channels": ["quote", "trade", "depth"]}
//! {"id": 3, "action": "subscribe_candlesticks", "symbol": "AAPL.US", "period": "day"}
//! ```
//!
//! # Replies and pushes (bridge -> gateway)
//!
//! ```json
//! {"type": "ack", "id": 2}
//! {"type": "error", "id": 3, "code": 301600, "message": "invalid symbol"}
//! {"type": "push", "kind": "quote", "symbol": "AAPL.US", "event": {"last_done": "187.30"}}
//! ```

use serde::{Deserialize, Serialize};

use crate::application::ports::{CandlePeriod, Channel};
use crate::domain::streaming::{PushKind, RawPush};
use crate::domain::subscription::Symbol;
use crate::infrastructure::config::Credentials;

// =============================================================================
// Commands
// =============================================================================

/// Command body, tagged by `action`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Command {
    /// Authenticate the session.
    Auth {
        /// Application key.
        app_key: String,
        /// Application secret.
        app_secret: String,
        /// Access token.
        access_token: String,
    },
    /// Subscribe symbols to channels.
    Subscribe {
        /// Symbols.
        symbols: Vec<Symbol>,
        /// Channels.
        channels: Vec<Channel>,
    },
    /// Unsubscribe symbols from channels.
    Unsubscribe {
        /// Symbols.
        symbols: Vec<Symbol>,
        /// Channels.
        channels: Vec<Channel>,
    },
    /// Subscribe one symbol to candlesticks.
    SubscribeCandlesticks {
        /// Symbol.
        symbol: Symbol,
        /// Bar period.
        period: CandlePeriod,
    },
    /// Unsubscribe one symbol from candlesticks.
    UnsubscribeCandlesticks {
        /// Symbol.
        symbol: Symbol,
        /// Bar period.
        period: CandlePeriod,
    },
}

impl Command {
    /// Build the authentication command.
    #[must_use]
    pub fn auth(credentials: &Credentials) -> Self {
        Self::Auth {
            app_key: credentials.app_key().to_string(),
            app_secret: credentials.app_secret().to_string(),
            access_token: credentials.access_token().to_string(),
        }
    }

    /// Action label, also used in logs.
    #[must_use]
    pub const fn action(&self) -> &'static str {
        match self {
            Self::Auth { .. } => "auth",
            Self::Subscribe { .. } => "subscribe",
            Self::Unsubscribe { .. } => "unsubscribe",
            Self::SubscribeCandlesticks { .. } => "subscribe_candlesticks",
            Self::UnsubscribeCandlesticks { .. } => "unsubscribe_candlesticks",
        }
    }
}

/// A command with its correlation id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandFrame {
    /// Correlation id echoed by the reply.
    pub id: u64,
    /// Command body.
    #[serde(flatten)]
    pub command: Command,
}

impl CommandFrame {
    /// Serialize to JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// =============================================================================
// Bridge Messages
// =============================================================================

/// Command accepted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AckMessage {
    /// Id of the accepted command.
    pub id: u64,
}

/// Command refused, or an unsolicited bridge error when `id` is absent.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ErrorMessage {
    /// Id of the refused command.
    #[serde(default)]
    pub id: Option<u64>,
    /// Upstream error code.
    #[serde(default)]
    pub code: i64,
    /// Upstream error message.
    #[serde(default)]
    pub message: String,
}

/// One upstream push, still in raw form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushMessage {
    /// Symbol the push is about.
    pub symbol: Symbol,
    /// Typed push event.
    pub event: RawPush,
}

impl PushMessage {
    /// Kind of push.
    #[must_use]
    pub const fn kind(&self) -> PushKind {
        match self.event {
            RawPush::Quote(_) => PushKind::Quote,
            RawPush::Candlestick(_) => PushKind::Candlestick,
            RawPush::Trades(_) => PushKind::Trades,
            RawPush::Depth(_) => PushKind::Depth,
        }
    }
}

/// Any message the bridge sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeMessage {
    /// Command accepted.
    Ack(AckMessage),
    /// Command refused.
    Error(ErrorMessage),
    /// Market data push.
    Push(PushMessage),
}
