//! Client Command Handling
//!
//! Interprets the text frames a WebSocket client sends:
//!
//! ```json
//! {"action": "subscribe", "symbols": ["AAPL.US", "700.HK"]}
//! ```
//!
//! and produces the reply for that client alone:
//!
//! ```json
//! {"type": "ack", "action": "subscribe", "symbols": [...], "subscribed": [...]}
//! {"type": "error", "message": "unknown action: foo"}
//! ```
//!
//! A bad command never closes the connection; it only earns an error reply.

use serde::{Deserialize, Serialize};
use serde_json::error::Category;
use tracing::debug;

use super::registry::SubscriptionRegistry;
use crate::domain::subscription::Symbol;

/// Subscription action a client may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Add symbols.
    Subscribe,
    /// Remove symbols.
    Unsubscribe,
}

impl Action {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "subscribe" => Some(Self::Subscribe),
            "unsubscribe" => Some(Self::Unsubscribe),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawCommand {
    #[serde(default)]
    action: String,
    #[serde(default)]
    symbols: Vec<Symbol>,
}

/// Reply sent back to the client that issued a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CommandReply {
    /// Command applied.
    Ack {
        /// Requested action.
        action: Action,
        /// Symbols as the client sent them.
        symbols: Vec<Symbol>,
        /// Full subscription set after the command.
        subscribed: Vec<Symbol>,
    },
    /// Command rejected or failed.
    Error {
        /// Human-readable reason.
        message: String,
    },
}

impl CommandReply {
    fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Serialize for the wire.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"type":"error","message":"reply encoding failed: {e}"}}"#)
        })
    }
}

/// Parse and apply one client command.
pub async fn handle_command(registry: &SubscriptionRegistry, text: &str) -> CommandReply {
    let command: RawCommand = match serde_json::from_str(text) {
        Ok(command) => command,
        Err(e) if matches!(e.classify(), Category::Data) => {
            return CommandReply::error(format!("invalid command: {e}"));
        }
        Err(e) => return CommandReply::error(format!("invalid JSON: {e}")),
    };

    let Some(action) = Action::parse(&command.action) else {
        return CommandReply::error(format!("unknown action: {}", command.action));
    };
    if command.symbols.is_empty() {
        return CommandReply::error("symbols must not be empty");
    }

    let result = match action {
        Action::Subscribe => registry.subscribe(&command.symbols).await,
        Action::Unsubscribe => registry.unsubscribe(&command.symbols).await,
    };

    match result {
        Ok(delta) => {
            debug!(?action, applied = ?delta.applied, "Client command applied");
            CommandReply::Ack {
                action,
                symbols: command.symbols,
                subscribed: registry.current_symbols(),
            }
        }
        Err(e) => CommandReply::error(e.to_string()),
    }
}
