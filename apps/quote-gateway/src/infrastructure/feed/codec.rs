//! Feed Bridge Codec
//!
//! Decodes bridge text frames into [`BridgeMessage`]s. A frame carries
//! either a single JSON object or an array of them; the `type` field of each
//! object selects the message kind, and the `kind` field of a push selects
//! the upstream event schema.

use serde::Deserialize;
use serde_json::Value;

use super::messages::{AckMessage, BridgeMessage, CommandFrame, ErrorMessage, PushMessage};
use crate::domain::streaming::{
    PushKind, RawCandlestick, RawDepth, RawPush, RawQuote, RawTrades,
};

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Unknown message type.
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    /// Invalid message format.
    #[error("invalid message format: {0}")]
    InvalidFormat(String),
}

#[derive(Deserialize)]
struct PushHeader {
    kind: PushKind,
    symbol: String,
    #[serde(default)]
    event: Value,
}

/// JSON codec for the feed bridge protocol.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a new JSON codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode one text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not JSON, not an object or array, or
    /// an element has an unknown or malformed shape.
    pub fn decode(&self, text: &str) -> Result<Vec<BridgeMessage>, CodecError> {
        match serde_json::from_str::<Value>(text)? {
            Value::Array(values) => values.into_iter().map(decode_value).collect(),
            value @ Value::Object(_) => Ok(vec![decode_value(value)?]),
            other => Err(CodecError::InvalidFormat(format!(
                "expected JSON array or object, got: {}",
                truncate(&other.to_string(), 50)
            ))),
        }
    }

    /// Encode a command frame.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode(&self, frame: &CommandFrame) -> Result<String, CodecError> {
        Ok(frame.to_json()?)
    }
}

fn decode_value(value: Value) -> Result<BridgeMessage, CodecError> {
    let msg_type = value
        .get("type")
        .and_then(Value::as_str)
        .map(str::to_string);

    match msg_type.as_deref() {
        Some("ack") => Ok(BridgeMessage::Ack(serde_json::from_value::<AckMessage>(value)?)),
        Some("error") => Ok(BridgeMessage::Error(serde_json::from_value::<ErrorMessage>(
            value,
        )?)),
        Some("push") => decode_push(value).map(BridgeMessage::Push),
        Some(other) => Err(CodecError::UnknownMessageType(other.to_string())),
        None => Err(CodecError::InvalidFormat("missing \"type\" field".to_string())),
    }
}

fn decode_push(value: Value) -> Result<PushMessage, CodecError> {
    let header: PushHeader = serde_json::from_value(value)?;
    let event = if header.event.is_null() {
        Value::Object(serde_json::Map::new())
    } else {
        header.event
    };

    let event = match header.kind {
        PushKind::Quote => RawPush::Quote(serde_json::from_value::<RawQuote>(event)?),
        PushKind::Candlestick => {
            RawPush::Candlestick(serde_json::from_value::<RawCandlestick>(event)?)
        }
        PushKind::Trades => RawPush::Trades(serde_json::from_value::<RawTrades>(event)?),
        PushKind::Depth => RawPush::Depth(serde_json::from_value::<RawDepth>(event)?),
    };

    Ok(PushMessage {
        symbol: header.symbol,
        event,
    })
}

fn truncate(text: &str, max: usize) -> &str {
    text.char_indices()
        .nth(max)
        .map_or(text, |(idx, _)| &text[..idx])
}
