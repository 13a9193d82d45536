//! Push Envelope
//!
//! The one message shape every client receives, whatever kind of upstream
//! push produced it:
//!
//! ```json
//! {"type": "quote", "symbol": "AAPL.US", "data": {"last_done": "187.30", ...}}
//! ```
//!
//! Monetary fields are strings carrying the exact decimal text; counts are
//! integers; timestamps are epoch seconds.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::subscription::Symbol;

// =============================================================================
// Push Kind
// =============================================================================

/// Kind of push carried by an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PushKind {
    /// Real-time quote.
    Quote,
    /// Candlestick bar update.
    Candlestick,
    /// Batch of tick-by-tick fills.
    Trades,
    /// Order book depth.
    Depth,
}

impl PushKind {
    /// Wire label, also used as the metrics label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Quote => "quote",
            Self::Candlestick => "candlestick",
            Self::Trades => "trades",
            Self::Depth => "depth",
        }
    }
}

impl fmt::Display for PushKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Payloads
// =============================================================================

/// Normalized quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotePayload {
    /// Last traded price.
    pub last_done: String,
    /// Session open.
    pub open: String,
    /// Session high.
    pub high: String,
    /// Session low.
    pub low: String,
    /// Previous close.
    pub prev_close: String,
    /// Cumulative volume.
    pub volume: i64,
    /// Cumulative turnover.
    pub turnover: String,
    /// `last_done - prev_close`.
    pub change: String,
    /// Change in percent, two decimal places.
    pub change_pct: String,
    /// Epoch seconds.
    pub timestamp: i64,
    /// Non-negative change.
    pub is_up: bool,
}

/// One normalized fill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeFill {
    /// Fill price.
    pub price: String,
    /// Fill volume.
    pub volume: i64,
    /// Epoch seconds.
    pub timestamp: i64,
    /// Aggressor direction (`Up`, `Down`, `Neutral`, or empty).
    pub direction: String,
    /// Exchange trade type code.
    pub trade_type: String,
    /// Trading session (`Normal`, `Pre`, `Post`, `Overnight`, or empty).
    pub trade_session: String,
    /// Anything but a `Down` fill.
    pub is_up: bool,
}

/// Normalized trades batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradesPayload {
    /// Fills in upstream order.
    pub trades: Vec<TradeFill>,
}

/// One normalized book level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthLevel {
    /// Level price.
    pub price: String,
    /// Resting volume.
    pub volume: i64,
    /// Order count.
    pub order_num: i64,
}

/// Normalized order book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthPayload {
    /// Asks, best first.
    pub asks: Vec<DepthLevel>,
    /// Bids, best first.
    pub bids: Vec<DepthLevel>,
}

/// Normalized candlestick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandlestickPayload {
    /// Period label (`Day`, `Week`, ...), empty when unknown.
    pub period: String,
    /// Open price.
    pub open: String,
    /// Close price.
    pub close: String,
    /// High price.
    pub high: String,
    /// Low price.
    pub low: String,
    /// Volume.
    pub volume: i64,
    /// Turnover.
    pub turnover: String,
    /// Epoch seconds.
    pub timestamp: i64,
}

/// Kind-specific envelope body.
///
/// Serialized without a tag; the envelope's `type` field names the kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PushPayload {
    /// Quote body.
    Quote(QuotePayload),
    /// Candlestick body.
    Candlestick(CandlestickPayload),
    /// Trades body.
    Trades(TradesPayload),
    /// Depth body.
    Depth(DepthPayload),
}

impl PushPayload {
    /// The kind this body belongs to.
    #[must_use]
    pub const fn kind(&self) -> PushKind {
        match self {
            Self::Quote(_) => PushKind::Quote,
            Self::Candlestick(_) => PushKind::Candlestick,
            Self::Trades(_) => PushKind::Trades,
            Self::Depth(_) => PushKind::Depth,
        }
    }
}

impl From<QuotePayload> for PushPayload {
    fn from(payload: QuotePayload) -> Self {
        Self::Quote(payload)
    }
}

impl From<CandlestickPayload> for PushPayload {
    fn from(payload: CandlestickPayload) -> Self {
        Self::Candlestick(payload)
    }
}

impl From<TradesPayload> for PushPayload {
    fn from(payload: TradesPayload) -> Self {
        Self::Trades(payload)
    }
}

impl From<DepthPayload> for PushPayload {
    fn from(payload: DepthPayload) -> Self {
        Self::Depth(payload)
    }
}

// =============================================================================
// Envelope
// =============================================================================

/// A normalized push ready for fan-out.
///
/// The `type` field is always derived from the payload, so a quote body can
/// never travel under a `depth` label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushEnvelope {
    #[serde(rename = "type")]
    kind: PushKind,
    symbol: Symbol,
    data: PushPayload,
}

impl PushEnvelope {
    /// Wrap a normalized body for `symbol`.
    #[must_use]
    pub fn new(symbol: impl Into<Symbol>, data: PushPayload) -> Self {
        Self {
            kind: data.kind(),
            symbol: symbol.into(),
            data,
        }
    }

    /// Envelope kind.
    #[must_use]
    pub const fn kind(&self) -> PushKind {
        self.kind
    }

    /// Symbol the push is about.
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Normalized body.
    #[must_use]
    pub const fn data(&self) -> &PushPayload {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;

    fn depth() -> PushPayload {
        PushPayload::Depth(DepthPayload {
            asks: vec![DepthLevel {
                price: "10.01".to_string(),
                volume: 300,
                order_num: 4,
            }],
            bids: vec![],
        })
    }

    #[test]
    fn kind_follows_payload() {
        let envelope = PushEnvelope::new("700.HK", depth());

        assert_eq!(envelope.kind(), PushKind::Depth);
        assert_eq!(envelope.symbol(), "700.HK");
    }

    #[test]
    fn serializes_with_type_symbol_data() {
        let envelope = PushEnvelope::new("700.HK", depth());
        let value: Value = serde_json::to_value(&envelope).unwrap();

        assert_eq!(
            value,
            json!({
                "type": "depth",
                "symbol": "700.HK",
                "data": {
                    "asks": [{"price": "10.01", "volume": 300, "order_num": 4}],
                    "bids": []
                }
            })
        );
    }

    #[test]
    fn kind_labels() {
        assert_eq!(PushKind::Quote.to_string(), "quote");
        assert_eq!(PushKind::Candlestick.as_str(), "candlestick");
        assert_eq!(
            serde_json::to_string(&PushKind::Trades).unwrap(),
            r#""trades""#
        );
        assert_eq!(
            serde_json::from_str::<PushKind>(r#""depth""#).unwrap(),
            PushKind::Depth
        );
    }
}
