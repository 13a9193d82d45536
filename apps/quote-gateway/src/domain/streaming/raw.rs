//! Upstream Push Event Schema
//!
//! Typed shapes of the push events the upstream feed delivers. Every field
//! is optional: the upstream omits fields freely, and a missing field must
//! fall back to a zero value rather than reject the event.
//!
//! # Wire Format (JSON)
//!
//! ```json
//! {"last_done": "123.456", "prev_close": "120.000", "volume": 1200,
//!  "timestamp": "2024-03-01T14:30:00Z"}
//! ```
//!
//! Decimal fields accept either JSON strings or JSON numbers; timestamps
//! accept either integer epoch seconds or an RFC 3339 string.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Timestamps
// =============================================================================

/// An upstream timestamp in whichever form the feed sent it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    /// Epoch seconds.
    Epoch(i64),
    /// Structured date/time.
    DateTime(DateTime<Utc>),
}

impl RawTimestamp {
    /// Epoch seconds, whatever the source form.
    #[must_use]
    pub fn epoch_seconds(self) -> i64 {
        match self {
            Self::Epoch(secs) => secs,
            Self::DateTime(dt) => dt.timestamp(),
        }
    }
}

// =============================================================================
// Quote
// =============================================================================

/// Real-time quote push.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawQuote {
    /// Last traded price.
    pub last_done: Option<Decimal>,
    /// Session open.
    pub open: Option<Decimal>,
    /// Session high.
    pub high: Option<Decimal>,
    /// Session low.
    pub low: Option<Decimal>,
    /// Previous session close (reference price for change).
    pub prev_close: Option<Decimal>,
    /// Cumulative volume.
    pub volume: Option<i64>,
    /// Cumulative turnover.
    pub turnover: Option<Decimal>,
    /// Upstream-computed change, used only when no reference price is known.
    pub change: Option<Decimal>,
    /// Upstream-computed change rate in percent.
    pub change_rate: Option<Decimal>,
    /// Quote time.
    pub timestamp: Option<RawTimestamp>,
}

// =============================================================================
// Candlestick
// =============================================================================

/// One OHLCV bar.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawCandle {
    /// Open price.
    pub open: Option<Decimal>,
    /// Close price.
    pub close: Option<Decimal>,
    /// High price.
    pub high: Option<Decimal>,
    /// Low price.
    pub low: Option<Decimal>,
    /// Volume.
    pub volume: Option<i64>,
    /// Turnover.
    pub turnover: Option<Decimal>,
    /// Bar start time.
    pub timestamp: Option<RawTimestamp>,
}

/// Candlestick push: the bar plus its period label (e.g. `Period.Day`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawCandlestick {
    /// Bar period label.
    pub period: Option<String>,
    /// The bar itself.
    pub candlestick: RawCandle,
}

// =============================================================================
// Trades
// =============================================================================

/// One fill inside a trades push.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawTrade {
    /// Fill price.
    pub price: Option<Decimal>,
    /// Fill volume.
    pub volume: Option<i64>,
    /// Fill time.
    pub timestamp: Option<RawTimestamp>,
    /// Aggressor direction label (e.g. `TradeDirection.Up`).
    pub direction: Option<String>,
    /// Exchange trade type code.
    pub trade_type: Option<String>,
    /// Trading session label (e.g. `TradeSession.Pre`).
    pub trade_session: Option<String>,
}

/// Trades push: a batch of fills.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawTrades {
    /// Fills in upstream order.
    pub trades: Vec<RawTrade>,
}

// =============================================================================
// Depth
// =============================================================================

/// One price level of the order book.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawDepthLevel {
    /// Level price.
    pub price: Option<Decimal>,
    /// Resting volume.
    pub volume: Option<i64>,
    /// Number of orders at the level.
    pub order_num: Option<i64>,
}

/// Depth push: both sides of the book, best level first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawDepth {
    /// Ask levels.
    pub asks: Vec<RawDepthLevel>,
    /// Bid levels.
    pub bids: Vec<RawDepthLevel>,
}

// =============================================================================
// Push
// =============================================================================

/// Any upstream push event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawPush {
    /// Quote push.
    Quote(RawQuote),
    /// Candlestick push.
    Candlestick(RawCandlestick),
    /// Trades push.
    Trades(RawTrades),
    /// Depth push.
    Depth(RawDepth),
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn quote_deserializes_with_missing_fields() {
        let quote: RawQuote = serde_json::from_str(r#"{"last_done": "10.5"}"#).unwrap();

        assert_eq!(quote.last_done, Some(Decimal::from_str("10.5").unwrap()));
        assert!(quote.prev_close.is_none());
        assert!(quote.timestamp.is_none());
    }

    #[test]
    fn empty_object_is_a_valid_quote() {
        let quote: RawQuote = serde_json::from_str("{}").unwrap();
        assert_eq!(quote, RawQuote::default());
    }

    #[test]
    fn timestamp_accepts_epoch_seconds() {
        let ts: RawTimestamp = serde_json::from_str("1709303400").unwrap();
        assert_eq!(ts.epoch_seconds(), 1_709_303_400);
    }

    #[test]
    fn timestamp_accepts_rfc3339() {
        let ts: RawTimestamp = serde_json::from_str(r#""2024-03-01T14:30:00Z""#).unwrap();
        assert_eq!(ts.epoch_seconds(), 1_709_303_400);
    }

    #[test]
    fn decimal_string_keeps_scale() {
        let level: RawDepthLevel =
            serde_json::from_str(r#"{"price": "120.000", "volume": 5, "order_num": 2}"#).unwrap();

        assert_eq!(level.price.unwrap().to_string(), "120.000");
        assert_eq!(level.volume, Some(5));
        assert_eq!(level.order_num, Some(2));
    }

    #[test]
    fn candlestick_without_bar_defaults() {
        let push: RawCandlestick = serde_json::from_str(r#"{"period": "Period.Day"}"#).unwrap();

        assert_eq!(push.period.as_deref(), Some("Period.Day"));
        assert_eq!(push.candlestick, RawCandle::default());
    }

    #[test]
    fn trades_without_list_is_empty() {
        let push: RawTrades = serde_json::from_str("{}").unwrap();
        assert!(push.trades.is_empty());
    }
}
