//! Push Normalization
//!
//! Pure conversion from upstream push events into envelope payloads.
//!
//! Every function here is infallible: absent fields become `"0"` or `0`,
//! arithmetic that cannot be carried out (zero reference price, overflow)
//! falls back to the upstream value or zero.

use rust_decimal::Decimal;

use super::envelope::{
    CandlestickPayload, DepthLevel, DepthPayload, PushEnvelope, PushPayload, QuotePayload,
    TradeFill, TradesPayload,
};
use super::raw::{
    RawCandlestick, RawDepth, RawDepthLevel, RawPush, RawQuote, RawTimestamp, RawTrade, RawTrades,
};

/// Decimal places kept for percentage change.
pub const CHANGE_PCT_SCALE: u32 = 2;

// =============================================================================
// Field Helpers
// =============================================================================

fn amount(value: Option<Decimal>) -> String {
    value.unwrap_or(Decimal::ZERO).to_string()
}

fn epoch(value: Option<RawTimestamp>) -> i64 {
    value.map_or(0, RawTimestamp::epoch_seconds)
}

/// Last segment of an enum-like label (`TradeDirection.Up` -> `Up`).
fn label(value: Option<&str>) -> String {
    value
        .map(|v| v.rsplit_once('.').map_or(v, |(_, tail)| tail))
        .unwrap_or_default()
        .to_string()
}

// =============================================================================
// Quote
// =============================================================================

/// Change and percent change against the previous close.
///
/// Falls back to the upstream-supplied values when there is no usable
/// reference price.
fn quote_change(raw: &RawQuote) -> (Decimal, Decimal) {
    let reference = raw.prev_close.filter(|p| !p.is_zero());
    let last = raw.last_done.unwrap_or(Decimal::ZERO);

    let change = reference
        .and_then(|prev| last.checked_sub(prev))
        .or(raw.change)
        .unwrap_or(Decimal::ZERO);

    let change_pct = reference
        .and_then(|prev| change.checked_div(prev))
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .or(raw.change_rate)
        .unwrap_or(Decimal::ZERO)
        .round_dp(CHANGE_PCT_SCALE);

    (change, change_pct)
}

/// Normalize a quote push.
#[must_use]
pub fn quote(raw: &RawQuote) -> QuotePayload {
    let (change, change_pct) = quote_change(raw);

    QuotePayload {
        last_done: amount(raw.last_done),
        open: amount(raw.open),
        high: amount(raw.high),
        low: amount(raw.low),
        prev_close: amount(raw.prev_close),
        volume: raw.volume.unwrap_or_default(),
        turnover: amount(raw.turnover),
        change: change.to_string(),
        change_pct: change_pct.to_string(),
        timestamp: epoch(raw.timestamp),
        is_up: change >= Decimal::ZERO,
    }
}

// =============================================================================
// Candlestick
// =============================================================================

/// Normalize a candlestick push.
#[must_use]
pub fn candlestick(raw: &RawCandlestick) -> CandlestickPayload {
    let bar = &raw.candlestick;

    CandlestickPayload {
        period: label(raw.period.as_deref()),
        open: amount(bar.open),
        close: amount(bar.close),
        high: amount(bar.high),
        low: amount(bar.low),
        volume: bar.volume.unwrap_or_default(),
        turnover: amount(bar.turnover),
        timestamp: epoch(bar.timestamp),
    }
}

// =============================================================================
// Trades
// =============================================================================

/// A fill has no reference price, so `is_up` follows the direction label: only `Down` is down.
fn fill(raw: &RawTrade) -> TradeFill {
    let direction = label(raw.direction.as_deref());

    TradeFill {
        price: amount(raw.price),
        volume: raw.volume.unwrap_or_default(),
        timestamp: epoch(raw.timestamp),
        is_up: direction != "Down",
        direction,
        trade_type: raw.trade_type.clone().unwrap_or_default(),
        trade_session: label(raw.trade_session.as_deref()),
    }
}

/// Normalize a trades push.
#[must_use]
pub fn trades(raw: &RawTrades) -> TradesPayload {
    TradesPayload {
        trades: raw.trades.iter().map(fill).collect(),
    }
}

// =============================================================================
// Depth
// =============================================================================

fn level(raw: &RawDepthLevel) -> DepthLevel {
    DepthLevel {
        price: amount(raw.price),
        volume: raw.volume.unwrap_or_default(),
        order_num: raw.order_num.unwrap_or_default(),
    }
}

/// Normalize a depth push.
#[must_use]
pub fn depth(raw: &RawDepth) -> DepthPayload {
    DepthPayload {
        asks: raw.asks.iter().map(level).collect(),
        bids: raw.bids.iter().map(level).collect(),
    }
}

// =============================================================================
// Envelope
// =============================================================================

/// Normalize any push into a ready-to-broadcast envelope.
#[must_use]
pub fn envelope(symbol: &str, raw: &RawPush) -> PushEnvelope {
    let data = match raw {
        RawPush::Quote(q) => PushPayload::Quote(quote(q)),
        RawPush::Candlestick(c) => PushPayload::Candlestick(candlestick(c)),
        RawPush::Trades(t) => PushPayload::Trades(trades(t)),
        RawPush::Depth(d) => PushPayload::Depth(depth(d)),
    };
    PushEnvelope::new(symbol, data)
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use proptest::prelude::*;
    use serde_json::json;
    use test_case::test_case;

    use super::*;
    use crate::domain::streaming::envelope::PushKind;
    use crate::domain::streaming::raw::RawCandle;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn quote_change_keeps_exact_decimal_text() {
        let raw = RawQuote {
            last_done: Some(dec("123.456")),
            prev_close: Some(dec("120.000")),
            ..RawQuote::default()
        };

        let q = quote(&raw);

        assert_eq!(q.change, "3.456");
        assert_eq!(q.change_pct, "2.88");
        assert_eq!(q.last_done, "123.456");
        assert_eq!(q.prev_close, "120.000");
        assert!(q.is_up);
    }

    #[test]
    fn quote_with_no_fields_defaults_to_zero() {
        let q = quote(&RawQuote::default());

        assert_eq!(q.last_done, "0");
        assert_eq!(q.turnover, "0");
        assert_eq!(q.change, "0");
        assert_eq!(q.change_pct, "0");
        assert_eq!(q.volume, 0);
        assert_eq!(q.timestamp, 0);
        assert!(q.is_up, "zero change counts as up");
    }

    #[test]
    fn quote_below_reference_is_down() {
        let raw = RawQuote {
            last_done: Some(dec("9.50")),
            prev_close: Some(dec("10.00")),
            ..RawQuote::default()
        };

        let q = quote(&raw);

        assert_eq!(q.change, "-0.50");
        assert_eq!(dec(&q.change_pct), dec("-5"));
        assert!(!q.is_up);
    }

    #[test]
    fn quote_without_reference_uses_upstream_change() {
        let raw = RawQuote {
            last_done: Some(dec("50")),
            change: Some(dec("-1.25")),
            change_rate: Some(dec("-2.44")),
            ..RawQuote::default()
        };

        let q = quote(&raw);

        assert_eq!(q.change, "-1.25");
        assert_eq!(q.change_pct, "-2.44");
        assert!(!q.is_up);
    }

    #[test]
    fn quote_zero_reference_is_not_divided() {
        let raw = RawQuote {
            last_done: Some(dec("1")),
            prev_close: Some(Decimal::ZERO),
            ..RawQuote::default()
        };

        let q = quote(&raw);

        assert_eq!(q.change, "0");
        assert_eq!(q.change_pct, "0");
    }

    #[test]
    fn quote_timestamp_from_datetime() {
        let raw: RawQuote =
            serde_json::from_value(json!({"timestamp": "2024-03-01T14:30:00Z"})).unwrap();

        assert_eq!(quote(&raw).timestamp, 1_709_303_400);
    }

    #[test_case(Some("TradeDirection.Up"), "Up", true ; "qualified up")]
    #[test_case(Some("TradeDirection.Down"), "Down", false ; "qualified down")]
    #[test_case(Some("Neutral"), "Neutral", true ; "bare neutral")]
    #[test_case(None, "", true ; "absent")]
    fn trade_direction(direction: Option<&str>, expected: &str, is_up: bool) {
        let raw = RawTrades {
            trades: vec![RawTrade {
                direction: direction.map(str::to_string),
                ..RawTrade::default()
            }],
        };

        let fills = trades(&raw).trades;

        assert_eq!(fills[0].direction, expected);
        assert_eq!(fills[0].is_up, is_up);
    }

    #[test]
    fn trades_keep_order_and_fields() {
        let raw = RawTrades {
            trades: vec![
                RawTrade {
                    price: Some(dec("10.1")),
                    volume: Some(100),
                    timestamp: Some(RawTimestamp::Epoch(1_700_000_000)),
                    direction: Some("TradeDirection.Up".to_string()),
                    trade_type: Some("U".to_string()),
                    trade_session: Some("TradeSession.Pre".to_string()),
                },
                RawTrade {
                    price: Some(dec("10.0")),
                    volume: Some(5),
                    ..RawTrade::default()
                },
            ],
        };

        let fills = trades(&raw).trades;

        assert_eq!(fills.len(), 2);
        assert_eq!(fills[0].price, "10.1");
        assert_eq!(fills[0].timestamp, 1_700_000_000);
        assert_eq!(fills[0].trade_type, "U");
        assert_eq!(fills[0].trade_session, "Pre");
        assert_eq!(fills[1].price, "10.0");
        assert_eq!(fills[1].trade_session, "");
    }

    #[test]
    fn depth_preserves_level_order() {
        let raw = RawDepth {
            asks: vec![
                RawDepthLevel {
                    price: Some(dec("10.02")),
                    volume: Some(200),
                    order_num: Some(3),
                },
                RawDepthLevel {
                    price: Some(dec("10.03")),
                    ..RawDepthLevel::default()
                },
            ],
            bids: vec![RawDepthLevel::default()],
        };

        let book = depth(&raw);

        assert_eq!(book.asks[0].price, "10.02");
        assert_eq!(book.asks[0].order_num, 3);
        assert_eq!(book.asks[1].price, "10.03");
        assert_eq!(book.asks[1].volume, 0);
        assert_eq!(book.bids[0].price, "0");
    }

    #[test]
    fn candlestick_strips_period_prefix() {
        let raw = RawCandlestick {
            period: Some("Period.Day".to_string()),
            candlestick: RawCandle {
                open: Some(dec("1.10")),
                close: Some(dec("1.20")),
                high: Some(dec("1.25")),
                low: Some(dec("1.05")),
                volume: Some(1_000),
                turnover: Some(dec("1150.00")),
                timestamp: Some(RawTimestamp::Epoch(1_709_251_200)),
            },
        };

        let bar = candlestick(&raw);

        assert_eq!(bar.period, "Day");
        assert_eq!(bar.open, "1.10");
        assert_eq!(bar.close, "1.20");
        assert_eq!(bar.turnover, "1150.00");
        assert_eq!(bar.timestamp, 1_709_251_200);
    }

    #[test]
    fn candlestick_without_period_is_empty_label() {
        assert_eq!(candlestick(&RawCandlestick::default()).period, "");
    }

    #[test_case(RawPush::Quote(RawQuote::default()), PushKind::Quote ; "quote")]
    #[test_case(RawPush::Candlestick(RawCandlestick::default()), PushKind::Candlestick ; "candlestick")]
    #[test_case(RawPush::Trades(RawTrades::default()), PushKind::Trades ; "trades")]
    #[test_case(RawPush::Depth(RawDepth::default()), PushKind::Depth ; "depth")]
    fn envelope_kind_matches_push(raw: RawPush, kind: PushKind) {
        let envelope = envelope("AAA.US", &raw);

        assert_eq!(envelope.kind(), kind);
        assert_eq!(envelope.symbol(), "AAA.US");
    }

    proptest! {
        #[test]
        fn change_is_exact_difference(
            last in 0i64..10_000_000,
            prev in 1i64..10_000_000,
            scale in 0u32..5,
        ) {
            let last = Decimal::new(last, scale);
            let prev = Decimal::new(prev, scale);
            let raw = RawQuote {
                last_done: Some(last),
                prev_close: Some(prev),
                ..RawQuote::default()
            };

            let q = quote(&raw);

            prop_assert_eq!(dec(&q.change), last - prev);
            prop_assert_eq!(q.is_up, last >= prev);
        }
    }
}
