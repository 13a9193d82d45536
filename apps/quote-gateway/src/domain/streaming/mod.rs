//! Market Data Streaming Types
//!
//! Upstream push schema, the client-facing envelope, and the pure
//! normalization between them.

pub mod envelope;
pub mod normalize;
pub mod raw;

pub use envelope::{
    CandlestickPayload, DepthLevel, DepthPayload, PushEnvelope, PushKind, PushPayload,
    QuotePayload, TradeFill, TradesPayload,
};
pub use raw::{
    RawCandle, RawCandlestick, RawDepth, RawDepthLevel, RawPush, RawQuote, RawTimestamp,
    RawTrade, RawTrades,
};
