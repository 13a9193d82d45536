//! Subscription Set
//!
//! Domain type for the set of symbols the upstream feed is currently asked
//! to stream, plus the delta arithmetic the registry uses to decide which
//! upstream commands a request actually needs.
//!
//! # Design
//!
//! The set itself performs no I/O. Callers compute a delta against it,
//! carry out the upstream command for that delta, and only then commit the
//! delta back. Computing and committing are separate steps so that a failed
//! upstream command leaves the set untouched.

use std::collections::{BTreeSet, HashSet};

// =============================================================================
// Types
// =============================================================================

/// A symbol string (exchange-qualified ticker, e.g. `AAPL.US` or `700.HK`).
pub type Symbol = String;

/// Symbols requested by a caller, de-duplicated in first-seen order.
///
/// # Example
///
/// ```rust
/// use quote_gateway::domain::subscription::dedup_symbols;
///
/// let symbols = dedup_symbols(["B.US", "A.US", "B.US"]);
/// assert_eq!(symbols, vec!["B.US".to_string(), "A.US".to_string()]);
/// ```
#[must_use]
pub fn dedup_symbols<I, S>(symbols: I) -> Vec<Symbol>
where
    I: IntoIterator<Item = S>,
    S: Into<Symbol>,
{
    let mut seen = HashSet::new();
    symbols
        .into_iter()
        .map(Into::into)
        .filter(|symbol: &Symbol| seen.insert(symbol.clone()))
        .collect()
}

// =============================================================================
// Subscription Set
// =============================================================================

/// Symbols currently subscribed upstream.
///
/// Ordered so that snapshots are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionSet {
    symbols: BTreeSet<Symbol>,
}

impl SubscriptionSet {
    /// Create an empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            symbols: BTreeSet::new(),
        }
    }

    /// Requested symbols that are not yet subscribed, in request order.
    #[must_use]
    pub fn missing(&self, requested: &[Symbol]) -> Vec<Symbol> {
        requested
            .iter()
            .filter(|symbol| !self.symbols.contains(*symbol))
            .cloned()
            .collect()
    }

    /// Requested symbols that are currently subscribed, in request order.
    #[must_use]
    pub fn present(&self, requested: &[Symbol]) -> Vec<Symbol> {
        requested
            .iter()
            .filter(|symbol| self.symbols.contains(*symbol))
            .cloned()
            .collect()
    }

    /// Commit an add delta.
    pub fn commit_added(&mut self, added: &[Symbol]) {
        self.symbols.extend(added.iter().cloned());
    }

    /// Commit a remove delta.
    pub fn commit_removed(&mut self, removed: &[Symbol]) {
        for symbol in removed {
            self.symbols.remove(symbol);
        }
    }

    /// Check membership.
    #[must_use]
    pub fn contains(&self, symbol: &str) -> bool {
        self.symbols.contains(symbol)
    }

    /// Sorted snapshot of all members.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Symbol> {
        self.symbols.iter().cloned().collect()
    }

    /// Number of subscribed symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Check if nothing is subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

// =============================================================================
// Subscription Delta
// =============================================================================

/// Outcome of one subscribe or unsubscribe call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionDelta {
    /// Symbols committed to (or removed from) the set by this call.
    pub applied: Vec<Symbol>,
    /// Symbols whose candlestick command failed while the primary
    /// quote/trade/depth command succeeded.
    pub candle_failures: Vec<Symbol>,
}

impl SubscriptionDelta {
    /// A call that needed no upstream command.
    #[must_use]
    pub const fn unchanged() -> Self {
        Self {
            applied: Vec::new(),
            candle_failures: Vec::new(),
        }
    }

    /// Check if the call changed nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.applied.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================
