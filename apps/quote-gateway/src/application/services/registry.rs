//! Subscription Registry
//!
//! Authoritative view of which symbols the upstream feed streams. Client
//! subscribe/unsubscribe requests are reduced to the symbol delta against
//! that view and only the delta reaches the upstream.
//!
//! # Concurrency
//!
//! Subscribe and unsubscribe run one at a time behind an async operation
//! gate that stays held across the upstream round trip, so a second caller
//! always computes its delta against the committed result of the first.
//! The committed set sits behind its own short-held lock, so
//! [`SubscriptionRegistry::current_symbols`] never waits on the upstream.
//!
//! Once a delta is decided, the upstream commands and the commit run to
//! completion on a spawned task holding the gate, even if the caller's
//! future is dropped.

use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::application::ports::{CandlePeriod, Channel, FeedAdapter, FeedError};
use crate::domain::subscription::{SubscriptionDelta, SubscriptionSet, Symbol, dedup_symbols};
use crate::infrastructure::metrics;

/// Registry operation failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The batched quote/trade/depth command failed; nothing was committed.
    #[error(transparent)]
    Upstream(#[from] FeedError),

    /// The task applying the delta did not complete.
    #[error("subscription update interrupted: {0}")]
    Interrupted(String),
}

/// Owner of the upstream subscription set.
pub struct SubscriptionRegistry {
    inner: Arc<Inner>,
}

struct Inner {
    feed: Arc<dyn FeedAdapter>,
    gate: Arc<Mutex<()>>,
    set: RwLock<SubscriptionSet>,
}

impl std::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("set", &*self.inner.set.read())
            .finish_non_exhaustive()
    }
}

impl SubscriptionRegistry {
    /// Create an empty registry issuing commands to `feed`.
    #[must_use]
    pub fn new(feed: Arc<dyn FeedAdapter>) -> Self {
        Self {
            inner: Arc::new(Inner {
                feed,
                gate: Arc::new(Mutex::new(())),
                set: RwLock::new(SubscriptionSet::new()),
            }),
        }
    }

    /// Subscribe `symbols`, issuing upstream commands only for symbols not
    /// yet subscribed.
    ///
    /// Candlestick command failures are logged and reported in the returned
    /// delta; they do not undo the quote/trade/depth subscription. Once the
    /// delta is decided it is applied to completion even if the returned
    /// future is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the batched quote/trade/depth command fails. The
    /// set is left unchanged in that case.
    pub async fn subscribe(&self, symbols: &[Symbol]) -> Result<SubscriptionDelta, RegistryError> {
        let requested = dedup_symbols(symbols.iter().cloned());
        let gate = Arc::clone(&self.inner.gate).lock_owned().await;

        let added = self.inner.set.read().missing(&requested);
        if added.is_empty() {
            debug!(symbols = ?requested, "All symbols already subscribed");
            return Ok(SubscriptionDelta::unchanged());
        }

        let inner = Arc::clone(&self.inner);
        detached(async move {
            let _gate = gate;
            inner.add(added).await
        })
        .await
    }

    /// Unsubscribe `symbols`, issuing upstream commands only for symbols
    /// currently subscribed. Like [`Self::subscribe`], a decided delta is
    /// applied even if the returned future is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the batched quote/trade/depth command fails. The
    /// set is left unchanged in that case.
    pub async fn unsubscribe(
        &self,
        symbols: &[Symbol],
    ) -> Result<SubscriptionDelta, RegistryError> {
        let requested = dedup_symbols(symbols.iter().cloned());
        let gate = Arc::clone(&self.inner.gate).lock_owned().await;

        let removed = self.inner.set.read().present(&requested);
        if removed.is_empty() {
            debug!(symbols = ?requested, "No requested symbol is subscribed");
            return Ok(SubscriptionDelta::unchanged());
        }

        let inner = Arc::clone(&self.inner);
        detached(async move {
            let _gate = gate;
            inner.remove(removed).await
        })
        .await
    }

    /// Sorted snapshot of the subscribed symbols.
    #[must_use]
    pub fn current_symbols(&self) -> Vec<Symbol> {
        self.inner.set.read().snapshot()
    }

    /// Number of subscribed symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.set.read().len()
    }

    /// Check if nothing is subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.set.read().is_empty()
    }
}

/// Run `operation` on its own task so the caller cannot abandon it halfway.
async fn detached<F>(operation: F) -> Result<SubscriptionDelta, RegistryError>
where
    F: Future<Output = Result<SubscriptionDelta, RegistryError>> + Send + 'static,
{
    tokio::spawn(operation)
        .await
        .map_err(|e| RegistryError::Interrupted(e.to_string()))?
}

impl Inner {
    async fn add(&self, added: Vec<Symbol>) -> Result<SubscriptionDelta, RegistryError> {
        if let Err(e) = self.feed.subscribe_channels(&added, &Channel::PRIMARY).await {
            metrics::record_upstream_command_error("subscribe");
            warn!(symbols = ?added, error = %e, "Upstream subscribe failed");
            return Err(e.into());
        }

        let mut candle_failures = Vec::new();
        for symbol in &added {
            if let Err(e) = self.feed.subscribe_candles(symbol, CandlePeriod::Day).await {
                metrics::record_upstream_command_error("subscribe_candlesticks");
                warn!(symbol = %symbol, error = %e, "Candlestick subscribe failed");
                candle_failures.push(symbol.clone());
            }
        }

        let total = {
            let mut set = self.set.write();
            set.commit_added(&added);
            set.len()
        };
        metrics::set_subscribed_symbols(total);
        info!(symbols = ?added, total, "Subscribed");

        Ok(SubscriptionDelta {
            applied: added,
            candle_failures,
        })
    }

    async fn remove(&self, removed: Vec<Symbol>) -> Result<SubscriptionDelta, RegistryError> {
        if let Err(e) = self.feed.unsubscribe_channels(&removed, &Channel::PRIMARY).await {
            metrics::record_upstream_command_error("unsubscribe");
            warn!(symbols = ?removed, error = %e, "Upstream unsubscribe failed");
            return Err(e.into());
        }

        let mut candle_failures = Vec::new();
        for symbol in &removed {
            if let Err(e) = self.feed.unsubscribe_candles(symbol, CandlePeriod::Day).await {
                metrics::record_upstream_command_error("unsubscribe_candlesticks");
                warn!(symbol = %symbol, error = %e, "Candlestick unsubscribe failed");
                candle_failures.push(symbol.clone());
            }
        }

        let total = {
            let mut set = self.set.write();
            set.commit_removed(&removed);
            set.len()
        };
        metrics::set_subscribed_symbols(total);
        info!(symbols = ?removed, total, "Unsubscribed");

        Ok(SubscriptionDelta {
            applied: removed,
            candle_failures,
        })
    }
}
