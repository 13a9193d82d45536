//! Push Dispatcher
//!
//! Bridges the upstream feed's receive loop to the connection hub.
//!
//! The feed calls the `on_*` methods of a [`DispatchHandle`] from its own
//! task. Each call normalizes the push and hands the envelope to a bounded
//! queue with `try_send`, so the feed never waits on client fan-out. A
//! single [`Dispatcher`] task drains the queue and broadcasts, which keeps
//! envelopes in upstream delivery order.
//!
//! ```text
//! FeedClient ──on_quote()──► [bounded queue] ──► Dispatcher ──► ConnectionHub
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::domain::streaming::{
    PushEnvelope, RawCandlestick, RawDepth, RawPush, RawQuote, RawTrades, normalize,
};
use crate::infrastructure::broadcast::ConnectionHub;
use crate::infrastructure::metrics;

/// Create a dispatch handle and the consumer that drains it.
#[must_use]
pub fn dispatch_channel(hub: Arc<ConnectionHub>, capacity: usize) -> (DispatchHandle, Dispatcher) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let handle = DispatchHandle {
        tx,
        dropped: Arc::new(AtomicU64::new(0)),
    };
    (handle, Dispatcher { rx, hub })
}

// =============================================================================
// Dispatch Handle
// =============================================================================

/// Non-blocking entry point for upstream pushes.
#[derive(Debug, Clone)]
pub struct DispatchHandle {
    tx: mpsc::Sender<PushEnvelope>,
    dropped: Arc<AtomicU64>,
}

impl DispatchHandle {
    /// Handle a quote push. Returns `false` if the envelope was dropped.
    pub fn on_quote(&self, symbol: &str, raw: &RawQuote) -> bool {
        self.enqueue(PushEnvelope::new(symbol, normalize::quote(raw).into()))
    }

    /// Handle a candlestick push.
    pub fn on_candlestick(&self, symbol: &str, raw: &RawCandlestick) -> bool {
        self.enqueue(PushEnvelope::new(symbol, normalize::candlestick(raw).into()))
    }

    /// Handle a trades push.
    pub fn on_trades(&self, symbol: &str, raw: &RawTrades) -> bool {
        self.enqueue(PushEnvelope::new(symbol, normalize::trades(raw).into()))
    }

    /// Handle a depth push.
    pub fn on_depth(&self, symbol: &str, raw: &RawDepth) -> bool {
        self.enqueue(PushEnvelope::new(symbol, normalize::depth(raw).into()))
    }

    /// Handle any push.
    pub fn on_push(&self, symbol: &str, raw: &RawPush) -> bool {
        self.enqueue(normalize::envelope(symbol, raw))
    }

    /// Envelopes dropped because the queue was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn enqueue(&self, envelope: PushEnvelope) -> bool {
        let kind = envelope.kind();
        metrics::record_push_received(kind);

        match self.tx.try_send(envelope) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(envelope)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                metrics::record_push_dropped(kind);
                warn!(
                    kind = %kind,
                    symbol = envelope.symbol(),
                    total_dropped = total,
                    "Dispatch queue full, dropping push"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(kind = %kind, "Dispatcher stopped, discarding push");
                false
            }
        }
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Single consumer that broadcasts queued envelopes in order.
#[derive(Debug)]
pub struct Dispatcher {
    rx: mpsc::Receiver<PushEnvelope>,
    hub: Arc<ConnectionHub>,
}

impl Dispatcher {
    /// Broadcast queued envelopes until cancelled or every handle is dropped.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!("Dispatcher started");

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("Dispatcher cancelled");
                    break;
                }
                next = self.rx.recv() => {
                    let Some(envelope) = next else {
                        info!("All dispatch handles dropped");
                        break;
                    };
                    let outcome = self.hub.broadcast(&envelope).await;
                    trace!(
                        kind = %envelope.kind(),
                        symbol = envelope.symbol(),
                        delivered = outcome.delivered,
                        evicted = outcome.evicted,
                        "Broadcast envelope"
                    );
                }
            }
        }
    }
}
