//! Connection Hub
//!
//! Tracks live client connections and fans every envelope out to all of
//! them.
//!
//! # Architecture
//!
//! A broadcast is two-phase:
//!
//! 1. Serialize once, then copy the connection set under the lock and
//!    release it.
//! 2. Send to every connection in the copy concurrently. Connections whose
//!    send failed are collected and removed in one batch afterwards.
//!
//! The lock is never held across a send, so a slow client cannot stall
//! `connect`, `disconnect` or another broadcast. A connection registered
//! while a broadcast is in flight does not receive that envelope; it
//! receives the next one.
//!
//! Each connection is a [`ConnectionSink`]. The production sink,
//! [`ChannelSink`], pushes into a bounded per-client queue drained by the
//! socket writer task; a full queue counts as a failed send.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::domain::streaming::PushEnvelope;
use crate::infrastructure::metrics;

// =============================================================================
// Connection Identity
// =============================================================================

/// Identifier of one client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generate a fresh random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Sinks
// =============================================================================

/// Failed delivery to one connection.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum SendError {
    /// The connection is gone.
    #[error("connection closed")]
    Closed,

    /// The connection is not keeping up with the outgoing rate.
    #[error("connection send queue full")]
    Lagging,
}

/// Outgoing half of a client connection.
#[async_trait]
pub trait ConnectionSink: Send + Sync {
    /// Deliver one serialized message.
    async fn send(&self, text: Arc<str>) -> Result<(), SendError>;
}

/// Sink backed by a bounded per-client queue.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<Arc<str>>,
}

impl ChannelSink {
    /// Create a sink and the receiver its writer task drains.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl ConnectionSink for ChannelSink {
    async fn send(&self, text: Arc<str>) -> Result<(), SendError> {
        self.tx.try_send(text).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::Lagging,
            mpsc::error::TrySendError::Closed(_) => SendError::Closed,
        })
    }
}

// =============================================================================
// Connection Hub
// =============================================================================

/// Result of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastOutcome {
    /// Connections the message was delivered to.
    pub delivered: usize,
    /// Connections removed because the send failed.
    pub evicted: usize,
}

/// Owner of the live connection set.
#[derive(Default)]
pub struct ConnectionHub {
    connections: Mutex<HashMap<ConnectionId, Arc<dyn ConnectionSink>>>,
}

impl fmt::Debug for ConnectionHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHub")
            .field("connections", &self.connection_count())
            .finish()
    }
}

impl ConnectionHub {
    /// Create an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection whose handshake has completed.
    pub fn connect(&self, sink: Arc<dyn ConnectionSink>) -> ConnectionId {
        let id = ConnectionId::new();
        let count = {
            let mut connections = self.connections.lock();
            connections.insert(id, sink);
            connections.len()
        };
        metrics::set_ws_clients(count);
        info!(connection_id = %id, total = count, "Client connected");
        id
    }

    /// Remove a connection. Returns `false` if it was already gone.
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        let (removed, count) = {
            let mut connections = self.connections.lock();
            let removed = connections.remove(&id).is_some();
            (removed, connections.len())
        };
        if removed {
            metrics::set_ws_clients(count);
            info!(connection_id = %id, total = count, "Client disconnected");
        }
        removed
    }

    /// Number of live connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }

    /// Serialize `envelope` once and deliver it to every live connection.
    pub async fn broadcast(&self, envelope: &PushEnvelope) -> BroadcastOutcome {
        let text: Arc<str> = match serde_json::to_string(envelope) {
            Ok(json) => json.into(),
            Err(e) => {
                error!(symbol = envelope.symbol(), error = %e, "Failed to serialize envelope");
                return BroadcastOutcome::default();
            }
        };

        let started = Instant::now();
        let outcome = self.broadcast_text(text).await;
        metrics::record_broadcast_duration(started.elapsed());
        metrics::record_messages_sent(envelope.kind(), outcome.delivered as u64);
        outcome
    }

    /// Deliver an already serialized message to every live connection.
    pub async fn broadcast_text(&self, text: Arc<str>) -> BroadcastOutcome {
        let snapshot: Vec<(ConnectionId, Arc<dyn ConnectionSink>)> = self
            .connections
            .lock()
            .iter()
            .map(|(id, sink)| (*id, Arc::clone(sink)))
            .collect();

        if snapshot.is_empty() {
            return BroadcastOutcome::default();
        }

        let text = &text;
        let results = join_all(snapshot.iter().map(|(id, sink)| async move {
            (*id, sink.send(Arc::clone(text)).await)
        }))
        .await;

        let mut dead = Vec::new();
        for (id, result) in results {
            if let Err(e) = result {
                debug!(connection_id = %id, error = %e, "Send failed, evicting");
                dead.push(id);
            }
        }

        let delivered = snapshot.len() - dead.len();
        let evicted = self.evict(&dead);

        BroadcastOutcome { delivered, evicted }
    }

    /// Deliver a message to one connection only.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::Closed`] if the connection is not registered,
    /// or the sink's error; a failed connection is evicted.
    pub async fn send_to(&self, id: ConnectionId, text: Arc<str>) -> Result<(), SendError> {
        let sink = self
            .connections
            .lock()
            .get(&id)
            .cloned()
            .ok_or(SendError::Closed)?;

        let result = sink.send(text).await;
        if result.is_err() {
            self.evict(&[id]);
        }
        result
    }

    fn evict(&self, ids: &[ConnectionId]) -> usize {
        if ids.is_empty() {
            return 0;
        }

        let (evicted, count) = {
            let mut connections = self.connections.lock();
            let evicted = ids
                .iter()
                .filter(|id| connections.remove(id).is_some())
                .count();
            (evicted, connections.len())
        };

        if evicted > 0 {
            metrics::record_connections_evicted(evicted as u64);
            metrics::set_ws_clients(count);
            info!(evicted, total = count, "Evicted failed connections");
        }
        evicted
    }
}

// =============================================================================
// Tests
// =============================================================================
