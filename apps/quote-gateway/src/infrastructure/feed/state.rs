//! Feed connection status shared with the health endpoint.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

/// Live counters for the upstream session.
#[derive(Debug, Default)]
pub struct FeedState {
    connected: AtomicBool,
    reconnect_attempts: AtomicU32,
    pushes_received: AtomicU64,
    last_connected_at: RwLock<Option<DateTime<Utc>>>,
    last_error: RwLock<Option<String>>,
}

impl FeedState {
    /// Create a disconnected state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Session authenticated.
    pub fn mark_connected(&self) {
        self.connected.store(true, Ordering::SeqCst);
        self.reconnect_attempts.store(0, Ordering::Relaxed);
        *self.last_connected_at.write() = Some(Utc::now());
    }

    /// Session lost.
    pub fn mark_disconnected(&self, reason: impl Into<String>) {
        self.connected.store(false, Ordering::SeqCst);
        *self.last_error.write() = Some(reason.into());
    }

    /// Record a scheduled reconnect.
    pub fn record_reconnect_attempt(&self, attempt: u32) {
        self.reconnect_attempts.store(attempt, Ordering::Relaxed);
    }

    /// Count one upstream push.
    pub fn record_push(&self) {
        self.pushes_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Whether the session is authenticated.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Point-in-time copy for reporting.
    #[must_use]
    pub fn status(&self) -> FeedStatus {
        FeedStatus {
            connected: self.is_connected(),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::Relaxed),
            pushes_received: self.pushes_received.load(Ordering::Relaxed),
            last_connected_at: *self.last_connected_at.read(),
            last_error: self.last_error.read().clone(),
        }
    }
}

/// Snapshot of [`FeedState`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedStatus {
    /// Whether the session is authenticated.
    pub connected: bool,
    /// Current reconnect attempt, 0 while connected.
    pub reconnect_attempts: u32,
    /// Pushes received since start.
    pub pushes_received: u64,
    /// When the session last authenticated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_connected_at: Option<DateTime<Utc>>,
    /// Reason for the last disconnect.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_disconnected() {
        let status = FeedState::new().status();
        assert!(!status.connected);
        assert_eq!(status.pushes_received, 0);
        assert!(status.last_connected_at.is_none());
    }

    #[test]
    fn connect_clears_attempts() {
        let state = FeedState::new();
        state.record_reconnect_attempt(3);
        state.mark_connected();

        let status = state.status();
        assert!(status.connected);
        assert_eq!(status.reconnect_attempts, 0);
        assert!(status.last_connected_at.is_some());
    }

    #[test]
    fn disconnect_keeps_reason() {
        let state = FeedState::new();
        state.mark_connected();
        state.record_push();
        state.record_push();
        state.mark_disconnected("connection closed");

        let status = state.status();
        assert!(!status.connected);
        assert_eq!(status.pushes_received, 2);
        assert_eq!(status.last_error.as_deref(), Some("connection closed"));
    }
}
