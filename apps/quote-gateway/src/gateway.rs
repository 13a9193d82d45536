//! Gateway assembly.
//!
//! Wires the hub, registry, dispatcher, feed client and HTTP server from a
//! [`GatewayConfig`] and runs them under one cancellation token.

use std::sync::Arc;
use std::time::Instant;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::services::{Dispatcher, SubscriptionRegistry, dispatch_channel};
use crate::infrastructure::broadcast::ConnectionHub;
use crate::infrastructure::config::GatewayConfig;
use crate::infrastructure::feed::{FeedClient, FeedClientConfig};
use crate::infrastructure::http::{AppState, HttpServer, ServerError};
use crate::infrastructure::watchlist::WatchlistStore;

/// A fully wired gateway, not yet running.
#[derive(Debug)]
pub struct Gateway {
    config: GatewayConfig,
    cancel: CancellationToken,
    state: AppState,
    feed: Arc<FeedClient>,
    dispatcher: Dispatcher,
}

impl Gateway {
    /// Build every component. Nothing connects or listens yet.
    #[must_use]
    pub fn new(config: GatewayConfig, cancel: CancellationToken) -> Self {
        let hub = Arc::new(ConnectionHub::new());
        let (dispatch, dispatcher) =
            dispatch_channel(Arc::clone(&hub), config.dispatch.dispatch_capacity);

        let feed = Arc::new(FeedClient::new(
            FeedClientConfig::from_settings(&config.feed, config.credentials.clone()),
            dispatch,
            cancel.clone(),
        ));
        let registry = Arc::new(SubscriptionRegistry::new(Arc::clone(&feed) as _));

        let state = AppState {
            registry,
            hub,
            feed: feed.state(),
            watchlist: Arc::new(WatchlistStore::new(config.watchlist_path.clone())),
            client_queue_capacity: config.dispatch.client_queue_capacity,
            public_base_url: config.server.public_base_url.clone(),
            started_at: Instant::now(),
        };

        Self {
            config,
            cancel,
            state,
            feed,
            dispatcher,
        }
    }

    /// Handler state, shared with the running server.
    #[must_use]
    pub const fn state(&self) -> &AppState {
        &self.state
    }

    /// Bind the configured address and run until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `ServerError` if the address cannot be bound or the server
    /// fails.
    pub async fn run(self) -> Result<(), ServerError> {
        let addr = self.config.server.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ServerError::BindFailed(addr, e))?;
        self.serve(listener).await
    }

    /// Start the dispatcher and feed client, then serve HTTP on `listener`
    /// until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::ServerFailed` if the server fails.
    pub async fn serve(self, listener: TcpListener) -> Result<(), ServerError> {
        let Self {
            config,
            cancel,
            state,
            feed,
            dispatcher,
        } = self;

        tokio::spawn(dispatcher.run(cancel.clone()));

        let feed_cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = feed.run().await {
                tracing::error!(error = %e, "Feed client stopped");
                feed_cancel.cancel();
            }
        });

        let result = HttpServer::new(config.server, state, cancel.clone())
            .serve(listener)
            .await;
        cancel.cancel();
        result
    }
}
