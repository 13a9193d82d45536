//! HTTP and WebSocket Server
//!
//! # Endpoints
//!
//! - `GET /ws/quotes` - WebSocket push stream and subscription commands
//! - `POST /api/subscribe` - Subscribe symbols
//! - `DELETE /api/subscribe/{symbol}` - Unsubscribe one symbol
//! - `GET|POST /api/watchlist`, `DELETE /api/watchlist/{symbol}` - Watchlist
//! - `GET /health` - JSON status
//! - `GET /healthz` - Liveness probe
//! - `GET /metrics` - Prometheus metrics in text format

mod api;
mod health;
mod ws;

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::http::HeaderValue;
use axum::routing::{delete, get, post};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use api::ApiError;
pub use health::HealthResponse;

use crate::application::services::SubscriptionRegistry;
use crate::infrastructure::broadcast::ConnectionHub;
use crate::infrastructure::config::ServerSettings;
use crate::infrastructure::feed::FeedState;
use crate::infrastructure::watchlist::WatchlistStore;

// =============================================================================
// Shared State
// =============================================================================

/// State shared by every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Subscription registry.
    pub registry: Arc<SubscriptionRegistry>,
    /// Live client connections.
    pub hub: Arc<ConnectionHub>,
    /// Upstream session status.
    pub feed: Arc<FeedState>,
    /// Watchlist file store.
    pub watchlist: Arc<WatchlistStore>,
    /// Outgoing queue size per WebSocket client.
    pub client_queue_capacity: usize,
    /// Externally reachable base URL, echoed by `/health`.
    pub public_base_url: Option<String>,
    /// Process start.
    pub started_at: Instant,
}

// =============================================================================
// Router
// =============================================================================

/// Build the application router.
pub fn router(state: AppState, cors_allow_origins: &[String]) -> Router {
    Router::new()
        .route("/ws/quotes", get(ws::ws_quotes))
        .route("/api/subscribe", post(api::subscribe))
        .route("/api/subscribe/{symbol}", delete(api::unsubscribe))
        .route(
            "/api/watchlist",
            get(api::get_watchlist).post(api::add_to_watchlist),
        )
        .route("/api/watchlist/{symbol}", delete(api::remove_from_watchlist))
        .route("/health", get(health::health_handler))
        .route("/healthz", get(health::liveness_handler))
        .route("/metrics", get(health::metrics_handler))
        .layer(cors_layer(cors_allow_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `*` anywhere in the list allows any origin.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.is_empty() || origins.iter().any(|o| o == "*") {
        AllowOrigin::from(Any)
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any)
}

// =============================================================================
// Server
// =============================================================================

/// HTTP server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind.
    #[error("failed to bind to {0}: {1}")]
    BindFailed(String, std::io::Error),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(std::io::Error),
}

/// HTTP server serving [`router`].
#[derive(Debug)]
pub struct HttpServer {
    settings: ServerSettings,
    state: AppState,
    cancel: CancellationToken,
}

impl HttpServer {
    /// Create a new server.
    #[must_use]
    pub const fn new(
        settings: ServerSettings,
        state: AppState,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            settings,
            state,
            cancel,
        }
    }

    /// Bind and serve until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `ServerError` if binding fails or the server stops with an
    /// I/O error.
    pub async fn run(self) -> Result<(), ServerError> {
        let addr = self.settings.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ServerError::BindFailed(addr.clone(), e))?;

        self.serve(listener).await
    }

    /// Serve on an already bound listener until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::ServerFailed` if the server stops with an I/O
    /// error.
    pub async fn serve(self, listener: TcpListener) -> Result<(), ServerError> {
        let app = router(self.state, &self.settings.cors_allow_origins);

        match listener.local_addr() {
            Ok(addr) => tracing::info!(%addr, "HTTP server listening"),
            Err(e) => tracing::warn!(error = %e, "HTTP server listening on unknown address"),
        }

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(ServerError::ServerFailed)?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use tower::ServiceExt;

    use super::*;
    use crate::application::ports::MockFeedAdapter;

    pub(super) fn test_state(feed: MockFeedAdapter, watchlist: &tempfile::TempDir) -> AppState {
        AppState {
            registry: Arc::new(SubscriptionRegistry::new(Arc::new(feed))),
            hub: Arc::new(ConnectionHub::new()),
            feed: Arc::new(FeedState::new()),
            watchlist: Arc::new(WatchlistStore::new(watchlist.path().join("watchlist.json"))),
            client_queue_capacity: 8,
            public_base_url: None,
            started_at: Instant::now(),
        }
    }

    #[tokio::test]
    async fn cors_preflight_allows_listed_origin() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(
            test_state(MockFeedAdapter::new(), &dir),
            &["http://localhost:5173".to_string()],
        );

        let response = app
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri("/api/watchlist")
                    .header(header::ORIGIN, "http://localhost:5173")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://localhost:5173"
        );
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(test_state(MockFeedAdapter::new(), &dir), &[]);

        let response = app
            .oneshot(Request::get("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
