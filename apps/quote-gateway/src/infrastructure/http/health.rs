//! Health, liveness and metrics handlers.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;

use super::AppState;
use crate::domain::subscription::Symbol;
use crate::infrastructure::feed::FeedStatus;
use crate::infrastructure::metrics::get_metrics_handle;

/// `/health` body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the process serves requests.
    pub status: &'static str,
    /// Gateway version.
    pub version: &'static str,
    /// Seconds since start.
    pub uptime_secs: u64,
    /// Subscribed symbols, sorted.
    pub subscribed: Vec<Symbol>,
    /// Connected WebSocket clients.
    pub ws_clients: usize,
    /// Upstream session status.
    pub feed: FeedStatus,
    /// Externally reachable base URL, when configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_base_url: Option<String>,
}

pub(super) async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started_at.elapsed().as_secs(),
        subscribed: state.registry.current_symbols(),
        ws_clients: state.hub.connection_count(),
        feed: state.feed.status(),
        public_base_url: state.public_base_url.clone(),
    })
}

pub(super) async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

pub(super) async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                handle.render(),
            )
        },
    )
}

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::super::router;
    use super::super::tests::test_state;
    use super::*;
    use crate::application::ports::MockFeedAdapter;

    #[tokio::test]
    async fn health_reports_state() {
        let dir = tempfile::tempdir().unwrap();
        let mut feed = MockFeedAdapter::new();
        feed.expect_subscribe_channels().returning(|_, _| Ok(()));
        feed.expect_subscribe_candles().returning(|_, _| Ok(()));
        let mut state = test_state(feed, &dir);
        state.public_base_url = Some("https://quotes.example.com".to_string());
        state.registry.subscribe(&["AAA.US".to_string()]).await.unwrap();
        state.feed.mark_connected();
        let app = router(state, &[]);

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["subscribed"], json!(["AAA.US"]));
        assert_eq!(body["ws_clients"], 0);
        assert_eq!(body["feed"]["connected"], true);
        assert_eq!(body["public_base_url"], "https://quotes.example.com");
    }

    #[tokio::test]
    async fn health_omits_unset_base_url() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(test_state(MockFeedAdapter::new(), &dir), &[]);

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert!(body.get("public_base_url").is_none());
        assert_eq!(body["feed"]["connected"], false);
    }

    #[tokio::test]
    async fn liveness_is_plain_ok() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(test_state(MockFeedAdapter::new(), &dir), &[]);

        let response = app
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"OK");
    }
}
