//! REST routes for subscriptions and the watchlist.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::AppState;
use crate::application::services::RegistryError;
use crate::domain::subscription::Symbol;
use crate::infrastructure::watchlist::WatchlistError;

// =============================================================================
// Errors
// =============================================================================

/// Error returned by a REST handler, rendered as `{"error": message}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Request is malformed.
    #[error("{0}")]
    BadRequest(String),

    /// Resource does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Upstream feed refused or failed the command.
    #[error("{0}")]
    Upstream(#[from] RegistryError),

    /// Local failure.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = %self, "Request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<WatchlistError> for ApiError {
    fn from(e: WatchlistError) -> Self {
        match e {
            WatchlistError::EmptySymbol => Self::BadRequest(e.to_string()),
            WatchlistError::NotFound(_) => Self::NotFound(e.to_string()),
            WatchlistError::Io(_) | WatchlistError::Json(_) => Self::Internal(e.to_string()),
        }
    }
}

// =============================================================================
// Subscriptions
// =============================================================================

#[derive(Debug, Deserialize)]
pub(super) struct SubscribeRequest {
    #[serde(default)]
    symbols: Vec<Symbol>,
}

#[derive(Debug, Serialize)]
pub(super) struct SubscribedResponse {
    subscribed: Vec<Symbol>,
}

pub(super) async fn subscribe(
    State(state): State<AppState>,
    Json(body): Json<SubscribeRequest>,
) -> Result<Json<SubscribedResponse>, ApiError> {
    if body.symbols.is_empty() {
        return Err(ApiError::BadRequest("symbols must not be empty".to_string()));
    }
    state.registry.subscribe(&body.symbols).await?;
    Ok(Json(SubscribedResponse {
        subscribed: state.registry.current_symbols(),
    }))
}

pub(super) async fn unsubscribe(
    State(state): State<AppState>,
    Path(symbol): Path<Symbol>,
) -> Result<Json<SubscribedResponse>, ApiError> {
    state.registry.unsubscribe(&[symbol]).await?;
    Ok(Json(SubscribedResponse {
        subscribed: state.registry.current_symbols(),
    }))
}

// =============================================================================
// Watchlist
// =============================================================================

#[derive(Debug, Deserialize)]
pub(super) struct WatchlistAddRequest {
    symbol: String,
}

#[derive(Debug, Serialize)]
pub(super) struct WatchlistResponse {
    symbols: Vec<Symbol>,
}

pub(super) async fn get_watchlist(State(state): State<AppState>) -> Json<WatchlistResponse> {
    Json(WatchlistResponse {
        symbols: state.watchlist.list().await,
    })
}

pub(super) async fn add_to_watchlist(
    State(state): State<AppState>,
    Json(body): Json<WatchlistAddRequest>,
) -> Result<Json<WatchlistResponse>, ApiError> {
    let symbols = state.watchlist.add(&body.symbol).await?;
    Ok(Json(WatchlistResponse { symbols }))
}

pub(super) async fn remove_from_watchlist(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<WatchlistResponse>, ApiError> {
    let symbols = state.watchlist.remove(&symbol).await?;
    Ok(Json(WatchlistResponse { symbols }))
}
