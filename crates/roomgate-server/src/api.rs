//! HTTP handlers for the roomgate server.

use crate::session::{create_session, SessionError, SessionRequest, SessionResponse};
use crate::AppState;
use axum::{
    extract::{Extension, Json, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;

/// API error type mapping to HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadRequest(String),
    #[error("internal server error: {0}")]
    InternalServerError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(json!({
            "detail": message
        }));

        (status, body).into_response()
    }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::InvalidInput(msg) => ApiError::BadRequest(msg),
            SessionError::Configuration(msg) => ApiError::InternalServerError(format!(
                "{}. Check LIVEKIT_API_KEY and LIVEKIT_API_SECRET.",
                msg
            )),
            other => ApiError::InternalServerError(other.to_string()),
        }
    }
}

/// Handler for `GET /token` and `GET /session`.
pub async fn token_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(request): Query<SessionRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let response = create_session(&state, request).await?;
    Ok(Json(response))
}

/// Handler for `GET /health`.
pub async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "roomgate",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Handler for `GET /debug` and `GET /`.
///
/// Reports configuration presence, never the secret itself. `worker` is
/// `"busy"` while a session is replacing the worker.
pub async fn debug_handler(Extension(state): Extension<Arc<AppState>>) -> Json<Value> {
    let counter = match state.counter.current().await {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("failed to read sequence counter: {}", e);
            None
        }
    };
    // Never wait behind a bind that is escalating signals.
    let worker = match state.supervisor.try_current() {
        Ok(status) => json!(status),
        Err(_) => json!("busy"),
    };

    Json(json!({
        "status": "running",
        "livekit_url": state.minter.url(),
        "credentials_loaded": state.minter.is_configured(),
        "token_ttl_seconds": state.minter.token_ttl().as_secs(),
        "name_prefix": state.name_prefix,
        "counter": counter,
        "worker": worker,
    }))
}
