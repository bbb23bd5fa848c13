//! Roomgate server library logic.
//!
//! Issues LiveKit join tokens over HTTP and keeps one worker process bound
//! to the most recently requested room.

pub mod api;
pub mod config;
pub mod sequence;
pub mod session;

use axum::{http::Method, routing::get, Extension, Router};
use config::Config;
use roomgate_voice::GrantMinter;
use roomgate_worker::WorkerSupervisor;
use sequence::SequenceCounter;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Signs join tokens.
    pub minter: Arc<GrantMinter>,
    /// Source of generated identity and room names.
    pub counter: SequenceCounter,
    /// Owns the current worker process.
    pub supervisor: Arc<WorkerSupervisor>,
    /// Prefix of generated names.
    pub name_prefix: String,
}

impl AppState {
    pub fn from_config(config: &Config) -> Self {
        Self {
            minter: Arc::new(GrantMinter::new(config.livekit.clone())),
            counter: SequenceCounter::new(config.sequence.path.clone(), config.sequence.seed),
            supervisor: Arc::new(WorkerSupervisor::new(config.worker.clone())),
            name_prefix: config.sequence.name_prefix.clone(),
        }
    }
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/token", get(api::token_handler))
        .route("/session", get(api::token_handler))
        .route("/health", get(api::health_handler))
        .route("/debug", get(api::debug_handler))
        .route("/", get(api::debug_handler))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(Any),
        )
        .layer(Extension(Arc::new(state)))
}
