//! Roomgate server binary.
//!
//! Starts an axum HTTP server with structured logging and graceful shutdown
//! on SIGTERM/SIGINT. The current worker is terminated on the way out.

use roomgate_server::{app, config, AppState};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// First CLI argument, then `ROOMGATE_CONFIG_PATH`, then `config.toml`.
/// Blank values count as absent.
fn config_path(arg: Option<String>, env: Option<String>) -> (String, &'static str) {
    let given = |value: &String| !value.trim().is_empty();
    if let Some(path) = arg.filter(given) {
        (path, "cli-arg")
    } else if let Some(path) = env.filter(given) {
        (path, "env-var")
    } else {
        ("config.toml".to_string(), "default")
    }
}

#[tokio::main]
async fn main() {
    // A missing .env file is fine; the environment may already be set.
    let dotenv_path = dotenv::dotenv().ok();

    let (config_path, config_source) = config_path(
        std::env::args().nth(1),
        std::env::var("ROOMGATE_CONFIG_PATH").ok(),
    );
    let config = config::load_config(Some(config_path.as_str()))
        .expect("failed to load configuration; the server cannot start without valid config");

    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        source = config_source,
        path = %config_path,
        dotenv = ?dotenv_path,
        "resolved startup configuration path"
    );

    // Tokens cannot be issued without credentials, but /health and /debug
    // stay up so the problem is visible.
    match config.livekit.validate() {
        Ok(()) => tracing::info!(url = %config.livekit.url, "LiveKit credentials loaded"),
        Err(e) => tracing::error!("{}; /token will fail until this is fixed", e),
    }

    let state = AppState::from_config(&config);
    let supervisor = state.supervisor.clone();

    let app = app(state);
    let addr = SocketAddr::new(config.server.host, config.server.port);

    tracing::info!(%addr, "starting roomgate server");

    let listener = TcpListener::bind(addr)
        .await
        .expect("failed to bind to address; is another process using this port?");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    if let Some(outcome) = supervisor.shutdown().await {
        tracing::info!(outcome = outcome.as_str(), "stopped current worker");
    }

    tracing::info!("roomgate server shut down");
}

/// Resolves on SIGINT, or on SIGTERM where the platform has it.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => tracing::info!("received SIGINT, shutting down"),
                    _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
                }
                return;
            }
            Err(e) => tracing::warn!("SIGTERM handler unavailable, relying on SIGINT: {}", e),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        // Without a signal source the server simply runs until killed.
        tracing::error!("failed to listen for SIGINT: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("received SIGINT, shutting down");
}
