//! HTTP boundary for Tiki.
//!
//! Exposes upload-and-enrich, result lookup, field edits, finalization and a
//! health check as a JSON API on top of [`tiki_core::Pipeline`].

pub mod errors;
pub mod handlers;
pub mod state;
pub mod upload;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tiki_shared::{AppConfig, Result, TikiError};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

pub use state::AppState;

/// Largest accepted upload body.
const MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

/// Creates the Axum router with all the application routes.
pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health/", get(handlers::health))
        .route(
            "/api/enrich/",
            post(handlers::enrich).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/api/result/{id}/", get(handlers::result))
        .route("/api/result/{id}/edit/", post(handlers::edit_field))
        .route("/api/result/{id}/finalize/", post(handlers::finalize))
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
}

/// Serve the API on an already-bound listener until the process exits.
pub async fn run(listener: TcpListener, app_state: AppState) -> Result<()> {
    let addr = listener
        .local_addr()
        .map_err(|e| TikiError::Network(format!("listener has no local address: {e}")))?;
    info!(%addr, "listening");

    axum::serve(listener, create_router(app_state))
        .await
        .map_err(|e| TikiError::Network(format!("server error: {e}")))
}

/// Build state from `config`, bind `[server] bind` and serve.
pub async fn serve(config: &AppConfig) -> Result<()> {
    let app_state = AppState::from_config(config).await?;
    let listener = TcpListener::bind(&config.server.bind)
        .await
        .map_err(|e| TikiError::Network(format!("could not bind {}: {e}", config.server.bind)))?;
    run(listener, app_state).await
}
