//! HTTP server setup and routing
//!
//! Sets up the Axum HTTP server with routes for the admin surface, player
//! synchronization, and SSE.

use crate::error::{Error, Result};
use crate::state::SharedState;
use axum::{
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Serialize;
use sqlx::{Pool, Sqlite};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared application context passed to all handlers
///
/// **Note:** AppContext implements Clone, which gives us `FromRef<AppContext>`
/// for free via Axum's blanket implementation.
#[derive(Clone)]
pub struct AppContext {
    pub state: Arc<SharedState>,
    pub db_pool: Pool<Sqlite>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    module: String,
    version: String,
}

/// GET /health - Health check endpoint
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "control_plane".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Build the application router
pub fn build_router(ctx: AppContext) -> Router {
    Router::new()
        // Health endpoint
        .route("/health", get(health))

        // Display registration and naming
        .route("/displays", post(super::displays::create_display))
        .route("/displays", get(super::displays::list_displays))
        .route("/displays/:display_id", get(super::displays::get_display))
        .route("/displays/:display_id", put(super::displays::rename_display))
        .route("/displays/:display_id", delete(super::displays::delete_display))

        // Playlist and block store
        .route("/displays/:display_id/playlists", post(super::playlists::create_playlist))
        .route("/displays/:display_id/playlists", get(super::playlists::list_playlists))
        .route("/playlists/:playlist_id", get(super::playlists::get_playlist))
        .route("/playlists/:playlist_id", put(super::playlists::rename_playlist))
        .route("/playlists/:playlist_id", delete(super::playlists::delete_playlist))
        .route("/playlists/:playlist_id/activate", post(super::playlists::activate_playlist))
        .route("/playlists/:playlist_id/blocks", post(super::playlists::add_block))
        .route("/blocks/:block_id", put(super::playlists::update_block))
        .route("/blocks/:block_id", delete(super::playlists::remove_block))

        // Transport control
        .route("/displays/:display_id/command", post(super::transport::issue_command))

        // Timeline progress and search preview
        .route("/displays/:display_id/progress", get(super::progress::get_progress))
        .route("/search/preview", get(super::progress::search_preview))

        // Administrative maintenance
        .route("/displays/:display_id/repopulate", post(super::progress::repopulate))
        .route("/displays/:display_id/reset-blocks", post(super::progress::reset_blocks))
        .route("/displays/:display_id/reset-position", post(super::progress::reset_position))
        .route("/displays/:display_id/reset-history", post(super::progress::reset_history))

        // Player synchronization (pull channel)
        .route("/displays/:display_id/sync", post(super::sync::sync_poll))
        .route("/displays/:display_id/finished", post(super::sync::video_finished))

        // SSE event stream (push channel)
        .route("/displays/:display_id/events", get(super::sse::event_stream))

        // Attach application context
        .with_state(ctx)

        // Request tracing and CORS for the admin dashboard
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Run the HTTP API server
pub async fn run(port: u16, state: Arc<SharedState>, db_pool: Pool<Sqlite>) -> Result<()> {
    let ctx = AppContext { state, db_pool };
    let app = build_router(ctx);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Http(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| Error::Http(format!("Server error: {}", e)))?;

    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        }
    }
}
