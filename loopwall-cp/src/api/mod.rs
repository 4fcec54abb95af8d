//! REST/SSE API for the control plane
//!
//! Handler modules are grouped by surface: display CRUD, playlist/block
//! store, transport commands, progress queries and maintenance, player
//! synchronization, and the SSE push channel.

pub mod displays;
pub mod playlists;
pub mod progress;
pub mod server;
pub mod sse;
pub mod sync;
pub mod transport;

use axum::{http::StatusCode, Json};
use serde::Serialize;
use tracing::error;

use crate::error::Error;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
}

pub(crate) type ApiError = (StatusCode, Json<StatusResponse>);

/// Map service errors onto HTTP statuses in one place
///
/// Validation (400) and not-found (404) stay distinguishable; everything
/// else is a 500 and gets logged here so handlers don't have to.
pub(crate) fn error_response(err: Error) -> ApiError {
    let code = match &err {
        Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if code == StatusCode::INTERNAL_SERVER_ERROR {
        error!("Request failed: {}", err);
    }
    (code, Json(StatusResponse { status: format!("error: {}", err) }))
}
