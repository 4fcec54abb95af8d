//! Display registration and naming endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use loopwall_common::db::models::Display;
use loopwall_common::events::PlaybackState;

use crate::api::server::AppContext;
use crate::api::{error_response, ApiError};
use crate::db::{displays, settings};
use crate::display::machine;

#[derive(Debug, Deserialize)]
pub struct DisplayRequest {
    name: String,
}

#[derive(Debug, Serialize)]
pub struct DisplayInfo {
    guid: Uuid,
    name: String,
    /// Effective state; reads `offline` when the heartbeat is stale
    state: PlaybackState,
    current_entry_guid: Option<Uuid>,
    position_seconds: f64,
    muted: bool,
    last_seen_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct DisplayListResponse {
    displays: Vec<DisplayInfo>,
}

fn display_info(display: Display, offline_after: i64, now: DateTime<Utc>) -> DisplayInfo {
    let state = machine::effective_state(
        display.playback_state,
        display.last_seen_at,
        offline_after,
        now,
    );
    DisplayInfo {
        guid: display.guid,
        name: display.name,
        state,
        current_entry_guid: display.current_entry_guid,
        position_seconds: display.position_seconds,
        muted: display.muted,
        last_seen_at: display.last_seen_at,
        created_at: display.created_at,
    }
}

/// POST /displays - Register a new display
pub async fn create_display(
    State(ctx): State<AppContext>,
    Json(req): Json<DisplayRequest>,
) -> Result<(StatusCode, Json<DisplayInfo>), ApiError> {
    let created = displays::create_display(&ctx.db_pool, &req.name)
        .await
        .map_err(error_response)?;

    info!("Registered display '{}' ({})", created.name, created.guid);
    let offline_after = settings::get_offline_after_seconds(&ctx.db_pool)
        .await
        .map_err(error_response)?;
    Ok((
        StatusCode::CREATED,
        Json(display_info(created, offline_after, Utc::now())),
    ))
}

/// GET /displays - List registered displays
pub async fn list_displays(
    State(ctx): State<AppContext>,
) -> Result<Json<DisplayListResponse>, ApiError> {
    let offline_after = settings::get_offline_after_seconds(&ctx.db_pool)
        .await
        .map_err(error_response)?;
    let now = Utc::now();

    let displays = displays::list_displays(&ctx.db_pool)
        .await
        .map_err(error_response)?
        .into_iter()
        .map(|d| display_info(d, offline_after, now))
        .collect();

    Ok(Json(DisplayListResponse { displays }))
}

/// GET /displays/:display_id - Fetch one display
pub async fn get_display(
    State(ctx): State<AppContext>,
    Path(display_id): Path<Uuid>,
) -> Result<Json<DisplayInfo>, ApiError> {
    let display = displays::get_display(&ctx.db_pool, display_id)
        .await
        .map_err(error_response)?;
    let offline_after = settings::get_offline_after_seconds(&ctx.db_pool)
        .await
        .map_err(error_response)?;

    Ok(Json(display_info(display, offline_after, Utc::now())))
}

/// PUT /displays/:display_id - Rename a display
pub async fn rename_display(
    State(ctx): State<AppContext>,
    Path(display_id): Path<Uuid>,
    Json(req): Json<DisplayRequest>,
) -> Result<StatusCode, ApiError> {
    displays::rename_display(&ctx.db_pool, display_id, &req.name)
        .await
        .map_err(error_response)?;

    info!("Renamed display {} to '{}'", display_id, req.name);
    Ok(StatusCode::OK)
}

/// DELETE /displays/:display_id - Remove a display
///
/// Cascades to playlists, blocks, timeline entries, history, and commands.
pub async fn delete_display(
    State(ctx): State<AppContext>,
    Path(display_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let lock = ctx.state.display_lock(display_id).await;
    let _guard = lock.lock().await;

    // Invalidate any in-flight materialization before the rows disappear
    ctx.state.bump_generation(display_id).await;

    displays::delete_display(&ctx.db_pool, display_id)
        .await
        .map_err(error_response)?;
    ctx.state.forget_display(display_id).await;

    info!("Deleted display {}", display_id);
    Ok(StatusCode::NO_CONTENT)
}
