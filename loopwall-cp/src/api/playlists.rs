//! Playlist and block store endpoints
//!
//! Mutations that touch the active playlist trigger timeline repair: the
//! materializer rebuilds the queued tail so edits take effect on the next
//! video without disturbing entries already playing or played.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use loopwall_common::db::models::{Block, Playlist};
use loopwall_common::events::LoopwallEvent;

use crate::api::server::AppContext;
use crate::api::{error_response, ApiError};
use crate::db::blocks::{self, BlockDefinition};
use crate::db::{displays, playlists, timeline};
use crate::display::machine;
use crate::error::Error;
use crate::scheduler;

#[derive(Debug, Deserialize)]
pub struct CreatePlaylistRequest {
    name: String,
    #[serde(default)]
    blocks: Vec<BlockDefinition>,
}

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    name: String,
}

#[derive(Debug, Deserialize)]
pub struct AddBlockRequest {
    #[serde(flatten)]
    definition: BlockDefinition,
    /// Ordinal to insert at; appended when omitted
    position: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct PlaylistWithBlocks {
    #[serde(flatten)]
    playlist: Playlist,
    blocks: Vec<Block>,
}

#[derive(Debug, Serialize)]
pub struct PlaylistListResponse {
    playlists: Vec<Playlist>,
}

async fn playlist_with_blocks(
    ctx: &AppContext,
    playlist: Playlist,
) -> Result<PlaylistWithBlocks, Error> {
    let mut conn = ctx.db_pool.acquire().await.map_err(Error::from)?;
    let blocks = blocks::blocks_for_playlist(&mut conn, playlist.guid).await?;
    Ok(PlaylistWithBlocks { playlist, blocks })
}

/// POST /displays/:display_id/playlists - Create a playlist with blocks
pub async fn create_playlist(
    State(ctx): State<AppContext>,
    Path(display_id): Path<Uuid>,
    Json(req): Json<CreatePlaylistRequest>,
) -> Result<(StatusCode, Json<PlaylistWithBlocks>), ApiError> {
    let (playlist, created_blocks) =
        playlists::create_playlist_with_blocks(&ctx.db_pool, display_id, &req.name, &req.blocks)
            .await
            .map_err(error_response)?;

    info!(
        "Created playlist '{}' ({}) with {} blocks for display {}",
        playlist.name,
        playlist.guid,
        created_blocks.len(),
        display_id
    );
    Ok((
        StatusCode::CREATED,
        Json(PlaylistWithBlocks { playlist, blocks: created_blocks }),
    ))
}

/// GET /displays/:display_id/playlists - List a display's playlists
pub async fn list_playlists(
    State(ctx): State<AppContext>,
    Path(display_id): Path<Uuid>,
) -> Result<Json<PlaylistListResponse>, ApiError> {
    // 404 for unknown displays rather than an empty list
    displays::get_display(&ctx.db_pool, display_id)
        .await
        .map_err(error_response)?;

    let playlists = playlists::list_playlists(&ctx.db_pool, display_id)
        .await
        .map_err(error_response)?;
    Ok(Json(PlaylistListResponse { playlists }))
}

/// GET /playlists/:playlist_id - Fetch a playlist with its blocks
pub async fn get_playlist(
    State(ctx): State<AppContext>,
    Path(playlist_id): Path<Uuid>,
) -> Result<Json<PlaylistWithBlocks>, ApiError> {
    let playlist = playlists::get_playlist(&ctx.db_pool, playlist_id)
        .await
        .map_err(error_response)?;
    let response = playlist_with_blocks(&ctx, playlist).await.map_err(error_response)?;
    Ok(Json(response))
}

/// PUT /playlists/:playlist_id - Rename a playlist
pub async fn rename_playlist(
    State(ctx): State<AppContext>,
    Path(playlist_id): Path<Uuid>,
    Json(req): Json<RenameRequest>,
) -> Result<StatusCode, ApiError> {
    playlists::rename_playlist(&ctx.db_pool, playlist_id, &req.name)
        .await
        .map_err(error_response)?;
    Ok(StatusCode::OK)
}

/// DELETE /playlists/:playlist_id - Delete a playlist
pub async fn delete_playlist(
    State(ctx): State<AppContext>,
    Path(playlist_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let playlist = playlists::get_playlist(&ctx.db_pool, playlist_id)
        .await
        .map_err(error_response)?;

    let lock = ctx.state.display_lock(playlist.display_guid).await;
    let _guard = lock.lock().await;

    if playlist.is_active {
        // Deactivation aborts any in-flight materialization
        ctx.state.bump_generation(playlist.display_guid).await;
    }

    playlists::delete_playlist(&ctx.db_pool, playlist_id)
        .await
        .map_err(error_response)?;

    info!("Deleted playlist {} from display {}", playlist_id, playlist.display_guid);
    Ok(StatusCode::NO_CONTENT)
}

/// POST /playlists/:playlist_id/activate - Make a playlist active
///
/// Exclusive per display: clears the flag on every other playlist in the
/// same transaction, then materializes the current loop and hands the
/// display its first assignment if it was showing something else.
pub async fn activate_playlist(
    State(ctx): State<AppContext>,
    Path(playlist_id): Path<Uuid>,
) -> Result<Json<PlaylistWithBlocks>, ApiError> {
    let playlist = playlists::get_playlist(&ctx.db_pool, playlist_id)
        .await
        .map_err(error_response)?;
    let display_id = playlist.display_guid;

    let lock = ctx.state.display_lock(display_id).await;
    let _guard = lock.lock().await;

    // Invalidate materialization runs started for the previous playlist
    ctx.state.bump_generation(display_id).await;

    let result: Result<(), Error> = async {
        let mut tx = ctx.db_pool.begin().await.map_err(Error::from)?;
        playlists::activate_exclusive(&mut tx, &playlist).await?;
        timeline::delete_queued_for_other_playlists(&mut tx, display_id, playlist.guid).await?;
        tx.commit().await.map_err(Error::from)?;
        Ok(())
    }
    .await;
    result.map_err(error_response)?;

    info!("Activated playlist {} on display {}", playlist_id, display_id);
    ctx.state.broadcast_event(LoopwallEvent::PlaylistActivated {
        display_id,
        playlist_id,
        timestamp: Utc::now(),
    });

    scheduler::materialize_loop(
        &ctx.db_pool,
        &ctx.state,
        display_id,
        playlist.guid,
        playlist.loop_count,
    )
    .await
    .map_err(error_response)?;

    // Switch the display onto the new rotation unless it is already there
    let display = displays::get_display(&ctx.db_pool, display_id)
        .await
        .map_err(error_response)?;
    let needs_switch = match display.current_entry_guid {
        None => true,
        Some(cur) => {
            let mut conn = ctx.db_pool.acquire().await.map_err(|e| error_response(e.into()))?;
            match timeline::get_entry(&mut conn, cur).await {
                Ok(entry) => entry.playlist_guid != playlist.guid,
                Err(Error::NotFound(_)) => true,
                Err(e) => return Err(error_response(e)),
            }
        }
    };
    if needs_switch {
        machine::finish_current(&ctx.db_pool, &ctx.state, display_id, false)
            .await
            .map_err(error_response)?;
    }

    let refreshed = playlists::get_playlist(&ctx.db_pool, playlist_id)
        .await
        .map_err(error_response)?;
    let response = playlist_with_blocks(&ctx, refreshed).await.map_err(error_response)?;
    Ok(Json(response))
}

/// Repair the active timeline after a block edit
async fn repair_if_active(ctx: &AppContext, playlist: &Playlist) -> Result<(), Error> {
    if !playlist.is_active {
        return Ok(());
    }
    let outcome = scheduler::repopulate(&ctx.db_pool, &ctx.state, playlist.display_guid).await?;

    // An idle display may have content again after the refill
    if outcome.added > 0 {
        let display = displays::get_display(&ctx.db_pool, playlist.display_guid).await?;
        if display.current_entry_guid.is_none() {
            machine::advance(&ctx.db_pool, &ctx.state, playlist.display_guid).await?;
        }
    }
    Ok(())
}

/// POST /playlists/:playlist_id/blocks - Insert a block
pub async fn add_block(
    State(ctx): State<AppContext>,
    Path(playlist_id): Path<Uuid>,
    Json(req): Json<AddBlockRequest>,
) -> Result<(StatusCode, Json<Block>), ApiError> {
    let playlist = playlists::get_playlist(&ctx.db_pool, playlist_id)
        .await
        .map_err(error_response)?;

    let lock = ctx.state.display_lock(playlist.display_guid).await;
    let _guard = lock.lock().await;

    let block = blocks::insert_block(&ctx.db_pool, playlist_id, &req.definition, req.position)
        .await
        .map_err(error_response)?;

    info!(
        "Added block '{}' at position {} to playlist {}",
        block.search_term, block.position, playlist_id
    );
    repair_if_active(&ctx, &playlist).await.map_err(error_response)?;

    Ok((StatusCode::CREATED, Json(block)))
}

/// PUT /blocks/:block_id - Update a block definition
pub async fn update_block(
    State(ctx): State<AppContext>,
    Path(block_id): Path<Uuid>,
    Json(def): Json<BlockDefinition>,
) -> Result<Json<Block>, ApiError> {
    let existing = blocks::get_block(&ctx.db_pool, block_id)
        .await
        .map_err(error_response)?;
    let playlist = playlists::get_playlist(&ctx.db_pool, existing.playlist_guid)
        .await
        .map_err(error_response)?;

    let lock = ctx.state.display_lock(playlist.display_guid).await;
    let _guard = lock.lock().await;

    let block = blocks::update_block(&ctx.db_pool, block_id, &def)
        .await
        .map_err(error_response)?;

    info!("Updated block {} in playlist {}", block_id, playlist.guid);
    repair_if_active(&ctx, &playlist).await.map_err(error_response)?;

    Ok(Json(block))
}

/// DELETE /blocks/:block_id - Remove a block
pub async fn remove_block(
    State(ctx): State<AppContext>,
    Path(block_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let existing = blocks::get_block(&ctx.db_pool, block_id)
        .await
        .map_err(error_response)?;
    let playlist = playlists::get_playlist(&ctx.db_pool, existing.playlist_guid)
        .await
        .map_err(error_response)?;

    let lock = ctx.state.display_lock(playlist.display_guid).await;
    let _guard = lock.lock().await;

    blocks::remove_block(&ctx.db_pool, block_id)
        .await
        .map_err(error_response)?;

    info!("Removed block {} from playlist {}", block_id, playlist.guid);
    repair_if_active(&ctx, &playlist).await.map_err(error_response)?;

    Ok(StatusCode::NO_CONTENT)
}
