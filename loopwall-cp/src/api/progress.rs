//! Timeline progress queries, search preview, and maintenance endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use loopwall_common::db::models::{EntryStatus, SelectionMode, VideoFormat};
use loopwall_common::events::PlaybackState;

use crate::api::server::AppContext;
use crate::api::{error_response, ApiError, StatusResponse};
use crate::catalog::term::SearchTerm;
use crate::db::videos::CandidateFilter;
use crate::db::{blocks, displays, history, playlists, settings, timeline, videos};
use crate::display::machine;
use crate::error::Error;
use crate::scheduler;

// ============================================================================
// Progress query
// ============================================================================

#[derive(Debug, Serialize)]
pub struct BlockProgress {
    pub guid: Uuid,
    pub search_term: String,
    pub position: i64,
    pub target_count: i64,
    pub selection_mode: SelectionMode,
    pub format: VideoFormat,
    /// Entries materialized for the current loop iteration
    pub materialized: i64,
    /// Entries played in the current loop iteration
    pub played: i64,
    pub times_played: i64,
    /// Degraded-selection visibility: the catalog lacked candidates
    pub underfilled: bool,
}

#[derive(Debug, Serialize)]
pub struct CurrentBlock {
    pub guid: Uuid,
    pub search_term: String,
    /// Videos consumed within the block this loop
    pub consumed: i64,
    pub target: i64,
}

#[derive(Debug, Serialize)]
pub struct NowPlaying {
    pub entry_guid: Uuid,
    pub video_guid: Uuid,
    pub title: String,
    pub url: String,
    pub block_position: i64,
    pub position_seconds: f64,
    pub muted: bool,
}

#[derive(Debug, Serialize)]
pub struct ProgressResponse {
    pub display_guid: Uuid,
    pub state: PlaybackState,
    /// None when the display has no active playlist
    pub playlist_guid: Option<Uuid>,
    pub playlist_name: Option<String>,
    pub loop_count: i64,
    pub absolute_position: Option<i64>,
    pub current_block: Option<CurrentBlock>,
    pub blocks: Vec<BlockProgress>,
    pub now_playing: Option<NowPlaying>,
}

/// GET /displays/:display_id/progress - Rotation progress snapshot
pub async fn get_progress(
    State(ctx): State<AppContext>,
    Path(display_id): Path<Uuid>,
) -> Result<Json<ProgressResponse>, ApiError> {
    let display = displays::get_display(&ctx.db_pool, display_id)
        .await
        .map_err(error_response)?;
    let offline_after = settings::get_offline_after_seconds(&ctx.db_pool)
        .await
        .map_err(error_response)?;
    let state = machine::effective_state(
        display.playback_state,
        display.last_seen_at,
        offline_after,
        Utc::now(),
    );

    let result: Result<ProgressResponse, Error> = async {
        let mut conn = ctx.db_pool.acquire().await?;

        let Some(playlist) = playlists::get_active_playlist(&mut conn, display_id).await? else {
            return Ok(ProgressResponse {
                display_guid: display_id,
                state,
                playlist_guid: None,
                playlist_name: None,
                loop_count: 0,
                absolute_position: None,
                current_block: None,
                blocks: Vec::new(),
                now_playing: None,
            });
        };

        let mut block_rows = Vec::new();
        for block in blocks::blocks_for_playlist(&mut conn, playlist.guid).await? {
            let (materialized, played) =
                timeline::block_loop_counts(&mut conn, block.guid, playlist.loop_count).await?;
            block_rows.push(BlockProgress {
                guid: block.guid,
                search_term: block.search_term,
                position: block.position,
                target_count: block.target_count,
                selection_mode: block.selection_mode,
                format: block.format,
                materialized,
                played,
                times_played: block.times_played,
                underfilled: materialized < block.target_count,
            });
        }

        let mut absolute_position = None;
        let mut current_block = None;
        let mut now_playing = None;
        if let Some(cur) = display.current_entry_guid {
            match timeline::get_entry(&mut conn, cur).await {
                Ok(entry) => {
                    absolute_position = Some(entry.absolute_position);
                    current_block = block_rows
                        .iter()
                        .find(|b| b.guid == entry.block_guid)
                        .map(|b| CurrentBlock {
                            guid: b.guid,
                            search_term: b.search_term.clone(),
                            consumed: b.played,
                            target: b.target_count,
                        });
                    now_playing = Some(NowPlaying {
                        entry_guid: entry.guid,
                        video_guid: entry.video_guid,
                        title: entry.video_title,
                        url: entry.video_url,
                        block_position: entry.block_position,
                        position_seconds: display.position_seconds,
                        muted: display.muted,
                    });
                }
                Err(Error::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        Ok(ProgressResponse {
            display_guid: display_id,
            state,
            playlist_guid: Some(playlist.guid),
            playlist_name: Some(playlist.name),
            loop_count: playlist.loop_count,
            absolute_position,
            current_block,
            blocks: block_rows,
            now_playing,
        })
    }
    .await;

    Ok(Json(result.map_err(error_response)?))
}

// ============================================================================
// Search preview
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct PreviewParams {
    pub term: String,
    pub format: Option<VideoFormat>,
    pub display: Uuid,
}

#[derive(Debug, Serialize)]
pub struct PreviewResponse {
    pub candidates: i64,
    pub already_seen: i64,
}

/// GET /search/preview - Candidate counts for a block definition
///
/// Lets the admin UI validate a block before saving. Mutates nothing.
pub async fn search_preview(
    State(ctx): State<AppContext>,
    Query(params): Query<PreviewParams>,
) -> Result<Json<PreviewResponse>, ApiError> {
    let term = SearchTerm::parse(&params.term);
    if term.include.is_empty() {
        return Err(error_response(Error::InvalidInput(
            "Search term must contain at least one inclusion token".into(),
        )));
    }

    displays::get_display(&ctx.db_pool, params.display)
        .await
        .map_err(error_response)?;

    let result: Result<PreviewResponse, Error> = async {
        let mut conn = ctx.db_pool.acquire().await?;
        let filter = CandidateFilter {
            term: &term,
            format: params.format.unwrap_or(VideoFormat::Mixed),
            display_guid: params.display,
            loop_scope: None,
        };
        let (candidates, already_seen) = videos::preview_counts(&mut conn, &filter).await?;
        Ok(PreviewResponse { candidates, already_seen })
    }
    .await;

    Ok(Json(result.map_err(error_response)?))
}

// ============================================================================
// Maintenance
// ============================================================================

#[derive(Debug, Serialize)]
pub struct RepopulateResponse {
    pub removed: u64,
    pub added: usize,
}

/// POST /displays/:display_id/repopulate - Force a full queued-tail rebuild
pub async fn repopulate(
    State(ctx): State<AppContext>,
    Path(display_id): Path<Uuid>,
) -> Result<Json<RepopulateResponse>, ApiError> {
    displays::get_display(&ctx.db_pool, display_id)
        .await
        .map_err(error_response)?;

    let lock = ctx.state.display_lock(display_id).await;
    let _guard = lock.lock().await;

    let outcome = scheduler::repopulate(&ctx.db_pool, &ctx.state, display_id)
        .await
        .map_err(error_response)?;

    // A previously empty display may have content again
    if outcome.added > 0 {
        let display = displays::get_display(&ctx.db_pool, display_id)
            .await
            .map_err(error_response)?;
        if display.current_entry_guid.is_none() {
            machine::advance(&ctx.db_pool, &ctx.state, display_id)
                .await
                .map_err(error_response)?;
        }
    }

    Ok(Json(RepopulateResponse { removed: outcome.removed, added: outcome.added }))
}

/// POST /displays/:display_id/reset-blocks - Discard play-counter drift
///
/// Resets play counters, recomputes the denormalized totals from the block
/// definitions, and rebuilds the queued tail.
pub async fn reset_blocks(
    State(ctx): State<AppContext>,
    Path(display_id): Path<Uuid>,
) -> Result<Json<StatusResponse>, ApiError> {
    displays::get_display(&ctx.db_pool, display_id)
        .await
        .map_err(error_response)?;

    let lock = ctx.state.display_lock(display_id).await;
    let _guard = lock.lock().await;

    let result: Result<(), Error> = async {
        let mut tx = ctx.db_pool.begin().await?;
        let playlist = playlists::get_active_playlist(&mut tx, display_id)
            .await?
            .ok_or_else(|| {
                Error::InvalidInput(format!("Display {} has no active playlist", display_id))
            })?;
        blocks::reset_play_counters(&mut tx, playlist.guid).await?;
        playlists::refresh_totals(&mut tx, playlist.guid).await?;
        tx.commit().await?;
        Ok(())
    }
    .await;
    result.map_err(error_response)?;

    scheduler::repopulate(&ctx.db_pool, &ctx.state, display_id)
        .await
        .map_err(error_response)?;

    info!("Reset block counters for display {}", display_id);
    Ok(Json(StatusResponse { status: "ok".to_string() }))
}

/// POST /displays/:display_id/reset-position - Restart the rotation
///
/// Leaves the current entry (marking it played, no history record) and
/// re-assigns from the earliest queued entry at position zero.
pub async fn reset_position(
    State(ctx): State<AppContext>,
    Path(display_id): Path<Uuid>,
) -> Result<Json<StatusResponse>, ApiError> {
    let lock = ctx.state.display_lock(display_id).await;
    let _guard = lock.lock().await;

    let result: Result<(), Error> = async {
        let mut tx = ctx.db_pool.begin().await?;
        let display = displays::get_display_tx(&mut tx, display_id).await?;
        if let Some(cur) = display.current_entry_guid {
            match timeline::get_entry(&mut tx, cur).await {
                Ok(entry) if entry.status == EntryStatus::Playing => {
                    timeline::transition_status(&mut tx, &entry, EntryStatus::Played).await?;
                }
                Ok(_) => {}
                Err(Error::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        displays::set_current_entry(&mut tx, display_id, None).await?;
        displays::set_position(&mut tx, display_id, 0.0).await?;
        tx.commit().await?;
        Ok(())
    }
    .await;
    result.map_err(error_response)?;

    machine::advance(&ctx.db_pool, &ctx.state, display_id)
        .await
        .map_err(error_response)?;

    info!("Reset timeline position for display {}", display_id);
    Ok(Json(StatusResponse { status: "ok".to_string() }))
}

#[derive(Debug, Serialize)]
pub struct ResetHistoryResponse {
    pub removed: u64,
}

/// POST /displays/:display_id/reset-history - Explicit history reset
pub async fn reset_history(
    State(ctx): State<AppContext>,
    Path(display_id): Path<Uuid>,
) -> Result<Json<ResetHistoryResponse>, ApiError> {
    displays::get_display(&ctx.db_pool, display_id)
        .await
        .map_err(error_response)?;

    let removed = history::reset_for_display(&ctx.db_pool, display_id)
        .await
        .map_err(error_response)?;

    info!("Reset history for display {}: {} records removed", display_id, removed);
    Ok(Json(ResetHistoryResponse { removed }))
}
