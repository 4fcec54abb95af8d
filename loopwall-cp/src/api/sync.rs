//! Player synchronization (pull channel)
//!
//! The poll exchange is authoritative: both channels read and write the
//! same display row, but a player that missed push messages recovers here.
//! The response carries the drained command log and, when the player's
//! reported entry differs from the control plane's assignment, the assigned
//! entry's snapshot — the display row always wins.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use loopwall_common::db::models::TimelineEntry;
use loopwall_common::events::PlaybackState;

use crate::api::server::AppContext;
use crate::api::{error_response, ApiError};
use crate::db::commands::QueuedCommand;
use crate::db::{displays, settings, timeline};
use crate::display::commands::drain_and_apply;
use crate::display::machine;
use crate::error::Error;

#[derive(Debug, Deserialize)]
pub struct SyncRequest {
    /// Player's believed state ("playing", "paused", ...)
    pub status: Option<String>,
    /// Entry the player believes it is showing
    pub current_entry: Option<Uuid>,
    /// Playback position within that entry
    pub position_seconds: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct Assignment {
    pub entry_guid: Uuid,
    pub video_guid: Uuid,
    pub title: String,
    pub url: String,
    pub width: i64,
    pub height: i64,
    pub duration: Option<f64>,
    pub block_guid: Uuid,
    pub block_position: i64,
    pub loop_iteration: i64,
    /// Resume offset (nonzero after an admin seek)
    pub position_seconds: f64,
}

#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub state: PlaybackState,
    pub muted: bool,
    pub position_seconds: f64,
    pub poll_interval_seconds: i64,
    pub commands: Vec<QueuedCommand>,
    /// Set when the player must switch to a different entry
    pub assignment: Option<Assignment>,
}

#[derive(Debug, Deserialize)]
pub struct FinishedRequest {
    /// Entry the player finished; stale reports are ignored
    pub entry: Option<Uuid>,
    /// False when playback failed (no history record is written)
    #[serde(default = "default_completed")]
    pub completed: bool,
}

fn default_completed() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct FinishedResponse {
    pub advanced: bool,
    pub assignment: Option<Assignment>,
}

pub(crate) fn assignment_from_entry(entry: &TimelineEntry, position_seconds: f64) -> Assignment {
    Assignment {
        entry_guid: entry.guid,
        video_guid: entry.video_guid,
        title: entry.video_title.clone(),
        url: entry.video_url.clone(),
        width: entry.video_width,
        height: entry.video_height,
        duration: entry.video_duration,
        block_guid: entry.block_guid,
        block_position: entry.block_position,
        loop_iteration: entry.loop_iteration,
        position_seconds,
    }
}

/// Snapshot of the display's assigned entry, if any
async fn current_assignment(
    ctx: &AppContext,
    display_id: Uuid,
) -> Result<Option<(Uuid, Assignment)>, Error> {
    let display = displays::get_display(&ctx.db_pool, display_id).await?;
    let Some(cur) = display.current_entry_guid else {
        return Ok(None);
    };

    let mut conn = ctx.db_pool.acquire().await?;
    match timeline::get_entry(&mut conn, cur).await {
        Ok(entry) => Ok(Some((cur, assignment_from_entry(&entry, display.position_seconds)))),
        Err(Error::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// POST /displays/:display_id/sync - Player poll exchange
pub async fn sync_poll(
    State(ctx): State<AppContext>,
    Path(display_id): Path<Uuid>,
    Json(req): Json<SyncRequest>,
) -> Result<Json<SyncResponse>, ApiError> {
    let lock = ctx.state.display_lock(display_id).await;
    let _guard = lock.lock().await;

    let display = displays::get_display(&ctx.db_pool, display_id)
        .await
        .map_err(error_response)?;

    // Heartbeat plus player-reported progress. The position is only
    // trusted while the player is showing what we think it is showing and
    // no admin seek is waiting to be delivered.
    let result: Result<(), Error> = async {
        let mut tx = ctx.db_pool.begin().await?;
        displays::touch_heartbeat(&mut tx, display_id, Utc::now()).await?;
        if display.seek_pending {
            // This response carries the seek target; accept reports again
            // from the next cycle on.
            displays::clear_seek_pending(&mut tx, display_id).await?;
        } else if let (Some(reported), Some(position)) = (req.current_entry, req.position_seconds) {
            if Some(reported) == display.current_entry_guid && position.is_finite() && position >= 0.0
            {
                displays::set_position(&mut tx, display_id, position).await?;
            }
        }
        tx.commit().await?;
        Ok(())
    }
    .await;
    result.map_err(error_response)?;

    if let Some(status) = &req.status {
        debug!("Display {} reports status '{}'", display_id, status);
    }

    // Drain exactly once; the state effects land before the response is
    // computed so the assignment already reflects them.
    let commands = drain_and_apply(&ctx.db_pool, &ctx.state, display_id)
        .await
        .map_err(error_response)?;

    let display = displays::get_display(&ctx.db_pool, display_id)
        .await
        .map_err(error_response)?;
    let assignment = match current_assignment(&ctx, display_id).await.map_err(error_response)? {
        Some((cur, assignment)) if req.current_entry != Some(cur) => {
            if req.current_entry.is_some() {
                warn!(
                    "Display {} reports stale entry {:?}, instructing switch to {}",
                    display_id, req.current_entry, cur
                );
            }
            Some(assignment)
        }
        _ => None,
    };

    let poll_interval_seconds = settings::get_sync_poll_interval(&ctx.db_pool)
        .await
        .map_err(error_response)?;

    Ok(Json(SyncResponse {
        state: display.playback_state,
        muted: display.muted,
        position_seconds: display.position_seconds,
        poll_interval_seconds,
        commands,
        assignment,
    }))
}

/// POST /displays/:display_id/finished - Player-reported completion
///
/// "Video finished" is reported by the player, never commanded by the
/// admin: it marks the current entry played, writes the history record,
/// advances the pointer, and resets the position to zero.
pub async fn video_finished(
    State(ctx): State<AppContext>,
    Path(display_id): Path<Uuid>,
    Json(req): Json<FinishedRequest>,
) -> Result<Json<FinishedResponse>, ApiError> {
    let lock = ctx.state.display_lock(display_id).await;
    let _guard = lock.lock().await;

    let display = displays::get_display(&ctx.db_pool, display_id)
        .await
        .map_err(error_response)?;

    // Stale report: the control plane no longer considers that entry
    // current (e.g. after an admin-issued skip). No mutation; just resync.
    if let (Some(reported), Some(current)) = (req.entry, display.current_entry_guid) {
        if reported != current {
            warn!(
                "Display {} finished stale entry {}, current is {}",
                display_id, reported, current
            );
            let assignment = current_assignment(&ctx, display_id)
                .await
                .map_err(error_response)?
                .map(|(_, a)| a);
            return Ok(Json(FinishedResponse { advanced: false, assignment }));
        }
    }

    let next = machine::finish_current(&ctx.db_pool, &ctx.state, display_id, req.completed)
        .await
        .map_err(error_response)?;

    let assignment = next.as_ref().map(|entry| assignment_from_entry(entry, 0.0));
    Ok(Json(FinishedResponse { advanced: true, assignment }))
}
