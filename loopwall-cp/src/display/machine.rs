//! Playback progression
//!
//! Advancement, loop wraparound, and the state effects of the discrete
//! commands. All functions here assume the caller holds the display's
//! advisory lock; mutations run in short display-scoped transactions.

use chrono::{DateTime, Utc};
use sqlx::{Pool, Sqlite};
use tracing::{debug, info, warn};
use uuid::Uuid;

use loopwall_common::db::models::{EntryStatus, TimelineEntry};
use loopwall_common::events::{LoopwallEvent, PlaybackState};

use crate::db::{displays, history, playlists, timeline};
use crate::error::{Error, Result};
use crate::scheduler;
use crate::state::SharedState;

/// Effective state as reported to clients
///
/// A display whose heartbeat is older than the staleness threshold reads as
/// offline regardless of its persisted state.
pub fn effective_state(
    stored: PlaybackState,
    last_seen_at: Option<DateTime<Utc>>,
    offline_after_seconds: i64,
    now: DateTime<Utc>,
) -> PlaybackState {
    match last_seen_at {
        Some(seen) if (now - seen).num_seconds() <= offline_after_seconds => stored,
        _ => PlaybackState::Offline,
    }
}

/// Advance the display to the next queued entry in absolute order
///
/// Wraps the loop when the queue is dry: increments the playlist loop
/// counter, materializes the next iteration, and retries once. A timeline
/// that stays empty parks the display in `idle` ("no content") rather than
/// erroring.
pub async fn advance(
    db: &Pool<Sqlite>,
    state: &SharedState,
    display_guid: Uuid,
) -> Result<Option<TimelineEntry>> {
    let after = current_position(db, display_guid).await?;

    if let Some(entry) = assign_next(db, state, display_guid, after).await? {
        return Ok(Some(entry));
    }

    // Queue is dry: wrap the loop if the active playlist ever produced
    // entries, otherwise there is simply no content.
    let mut conn = db.acquire().await?;
    let playlist = playlists::get_active_playlist(&mut conn, display_guid).await?;
    drop(conn);

    if let Some(playlist) = playlist {
        let has_entries: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM timeline_entries WHERE playlist_guid = ?)",
        )
        .bind(playlist.guid.to_string())
        .fetch_one(db)
        .await?;

        if has_entries {
            let mut tx = db.begin().await?;
            let loop_count = playlists::increment_loop_count(&mut tx, playlist.guid).await?;
            tx.commit().await?;

            info!(
                "Display {} completed loop {} of playlist {}",
                display_guid, loop_count, playlist.guid
            );
            state.broadcast_event(LoopwallEvent::LoopCompleted {
                display_id: display_guid,
                playlist_id: playlist.guid,
                loop_count,
                timestamp: Utc::now(),
            });

            scheduler::materialize_loop(db, state, display_guid, playlist.guid, loop_count).await?;

            if let Some(entry) = assign_next(db, state, display_guid, after).await? {
                return Ok(Some(entry));
            }
        }
    }

    go_idle(db, state, display_guid).await?;
    Ok(None)
}

/// Absolute position of the display's current entry, if any
async fn current_position(db: &Pool<Sqlite>, display_guid: Uuid) -> Result<Option<i64>> {
    let mut conn = db.acquire().await?;
    let display = displays::get_display_tx(&mut conn, display_guid).await?;

    match display.current_entry_guid {
        Some(guid) => match timeline::get_entry(&mut conn, guid).await {
            Ok(entry) => Ok(Some(entry.absolute_position)),
            // Entry vanished with its playlist; restart from the head
            Err(Error::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        },
        None => Ok(None),
    }
}

/// Assign the first queued entry after `after`, if one exists
async fn assign_next(
    db: &Pool<Sqlite>,
    state: &SharedState,
    display_guid: Uuid,
    after: Option<i64>,
) -> Result<Option<TimelineEntry>> {
    let mut tx = db.begin().await?;
    let display = displays::get_display_tx(&mut tx, display_guid).await?;

    let Some(entry) = timeline::next_queued_after(&mut tx, display_guid, after).await? else {
        return Ok(None);
    };

    timeline::transition_status(&mut tx, &entry, EntryStatus::Playing).await?;
    displays::set_current_entry(&mut tx, display_guid, Some(entry.guid)).await?;
    displays::set_position(&mut tx, display_guid, 0.0).await?;

    // Idle displays start playing on assignment; a paused display stays
    // paused and picks the entry up when resumed.
    let new_state = match display.playback_state {
        PlaybackState::Paused => PlaybackState::Paused,
        _ => PlaybackState::Playing,
    };
    if new_state != display.playback_state {
        displays::set_playback_state(&mut tx, display_guid, new_state).await?;
    }
    tx.commit().await?;

    state.broadcast_event(LoopwallEvent::NowPlayingChanged {
        display_id: display_guid,
        entry_id: Some(entry.guid),
        video_id: Some(entry.video_guid),
        title: Some(entry.video_title.clone()),
        timestamp: Utc::now(),
    });
    if new_state != display.playback_state {
        state.broadcast_event(LoopwallEvent::PlaybackStateChanged {
            display_id: display_guid,
            old_state: display.playback_state,
            new_state,
            timestamp: Utc::now(),
        });
    }

    let mut entry = entry;
    entry.status = EntryStatus::Playing;
    Ok(Some(entry))
}

/// Park the display with no content assigned
async fn go_idle(db: &Pool<Sqlite>, state: &SharedState, display_guid: Uuid) -> Result<()> {
    let mut tx = db.begin().await?;
    let display = displays::get_display_tx(&mut tx, display_guid).await?;

    displays::set_current_entry(&mut tx, display_guid, None).await?;
    displays::set_position(&mut tx, display_guid, 0.0).await?;
    if display.playback_state != PlaybackState::Idle {
        displays::set_playback_state(&mut tx, display_guid, PlaybackState::Idle).await?;
    }
    tx.commit().await?;

    warn!("Display {} has no content to play", display_guid);
    state.broadcast_event(LoopwallEvent::TimelineEmpty {
        display_id: display_guid,
        timestamp: Utc::now(),
    });
    if display.playback_state != PlaybackState::Idle {
        state.broadcast_event(LoopwallEvent::PlaybackStateChanged {
            display_id: display_guid,
            old_state: display.playback_state,
            new_state: PlaybackState::Idle,
            timestamp: Utc::now(),
        });
    }
    if display.current_entry_guid.is_some() {
        state.broadcast_event(LoopwallEvent::NowPlayingChanged {
            display_id: display_guid,
            entry_id: None,
            video_id: None,
            title: None,
            timestamp: Utc::now(),
        });
    }
    Ok(())
}

/// Player-reported completion of the current entry
///
/// Marks the entry `played`, appends a history record (unless the player
/// reports a failed playback), advances the current-entry pointer, and
/// resets the position to zero. Returns the next assignment, if any.
pub async fn finish_current(
    db: &Pool<Sqlite>,
    state: &SharedState,
    display_guid: Uuid,
    completed: bool,
) -> Result<Option<TimelineEntry>> {
    let mut tx = db.begin().await?;
    let display = displays::get_display_tx(&mut tx, display_guid).await?;

    if let Some(cur_guid) = display.current_entry_guid {
        match timeline::get_entry(&mut tx, cur_guid).await {
            Ok(entry) => {
                finish_entry(&mut tx, &entry, completed).await?;
            }
            Err(Error::NotFound(_)) => {
                debug!("Current entry {} vanished before completion", cur_guid);
            }
            Err(e) => return Err(e),
        }
    }
    tx.commit().await?;

    advance(db, state, display_guid).await
}

/// Terminal bookkeeping for an entry the display is leaving
///
/// `completed` controls the history write: a video the player failed to
/// render was not shown, so it must not poison future selection beyond its
/// timeline exclusion.
async fn finish_entry(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    entry: &TimelineEntry,
    completed: bool,
) -> Result<()> {
    match entry.status {
        EntryStatus::Playing => {
            timeline::transition_status(&mut *tx, entry, EntryStatus::Played).await?;
        }
        EntryStatus::Queued => {
            // Finished without ever being started through the normal path
            if completed {
                timeline::transition_status(&mut *tx, entry, EntryStatus::Playing).await?;
                let mut playing = entry.clone();
                playing.status = EntryStatus::Playing;
                timeline::transition_status(&mut *tx, &playing, EntryStatus::Played).await?;
            } else {
                timeline::transition_status(&mut *tx, entry, EntryStatus::Skipped).await?;
            }
        }
        // Replays of already-terminal entries keep their status
        EntryStatus::Played | EntryStatus::Skipped => {}
    }

    if completed {
        history::insert_record(
            &mut *tx,
            entry.display_guid,
            entry.video_guid,
            Some(entry.block_guid),
            entry.loop_iteration,
        )
        .await?;
    }
    Ok(())
}

/// Apply a drained `next` command: leave the current entry and move on
///
/// Admin skips do not historize the interrupted video; its timeline row
/// keeps it out of lifetime-scoped selection either way.
pub async fn skip_next(
    db: &Pool<Sqlite>,
    state: &SharedState,
    display_guid: Uuid,
) -> Result<Option<TimelineEntry>> {
    finish_current(db, state, display_guid, false).await
}

/// Apply a drained `previous` command: replay the last shown entry
///
/// Statuses are monotonic, so a replay re-points the display at the
/// terminal entry without touching its status. Consecutive `previous`
/// commands walk further back.
pub async fn skip_previous(
    db: &Pool<Sqlite>,
    state: &SharedState,
    display_guid: Uuid,
) -> Result<Option<TimelineEntry>> {
    let mut tx = db.begin().await?;
    let display = displays::get_display_tx(&mut tx, display_guid).await?;

    let Some(cur_guid) = display.current_entry_guid else {
        // Nothing to go back from
        return Ok(None);
    };

    let current = timeline::get_entry(&mut tx, cur_guid).await?;
    if current.status == EntryStatus::Playing {
        timeline::transition_status(&mut *tx, &current, EntryStatus::Played).await?;
    }

    let target =
        timeline::latest_terminal_before(&mut tx, display_guid, current.absolute_position).await?;

    let result = match target {
        Some(prev) => {
            displays::set_current_entry(&mut tx, display_guid, Some(prev.guid)).await?;
            displays::set_position(&mut tx, display_guid, 0.0).await?;
            Some(prev)
        }
        None => {
            // No earlier entry: restart the current one from the top
            displays::set_position(&mut tx, display_guid, 0.0).await?;
            Some(current)
        }
    };
    tx.commit().await?;

    if let Some(ref entry) = result {
        state.broadcast_event(LoopwallEvent::NowPlayingChanged {
            display_id: display_guid,
            entry_id: Some(entry.guid),
            video_id: Some(entry.video_guid),
            title: Some(entry.video_title.clone()),
            timestamp: Utc::now(),
        });
    }
    Ok(result)
}

/// Apply a drained `playVideo` command: jump straight to a timeline entry
///
/// Queued entries between the old and new position are marked skipped so
/// they neither play later nor linger for repopulation to resurrect.
pub async fn play_entry(
    db: &Pool<Sqlite>,
    state: &SharedState,
    display_guid: Uuid,
    entry_guid: Uuid,
) -> Result<TimelineEntry> {
    let mut tx = db.begin().await?;
    let display = displays::get_display_tx(&mut tx, display_guid).await?;

    let target = timeline::get_entry(&mut tx, entry_guid).await?;
    if target.display_guid != display_guid {
        return Err(Error::InvalidInput(format!(
            "Timeline entry {} belongs to another display",
            entry_guid
        )));
    }

    if let Some(cur_guid) = display.current_entry_guid {
        if cur_guid != target.guid {
            match timeline::get_entry(&mut tx, cur_guid).await {
                Ok(current) if current.status == EntryStatus::Playing => {
                    timeline::transition_status(&mut *tx, &current, EntryStatus::Played).await?;
                }
                Ok(_) => {}
                Err(Error::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
    }

    let mut assigned = target.clone();
    if target.status == EntryStatus::Queued {
        timeline::skip_queued_before(&mut tx, display_guid, target.absolute_position).await?;
        timeline::transition_status(&mut *tx, &target, EntryStatus::Playing).await?;
        assigned.status = EntryStatus::Playing;
    }

    displays::set_current_entry(&mut tx, display_guid, Some(target.guid)).await?;
    displays::set_position(&mut tx, display_guid, 0.0).await?;
    if display.playback_state == PlaybackState::Idle {
        displays::set_playback_state(&mut tx, display_guid, PlaybackState::Playing).await?;
    }
    tx.commit().await?;

    state.broadcast_event(LoopwallEvent::NowPlayingChanged {
        display_id: display_guid,
        entry_id: Some(assigned.guid),
        video_id: Some(assigned.video_guid),
        title: Some(assigned.video_title.clone()),
        timestamp: Utc::now(),
    });
    if display.playback_state == PlaybackState::Idle {
        state.broadcast_event(LoopwallEvent::PlaybackStateChanged {
            display_id: display_guid,
            old_state: PlaybackState::Idle,
            new_state: PlaybackState::Playing,
            timestamp: Utc::now(),
        });
    }
    Ok(assigned)
}
