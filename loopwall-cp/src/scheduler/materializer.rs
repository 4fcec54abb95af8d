//! Materialize-from-offset
//!
//! One loop iteration at a time: for each block in ordinal order, run the
//! selection engine and append one queued entry per returned video, tagged
//! with block id, block-relative position, absolute timeline position, and
//! loop-iteration number. The whole batch plus the block play counters
//! commit in a single transaction.
//!
//! Selection runs on the materializer's own transaction, so entries
//! appended for earlier blocks of the same run are already visible to later
//! blocks' exclusion subqueries.

use chrono::Utc;
use sqlx::{Pool, Sqlite, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

use loopwall_common::events::LoopwallEvent;

use crate::catalog::selection::{self, SelectionRequest};
use crate::catalog::term::SearchTerm;
use crate::db::settings::{self, HistoryScope};
use crate::db::{blocks, playlists, timeline};
use crate::error::{Error, Result};
use crate::state::SharedState;

/// Result of a materialization run
#[derive(Debug, Clone, Copy)]
pub struct MaterializeOutcome {
    pub created: usize,
    /// True when a generation bump invalidated the run and the batch was
    /// discarded instead of committed
    pub superseded: bool,
}

/// Result of a repopulation run
#[derive(Debug, Clone, Copy)]
pub struct RepopulateOutcome {
    pub removed: u64,
    pub added: usize,
    pub superseded: bool,
}

/// Fill one loop iteration up to every block's target count
///
/// Counts what each block already owns in the iteration and tops up the
/// gap, so the same routine serves fresh loops, reactivations, and
/// post-repopulation refills. Returns the number of entries appended.
async fn fill_loop(
    tx: &mut Transaction<'_, Sqlite>,
    display_guid: Uuid,
    playlist_guid: Uuid,
    loop_iteration: i64,
    loop_scope: Option<i64>,
    bump_counters: bool,
) -> Result<usize> {
    let block_list = blocks::blocks_for_playlist(&mut *tx, playlist_guid).await?;
    let mut next_abs = timeline::next_absolute_position(&mut *tx, display_guid).await?;
    let now = Utc::now();
    let mut created = 0usize;

    for block in &block_list {
        let existing = timeline::count_for_block_in_loop(&mut *tx, block.guid, loop_iteration).await?;
        let need = block.target_count - existing;
        if need <= 0 {
            continue;
        }

        let term = SearchTerm::parse(&block.search_term);
        let request = SelectionRequest {
            display_guid,
            term: &term,
            format: block.format,
            mode: block.selection_mode,
            count: need,
            loop_scope,
        };
        let selected = selection::select_videos(&mut *tx, &request).await?;

        for (offset, video) in selected.iter().enumerate() {
            timeline::insert_entry(
                &mut *tx,
                display_guid,
                playlist_guid,
                block.guid,
                video,
                existing + offset as i64,
                next_abs,
                loop_iteration,
            )
            .await?;
            next_abs += 1;
            created += 1;
        }

        if bump_counters && existing == 0 && !selected.is_empty() {
            blocks::mark_played(&mut *tx, block.guid, now).await?;
        }
    }

    Ok(created)
}

async fn loop_scope_for(db: &Pool<Sqlite>, loop_iteration: i64) -> Result<Option<i64>> {
    Ok(match settings::get_history_scope(db).await? {
        HistoryScope::Lifetime => None,
        HistoryScope::Loop => Some(loop_iteration),
    })
}

/// Materialize one loop iteration for a display's playlist
///
/// Caller must hold the display's advisory lock. A concurrent generation
/// bump (playlist deactivation) makes the run discard its batch.
pub async fn materialize_loop(
    db: &Pool<Sqlite>,
    state: &SharedState,
    display_guid: Uuid,
    playlist_guid: Uuid,
    loop_iteration: i64,
) -> Result<MaterializeOutcome> {
    let generation = state.generation(display_guid).await;
    materialize_loop_as_of(db, state, display_guid, playlist_guid, loop_iteration, generation).await
}

/// Materialization pinned to a generation snapshot
///
/// The batch commits only if the display's generation still matches
/// `generation` at commit time.
pub async fn materialize_loop_as_of(
    db: &Pool<Sqlite>,
    state: &SharedState,
    display_guid: Uuid,
    playlist_guid: Uuid,
    loop_iteration: i64,
    generation: u64,
) -> Result<MaterializeOutcome> {
    let loop_scope = loop_scope_for(db, loop_iteration).await?;

    let mut tx = db.begin().await?;
    let created = fill_loop(&mut tx, display_guid, playlist_guid, loop_iteration, loop_scope, true).await?;

    if state.generation(display_guid).await != generation {
        tx.rollback().await?;
        debug!(
            "Materialization for display {} superseded mid-run, discarding {} entries",
            display_guid, created
        );
        return Ok(MaterializeOutcome { created: 0, superseded: true });
    }
    tx.commit().await?;

    if created > 0 {
        info!(
            "Materialized {} entries for display {} (loop {})",
            created, display_guid, loop_iteration
        );
        state.broadcast_event(LoopwallEvent::TimelineExtended {
            display_id: display_guid,
            playlist_id: playlist_guid,
            entry_count: created,
            loop_iteration,
            timestamp: Utc::now(),
        });
    }

    Ok(MaterializeOutcome { created, superseded: false })
}

/// Rebuild the queued tail of the active playlist's timeline
///
/// Deletes only still-`queued` entries, then refills the current loop from
/// the current absolute position, so a block edit takes effect on the next
/// video without interrupting what is playing. Caller must hold the
/// display's advisory lock.
pub async fn repopulate(
    db: &Pool<Sqlite>,
    state: &SharedState,
    display_guid: Uuid,
) -> Result<RepopulateOutcome> {
    let generation = state.generation(display_guid).await;

    let mut tx = db.begin().await?;
    let playlist = playlists::get_active_playlist(&mut tx, display_guid)
        .await?
        .ok_or_else(|| {
            Error::InvalidInput(format!("Display {} has no active playlist", display_guid))
        })?;

    let loop_iteration = playlist.loop_count;
    let loop_scope = loop_scope_for(db, loop_iteration).await?;

    let removed = timeline::delete_queued(&mut tx, display_guid).await?;
    let added = fill_loop(&mut tx, display_guid, playlist.guid, loop_iteration, loop_scope, false).await?;

    if state.generation(display_guid).await != generation {
        tx.rollback().await?;
        debug!("Repopulation for display {} superseded mid-run, discarded", display_guid);
        return Ok(RepopulateOutcome { removed: 0, added: 0, superseded: true });
    }
    tx.commit().await?;

    info!(
        "Repopulated timeline for display {}: removed {} queued, added {}",
        display_guid, removed, added
    );
    state.broadcast_event(LoopwallEvent::TimelineRepopulated {
        display_id: display_guid,
        playlist_id: playlist.guid,
        removed,
        added,
        timestamp: Utc::now(),
    });

    Ok(RepopulateOutcome { removed, added, superseded: false })
}
