//! Transport command tests
//!
//! Synchronous application and idempotence of the instant commands, FIFO
//! at-most-once consumption of the queued commands, and the state effects
//! of next/previous/playVideo.

mod helpers;

use std::sync::Arc;
use uuid::Uuid;

use loopwall_common::db::models::{EntryStatus, SelectionMode, TimelineEntry, VideoFormat};
use loopwall_common::events::{LoopwallEvent, PlaybackState};
use loopwall_cp::db::{commands as command_log, displays, playlists, timeline};
use loopwall_cp::display::commands::{
    dispatch_command, drain_and_apply, DispatchOutcome, TransportCommand,
};
use loopwall_cp::display::machine;
use loopwall_cp::scheduler;
use loopwall_cp::state::SharedState;

use helpers::{block_def, seed_video, test_db, TestDb};

/// A display actively rotating through `count` seeded videos
async fn setup_rotation(db: &TestDb, state: &SharedState, count: i64) -> (Uuid, Vec<TimelineEntry>) {
    for i in 0..count {
        seed_video(&db.pool, &format!("harbor timelapse {}", i), "port", 1920, 1080, i).await;
    }
    let display = displays::create_display(&db.pool, "pier wall").await.unwrap();
    let defs = vec![block_def("harbor", count, SelectionMode::Newest, VideoFormat::Mixed)];
    let (playlist, _) =
        playlists::create_playlist_with_blocks(&db.pool, display.guid, "rotation", &defs)
            .await
            .unwrap();

    let mut conn = db.pool.acquire().await.unwrap();
    playlists::activate_exclusive(&mut conn, &playlist).await.unwrap();
    drop(conn);

    scheduler::materialize_loop(&db.pool, state, display.guid, playlist.guid, 0)
        .await
        .unwrap();
    machine::advance(&db.pool, state, display.guid).await.unwrap();

    let entries = timeline::entries_for_display(&db.pool, display.guid).await.unwrap();
    (display.guid, entries)
}

fn count_events(
    rx: &mut tokio::sync::broadcast::Receiver<LoopwallEvent>,
    mut pred: impl FnMut(&LoopwallEvent) -> bool,
) -> usize {
    let mut n = 0;
    while let Ok(event) = rx.try_recv() {
        if pred(&event) {
            n += 1;
        }
    }
    n
}

#[tokio::test]
async fn seek_applies_synchronously_and_is_idempotent() {
    let db = test_db().await;
    let state = Arc::new(SharedState::new());
    let (display_id, _) = setup_rotation(&db, &state, 3).await;

    let mut rx = state.subscribe_events();

    let outcome = dispatch_command(&db.pool, &state, display_id, TransportCommand::Seek { position: 42.0 })
        .await
        .unwrap();
    assert_eq!(outcome, DispatchOutcome::Applied);

    let display = displays::get_display(&db.pool, display_id).await.unwrap();
    assert_eq!(display.position_seconds, 42.0);
    assert!(display.seek_pending);

    // Same seek again: no state change, no duplicate push
    dispatch_command(&db.pool, &state, display_id, TransportCommand::Seek { position: 42.0 })
        .await
        .unwrap();
    let seeks = count_events(&mut rx, |e| matches!(e, LoopwallEvent::PositionChanged { .. }));
    assert_eq!(seeks, 1);
}

#[tokio::test]
async fn play_and_pause_are_idempotent() {
    let db = test_db().await;
    let state = Arc::new(SharedState::new());
    let (display_id, _) = setup_rotation(&db, &state, 3).await;

    let mut rx = state.subscribe_events();

    for _ in 0..2 {
        dispatch_command(&db.pool, &state, display_id, TransportCommand::Pause).await.unwrap();
    }
    let display = displays::get_display(&db.pool, display_id).await.unwrap();
    assert_eq!(display.playback_state, PlaybackState::Paused);

    for _ in 0..2 {
        dispatch_command(&db.pool, &state, display_id, TransportCommand::Play).await.unwrap();
    }
    let display = displays::get_display(&db.pool, display_id).await.unwrap();
    assert_eq!(display.playback_state, PlaybackState::Playing);

    // One pause transition plus one play transition, no duplicates
    let changes = count_events(&mut rx, |e| matches!(e, LoopwallEvent::PlaybackStateChanged { .. }));
    assert_eq!(changes, 2);
}

#[tokio::test]
async fn mute_is_idempotent() {
    let db = test_db().await;
    let state = Arc::new(SharedState::new());
    let (display_id, _) = setup_rotation(&db, &state, 2).await;

    let mut rx = state.subscribe_events();

    for _ in 0..3 {
        dispatch_command(&db.pool, &state, display_id, TransportCommand::Mute).await.unwrap();
    }
    dispatch_command(&db.pool, &state, display_id, TransportCommand::Unmute).await.unwrap();

    let display = displays::get_display(&db.pool, display_id).await.unwrap();
    assert!(!display.muted);

    let changes = count_events(&mut rx, |e| matches!(e, LoopwallEvent::MuteChanged { .. }));
    assert_eq!(changes, 2);
}

#[tokio::test]
async fn queued_commands_drain_fifo_and_only_once() {
    let db = test_db().await;
    let state = Arc::new(SharedState::new());
    let (display_id, _) = setup_rotation(&db, &state, 5).await;

    let first = dispatch_command(&db.pool, &state, display_id, TransportCommand::Next).await.unwrap();
    let second = dispatch_command(&db.pool, &state, display_id, TransportCommand::Next).await.unwrap();
    assert_eq!(first, DispatchOutcome::Queued { seq: 1 });
    assert_eq!(second, DispatchOutcome::Queued { seq: 2 });
    assert_eq!(command_log::pending_count(&db.pool, display_id).await.unwrap(), 2);

    let drained = drain_and_apply(&db.pool, &state, display_id).await.unwrap();
    assert_eq!(drained.len(), 2);
    assert_eq!(drained[0].seq, 1);
    assert_eq!(drained[1].seq, 2);

    // Consumed at most once
    assert_eq!(command_log::pending_count(&db.pool, display_id).await.unwrap(), 0);
    assert!(drain_and_apply(&db.pool, &state, display_id).await.unwrap().is_empty());

    // Sequence numbers are never reused after a drain
    let third = dispatch_command(&db.pool, &state, display_id, TransportCommand::Next).await.unwrap();
    assert_eq!(third, DispatchOutcome::Queued { seq: 3 });
}

#[tokio::test]
async fn next_advances_to_the_following_entry() {
    let db = test_db().await;
    let state = Arc::new(SharedState::new());
    let (display_id, entries) = setup_rotation(&db, &state, 3).await;

    dispatch_command(&db.pool, &state, display_id, TransportCommand::Next).await.unwrap();
    drain_and_apply(&db.pool, &state, display_id).await.unwrap();

    let display = displays::get_display(&db.pool, display_id).await.unwrap();
    assert_eq!(display.current_entry_guid, Some(entries[1].guid));
    assert_eq!(display.position_seconds, 0.0);

    let refreshed = timeline::entries_for_display(&db.pool, display_id).await.unwrap();
    assert_eq!(refreshed[0].status, EntryStatus::Played);
    assert_eq!(refreshed[1].status, EntryStatus::Playing);
}

#[tokio::test]
async fn previous_replays_the_last_shown_entry() {
    let db = test_db().await;
    let state = Arc::new(SharedState::new());
    let (display_id, entries) = setup_rotation(&db, &state, 3).await;

    // Move to the second entry, then come back
    machine::finish_current(&db.pool, &state, display_id, true).await.unwrap();
    dispatch_command(&db.pool, &state, display_id, TransportCommand::Previous).await.unwrap();
    drain_and_apply(&db.pool, &state, display_id).await.unwrap();

    let display = displays::get_display(&db.pool, display_id).await.unwrap();
    assert_eq!(display.current_entry_guid, Some(entries[0].guid));
    assert_eq!(display.position_seconds, 0.0);

    // Statuses never regress: the replayed entry stays played
    let refreshed = timeline::entries_for_display(&db.pool, display_id).await.unwrap();
    assert_eq!(refreshed[0].status, EntryStatus::Played);
    assert_eq!(refreshed[1].status, EntryStatus::Played);
}

#[tokio::test]
async fn play_video_jumps_and_skips_jumped_queue() {
    let db = test_db().await;
    let state = Arc::new(SharedState::new());
    let (display_id, entries) = setup_rotation(&db, &state, 5).await;

    // Jump from entry 0 straight to entry 3
    dispatch_command(
        &db.pool,
        &state,
        display_id,
        TransportCommand::PlayVideo { entry: entries[3].guid },
    )
    .await
    .unwrap();
    drain_and_apply(&db.pool, &state, display_id).await.unwrap();

    let display = displays::get_display(&db.pool, display_id).await.unwrap();
    assert_eq!(display.current_entry_guid, Some(entries[3].guid));

    let refreshed = timeline::entries_for_display(&db.pool, display_id).await.unwrap();
    assert_eq!(refreshed[0].status, EntryStatus::Played);
    assert_eq!(refreshed[1].status, EntryStatus::Skipped);
    assert_eq!(refreshed[2].status, EntryStatus::Skipped);
    assert_eq!(refreshed[3].status, EntryStatus::Playing);
    assert_eq!(refreshed[4].status, EntryStatus::Queued);
}

#[tokio::test]
async fn play_video_rejects_foreign_entries() {
    let db = test_db().await;
    let state = Arc::new(SharedState::new());
    let (display_id, _) = setup_rotation(&db, &state, 2).await;

    let result = machine::play_entry(&db.pool, &state, display_id, Uuid::new_v4()).await;
    assert!(matches!(result, Err(loopwall_cp::Error::NotFound(_))));
}
