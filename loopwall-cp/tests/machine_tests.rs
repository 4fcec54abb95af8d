//! Display state machine tests
//!
//! Player-reported completion, history writes, loop wraparound with
//! rematerialization, and the "no content" idle state.

mod helpers;

use std::sync::Arc;
use uuid::Uuid;

use loopwall_common::db::models::{EntryStatus, SelectionMode, VideoFormat};
use loopwall_common::events::{LoopwallEvent, PlaybackState};
use loopwall_cp::db::{displays, history, playlists, timeline};
use loopwall_cp::display::machine;
use loopwall_cp::scheduler;
use loopwall_cp::state::SharedState;

use helpers::{block_def, seed_video, test_db, TestDb};

async fn activate_and_start(
    db: &TestDb,
    state: &SharedState,
    display: Uuid,
    playlist: &loopwall_common::db::models::Playlist,
) {
    let mut conn = db.pool.acquire().await.unwrap();
    playlists::activate_exclusive(&mut conn, playlist).await.unwrap();
    drop(conn);
    scheduler::materialize_loop(&db.pool, state, display, playlist.guid, playlist.loop_count)
        .await
        .unwrap();
    machine::advance(&db.pool, state, display).await.unwrap();
}

#[tokio::test]
async fn finished_marks_played_historizes_and_advances() {
    let db = test_db().await;
    let state = Arc::new(SharedState::new());
    let display = displays::create_display(&db.pool, "wall").await.unwrap();

    for i in 0..3 {
        seed_video(&db.pool, &format!("desert dunes {}", i), "sand", 1920, 1080, i).await;
    }
    let defs = vec![block_def("desert", 3, SelectionMode::Newest, VideoFormat::Mixed)];
    let (playlist, _) =
        playlists::create_playlist_with_blocks(&db.pool, display.guid, "p", &defs)
            .await
            .unwrap();
    activate_and_start(&db, &state, display.guid, &playlist).await;

    let entries = timeline::entries_for_display(&db.pool, display.guid).await.unwrap();
    let first = &entries[0];
    assert_eq!(first.status, EntryStatus::Playing);

    let next = machine::finish_current(&db.pool, &state, display.guid, true).await.unwrap();
    assert_eq!(next.unwrap().guid, entries[1].guid);

    let refreshed = timeline::entries_for_display(&db.pool, display.guid).await.unwrap();
    assert_eq!(refreshed[0].status, EntryStatus::Played);
    assert_eq!(refreshed[1].status, EntryStatus::Playing);

    let shown = history::count_for_display(&db.pool, display.guid).await.unwrap();
    assert_eq!(shown, 1);

    let row = displays::get_display(&db.pool, display.guid).await.unwrap();
    assert_eq!(row.current_entry_guid, Some(entries[1].guid));
    assert_eq!(row.position_seconds, 0.0);
}

#[tokio::test]
async fn failed_playback_is_not_historized() {
    let db = test_db().await;
    let state = Arc::new(SharedState::new());
    let display = displays::create_display(&db.pool, "wall").await.unwrap();

    for i in 0..2 {
        seed_video(&db.pool, &format!("geyser {}", i), "steam", 1920, 1080, i).await;
    }
    let defs = vec![block_def("geyser", 2, SelectionMode::Newest, VideoFormat::Mixed)];
    let (playlist, _) =
        playlists::create_playlist_with_blocks(&db.pool, display.guid, "p", &defs)
            .await
            .unwrap();
    activate_and_start(&db, &state, display.guid, &playlist).await;

    machine::finish_current(&db.pool, &state, display.guid, false).await.unwrap();

    assert_eq!(history::count_for_display(&db.pool, display.guid).await.unwrap(), 0);
    let refreshed = timeline::entries_for_display(&db.pool, display.guid).await.unwrap();
    assert_eq!(refreshed[0].status, EntryStatus::Played);
}

#[tokio::test]
async fn finishing_last_entry_wraps_loop_and_rematerializes() {
    let db = test_db().await;
    let state = Arc::new(SharedState::new());
    let display = displays::create_display(&db.pool, "wall").await.unwrap();

    // Enough catalog for two full rotations of (1 river + 1 bridge)
    for i in 0..2 {
        seed_video(&db.pool, &format!("river rapids {}", i), "water", 1920, 1080, i).await;
        seed_video(&db.pool, &format!("bridge at night {}", i), "city", 1920, 1080, i).await;
    }
    let defs = vec![
        block_def("river", 1, SelectionMode::Newest, VideoFormat::Mixed),
        block_def("bridge", 1, SelectionMode::Newest, VideoFormat::Mixed),
    ];
    let (playlist, created) =
        playlists::create_playlist_with_blocks(&db.pool, display.guid, "p", &defs)
            .await
            .unwrap();
    activate_and_start(&db, &state, display.guid, &playlist).await;

    let mut rx = state.subscribe_events();

    // Consume the whole first rotation
    machine::finish_current(&db.pool, &state, display.guid, true).await.unwrap();
    let next = machine::finish_current(&db.pool, &state, display.guid, true).await.unwrap();

    // The wrap bumped the loop counter and restarted from the first block
    let refreshed = playlists::get_playlist(&db.pool, playlist.guid).await.unwrap();
    assert_eq!(refreshed.loop_count, 1);

    let assigned = next.unwrap();
    assert_eq!(assigned.loop_iteration, 1);
    assert_eq!(assigned.block_guid, created[0].guid);

    // Loop 1 entries exclude everything already shown (lifetime scope)
    let entries = timeline::entries_for_display(&db.pool, display.guid).await.unwrap();
    let loop1: Vec<_> = entries.iter().filter(|e| e.loop_iteration == 1).collect();
    assert_eq!(loop1.len(), 2);
    let loop0_videos: Vec<Uuid> = entries
        .iter()
        .filter(|e| e.loop_iteration == 0)
        .map(|e| e.video_guid)
        .collect();
    assert!(loop1.iter().all(|e| !loop0_videos.contains(&e.video_guid)));

    let wraps = {
        let mut n = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, LoopwallEvent::LoopCompleted { loop_count: 1, .. }) {
                n += 1;
            }
        }
        n
    };
    assert_eq!(wraps, 1);
}

#[tokio::test]
async fn exhausted_catalog_parks_the_display_idle() {
    let db = test_db().await;
    let state = Arc::new(SharedState::new());
    let display = displays::create_display(&db.pool, "wall").await.unwrap();

    // One eligible video, one rotation, nothing left for loop 1
    seed_video(&db.pool, "aurora borealis", "night sky", 1920, 1080, 1).await;
    let defs = vec![block_def("aurora", 1, SelectionMode::Newest, VideoFormat::Mixed)];
    let (playlist, _) =
        playlists::create_playlist_with_blocks(&db.pool, display.guid, "p", &defs)
            .await
            .unwrap();
    activate_and_start(&db, &state, display.guid, &playlist).await;

    let mut rx = state.subscribe_events();
    let next = machine::finish_current(&db.pool, &state, display.guid, true).await.unwrap();
    assert!(next.is_none());

    let row = displays::get_display(&db.pool, display.guid).await.unwrap();
    assert_eq!(row.playback_state, PlaybackState::Idle);
    assert_eq!(row.current_entry_guid, None);

    let mut saw_empty = false;
    while let Ok(event) = rx.try_recv() {
        if matches!(event, LoopwallEvent::TimelineEmpty { .. }) {
            saw_empty = true;
        }
    }
    assert!(saw_empty);

    // The wrap attempt still counts as a completed rotation
    let refreshed = playlists::get_playlist(&db.pool, playlist.guid).await.unwrap();
    assert_eq!(refreshed.loop_count, 1);
}

#[tokio::test]
async fn no_content_playlist_goes_idle_without_spurious_wrap() {
    let db = test_db().await;
    let state = Arc::new(SharedState::new());
    let display = displays::create_display(&db.pool, "wall").await.unwrap();

    // Block matches nothing in the catalog
    let defs = vec![block_def("unobtainium", 2, SelectionMode::Newest, VideoFormat::Mixed)];
    let (playlist, _) =
        playlists::create_playlist_with_blocks(&db.pool, display.guid, "p", &defs)
            .await
            .unwrap();
    activate_and_start(&db, &state, display.guid, &playlist).await;

    let row = displays::get_display(&db.pool, display.guid).await.unwrap();
    assert_eq!(row.playback_state, PlaybackState::Idle);
    assert_eq!(row.current_entry_guid, None);

    // A playlist that never materialized anything must not spin the counter
    let refreshed = playlists::get_playlist(&db.pool, playlist.guid).await.unwrap();
    assert_eq!(refreshed.loop_count, 0);
}
