//! Timeline materializer tests
//!
//! The two-block materialization scenario, strict absolute-position
//! monotonicity across repopulation, survivor-preserving repairs, the
//! target-count edit scenario, and the loop-scoped history policy knob.

mod helpers;

use uuid::Uuid;

use loopwall_common::db::models::{EntryStatus, SelectionMode, VideoFormat};
use loopwall_cp::db::blocks;
use loopwall_cp::db::{displays, history, playlists, settings, timeline};
use loopwall_cp::scheduler;
use loopwall_cp::state::SharedState;

use helpers::{block_def, seed_video, test_db};

async fn activate(pool: &sqlx::SqlitePool, playlist: &loopwall_common::db::models::Playlist) {
    let mut conn = pool.acquire().await.unwrap();
    playlists::activate_exclusive(&mut conn, playlist).await.unwrap();
}

/// Walk an entry through queued -> playing -> played
async fn mark_played(pool: &sqlx::SqlitePool, entry: &loopwall_common::db::models::TimelineEntry) {
    let mut conn = pool.acquire().await.unwrap();
    timeline::transition_status(&mut conn, entry, EntryStatus::Playing).await.unwrap();
    let mut playing = entry.clone();
    playing.status = EntryStatus::Playing;
    timeline::transition_status(&mut conn, &playing, EntryStatus::Played).await.unwrap();
}

#[tokio::test]
async fn two_block_playlist_materializes_in_block_order() {
    let db = test_db().await;
    let state = SharedState::new();
    let display = displays::create_display(&db.pool, "wall").await.unwrap();

    // Catalog: four cat videos, three eligible wide dog videos, one
    // excluded by token, one excluded by aspect
    for i in 0..4 {
        seed_video(&db.pool, &format!("cats {}", i), "feline", 1920, 1080, i).await;
    }
    for i in 0..3 {
        seed_video(&db.pool, &format!("dogs {}", i), "canine", 1920, 1080, i).await;
    }
    seed_video(&db.pool, "dogs and puppy", "canine", 1920, 1080, 5).await;
    seed_video(&db.pool, "dogs portrait", "canine", 1080, 1920, 6).await;

    let defs = vec![
        block_def("cats", 3, SelectionMode::Newest, VideoFormat::Mixed),
        block_def("dogs -puppy", 2, SelectionMode::Random, VideoFormat::Wide),
    ];
    let (playlist, created) =
        playlists::create_playlist_with_blocks(&db.pool, display.guid, "animals", &defs)
            .await
            .unwrap();
    activate(&db.pool, &playlist).await;

    let outcome =
        scheduler::materialize_loop(&db.pool, &state, display.guid, playlist.guid, 0)
            .await
            .unwrap();
    assert_eq!(outcome.created, 5);
    assert!(!outcome.superseded);

    let entries = timeline::entries_for_display(&db.pool, display.guid).await.unwrap();
    assert_eq!(entries.len(), 5);

    // Block order, dense absolute and block-relative positions
    for (i, entry) in entries.iter().enumerate() {
        assert_eq!(entry.absolute_position, i as i64);
        assert_eq!(entry.loop_iteration, 0);
        assert_eq!(entry.status, EntryStatus::Queued);
    }
    assert!(entries[..3].iter().all(|e| e.block_guid == created[0].guid));
    assert!(entries[3..].iter().all(|e| e.block_guid == created[1].guid));
    assert_eq!(
        entries.iter().map(|e| e.block_position).collect::<Vec<_>>(),
        vec![0, 1, 2, 0, 1]
    );

    // Exclusion token and aspect filter held
    assert!(entries.iter().all(|e| !e.video_title.contains("puppy")));
    assert!(entries[3..].iter().all(|e| e.video_width > e.video_height));

    // No video assigned twice
    let mut videos: Vec<Uuid> = entries.iter().map(|e| e.video_guid).collect();
    videos.sort();
    videos.dedup();
    assert_eq!(videos.len(), 5);

    // Block counters were bumped for the generated iteration
    let refreshed = blocks::get_block(&db.pool, created[0].guid).await.unwrap();
    assert_eq!(refreshed.times_played, 1);
    assert!(refreshed.last_played_at.is_some());
}

#[tokio::test]
async fn empty_playlist_leaves_timeline_empty() {
    let db = test_db().await;
    let state = SharedState::new();
    let display = displays::create_display(&db.pool, "wall").await.unwrap();
    let (playlist, _) =
        playlists::create_playlist_with_blocks(&db.pool, display.guid, "empty", &[])
            .await
            .unwrap();
    activate(&db.pool, &playlist).await;

    let outcome =
        scheduler::materialize_loop(&db.pool, &state, display.guid, playlist.guid, 0)
            .await
            .unwrap();
    assert_eq!(outcome.created, 0);
    assert!(timeline::entries_for_display(&db.pool, display.guid).await.unwrap().is_empty());
}

#[tokio::test]
async fn target_count_edit_tops_up_around_survivors() {
    let db = test_db().await;
    let state = SharedState::new();
    let display = displays::create_display(&db.pool, "wall").await.unwrap();

    for i in 0..8 {
        seed_video(&db.pool, &format!("trains {}", i), "railway", 1920, 1080, i).await;
    }

    let defs = vec![block_def("trains", 3, SelectionMode::Newest, VideoFormat::Mixed)];
    let (playlist, created) =
        playlists::create_playlist_with_blocks(&db.pool, display.guid, "p", &defs)
            .await
            .unwrap();
    activate(&db.pool, &playlist).await;
    scheduler::materialize_loop(&db.pool, &state, display.guid, playlist.guid, 0)
        .await
        .unwrap();

    // One of the original three entries is already played
    let entries = timeline::entries_for_display(&db.pool, display.guid).await.unwrap();
    assert_eq!(entries.len(), 3);
    mark_played(&db.pool, &entries[0]).await;

    // Raise the target from 3 to 5, then repair
    blocks::update_block(
        &db.pool,
        created[0].guid,
        &block_def("trains", 5, SelectionMode::Newest, VideoFormat::Mixed),
    )
    .await
    .unwrap();
    let outcome = scheduler::repopulate(&db.pool, &state, display.guid).await.unwrap();
    assert_eq!(outcome.removed, 2);
    assert_eq!(outcome.added, 4);

    let entries = timeline::entries_for_display(&db.pool, display.guid).await.unwrap();
    assert_eq!(entries.len(), 5);
    let played = entries.iter().filter(|e| e.status == EntryStatus::Played).count();
    let queued = entries.iter().filter(|e| e.status == EntryStatus::Queued).count();
    assert_eq!(played, 1);
    assert_eq!(queued, 4);

    // The played survivor's video is not re-assigned
    let mut videos: Vec<Uuid> = entries.iter().map(|e| e.video_guid).collect();
    videos.sort();
    videos.dedup();
    assert_eq!(videos.len(), 5);
}

#[tokio::test]
async fn absolute_positions_never_reused_across_repopulation() {
    let db = test_db().await;
    let state = SharedState::new();
    let display = displays::create_display(&db.pool, "wall").await.unwrap();

    for i in 0..10 {
        seed_video(&db.pool, &format!("clouds {}", i), "sky", 1920, 1080, i).await;
    }

    let defs = vec![block_def("clouds", 4, SelectionMode::Newest, VideoFormat::Mixed)];
    let (playlist, _) = playlists::create_playlist_with_blocks(&db.pool, display.guid, "p", &defs)
        .await
        .unwrap();
    activate(&db.pool, &playlist).await;
    scheduler::materialize_loop(&db.pool, &state, display.guid, playlist.guid, 0)
        .await
        .unwrap();

    let entries = timeline::entries_for_display(&db.pool, display.guid).await.unwrap();
    let max_before = entries.iter().map(|e| e.absolute_position).max().unwrap();
    mark_played(&db.pool, &entries[0]).await;

    // All queued entries (positions 1..3) are discarded and refilled
    scheduler::repopulate(&db.pool, &state, display.guid).await.unwrap();

    let entries = timeline::entries_for_display(&db.pool, display.guid).await.unwrap();
    let positions: Vec<i64> = entries.iter().map(|e| e.absolute_position).collect();

    // Strictly increasing, and refills landed beyond every position ever used
    assert!(positions.windows(2).all(|w| w[0] < w[1]));
    assert!(entries
        .iter()
        .filter(|e| e.status == EntryStatus::Queued)
        .all(|e| e.absolute_position > max_before));
}

#[tokio::test]
async fn loop_scope_allows_repeats_after_rotation() {
    let db = test_db().await;
    let state = SharedState::new();
    let display = displays::create_display(&db.pool, "wall").await.unwrap();

    // Tiny catalog: two eligible videos
    let a = seed_video(&db.pool, "lava flow one", "volcano", 1920, 1080, 1).await;
    let b = seed_video(&db.pool, "lava flow two", "volcano", 1920, 1080, 2).await;

    let defs = vec![block_def("lava", 2, SelectionMode::Newest, VideoFormat::Mixed)];
    let (playlist, _) = playlists::create_playlist_with_blocks(&db.pool, display.guid, "p", &defs)
        .await
        .unwrap();
    activate(&db.pool, &playlist).await;
    scheduler::materialize_loop(&db.pool, &state, display.guid, playlist.guid, 0)
        .await
        .unwrap();

    // Both entries consumed and historized in loop 0
    let entries = timeline::entries_for_display(&db.pool, display.guid).await.unwrap();
    let mut conn = db.pool.acquire().await.unwrap();
    for entry in &entries {
        history::insert_record(&mut conn, display.guid, entry.video_guid, Some(entry.block_guid), 0)
            .await
            .unwrap();
    }
    drop(conn);
    for entry in &entries {
        mark_played(&db.pool, entry).await;
    }

    // Lifetime scope: the next loop finds nothing
    let outcome = scheduler::materialize_loop(&db.pool, &state, display.guid, playlist.guid, 1)
        .await
        .unwrap();
    assert_eq!(outcome.created, 0);

    // Loop scope: the same two videos are eligible again in loop 2
    settings::set_history_scope(&db.pool, settings::HistoryScope::Loop).await.unwrap();
    let outcome = scheduler::materialize_loop(&db.pool, &state, display.guid, playlist.guid, 2)
        .await
        .unwrap();
    assert_eq!(outcome.created, 2);

    let entries = timeline::entries_for_display(&db.pool, display.guid).await.unwrap();
    let loop2: Vec<Uuid> = entries
        .iter()
        .filter(|e| e.loop_iteration == 2)
        .map(|e| e.video_guid)
        .collect();
    assert!(loop2.contains(&a));
    assert!(loop2.contains(&b));
}

#[tokio::test]
async fn generation_bump_discards_the_batch() {
    let db = test_db().await;
    let state = SharedState::new();
    let display = displays::create_display(&db.pool, "wall").await.unwrap();

    seed_video(&db.pool, "glacier calving", "ice", 1920, 1080, 1).await;
    let defs = vec![block_def("glacier", 1, SelectionMode::Newest, VideoFormat::Mixed)];
    let (playlist, _) = playlists::create_playlist_with_blocks(&db.pool, display.guid, "p", &defs)
        .await
        .unwrap();
    activate(&db.pool, &playlist).await;

    // Simulate a deactivation racing the run: the materializer holds a
    // stale generation snapshot, so its batch must be discarded.
    let stale_generation = state.generation(display.guid).await;
    state.bump_generation(display.guid).await;

    let outcome = scheduler::materialize_loop_as_of(
        &db.pool,
        &state,
        display.guid,
        playlist.guid,
        0,
        stale_generation,
    )
    .await
    .unwrap();
    assert!(outcome.superseded);
    assert_eq!(outcome.created, 0);
    assert!(timeline::entries_for_display(&db.pool, display.guid).await.unwrap().is_empty());

    // A run started after the bump sees a stable generation and commits
    let outcome = scheduler::materialize_loop(&db.pool, &state, display.guid, playlist.guid, 0)
        .await
        .unwrap();
    assert!(!outcome.superseded);
    assert_eq!(outcome.created, 1);
}
