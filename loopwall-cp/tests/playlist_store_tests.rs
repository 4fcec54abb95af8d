//! Playlist & block store integrity tests
//!
//! Covers the ordinal-density invariant (positions are always {0..n-1}
//! after any add/remove), exclusive activation, denormalized totals, and
//! validation rejecting malformed blocks before any mutation.

mod helpers;

use loopwall_common::db::models::{SelectionMode, VideoFormat};
use loopwall_cp::db::{blocks, displays, playlists};
use loopwall_cp::error::Error;

use helpers::{block_def, test_db};

async fn ordinals(pool: &sqlx::SqlitePool, playlist: uuid::Uuid) -> Vec<i64> {
    let mut conn = pool.acquire().await.unwrap();
    blocks::blocks_for_playlist(&mut conn, playlist)
        .await
        .unwrap()
        .iter()
        .map(|b| b.position)
        .collect()
}

#[tokio::test]
async fn create_playlist_assigns_dense_ordinals_and_totals() {
    let db = test_db().await;
    let display = displays::create_display(&db.pool, "lobby wall").await.unwrap();

    let defs = vec![
        block_def("cats", 3, SelectionMode::Newest, VideoFormat::Mixed),
        block_def("dogs -puppy", 2, SelectionMode::Random, VideoFormat::Wide),
        block_def("birds", 4, SelectionMode::Newest, VideoFormat::Tall),
    ];
    let (playlist, created) =
        playlists::create_playlist_with_blocks(&db.pool, display.guid, "animals", &defs)
            .await
            .unwrap();

    assert_eq!(playlist.block_count, 3);
    assert_eq!(playlist.video_count, 9);
    assert!(!playlist.is_active);
    assert_eq!(created.len(), 3);
    assert_eq!(ordinals(&db.pool, playlist.guid).await, vec![0, 1, 2]);
}

#[tokio::test]
async fn insert_block_in_middle_renumbers_tail() {
    let db = test_db().await;
    let display = displays::create_display(&db.pool, "lobby wall").await.unwrap();
    let defs = vec![
        block_def("a", 1, SelectionMode::Newest, VideoFormat::Mixed),
        block_def("b", 1, SelectionMode::Newest, VideoFormat::Mixed),
        block_def("c", 1, SelectionMode::Newest, VideoFormat::Mixed),
    ];
    let (playlist, _) =
        playlists::create_playlist_with_blocks(&db.pool, display.guid, "p", &defs)
            .await
            .unwrap();

    let inserted = blocks::insert_block(
        &db.pool,
        playlist.guid,
        &block_def("x", 2, SelectionMode::Random, VideoFormat::Mixed),
        Some(1),
    )
    .await
    .unwrap();

    assert_eq!(inserted.position, 1);
    assert_eq!(ordinals(&db.pool, playlist.guid).await, vec![0, 1, 2, 3]);

    let mut conn = db.pool.acquire().await.unwrap();
    let all = blocks::blocks_for_playlist(&mut conn, playlist.guid).await.unwrap();
    let terms: Vec<&str> = all.iter().map(|b| b.search_term.as_str()).collect();
    assert_eq!(terms, vec!["a", "x", "b", "c"]);

    let refreshed = playlists::get_playlist(&db.pool, playlist.guid).await.unwrap();
    assert_eq!(refreshed.block_count, 4);
    assert_eq!(refreshed.video_count, 5);
}

#[tokio::test]
async fn remove_block_keeps_ordinals_dense() {
    let db = test_db().await;
    let display = displays::create_display(&db.pool, "lobby wall").await.unwrap();
    let defs = vec![
        block_def("a", 1, SelectionMode::Newest, VideoFormat::Mixed),
        block_def("b", 1, SelectionMode::Newest, VideoFormat::Mixed),
        block_def("c", 1, SelectionMode::Newest, VideoFormat::Mixed),
    ];
    let (playlist, created) =
        playlists::create_playlist_with_blocks(&db.pool, display.guid, "p", &defs)
            .await
            .unwrap();

    blocks::remove_block(&db.pool, created[1].guid).await.unwrap();

    assert_eq!(ordinals(&db.pool, playlist.guid).await, vec![0, 1]);
    let refreshed = playlists::get_playlist(&db.pool, playlist.guid).await.unwrap();
    assert_eq!(refreshed.block_count, 2);
}

#[tokio::test]
async fn malformed_blocks_are_rejected_without_mutation() {
    let db = test_db().await;
    let display = displays::create_display(&db.pool, "lobby wall").await.unwrap();

    let defs = vec![
        block_def("fine", 2, SelectionMode::Newest, VideoFormat::Mixed),
        block_def("   ", 2, SelectionMode::Newest, VideoFormat::Mixed),
    ];
    let result =
        playlists::create_playlist_with_blocks(&db.pool, display.guid, "broken", &defs).await;
    assert!(matches!(result, Err(Error::InvalidInput(_))));

    // Nothing was written
    assert!(playlists::list_playlists(&db.pool, display.guid).await.unwrap().is_empty());

    let result = playlists::create_playlist_with_blocks(
        &db.pool,
        display.guid,
        "broken",
        &[block_def("ok", 0, SelectionMode::Newest, VideoFormat::Mixed)],
    )
    .await;
    assert!(matches!(result, Err(Error::InvalidInput(_))));
}

#[tokio::test]
async fn unknown_ids_surface_not_found() {
    let db = test_db().await;
    let nobody = uuid::Uuid::new_v4();

    assert!(matches!(
        displays::get_display(&db.pool, nobody).await,
        Err(Error::NotFound(_))
    ));
    assert!(matches!(
        playlists::get_playlist(&db.pool, nobody).await,
        Err(Error::NotFound(_))
    ));
    assert!(matches!(
        blocks::get_block(&db.pool, nobody).await,
        Err(Error::NotFound(_))
    ));
    assert!(matches!(
        playlists::create_playlist_with_blocks(&db.pool, nobody, "p", &[]).await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn activation_is_exclusive_per_display() {
    let db = test_db().await;
    let display = displays::create_display(&db.pool, "lobby wall").await.unwrap();

    let (first, _) = playlists::create_playlist_with_blocks(&db.pool, display.guid, "one", &[])
        .await
        .unwrap();
    let (second, _) = playlists::create_playlist_with_blocks(&db.pool, display.guid, "two", &[])
        .await
        .unwrap();

    let mut conn = db.pool.acquire().await.unwrap();
    playlists::activate_exclusive(&mut conn, &first).await.unwrap();
    playlists::activate_exclusive(&mut conn, &second).await.unwrap();
    drop(conn);

    let all = playlists::list_playlists(&db.pool, display.guid).await.unwrap();
    let active: Vec<_> = all.iter().filter(|p| p.is_active).collect();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].guid, second.guid);
}

#[tokio::test]
async fn display_delete_cascades() {
    let db = test_db().await;
    let display = displays::create_display(&db.pool, "doomed").await.unwrap();
    let defs = vec![block_def("cats", 2, SelectionMode::Newest, VideoFormat::Mixed)];
    let (playlist, _) =
        playlists::create_playlist_with_blocks(&db.pool, display.guid, "p", &defs)
            .await
            .unwrap();

    displays::delete_display(&db.pool, display.guid).await.unwrap();

    assert!(matches!(
        playlists::get_playlist(&db.pool, playlist.guid).await,
        Err(Error::NotFound(_))
    ));
    let block_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM blocks")
        .fetch_one(&db.pool)
        .await
        .unwrap();
    assert_eq!(block_count, 0);
}
