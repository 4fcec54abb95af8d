//! Playlist store
//!
//! Playlist rows plus the multi-row operations of the playlist/block store:
//! create-with-blocks, exclusive activation, and denormalized totals. Block
//! row queries live in [`crate::db::blocks`].

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite, SqliteConnection};
use uuid::Uuid;

use loopwall_common::db::models::{Block, Playlist};

use crate::db::blocks::{self, BlockDefinition};
use crate::db::displays::parse_guid;
use crate::error::{Error, Result};

fn playlist_from_row(row: &SqliteRow) -> Result<Playlist> {
    Ok(Playlist {
        guid: parse_guid(&row.get::<String, _>("guid"))?,
        display_guid: parse_guid(&row.get::<String, _>("display_guid"))?,
        name: row.get("name"),
        is_active: row.get::<i64, _>("is_active") != 0,
        block_count: row.get("block_count"),
        video_count: row.get("video_count"),
        loop_count: row.get("loop_count"),
        created_at: row.get("created_at"),
    })
}

const PLAYLIST_COLUMNS: &str =
    "guid, display_guid, name, is_active, block_count, video_count, loop_count, created_at";

/// Create a playlist together with its initial block set
///
/// Atomic: the playlist row, all block rows with dense ordinals, and the
/// denormalized totals land in one transaction. Every block definition is
/// validated before any row is written.
pub async fn create_playlist_with_blocks(
    db: &Pool<Sqlite>,
    display_guid: Uuid,
    name: &str,
    block_defs: &[BlockDefinition],
) -> Result<(Playlist, Vec<Block>)> {
    if name.trim().is_empty() {
        return Err(Error::InvalidInput("Playlist name must not be empty".into()));
    }
    for def in block_defs {
        def.validate()?;
    }

    // Reject unknown displays before mutating anything
    let display_exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM displays WHERE guid = ?)")
            .bind(display_guid.to_string())
            .fetch_one(db)
            .await?;
    if !display_exists {
        return Err(Error::NotFound(format!("Display {}", display_guid)));
    }

    let guid = Uuid::new_v4();
    let now = Utc::now();
    let video_count: i64 = block_defs.iter().map(|d| d.target_count).sum();

    let mut tx = db.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO playlists (guid, display_guid, name, is_active, block_count, video_count, loop_count, created_at)
        VALUES (?, ?, ?, 0, ?, ?, 0, ?)
        "#,
    )
    .bind(guid.to_string())
    .bind(display_guid.to_string())
    .bind(name)
    .bind(block_defs.len() as i64)
    .bind(video_count)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    let mut created = Vec::with_capacity(block_defs.len());
    for (position, def) in block_defs.iter().enumerate() {
        created.push(blocks::insert_block_row(&mut tx, guid, def, position as i64).await?);
    }

    tx.commit().await?;

    let playlist = get_playlist(db, guid).await?;
    Ok((playlist, created))
}

/// Fetch a playlist by id
pub async fn get_playlist(db: &Pool<Sqlite>, guid: Uuid) -> Result<Playlist> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM playlists WHERE guid = ?",
        PLAYLIST_COLUMNS
    ))
    .bind(guid.to_string())
    .fetch_optional(db)
    .await?
    .ok_or_else(|| Error::NotFound(format!("Playlist {}", guid)))?;

    playlist_from_row(&row)
}

/// List a display's playlists
pub async fn list_playlists(db: &Pool<Sqlite>, display_guid: Uuid) -> Result<Vec<Playlist>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM playlists WHERE display_guid = ? ORDER BY created_at, guid",
        PLAYLIST_COLUMNS
    ))
    .bind(display_guid.to_string())
    .fetch_all(db)
    .await?;

    rows.iter().map(playlist_from_row).collect()
}

/// The display's active playlist, if any
pub async fn get_active_playlist(
    conn: &mut SqliteConnection,
    display_guid: Uuid,
) -> Result<Option<Playlist>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM playlists WHERE display_guid = ? AND is_active = 1",
        PLAYLIST_COLUMNS
    ))
    .bind(display_guid.to_string())
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(playlist_from_row).transpose()
}

/// Rename a playlist
pub async fn rename_playlist(db: &Pool<Sqlite>, guid: Uuid, name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::InvalidInput("Playlist name must not be empty".into()));
    }

    let result = sqlx::query("UPDATE playlists SET name = ? WHERE guid = ?")
        .bind(name)
        .bind(guid.to_string())
        .execute(db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Playlist {}", guid)));
    }
    Ok(())
}

/// Delete a playlist (blocks and timeline entries cascade)
pub async fn delete_playlist(db: &Pool<Sqlite>, guid: Uuid) -> Result<Playlist> {
    let playlist = get_playlist(db, guid).await?;

    let mut tx = db.begin().await?;

    // The display must not keep pointing at an entry that is about to vanish
    sqlx::query(
        r#"
        UPDATE displays SET current_entry_guid = NULL, playback_state = 'idle', position_seconds = 0
        WHERE guid = ? AND current_entry_guid IN
            (SELECT guid FROM timeline_entries WHERE playlist_guid = ?)
        "#,
    )
    .bind(playlist.display_guid.to_string())
    .bind(guid.to_string())
    .execute(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM playlists WHERE guid = ?")
        .bind(guid.to_string())
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(playlist)
}

/// Make a playlist the display's only active playlist
///
/// Clears `is_active` on every other playlist for the same display and sets
/// it on the target in a single transaction.
pub async fn activate_exclusive(conn: &mut SqliteConnection, playlist: &Playlist) -> Result<()> {
    sqlx::query("UPDATE playlists SET is_active = 0 WHERE display_guid = ? AND guid != ?")
        .bind(playlist.display_guid.to_string())
        .bind(playlist.guid.to_string())
        .execute(&mut *conn)
        .await?;

    sqlx::query("UPDATE playlists SET is_active = 1 WHERE guid = ?")
        .bind(playlist.guid.to_string())
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// Increment the playlist loop counter, returning the new value
pub async fn increment_loop_count(conn: &mut SqliteConnection, guid: Uuid) -> Result<i64> {
    sqlx::query("UPDATE playlists SET loop_count = loop_count + 1 WHERE guid = ?")
        .bind(guid.to_string())
        .execute(&mut *conn)
        .await?;

    let loop_count: i64 = sqlx::query_scalar("SELECT loop_count FROM playlists WHERE guid = ?")
        .bind(guid.to_string())
        .fetch_one(&mut *conn)
        .await?;
    Ok(loop_count)
}

/// Recompute denormalized block/video totals from the block rows
pub async fn refresh_totals(conn: &mut SqliteConnection, guid: Uuid) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE playlists SET
            block_count = (SELECT COUNT(*) FROM blocks WHERE playlist_guid = ?),
            video_count = (SELECT COALESCE(SUM(target_count), 0) FROM blocks WHERE playlist_guid = ?)
        WHERE guid = ?
        "#,
    )
    .bind(guid.to_string())
    .bind(guid.to_string())
    .bind(guid.to_string())
    .execute(&mut *conn)
    .await?;
    Ok(())
}
