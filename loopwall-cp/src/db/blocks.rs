//! Block table queries
//!
//! Ordinal positions are dense, zero-based, and unique per playlist;
//! insertion and removal renumber the tail inside the caller's transaction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite, SqliteConnection};
use uuid::Uuid;

use loopwall_common::db::models::{Block, SelectionMode, VideoFormat};

use crate::db::displays::parse_guid;
use crate::error::{Error, Result};

/// A block as submitted by the admin surface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockDefinition {
    pub search_term: String,
    pub target_count: i64,
    pub selection_mode: SelectionMode,
    pub format: VideoFormat,
}

impl BlockDefinition {
    /// Validation runs before any mutation; a malformed block never reaches
    /// the store.
    pub fn validate(&self) -> Result<()> {
        if self.search_term.trim().is_empty() {
            return Err(Error::InvalidInput("Block search term must not be empty".into()));
        }
        if self.target_count <= 0 {
            return Err(Error::InvalidInput(format!(
                "Block target count must be positive, got {}",
                self.target_count
            )));
        }
        Ok(())
    }
}

fn block_from_row(row: &SqliteRow) -> Result<Block> {
    let mode_raw: String = row.get("selection_mode");
    let format_raw: String = row.get("format");

    Ok(Block {
        guid: parse_guid(&row.get::<String, _>("guid"))?,
        playlist_guid: parse_guid(&row.get::<String, _>("playlist_guid"))?,
        search_term: row.get("search_term"),
        target_count: row.get("target_count"),
        selection_mode: SelectionMode::parse(&mode_raw)
            .ok_or_else(|| Error::Internal(format!("Invalid selection mode in database: {}", mode_raw)))?,
        format: VideoFormat::parse(&format_raw)
            .ok_or_else(|| Error::Internal(format!("Invalid format in database: {}", format_raw)))?,
        position: row.get("position"),
        times_played: row.get("times_played"),
        last_played_at: row.get::<Option<DateTime<Utc>>, _>("last_played_at"),
        created_at: row.get("created_at"),
    })
}

const BLOCK_COLUMNS: &str = "guid, playlist_guid, search_term, target_count, selection_mode, \
                             format, position, times_played, last_played_at, created_at";

/// Insert a block row at a fixed ordinal (no renumbering)
///
/// Used by playlist creation, where ordinals are assigned densely up front.
pub async fn insert_block_row(
    conn: &mut SqliteConnection,
    playlist_guid: Uuid,
    def: &BlockDefinition,
    position: i64,
) -> Result<Block> {
    let guid = Uuid::new_v4();
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO blocks (guid, playlist_guid, search_term, target_count, selection_mode, format, position, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(guid.to_string())
    .bind(playlist_guid.to_string())
    .bind(def.search_term.trim())
    .bind(def.target_count)
    .bind(def.selection_mode.as_str())
    .bind(def.format.as_str())
    .bind(position)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    get_block_tx(conn, guid).await
}

/// Insert a block into an existing playlist at `position`
///
/// Clamps the position to the current block count, shifts the tail up by
/// one, and refreshes the playlist's denormalized totals. One transaction.
pub async fn insert_block(
    db: &Pool<Sqlite>,
    playlist_guid: Uuid,
    def: &BlockDefinition,
    position: Option<i64>,
) -> Result<Block> {
    def.validate()?;

    let mut tx = db.begin().await?;

    let block_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM blocks WHERE playlist_guid = ?")
        .bind(playlist_guid.to_string())
        .fetch_one(&mut *tx)
        .await?;

    let playlist_exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM playlists WHERE guid = ?)")
            .bind(playlist_guid.to_string())
            .fetch_one(&mut *tx)
            .await?;
    if !playlist_exists {
        return Err(Error::NotFound(format!("Playlist {}", playlist_guid)));
    }

    let position = position.unwrap_or(block_count).clamp(0, block_count);

    sqlx::query("UPDATE blocks SET position = position + 1 WHERE playlist_guid = ? AND position >= ?")
        .bind(playlist_guid.to_string())
        .bind(position)
        .execute(&mut *tx)
        .await?;

    let block = insert_block_row(&mut tx, playlist_guid, def, position).await?;
    crate::db::playlists::refresh_totals(&mut tx, playlist_guid).await?;

    tx.commit().await?;
    Ok(block)
}

/// Update a block's definition in place (ordinal unchanged)
pub async fn update_block(db: &Pool<Sqlite>, guid: Uuid, def: &BlockDefinition) -> Result<Block> {
    def.validate()?;

    let existing = get_block(db, guid).await?;

    let mut tx = db.begin().await?;

    sqlx::query(
        "UPDATE blocks SET search_term = ?, target_count = ?, selection_mode = ?, format = ? WHERE guid = ?",
    )
    .bind(def.search_term.trim())
    .bind(def.target_count)
    .bind(def.selection_mode.as_str())
    .bind(def.format.as_str())
    .bind(guid.to_string())
    .execute(&mut *tx)
    .await?;

    crate::db::playlists::refresh_totals(&mut tx, existing.playlist_guid).await?;

    tx.commit().await?;
    get_block(db, guid).await
}

/// Remove a block, renumbering the tail so ordinals stay dense
pub async fn remove_block(db: &Pool<Sqlite>, guid: Uuid) -> Result<Block> {
    let existing = get_block(db, guid).await?;

    let mut tx = db.begin().await?;

    sqlx::query("DELETE FROM blocks WHERE guid = ?")
        .bind(guid.to_string())
        .execute(&mut *tx)
        .await?;

    sqlx::query("UPDATE blocks SET position = position - 1 WHERE playlist_guid = ? AND position > ?")
        .bind(existing.playlist_guid.to_string())
        .bind(existing.position)
        .execute(&mut *tx)
        .await?;

    crate::db::playlists::refresh_totals(&mut tx, existing.playlist_guid).await?;

    tx.commit().await?;
    Ok(existing)
}

/// Fetch a block by id
pub async fn get_block(db: &Pool<Sqlite>, guid: Uuid) -> Result<Block> {
    let row = sqlx::query(&format!("SELECT {} FROM blocks WHERE guid = ?", BLOCK_COLUMNS))
        .bind(guid.to_string())
        .fetch_optional(db)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Block {}", guid)))?;

    block_from_row(&row)
}

async fn get_block_tx(conn: &mut SqliteConnection, guid: Uuid) -> Result<Block> {
    let row = sqlx::query(&format!("SELECT {} FROM blocks WHERE guid = ?", BLOCK_COLUMNS))
        .bind(guid.to_string())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Block {}", guid)))?;

    block_from_row(&row)
}

/// All blocks of a playlist in ordinal order
pub async fn blocks_for_playlist(
    conn: &mut SqliteConnection,
    playlist_guid: Uuid,
) -> Result<Vec<Block>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM blocks WHERE playlist_guid = ? ORDER BY position",
        BLOCK_COLUMNS
    ))
    .bind(playlist_guid.to_string())
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(block_from_row).collect()
}

/// Record that a loop iteration was generated for a block
pub async fn mark_played(conn: &mut SqliteConnection, guid: Uuid, at: DateTime<Utc>) -> Result<()> {
    sqlx::query("UPDATE blocks SET times_played = times_played + 1, last_played_at = ? WHERE guid = ?")
        .bind(at)
        .bind(guid.to_string())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Clear play counters for every block of a playlist
pub async fn reset_play_counters(conn: &mut SqliteConnection, playlist_guid: Uuid) -> Result<()> {
    sqlx::query("UPDATE blocks SET times_played = 0, last_played_at = NULL WHERE playlist_guid = ?")
        .bind(playlist_guid.to_string())
        .execute(&mut *conn)
        .await?;
    Ok(())
}
