//! Display table queries

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite, SqliteConnection};
use uuid::Uuid;

use loopwall_common::db::models::Display;
use loopwall_common::events::PlaybackState;

use crate::error::{Error, Result};

pub(crate) fn parse_guid(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| Error::Internal(format!("Invalid guid in database: {}", e)))
}

fn display_from_row(row: &SqliteRow) -> Result<Display> {
    let state_raw: String = row.get("playback_state");
    let playback_state = PlaybackState::parse(&state_raw)
        .ok_or_else(|| Error::Internal(format!("Invalid playback state in database: {}", state_raw)))?;

    let current_entry_guid = row
        .get::<Option<String>, _>("current_entry_guid")
        .map(|s| parse_guid(&s))
        .transpose()?;

    Ok(Display {
        guid: parse_guid(&row.get::<String, _>("guid"))?,
        name: row.get("name"),
        playback_state,
        current_entry_guid,
        position_seconds: row.get("position_seconds"),
        muted: row.get::<i64, _>("muted") != 0,
        seek_pending: row.get::<i64, _>("seek_pending") != 0,
        next_command_seq: row.get("next_command_seq"),
        last_seen_at: row.get::<Option<DateTime<Utc>>, _>("last_seen_at"),
        created_at: row.get("created_at"),
    })
}

const DISPLAY_COLUMNS: &str = "guid, name, playback_state, current_entry_guid, position_seconds, \
                               muted, seek_pending, next_command_seq, last_seen_at, created_at";

/// Create a new display
pub async fn create_display(db: &Pool<Sqlite>, name: &str) -> Result<Display> {
    if name.trim().is_empty() {
        return Err(Error::InvalidInput("Display name must not be empty".into()));
    }

    let guid = Uuid::new_v4();
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO displays (guid, name, playback_state, created_at) VALUES (?, ?, 'idle', ?)",
    )
    .bind(guid.to_string())
    .bind(name)
    .bind(now)
    .execute(db)
    .await?;

    get_display(db, guid).await
}

/// Fetch a display by id
pub async fn get_display(db: &Pool<Sqlite>, guid: Uuid) -> Result<Display> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM displays WHERE guid = ?",
        DISPLAY_COLUMNS
    ))
    .bind(guid.to_string())
    .fetch_optional(db)
    .await?
    .ok_or_else(|| Error::NotFound(format!("Display {}", guid)))?;

    display_from_row(&row)
}

/// Fetch a display by id inside a transaction
pub async fn get_display_tx(conn: &mut SqliteConnection, guid: Uuid) -> Result<Display> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM displays WHERE guid = ?",
        DISPLAY_COLUMNS
    ))
    .bind(guid.to_string())
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| Error::NotFound(format!("Display {}", guid)))?;

    display_from_row(&row)
}

/// List all displays
pub async fn list_displays(db: &Pool<Sqlite>) -> Result<Vec<Display>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM displays ORDER BY created_at, guid",
        DISPLAY_COLUMNS
    ))
    .fetch_all(db)
    .await?;

    rows.iter().map(display_from_row).collect()
}

/// Rename a display
pub async fn rename_display(db: &Pool<Sqlite>, guid: Uuid, name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::InvalidInput("Display name must not be empty".into()));
    }

    let result = sqlx::query("UPDATE displays SET name = ? WHERE guid = ?")
        .bind(name)
        .bind(guid.to_string())
        .execute(db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Display {}", guid)));
    }
    Ok(())
}

/// Delete a display
///
/// Foreign keys cascade to playlists, blocks, timeline entries, history,
/// and the command log.
pub async fn delete_display(db: &Pool<Sqlite>, guid: Uuid) -> Result<()> {
    let result = sqlx::query("DELETE FROM displays WHERE guid = ?")
        .bind(guid.to_string())
        .execute(db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Display {}", guid)));
    }
    Ok(())
}

/// Record a player heartbeat
pub async fn touch_heartbeat(conn: &mut SqliteConnection, guid: Uuid, at: DateTime<Utc>) -> Result<()> {
    sqlx::query("UPDATE displays SET last_seen_at = ? WHERE guid = ?")
        .bind(at)
        .bind(guid.to_string())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Persist the playback state (idle/playing/paused)
pub async fn set_playback_state(
    conn: &mut SqliteConnection,
    guid: Uuid,
    state: PlaybackState,
) -> Result<()> {
    sqlx::query("UPDATE displays SET playback_state = ? WHERE guid = ?")
        .bind(state.as_str())
        .bind(guid.to_string())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Persist the playback position in seconds
pub async fn set_position(conn: &mut SqliteConnection, guid: Uuid, position: f64) -> Result<()> {
    sqlx::query("UPDATE displays SET position_seconds = ? WHERE guid = ?")
        .bind(position)
        .bind(guid.to_string())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Persist an admin seek
///
/// Sets the pending flag so the next poll pushes the position to the
/// player instead of trusting the player's stale report.
pub async fn set_seek_position(conn: &mut SqliteConnection, guid: Uuid, position: f64) -> Result<()> {
    sqlx::query("UPDATE displays SET position_seconds = ?, seek_pending = 1 WHERE guid = ?")
        .bind(position)
        .bind(guid.to_string())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Mark the pending seek as delivered
pub async fn clear_seek_pending(conn: &mut SqliteConnection, guid: Uuid) -> Result<()> {
    sqlx::query("UPDATE displays SET seek_pending = 0 WHERE guid = ?")
        .bind(guid.to_string())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Persist the mute flag
pub async fn set_muted(conn: &mut SqliteConnection, guid: Uuid, muted: bool) -> Result<()> {
    sqlx::query("UPDATE displays SET muted = ? WHERE guid = ?")
        .bind(muted as i64)
        .bind(guid.to_string())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Point the display at a timeline entry (or nothing)
pub async fn set_current_entry(
    conn: &mut SqliteConnection,
    guid: Uuid,
    entry: Option<Uuid>,
) -> Result<()> {
    sqlx::query("UPDATE displays SET current_entry_guid = ? WHERE guid = ?")
        .bind(entry.map(|e| e.to_string()))
        .bind(guid.to_string())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Allocate the next command sequence number for a display
///
/// Sequence numbers are monotonically increasing and never reused, even
/// after commands are drained, so players can deduplicate redelivery.
pub async fn next_command_seq(conn: &mut SqliteConnection, guid: Uuid) -> Result<i64> {
    let seq: i64 = sqlx::query_scalar("SELECT next_command_seq FROM displays WHERE guid = ?")
        .bind(guid.to_string())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Display {}", guid)))?;

    sqlx::query("UPDATE displays SET next_command_seq = next_command_seq + 1 WHERE guid = ?")
        .bind(guid.to_string())
        .execute(&mut *conn)
        .await?;

    Ok(seq)
}
