//! Timeline entry queries
//!
//! Absolute positions are strictly increasing per display and never reused,
//! even across repopulation. Status updates go through
//! [`transition_status`], which refuses lifecycle regressions.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite, SqliteConnection};
use uuid::Uuid;

use loopwall_common::db::models::{EntryStatus, TimelineEntry, Video};

use crate::db::displays::parse_guid;
use crate::error::{Error, Result};

fn entry_from_row(row: &SqliteRow) -> Result<TimelineEntry> {
    let status_raw: String = row.get("status");

    Ok(TimelineEntry {
        guid: parse_guid(&row.get::<String, _>("guid"))?,
        display_guid: parse_guid(&row.get::<String, _>("display_guid"))?,
        playlist_guid: parse_guid(&row.get::<String, _>("playlist_guid"))?,
        block_guid: parse_guid(&row.get::<String, _>("block_guid"))?,
        video_guid: parse_guid(&row.get::<String, _>("video_guid"))?,
        block_position: row.get("block_position"),
        absolute_position: row.get("absolute_position"),
        loop_iteration: row.get("loop_iteration"),
        status: EntryStatus::parse(&status_raw)
            .ok_or_else(|| Error::Internal(format!("Invalid entry status in database: {}", status_raw)))?,
        video_title: row.get("video_title"),
        video_url: row.get("video_url"),
        video_width: row.get("video_width"),
        video_height: row.get("video_height"),
        video_duration: row.get::<Option<f64>, _>("video_duration"),
        created_at: row.get("created_at"),
    })
}

const ENTRY_COLUMNS: &str = "guid, display_guid, playlist_guid, block_guid, video_guid, \
                             block_position, absolute_position, loop_iteration, status, \
                             video_title, video_url, video_width, video_height, video_duration, \
                             created_at";

/// First absolute position not yet materialized for a display
pub async fn next_absolute_position(conn: &mut SqliteConnection, display_guid: Uuid) -> Result<i64> {
    let next: i64 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(absolute_position) + 1, 0) FROM timeline_entries WHERE display_guid = ?",
    )
    .bind(display_guid.to_string())
    .fetch_one(&mut *conn)
    .await?;
    Ok(next)
}

/// Append one entry, snapshotting the video's display metadata
pub async fn insert_entry(
    conn: &mut SqliteConnection,
    display_guid: Uuid,
    playlist_guid: Uuid,
    block_guid: Uuid,
    video: &Video,
    block_position: i64,
    absolute_position: i64,
    loop_iteration: i64,
) -> Result<Uuid> {
    let guid = Uuid::new_v4();
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO timeline_entries
            (guid, display_guid, playlist_guid, block_guid, video_guid,
             block_position, absolute_position, loop_iteration, status,
             video_title, video_url, video_width, video_height, video_duration, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'queued', ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(guid.to_string())
    .bind(display_guid.to_string())
    .bind(playlist_guid.to_string())
    .bind(block_guid.to_string())
    .bind(video.guid.to_string())
    .bind(block_position)
    .bind(absolute_position)
    .bind(loop_iteration)
    .bind(&video.title)
    .bind(&video.source_url)
    .bind(video.width)
    .bind(video.height)
    .bind(video.duration)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(guid)
}

/// Fetch an entry by id
pub async fn get_entry(conn: &mut SqliteConnection, guid: Uuid) -> Result<TimelineEntry> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM timeline_entries WHERE guid = ?",
        ENTRY_COLUMNS
    ))
    .bind(guid.to_string())
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| Error::NotFound(format!("Timeline entry {}", guid)))?;

    entry_from_row(&row)
}

/// Move an entry to `next` status, enforcing the monotonic lifecycle
///
/// Returns false (and leaves the row untouched) when the entry is already
/// in `next`; an illegal transition is an internal error.
pub async fn transition_status(
    conn: &mut SqliteConnection,
    entry: &TimelineEntry,
    next: EntryStatus,
) -> Result<bool> {
    if entry.status == next {
        return Ok(false);
    }
    if !entry.status.can_transition_to(next) {
        return Err(Error::Internal(format!(
            "Illegal entry status transition {} -> {} for {}",
            entry.status.as_str(),
            next.as_str(),
            entry.guid
        )));
    }

    sqlx::query("UPDATE timeline_entries SET status = ? WHERE guid = ?")
        .bind(next.as_str())
        .bind(entry.guid.to_string())
        .execute(&mut *conn)
        .await?;
    Ok(true)
}

/// Next queued entry after an absolute position (exclusive)
pub async fn next_queued_after(
    conn: &mut SqliteConnection,
    display_guid: Uuid,
    after: Option<i64>,
) -> Result<Option<TimelineEntry>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM timeline_entries \
         WHERE display_guid = ? AND status = 'queued' AND absolute_position > ? \
         ORDER BY absolute_position LIMIT 1",
        ENTRY_COLUMNS
    ))
    .bind(display_guid.to_string())
    .bind(after.unwrap_or(-1))
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(entry_from_row).transpose()
}

/// Latest already-shown entry strictly before an absolute position
///
/// Used by the `previous` command: replays go to terminal entries only.
pub async fn latest_terminal_before(
    conn: &mut SqliteConnection,
    display_guid: Uuid,
    before: i64,
) -> Result<Option<TimelineEntry>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM timeline_entries \
         WHERE display_guid = ? AND status IN ('played', 'skipped') AND absolute_position < ? \
         ORDER BY absolute_position DESC LIMIT 1",
        ENTRY_COLUMNS
    ))
    .bind(display_guid.to_string())
    .bind(before)
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(entry_from_row).transpose()
}

/// Delete every still-queued entry for a display
///
/// Repopulation never touches `playing`/`played`/`skipped` rows.
pub async fn delete_queued(conn: &mut SqliteConnection, display_guid: Uuid) -> Result<u64> {
    let result = sqlx::query(
        "DELETE FROM timeline_entries WHERE display_guid = ? AND status = 'queued'",
    )
    .bind(display_guid.to_string())
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

/// Mark still-queued entries before an absolute position as skipped
///
/// Used when `playVideo` jumps over part of the queue.
pub async fn skip_queued_before(
    conn: &mut SqliteConnection,
    display_guid: Uuid,
    before: i64,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE timeline_entries SET status = 'skipped' \
         WHERE display_guid = ? AND status = 'queued' AND absolute_position < ?",
    )
    .bind(display_guid.to_string())
    .bind(before)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

/// Count queued entries for a display
pub async fn count_queued(conn: &mut SqliteConnection, display_guid: Uuid) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM timeline_entries WHERE display_guid = ? AND status = 'queued'",
    )
    .bind(display_guid.to_string())
    .fetch_one(&mut *conn)
    .await?;
    Ok(count)
}

/// Entries a block already owns in a loop iteration, any status
///
/// The materializer fills each block up to its target counting what exists,
/// so a repopulation (queued rows just deleted) tops up around the
/// survivors instead of refilling from scratch.
pub async fn count_for_block_in_loop(
    conn: &mut SqliteConnection,
    block_guid: Uuid,
    loop_iteration: i64,
) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM timeline_entries WHERE block_guid = ? AND loop_iteration = ?",
    )
    .bind(block_guid.to_string())
    .bind(loop_iteration)
    .fetch_one(&mut *conn)
    .await?;
    Ok(count)
}

/// Drop queued assignments that belong to playlists other than `keep`
///
/// Run on activation: a superseded playlist's unplayed tail must not leak
/// into the new rotation. Terminal entries stay for history and exclusion.
pub async fn delete_queued_for_other_playlists(
    conn: &mut SqliteConnection,
    display_guid: Uuid,
    keep_playlist: Uuid,
) -> Result<u64> {
    let result = sqlx::query(
        "DELETE FROM timeline_entries \
         WHERE display_guid = ? AND status = 'queued' AND playlist_guid != ?",
    )
    .bind(display_guid.to_string())
    .bind(keep_playlist.to_string())
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

/// Per-block materialization/play counts for one loop iteration
pub async fn block_loop_counts(
    conn: &mut SqliteConnection,
    block_guid: Uuid,
    loop_iteration: i64,
) -> Result<(i64, i64)> {
    let row = sqlx::query(
        "SELECT COUNT(*) AS materialized, \
                COALESCE(SUM(CASE WHEN status = 'played' THEN 1 ELSE 0 END), 0) AS played \
         FROM timeline_entries WHERE block_guid = ? AND loop_iteration = ?",
    )
    .bind(block_guid.to_string())
    .bind(loop_iteration)
    .fetch_one(&mut *conn)
    .await?;

    Ok((row.get::<i64, _>("materialized"), row.get::<i64, _>("played")))
}

/// All entries for a display in absolute order
pub async fn entries_for_display(db: &Pool<Sqlite>, display_guid: Uuid) -> Result<Vec<TimelineEntry>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM timeline_entries WHERE display_guid = ? ORDER BY absolute_position",
        ENTRY_COLUMNS
    ))
    .bind(display_guid.to_string())
    .fetch_all(db)
    .await?;

    rows.iter().map(entry_from_row).collect()
}
