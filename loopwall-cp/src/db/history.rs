//! History ledger queries
//!
//! Append-only: rows are written when a video finishes on a display and are
//! never updated. The only delete path is the explicit admin reset.

use chrono::Utc;
use sqlx::{Pool, Sqlite, SqliteConnection};
use uuid::Uuid;

use crate::error::Result;

/// Record that a video was shown on a display
pub async fn insert_record(
    conn: &mut SqliteConnection,
    display_guid: Uuid,
    video_guid: Uuid,
    block_guid: Option<Uuid>,
    loop_iteration: i64,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO history (display_guid, video_guid, block_guid, loop_iteration, created_at) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(display_guid.to_string())
    .bind(video_guid.to_string())
    .bind(block_guid.map(|b| b.to_string()))
    .bind(loop_iteration)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Number of history records for a display
pub async fn count_for_display(db: &Pool<Sqlite>, display_guid: Uuid) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM history WHERE display_guid = ?")
        .bind(display_guid.to_string())
        .fetch_one(db)
        .await?;
    Ok(count)
}

/// Explicit admin reset: drop a display's entire viewing history
pub async fn reset_for_display(db: &Pool<Sqlite>, display_guid: Uuid) -> Result<u64> {
    let result = sqlx::query("DELETE FROM history WHERE display_guid = ?")
        .bind(display_guid.to_string())
        .execute(db)
        .await?;
    Ok(result.rows_affected())
}
