//! Command log queries
//!
//! The pending-command list is a proper ordered, sequence-numbered log, not
//! an opaque blob: each row carries the display-scoped `seq` allocated at
//! enqueue time, so drains are FIFO and redelivery is deduplicable.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Pool, Row, Sqlite, SqliteConnection};
use uuid::Uuid;

use crate::display::commands::TransportCommand;
use crate::error::{Error, Result};

/// A command waiting in a display's log
#[derive(Debug, Clone, Serialize)]
pub struct QueuedCommand {
    pub seq: i64,
    #[serde(flatten)]
    pub command: TransportCommand,
    pub issued_at: DateTime<Utc>,
}

/// Append a command under an already-allocated sequence number
pub async fn append(
    conn: &mut SqliteConnection,
    display_guid: Uuid,
    seq: i64,
    command: &TransportCommand,
) -> Result<()> {
    let payload = serde_json::to_string(command)
        .map_err(|e| Error::Internal(format!("Failed to serialize command: {}", e)))?;

    sqlx::query(
        "INSERT INTO commands (display_guid, seq, kind, payload, issued_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(display_guid.to_string())
    .bind(seq)
    .bind(command.kind())
    .bind(payload)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Drain a display's pending commands in FIFO order
///
/// Selection and deletion happen on the caller's transaction, so a drained
/// command is consumed exactly once even if the response is lost — the
/// player deduplicates on `seq`.
pub async fn drain(conn: &mut SqliteConnection, display_guid: Uuid) -> Result<Vec<QueuedCommand>> {
    let rows = sqlx::query(
        "SELECT seq, payload, issued_at FROM commands WHERE display_guid = ? ORDER BY seq",
    )
    .bind(display_guid.to_string())
    .fetch_all(&mut *conn)
    .await?;

    let mut drained = Vec::with_capacity(rows.len());
    for row in &rows {
        let payload: String = row.get("payload");
        let command: TransportCommand = serde_json::from_str(&payload)
            .map_err(|e| Error::Internal(format!("Corrupt command payload: {}", e)))?;
        drained.push(QueuedCommand {
            seq: row.get("seq"),
            command,
            issued_at: row.get("issued_at"),
        });
    }

    sqlx::query("DELETE FROM commands WHERE display_guid = ?")
        .bind(display_guid.to_string())
        .execute(&mut *conn)
        .await?;

    Ok(drained)
}

/// Number of commands waiting for a display
pub async fn pending_count(db: &Pool<Sqlite>, display_guid: Uuid) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM commands WHERE display_guid = ?")
        .bind(display_guid.to_string())
        .fetch_one(db)
        .await?;
    Ok(count)
}
