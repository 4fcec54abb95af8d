//! Settings database access
//!
//! Read/write settings from the settings table (key-value store).
//! All settings are global/system-wide.

use crate::error::Result;
use sqlx::{Pool, Sqlite};
use std::str::FromStr;

/// History exclusion scope policy
///
/// `Lifetime`: a video shown to a display is never selected again for it.
/// `Loop`: exclusion is scoped to the loop iteration, so repeats are
/// permitted after a full rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryScope {
    Lifetime,
    Loop,
}

/// Get the history exclusion scope (defaults to lifetime)
pub async fn get_history_scope(db: &Pool<Sqlite>) -> Result<HistoryScope> {
    match get_setting::<String>(db, "history_scope").await?.as_deref() {
        Some("loop") => Ok(HistoryScope::Loop),
        _ => Ok(HistoryScope::Lifetime),
    }
}

/// Set the history exclusion scope
pub async fn set_history_scope(db: &Pool<Sqlite>, scope: HistoryScope) -> Result<()> {
    let value = match scope {
        HistoryScope::Lifetime => "lifetime",
        HistoryScope::Loop => "loop",
    };
    set_setting(db, "history_scope", value).await
}

/// Seconds without a heartbeat before a display reads as offline
pub async fn get_offline_after_seconds(db: &Pool<Sqlite>) -> Result<i64> {
    Ok(get_setting::<i64>(db, "display_offline_after_seconds")
        .await?
        .unwrap_or(60))
}

/// Poll interval suggested to players in sync responses
pub async fn get_sync_poll_interval(db: &Pool<Sqlite>) -> Result<i64> {
    Ok(get_setting::<i64>(db, "sync_poll_interval_seconds")
        .await?
        .unwrap_or(5))
}

/// Get a setting value parsed as type T
async fn get_setting<T: FromStr>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>> {
    let row: Option<(Option<String>,)> =
        sqlx::query_as("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(db)
            .await?;

    match row {
        Some((Some(value),)) => Ok(value.parse::<T>().ok()),
        _ => Ok(None),
    }
}

/// Set a setting value (insert or replace)
async fn set_setting<T: ToString>(db: &Pool<Sqlite>, key: &str, value: T) -> Result<()> {
    sqlx::query("INSERT OR REPLACE INTO settings (key, value) VALUES (?, ?)")
        .bind(key)
        .bind(value.to_string())
        .execute(db)
        .await?;
    Ok(())
}
