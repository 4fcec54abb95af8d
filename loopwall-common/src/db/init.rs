//! Database initialization
//!
//! Creates the database on first run and brings the schema up idempotently.
//! Every `create_*_table` call is safe to repeat (`CREATE TABLE IF NOT
//! EXISTS`), so startup doubles as migration for fresh columns-free deploys.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // Enable foreign keys (required for display cascade deletes)
    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    // WAL allows concurrent readers while one display-scoped writer commits
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;

    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    init_schema(&pool).await?;
    init_settings_defaults(&pool).await?;

    Ok(pool)
}

/// Create all tables (idempotent - safe to call multiple times)
///
/// Split out of [`init_database`] so tests can run the real schema against
/// an in-memory pool.
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;

    create_displays_table(pool).await?;
    create_playlists_table(pool).await?;
    create_blocks_table(pool).await?;
    create_timeline_entries_table(pool).await?;
    create_history_table(pool).await?;
    create_commands_table(pool).await?;
    create_videos_table(pool).await?;
    create_settings_table(pool).await?;

    Ok(())
}

async fn create_displays_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS displays (
            guid TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            playback_state TEXT NOT NULL DEFAULT 'idle',
            current_entry_guid TEXT,
            position_seconds REAL NOT NULL DEFAULT 0,
            muted INTEGER NOT NULL DEFAULT 0,
            seek_pending INTEGER NOT NULL DEFAULT 0,
            next_command_seq INTEGER NOT NULL DEFAULT 1,
            last_seen_at TIMESTAMP,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_playlists_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS playlists (
            guid TEXT PRIMARY KEY,
            display_guid TEXT NOT NULL REFERENCES displays(guid) ON DELETE CASCADE,
            name TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 0,
            block_count INTEGER NOT NULL DEFAULT 0,
            video_count INTEGER NOT NULL DEFAULT 0,
            loop_count INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_playlists_display ON playlists(display_guid)",
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_blocks_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS blocks (
            guid TEXT PRIMARY KEY,
            playlist_guid TEXT NOT NULL REFERENCES playlists(guid) ON DELETE CASCADE,
            search_term TEXT NOT NULL,
            target_count INTEGER NOT NULL,
            selection_mode TEXT NOT NULL,
            format TEXT NOT NULL,
            position INTEGER NOT NULL,
            times_played INTEGER NOT NULL DEFAULT 0,
            last_played_at TIMESTAMP,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_blocks_playlist ON blocks(playlist_guid, position)",
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_timeline_entries_table(pool: &SqlitePool) -> Result<()> {
    // block_guid is deliberately not a foreign key: played entries and their
    // snapshots outlive block deletion.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS timeline_entries (
            guid TEXT PRIMARY KEY,
            display_guid TEXT NOT NULL REFERENCES displays(guid) ON DELETE CASCADE,
            playlist_guid TEXT NOT NULL REFERENCES playlists(guid) ON DELETE CASCADE,
            block_guid TEXT NOT NULL,
            video_guid TEXT NOT NULL,
            block_position INTEGER NOT NULL,
            absolute_position INTEGER NOT NULL,
            loop_iteration INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'queued',
            video_title TEXT NOT NULL,
            video_url TEXT NOT NULL,
            video_width INTEGER NOT NULL,
            video_height INTEGER NOT NULL,
            video_duration REAL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_timeline_display_abs
            ON timeline_entries(display_guid, absolute_position)
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_timeline_display_status ON timeline_entries(display_guid, status)",
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_history_table(pool: &SqlitePool) -> Result<()> {
    // Append-only; block_guid is not a foreign key so history survives
    // playlist and block deletion (only display deletion cascades).
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            display_guid TEXT NOT NULL REFERENCES displays(guid) ON DELETE CASCADE,
            video_guid TEXT NOT NULL,
            block_guid TEXT,
            loop_iteration INTEGER NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_history_display_video ON history(display_guid, video_guid)",
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_commands_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS commands (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            display_guid TEXT NOT NULL REFERENCES displays(guid) ON DELETE CASCADE,
            seq INTEGER NOT NULL,
            kind TEXT NOT NULL,
            payload TEXT NOT NULL,
            issued_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE(display_guid, seq)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_videos_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS videos (
            guid TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT,
            creator TEXT,
            source_url TEXT NOT NULL,
            width INTEGER NOT NULL,
            height INTEGER NOT NULL,
            duration REAL,
            published_at TIMESTAMP NOT NULL,
            added_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_videos_published ON videos(published_at)",
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Initialize settings table with default values
pub async fn init_settings_defaults(pool: &SqlitePool) -> Result<()> {
    info!("Initializing default settings");

    let defaults = vec![
        // History exclusion scope: "lifetime" (never repeat) or "loop"
        // (repeats permitted after a full rotation)
        ("history_scope", "lifetime"),
        // Heartbeat staleness threshold before a display reads as offline
        ("display_offline_after_seconds", "60"),
        // Suggested poll interval returned to players in sync responses
        ("sync_poll_interval_seconds", "5"),
    ];

    for (key, default_value) in defaults {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM settings WHERE key = ?)")
                .bind(key)
                .fetch_one(pool)
                .await?;

        if !exists {
            sqlx::query("INSERT INTO settings (key, value) VALUES (?, ?)")
                .bind(key)
                .bind(default_value)
                .execute(pool)
                .await?;

            info!("Initialized setting '{}' with default value: {}", key, default_value);
        }
    }

    Ok(())
}
