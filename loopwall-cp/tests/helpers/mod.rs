//! Shared test fixtures
//!
//! Builds a file-backed test database through the real schema
//! initialization path and seeds the video catalog the way the ingestion
//! collaborator would.

#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use tempfile::TempDir;
use uuid::Uuid;

use loopwall_common::db::models::{SelectionMode, VideoFormat};
use loopwall_cp::db::blocks::BlockDefinition;

pub struct TestDb {
    pub pool: SqlitePool,
    // Keeps the database file alive for the test's duration
    _dir: TempDir,
}

/// Fresh database with the full schema and default settings
pub async fn test_db() -> TestDb {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let pool = loopwall_common::db::init_database(&dir.path().join("loopwall.db"))
        .await
        .expect("Failed to initialize test database");
    TestDb { pool, _dir: dir }
}

/// Seed one catalog video published `age_days` ago
pub async fn seed_video(
    pool: &SqlitePool,
    title: &str,
    description: &str,
    width: i64,
    height: i64,
    age_days: i64,
) -> Uuid {
    seed_video_at(pool, title, description, width, height, Utc::now() - Duration::days(age_days))
        .await
}

/// Seed one catalog video with an exact publish timestamp
pub async fn seed_video_at(
    pool: &SqlitePool,
    title: &str,
    description: &str,
    width: i64,
    height: i64,
    published_at: DateTime<Utc>,
) -> Uuid {
    let guid = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO videos (guid, title, description, creator, source_url, width, height, duration, published_at, added_at) \
         VALUES (?, ?, ?, NULL, ?, ?, ?, 30.0, ?, ?)",
    )
    .bind(guid.to_string())
    .bind(title)
    .bind(description)
    .bind(format!("https://cdn.example/{}.mp4", guid))
    .bind(width)
    .bind(height)
    .bind(published_at)
    .bind(Utc::now())
    .execute(pool)
    .await
    .expect("Failed to seed video");
    guid
}

pub fn block_def(term: &str, count: i64, mode: SelectionMode, format: VideoFormat) -> BlockDefinition {
    BlockDefinition {
        search_term: term.to_string(),
        target_count: count,
        selection_mode: mode,
        format,
    }
}
