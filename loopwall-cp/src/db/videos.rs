//! Video catalog queries
//!
//! The catalog is a read-only collaborator: ingestion writes it, this
//! service only searches it. Candidate queries combine the parsed search
//! term, the aspect filter, and the display's exclusion set (history plus
//! already-materialized timeline assignments) in one SQL statement so the
//! materializer can run them inside its transaction and see its own
//! uncommitted inserts.

use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};
use uuid::Uuid;

use loopwall_common::db::models::{Video, VideoFormat};

use crate::catalog::term::SearchTerm;
use crate::db::displays::parse_guid;
use crate::error::Result;

/// Filter for one candidate query
#[derive(Debug)]
pub struct CandidateFilter<'a> {
    pub term: &'a SearchTerm,
    pub format: VideoFormat,
    pub display_guid: Uuid,
    /// `Some(loop)` scopes exclusion to that loop iteration (repeats allowed
    /// after a full rotation); `None` excludes for the display's lifetime.
    pub loop_scope: Option<i64>,
}

/// Searchable text: title, description, and creator, lowercased
const HAYSTACK: &str = "lower(v.title || ' ' || COALESCE(v.description, '') || ' ' || COALESCE(v.creator, ''))";

/// Escape LIKE wildcards in a user token (backslash is the escape char)
fn escape_like(token: &str) -> String {
    token
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn video_from_row(row: &SqliteRow) -> Result<Video> {
    Ok(Video {
        guid: parse_guid(&row.get::<String, _>("guid"))?,
        title: row.get("title"),
        description: row.get::<Option<String>, _>("description"),
        creator: row.get::<Option<String>, _>("creator"),
        source_url: row.get("source_url"),
        width: row.get("width"),
        height: row.get("height"),
        duration: row.get::<Option<f64>, _>("duration"),
        published_at: row.get("published_at"),
    })
}

fn push_match_conditions(qb: &mut QueryBuilder<'_, Sqlite>, term: &SearchTerm) {
    for token in &term.include {
        qb.push(" AND ")
            .push(HAYSTACK)
            .push(" LIKE ")
            .push_bind(format!("%{}%", escape_like(token)))
            .push(" ESCAPE '\\'");
    }
    for token in &term.exclude {
        qb.push(" AND ")
            .push(HAYSTACK)
            .push(" NOT LIKE ")
            .push_bind(format!("%{}%", escape_like(token)))
            .push(" ESCAPE '\\'");
    }
}

fn push_format_condition(qb: &mut QueryBuilder<'_, Sqlite>, format: VideoFormat) {
    match format {
        VideoFormat::Mixed => {}
        VideoFormat::Wide => {
            qb.push(" AND v.width > v.height");
        }
        VideoFormat::Tall => {
            qb.push(" AND v.height > v.width");
        }
    }
}

fn push_exclusion_conditions(qb: &mut QueryBuilder<'_, Sqlite>, filter: &CandidateFilter<'_>) {
    qb.push(" AND v.guid NOT IN (SELECT h.video_guid FROM history h WHERE h.display_guid = ")
        .push_bind(filter.display_guid.to_string());
    if let Some(loop_iteration) = filter.loop_scope {
        qb.push(" AND h.loop_iteration = ").push_bind(loop_iteration);
    }
    qb.push(")");

    qb.push(" AND v.guid NOT IN (SELECT t.video_guid FROM timeline_entries t WHERE t.display_guid = ")
        .push_bind(filter.display_guid.to_string());
    if let Some(loop_iteration) = filter.loop_scope {
        qb.push(" AND t.loop_iteration = ").push_bind(loop_iteration);
    }
    qb.push(")");
}

/// Ranked match ordering: exact phrase first, then a word-boundary match for
/// single-token terms, then plain all-tokens relevance; publish time and
/// stable guid order break ties deterministically.
fn push_ranked_order(qb: &mut QueryBuilder<'_, Sqlite>, term: &SearchTerm) {
    let phrase = term.phrase();
    qb.push(" ORDER BY CASE WHEN ")
        .push(HAYSTACK)
        .push(" LIKE ")
        .push_bind(format!("%{}%", escape_like(&phrase)))
        .push(" ESCAPE '\\' THEN 0");

    if let [token] = term.include.as_slice() {
        qb.push(" WHEN ' ' || ")
            .push(HAYSTACK)
            .push(" || ' ' LIKE ")
            .push_bind(format!("% {} %", escape_like(token)))
            .push(" ESCAPE '\\' THEN 1");
    }

    qb.push(" ELSE 2 END, v.published_at DESC, v.guid ASC");
}

/// All eligible candidates for a filter, in ranked order
///
/// Returns every eligible row; the selection engine applies the block's
/// mode (take-first-N or uniform sample) on top.
pub async fn search_candidates(
    conn: &mut SqliteConnection,
    filter: &CandidateFilter<'_>,
) -> Result<Vec<Video>> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT v.guid, v.title, v.description, v.creator, v.source_url, \
         v.width, v.height, v.duration, v.published_at FROM videos v WHERE 1 = 1",
    );

    push_match_conditions(&mut qb, filter.term);
    push_format_condition(&mut qb, filter.format);
    push_exclusion_conditions(&mut qb, filter);
    push_ranked_order(&mut qb, filter.term);

    let rows = qb.build().fetch_all(&mut *conn).await?;
    rows.iter().map(video_from_row).collect()
}

/// Candidate and already-seen counts for the search preview
///
/// `already_seen` counts matching videos the display has in its exclusion
/// set (history or timeline assignment); `candidates` counts the rest.
pub async fn preview_counts(
    conn: &mut SqliteConnection,
    filter: &CandidateFilter<'_>,
) -> Result<(i64, i64)> {
    let mut matching: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT COUNT(*) FROM videos v WHERE 1 = 1");
    push_match_conditions(&mut matching, filter.term);
    push_format_condition(&mut matching, filter.format);
    let total: i64 = matching.build_query_scalar().fetch_one(&mut *conn).await?;

    let mut eligible: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT COUNT(*) FROM videos v WHERE 1 = 1");
    push_match_conditions(&mut eligible, filter.term);
    push_format_condition(&mut eligible, filter.format);
    push_exclusion_conditions(&mut eligible, filter);
    let candidates: i64 = eligible.build_query_scalar().fetch_one(&mut *conn).await?;

    Ok((candidates, total - candidates))
}
