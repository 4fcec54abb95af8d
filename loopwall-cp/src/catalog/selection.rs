//! Candidate selection
//!
//! Applies a block's selection mode to the ranked candidate set. A block
//! that finds fewer than its target count under-fills rather than erroring;
//! the materializer tolerates the short batch and the condition stays
//! observable through the progress query.

use rand::seq::SliceRandom;
use sqlx::SqliteConnection;
use tracing::warn;
use uuid::Uuid;

use loopwall_common::db::models::{SelectionMode, Video, VideoFormat};

use crate::catalog::term::SearchTerm;
use crate::db::videos::{self, CandidateFilter};
use crate::error::Result;

/// Parameters for one block-sized selection
#[derive(Debug)]
pub struct SelectionRequest<'a> {
    pub display_guid: Uuid,
    pub term: &'a SearchTerm,
    pub format: VideoFormat,
    pub mode: SelectionMode,
    pub count: i64,
    /// Exclusion scope; see [`CandidateFilter::loop_scope`]
    pub loop_scope: Option<i64>,
}

/// Select up to `count` videos for a block
///
/// `newest` takes the ranked head (publish time descending, stable guid
/// tie-break); `random` draws a uniform sample from the whole eligible set.
pub async fn select_videos(
    conn: &mut SqliteConnection,
    request: &SelectionRequest<'_>,
) -> Result<Vec<Video>> {
    let filter = CandidateFilter {
        term: request.term,
        format: request.format,
        display_guid: request.display_guid,
        loop_scope: request.loop_scope,
    };

    let candidates = videos::search_candidates(conn, &filter).await?;
    let count = request.count.max(0) as usize;

    if candidates.len() < count {
        warn!(
            "Selection under-fill for display {}: wanted {}, found {} eligible candidates",
            request.display_guid,
            count,
            candidates.len()
        );
    }

    let selected = match request.mode {
        SelectionMode::Newest => candidates.into_iter().take(count).collect(),
        SelectionMode::Random => {
            let mut rng = rand::thread_rng();
            let mut sample: Vec<Video> = candidates
                .choose_multiple(&mut rng, count)
                .cloned()
                .collect();
            // Keep the sample's playback order stable
            sample.sort_by(|a, b| b.published_at.cmp(&a.published_at).then(a.guid.cmp(&b.guid)));
            sample
        }
    };

    Ok(selected)
}
