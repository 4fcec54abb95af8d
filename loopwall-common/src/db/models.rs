//! Database models and domain enums

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::events::PlaybackState;

/// How a block picks videos from its candidate set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMode {
    /// Most recently published first
    Newest,
    /// Uniform random sample
    Random,
}

impl SelectionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionMode::Newest => "newest",
            SelectionMode::Random => "random",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "newest" => Some(SelectionMode::Newest),
            "random" => Some(SelectionMode::Random),
            _ => None,
        }
    }
}

/// Aspect-ratio filter for a block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoFormat {
    /// No aspect filter
    Mixed,
    /// width > height
    Wide,
    /// height > width
    Tall,
}

impl VideoFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoFormat::Mixed => "mixed",
            VideoFormat::Wide => "wide",
            VideoFormat::Tall => "tall",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "mixed" => Some(VideoFormat::Mixed),
            "wide" => Some(VideoFormat::Wide),
            "tall" => Some(VideoFormat::Tall),
            _ => None,
        }
    }
}

/// Lifecycle status of a timeline entry
///
/// Transitions are monotonic: `queued -> playing -> played`, or
/// `queued -> skipped`. A status never regresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Queued,
    Playing,
    Played,
    Skipped,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Queued => "queued",
            EntryStatus::Playing => "playing",
            EntryStatus::Played => "played",
            EntryStatus::Skipped => "skipped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(EntryStatus::Queued),
            "playing" => Some(EntryStatus::Playing),
            "played" => Some(EntryStatus::Played),
            "skipped" => Some(EntryStatus::Skipped),
            _ => None,
        }
    }

    /// Whether moving to `next` respects the monotonic lifecycle
    pub fn can_transition_to(&self, next: EntryStatus) -> bool {
        matches!(
            (self, next),
            (EntryStatus::Queued, EntryStatus::Playing)
                | (EntryStatus::Queued, EntryStatus::Skipped)
                | (EntryStatus::Playing, EntryStatus::Played)
        )
    }

    /// Terminal statuses never transition again
    pub fn is_terminal(&self) -> bool {
        matches!(self, EntryStatus::Played | EntryStatus::Skipped)
    }
}

/// A registered display (player endpoint)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Display {
    pub guid: Uuid,
    pub name: String,
    /// Persisted state; `offline` is derived from `last_seen_at` on read
    pub playback_state: PlaybackState,
    pub current_entry_guid: Option<Uuid>,
    pub position_seconds: f64,
    pub muted: bool,
    /// An admin seek not yet delivered to the player; while set, the poll
    /// channel does not trust the player-reported position
    pub seek_pending: bool,
    /// Next sequence number for the command log (monotonic, never reused)
    pub next_command_seq: i64,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A playlist owned by a display
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Playlist {
    pub guid: Uuid,
    pub display_guid: Uuid,
    pub name: String,
    pub is_active: bool,
    /// Denormalized: number of blocks
    pub block_count: i64,
    /// Denormalized: sum of block target counts
    pub video_count: i64,
    /// Completed traversals of the whole block sequence
    pub loop_count: i64,
    pub created_at: DateTime<Utc>,
}

/// A search-defined segment of a playlist
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub guid: Uuid,
    pub playlist_guid: Uuid,
    pub search_term: String,
    pub target_count: i64,
    pub selection_mode: SelectionMode,
    pub format: VideoFormat,
    /// Dense zero-based ordinal within the playlist
    pub position: i64,
    pub times_played: i64,
    pub last_played_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// One concrete video assignment on a display's timeline
///
/// Carries a snapshot of the video's display metadata so playback does not
/// depend on the catalog remaining queryable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub guid: Uuid,
    pub display_guid: Uuid,
    pub playlist_guid: Uuid,
    pub block_guid: Uuid,
    pub video_guid: Uuid,
    /// Zero-based position within the originating block
    pub block_position: i64,
    /// Strictly increasing per display, never reused
    pub absolute_position: i64,
    /// Loop numbering is global to the playlist, not per-block
    pub loop_iteration: i64,
    pub status: EntryStatus,
    pub video_title: String,
    pub video_url: String,
    pub video_width: i64,
    pub video_height: i64,
    pub video_duration: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// Append-only record that a video was shown on a display
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: i64,
    pub display_guid: Uuid,
    pub video_guid: Uuid,
    /// Not a foreign key: history outlives block deletion
    pub block_guid: Option<Uuid>,
    pub loop_iteration: i64,
    pub created_at: DateTime<Utc>,
}

/// A candidate video in the catalog (read-only from this service)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Video {
    pub guid: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub creator: Option<String>,
    pub source_url: String,
    pub width: i64,
    pub height: i64,
    pub duration: Option<f64>,
    pub published_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_status_is_monotonic() {
        use EntryStatus::*;
        assert!(Queued.can_transition_to(Playing));
        assert!(Queued.can_transition_to(Skipped));
        assert!(Playing.can_transition_to(Played));

        // No regressions, no resurrection of terminal states
        assert!(!Playing.can_transition_to(Queued));
        assert!(!Played.can_transition_to(Playing));
        assert!(!Played.can_transition_to(Queued));
        assert!(!Skipped.can_transition_to(Playing));
        assert!(!Playing.can_transition_to(Skipped));
    }

    #[test]
    fn enums_parse_their_own_names() {
        assert_eq!(SelectionMode::parse("newest"), Some(SelectionMode::Newest));
        assert_eq!(SelectionMode::parse("oldest"), None);
        assert_eq!(VideoFormat::parse("tall"), Some(VideoFormat::Tall));
        assert_eq!(EntryStatus::parse("skipped"), Some(EntryStatus::Skipped));
    }
}
