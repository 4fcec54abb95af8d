//! Event types for the loopwall push channel
//!
//! Every mutation the control plane considers interesting to a connected
//! player or dashboard is broadcast as a [`LoopwallEvent`]. Events are
//! serialized for SSE transmission; the pull channel remains the source of
//! truth, so a dropped event is never fatal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Playback state of a display
///
/// `Offline` is derived from the heartbeat (`last_seen_at`), never stored:
/// the persisted states are `Idle`, `Playing`, and `Paused`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    /// No recent heartbeat from the player process
    Offline,
    /// Connected but nothing assigned (empty timeline)
    Idle,
    /// Advancing through the timeline
    Playing,
    /// Holding on the current entry
    Paused,
}

impl PlaybackState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackState::Offline => "offline",
            PlaybackState::Idle => "idle",
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "offline" => Some(PlaybackState::Offline),
            "idle" => Some(PlaybackState::Idle),
            "playing" => Some(PlaybackState::Playing),
            "paused" => Some(PlaybackState::Paused),
            _ => None,
        }
    }
}

/// Loopwall event types
///
/// Events are broadcast via the shared state's event channel and streamed to
/// players over per-display SSE connections. Every variant carries the
/// display it concerns so the SSE endpoint can filter the shared bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LoopwallEvent {
    /// Playback state changed (idle/playing/paused)
    ///
    /// Not emitted for idempotent no-op commands (play while playing).
    PlaybackStateChanged {
        display_id: Uuid,
        old_state: PlaybackState,
        new_state: PlaybackState,
        timestamp: DateTime<Utc>,
    },

    /// The display's current timeline entry changed
    ///
    /// Pushed so a connected player can switch without waiting for its next
    /// poll. `entry_id`/`video_id` are None when the timeline ran dry.
    NowPlayingChanged {
        display_id: Uuid,
        entry_id: Option<Uuid>,
        video_id: Option<Uuid>,
        title: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// Playback position changed by an admin seek
    PositionChanged {
        display_id: Uuid,
        position_seconds: f64,
        timestamp: DateTime<Utc>,
    },

    /// Mute flag changed
    MuteChanged {
        display_id: Uuid,
        muted: bool,
        timestamp: DateTime<Utc>,
    },

    /// A discrete command was appended to the display's command log
    CommandQueued {
        display_id: Uuid,
        seq: i64,
        kind: String,
        timestamp: DateTime<Utc>,
    },

    /// A playlist became the display's active playlist
    PlaylistActivated {
        display_id: Uuid,
        playlist_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// The materializer appended timeline entries
    TimelineExtended {
        display_id: Uuid,
        playlist_id: Uuid,
        entry_count: usize,
        loop_iteration: i64,
        timestamp: DateTime<Utc>,
    },

    /// A block edit or maintenance call rebuilt the queued tail of the timeline
    TimelineRepopulated {
        display_id: Uuid,
        playlist_id: Uuid,
        removed: u64,
        added: usize,
        timestamp: DateTime<Utc>,
    },

    /// The display consumed its last queued entry and wrapped around
    LoopCompleted {
        display_id: Uuid,
        playlist_id: Uuid,
        loop_count: i64,
        timestamp: DateTime<Utc>,
    },

    /// The timeline has no content to assign ("no content" state)
    TimelineEmpty {
        display_id: Uuid,
        timestamp: DateTime<Utc>,
    },
}

impl LoopwallEvent {
    /// Display this event concerns (used by the SSE endpoint to filter)
    pub fn display_id(&self) -> Uuid {
        match self {
            LoopwallEvent::PlaybackStateChanged { display_id, .. }
            | LoopwallEvent::NowPlayingChanged { display_id, .. }
            | LoopwallEvent::PositionChanged { display_id, .. }
            | LoopwallEvent::MuteChanged { display_id, .. }
            | LoopwallEvent::CommandQueued { display_id, .. }
            | LoopwallEvent::PlaylistActivated { display_id, .. }
            | LoopwallEvent::TimelineExtended { display_id, .. }
            | LoopwallEvent::TimelineRepopulated { display_id, .. }
            | LoopwallEvent::LoopCompleted { display_id, .. }
            | LoopwallEvent::TimelineEmpty { display_id, .. } => *display_id,
        }
    }

    /// Event type string for the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            LoopwallEvent::PlaybackStateChanged { .. } => "PlaybackStateChanged",
            LoopwallEvent::NowPlayingChanged { .. } => "NowPlayingChanged",
            LoopwallEvent::PositionChanged { .. } => "PositionChanged",
            LoopwallEvent::MuteChanged { .. } => "MuteChanged",
            LoopwallEvent::CommandQueued { .. } => "CommandQueued",
            LoopwallEvent::PlaylistActivated { .. } => "PlaylistActivated",
            LoopwallEvent::TimelineExtended { .. } => "TimelineExtended",
            LoopwallEvent::TimelineRepopulated { .. } => "TimelineRepopulated",
            LoopwallEvent::LoopCompleted { .. } => "LoopCompleted",
            LoopwallEvent::TimelineEmpty { .. } => "TimelineEmpty",
        }
    }
}
