//! Transport commands and the unified dispatcher
//!
//! All eight command kinds enter through [`dispatch_command`]. The instant
//! kinds (`play`, `pause`, `seek`, `mute`, `unmute`) mutate the display row
//! synchronously and idempotently, so a poll or push immediately after the
//! command reflects the new truth. The discrete kinds (`next`, `previous`,
//! `playVideo`) need a coordinated handoff with the player's render cycle,
//! so they are appended to the display's command log and consumed at most
//! once, in FIFO order, by the next synchronization cycle.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};
use tracing::{debug, info, warn};
use uuid::Uuid;

use loopwall_common::events::{LoopwallEvent, PlaybackState};

use crate::db::{commands as command_log, displays};
use crate::display::machine;
use crate::error::{Error, Result};
use crate::state::SharedState;

/// A discrete playback-control action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum TransportCommand {
    Play,
    Pause,
    Seek { position: f64 },
    Mute,
    Unmute,
    Next,
    Previous,
    PlayVideo { entry: Uuid },
}

impl TransportCommand {
    pub fn kind(&self) -> &'static str {
        match self {
            TransportCommand::Play => "play",
            TransportCommand::Pause => "pause",
            TransportCommand::Seek { .. } => "seek",
            TransportCommand::Mute => "mute",
            TransportCommand::Unmute => "unmute",
            TransportCommand::Next => "next",
            TransportCommand::Previous => "previous",
            TransportCommand::PlayVideo { .. } => "playVideo",
        }
    }

    /// Discrete commands go through the command log; the rest apply
    /// synchronously.
    pub fn is_queued(&self) -> bool {
        matches!(
            self,
            TransportCommand::Next | TransportCommand::Previous | TransportCommand::PlayVideo { .. }
        )
    }

    /// Payload validation, rejected before reaching the state machine
    pub fn validate(&self) -> Result<()> {
        if let TransportCommand::Seek { position } = self {
            if !position.is_finite() || *position < 0.0 {
                return Err(Error::InvalidInput(format!(
                    "Seek position must be a non-negative number, got {}",
                    position
                )));
            }
        }
        Ok(())
    }
}

/// What dispatch did with a command
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchOutcome {
    /// Applied synchronously to the display row
    Applied,
    /// Appended to the command log under this sequence number
    Queued { seq: i64 },
}

/// Unified command entry point
///
/// Caller must hold the display's advisory lock.
pub async fn dispatch_command(
    db: &Pool<Sqlite>,
    state: &SharedState,
    display_guid: Uuid,
    command: TransportCommand,
) -> Result<DispatchOutcome> {
    command.validate()?;

    if command.is_queued() {
        let seq = enqueue(db, display_guid, &command).await?;
        info!("Queued {} command for display {} (seq {})", command.kind(), display_guid, seq);
        state.broadcast_event(LoopwallEvent::CommandQueued {
            display_id: display_guid,
            seq,
            kind: command.kind().to_string(),
            timestamp: Utc::now(),
        });
        return Ok(DispatchOutcome::Queued { seq });
    }

    apply_instant(db, state, display_guid, &command).await?;
    Ok(DispatchOutcome::Applied)
}

async fn enqueue(db: &Pool<Sqlite>, display_guid: Uuid, command: &TransportCommand) -> Result<i64> {
    let mut tx = db.begin().await?;
    let seq = displays::next_command_seq(&mut tx, display_guid).await?;
    command_log::append(&mut tx, display_guid, seq, command).await?;
    tx.commit().await?;
    Ok(seq)
}

/// Apply an instant command to the persisted display row
///
/// Idempotent: applying `play` to an already-playing display, or `mute` to
/// an already-muted one, produces no state change and no push notification.
async fn apply_instant(
    db: &Pool<Sqlite>,
    state: &SharedState,
    display_guid: Uuid,
    command: &TransportCommand,
) -> Result<()> {
    let mut tx = db.begin().await?;
    let display = displays::get_display_tx(&mut tx, display_guid).await?;

    let mut events = Vec::new();

    match command {
        TransportCommand::Play => {
            if display.playback_state == PlaybackState::Playing {
                debug!("Play on already-playing display {} is a no-op", display_guid);
            } else if display.current_entry_guid.is_some() {
                displays::set_playback_state(&mut tx, display_guid, PlaybackState::Playing).await?;
                events.push(LoopwallEvent::PlaybackStateChanged {
                    display_id: display_guid,
                    old_state: display.playback_state,
                    new_state: PlaybackState::Playing,
                    timestamp: Utc::now(),
                });
            } else {
                // Nothing assigned yet: try to start from the head of the queue
                tx.commit().await?;
                machine::advance(db, state, display_guid).await?;
                return Ok(());
            }
        }
        TransportCommand::Pause => {
            if display.playback_state == PlaybackState::Playing {
                displays::set_playback_state(&mut tx, display_guid, PlaybackState::Paused).await?;
                events.push(LoopwallEvent::PlaybackStateChanged {
                    display_id: display_guid,
                    old_state: PlaybackState::Playing,
                    new_state: PlaybackState::Paused,
                    timestamp: Utc::now(),
                });
            } else {
                debug!("Pause on non-playing display {} is a no-op", display_guid);
            }
        }
        TransportCommand::Seek { position } => {
            if (display.position_seconds - position).abs() > f64::EPSILON {
                displays::set_seek_position(&mut tx, display_guid, *position).await?;
                events.push(LoopwallEvent::PositionChanged {
                    display_id: display_guid,
                    position_seconds: *position,
                    timestamp: Utc::now(),
                });
            }
        }
        TransportCommand::Mute | TransportCommand::Unmute => {
            let muted = matches!(command, TransportCommand::Mute);
            if display.muted != muted {
                displays::set_muted(&mut tx, display_guid, muted).await?;
                events.push(LoopwallEvent::MuteChanged {
                    display_id: display_guid,
                    muted,
                    timestamp: Utc::now(),
                });
            }
        }
        TransportCommand::Next | TransportCommand::Previous | TransportCommand::PlayVideo { .. } => {
            unreachable!("queued commands are handled by dispatch_command");
        }
    }

    tx.commit().await?;

    for event in events {
        state.broadcast_event(event);
    }
    Ok(())
}

/// Drain the display's command log and apply the state effects
///
/// Runs once per synchronization cycle. The drain is atomic (select +
/// delete in one transaction), so each command is consumed at most once;
/// the drained list is returned to the player with sequence numbers so a
/// lost response is recoverable and redelivery deduplicable. Application
/// failures are logged, never retried — at-most-once, not at-least-once.
pub async fn drain_and_apply(
    db: &Pool<Sqlite>,
    state: &SharedState,
    display_guid: Uuid,
) -> Result<Vec<command_log::QueuedCommand>> {
    let mut tx = db.begin().await?;
    let drained = command_log::drain(&mut tx, display_guid).await?;
    tx.commit().await?;

    for queued in &drained {
        debug!(
            "Applying queued {} command (seq {}) for display {}",
            queued.command.kind(),
            queued.seq,
            display_guid
        );
        let result = match &queued.command {
            TransportCommand::Next => machine::skip_next(db, state, display_guid).await.map(|_| ()),
            TransportCommand::Previous => {
                machine::skip_previous(db, state, display_guid).await.map(|_| ())
            }
            TransportCommand::PlayVideo { entry } => {
                machine::play_entry(db, state, display_guid, *entry).await.map(|_| ())
            }
            other => {
                warn!("Instant command {} found in command log, ignoring", other.kind());
                Ok(())
            }
        };
        if let Err(e) = result {
            warn!(
                "Failed to apply queued {} command (seq {}) for display {}: {}",
                queued.command.kind(),
                queued.seq,
                display_guid,
                e
            );
        }
    }

    Ok(drained)
}
