//! # Loopwall Control Plane (loopwall-cp)
//!
//! Drives unattended video displays from a central control plane.
//!
//! **Purpose:** Materialize search-defined playlists into concrete,
//! deduplicated, loop-safe timelines per display, track per-display playback
//! state, and reconcile remote players over a push (SSE) plus pull (poll)
//! synchronization protocol.
//!
//! **Architecture:** axum HTTP/SSE surface over a SQLite store; all
//! mutations for a display are serialized through a per-display advisory
//! lock and short display-scoped transactions.

pub mod api;
pub mod catalog;
pub mod db;
pub mod display;
pub mod error;
pub mod scheduler;
pub mod state;

pub use error::{Error, Result};
pub use state::SharedState;
