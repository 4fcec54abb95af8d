//! # Loopwall Common Library
//!
//! Shared code for the loopwall control plane:
//! - Database initialization, schema, and row models
//! - Event types (LoopwallEvent enum)
//! - Configuration resolution
//! - Error types

pub mod config;
pub mod db;
pub mod error;
pub mod events;

pub use error::{Error, Result};
pub use events::PlaybackState;
