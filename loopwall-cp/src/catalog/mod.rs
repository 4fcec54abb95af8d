//! Video selection engine
//!
//! Parses block search terms and turns them into concrete, history-aware
//! candidate selections against the video catalog.

pub mod selection;
pub mod term;

pub use selection::{select_videos, SelectionRequest};
pub use term::SearchTerm;
