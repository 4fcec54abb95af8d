//! Timeline materializer
//!
//! The scheduling engine: turns the active playlist's abstract blocks into
//! concrete, ordered timeline entries per display, and keeps the sequence
//! consistent across block edits and loop wraparound.

pub mod materializer;

pub use materializer::{
    materialize_loop, materialize_loop_as_of, repopulate, MaterializeOutcome, RepopulateOutcome,
};
