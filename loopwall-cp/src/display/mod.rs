//! Display state machine
//!
//! Per-display persisted playback state plus the unified command path:
//! transport commands apply synchronously to the display row, discrete
//! commands go through the sequence-numbered command log and are applied by
//! the synchronization cycle that drains them.

pub mod commands;
pub mod machine;

pub use commands::{dispatch_command, drain_and_apply, DispatchOutcome, TransportCommand};
