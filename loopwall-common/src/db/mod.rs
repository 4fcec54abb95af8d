//! Database access layer shared across loopwall services
//!
//! Schema creation lives here; per-table query modules live in the service
//! crates that own the mutation paths.

pub mod init;
pub mod models;

pub use init::{init_database, init_schema, init_settings_defaults};
