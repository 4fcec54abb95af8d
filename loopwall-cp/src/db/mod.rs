//! Database access layer
//!
//! Query modules per table. Functions that participate in a larger
//! transaction take `&mut SqliteConnection`; standalone operations take the
//! pool and manage their own transaction.

pub mod blocks;
pub mod commands;
pub mod displays;
pub mod history;
pub mod playlists;
pub mod settings;
pub mod timeline;
pub mod videos;
