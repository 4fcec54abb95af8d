//! Error types for loopwall-cp
//!
//! Defines module-specific error types using thiserror for clear error
//! propagation. Validation failures (`InvalidInput`) are kept distinct from
//! `NotFound` so API clients can tell "doesn't exist" from "bad input".

use thiserror::Error;

/// Main error type for loopwall-cp
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database connection or query errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience Result type using loopwall-cp Error
pub type Result<T> = std::result::Result<T, Error>;
