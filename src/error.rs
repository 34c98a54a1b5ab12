//! Error types for the Waypost gateway

use thiserror::Error;

/// Result type alias for Waypost operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the Waypost gateway
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Authentication/authorization error
    #[error("auth error: {0}")]
    Auth(String),

    /// Telemetry payload failed validation
    #[error("validation error: {0}")]
    Validation(String),

    /// Resource not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// `SQLite` error
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
