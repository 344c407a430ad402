//! Error types for notification storage.

use thiserror::Error;

/// Errors that can occur in store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Record or client not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A stored value could not be decoded.
    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// SQLite error.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// JSON serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The backing store rejected or failed the call.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// A delivery method value outside the known channel set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown delivery channel: {0}")]
pub struct UnknownChannel(pub i64);
