//! Error types for the trigger service.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur in trigger operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Time zone is not one of the accepted zones.
    #[error("invalid time zone: {0}")]
    InvalidTimeZone(String),

    /// Fire time is in the past or too close to now.
    #[error("invalid date: {fire_at} must be at least {min_lead_secs}s after {now}")]
    InvalidDate {
        fire_at: DateTime<Utc>,
        now: DateTime<Utc>,
        min_lead_secs: i64,
    },

    /// Trigger not found.
    #[error("trigger not found: {0}")]
    NotFound(String),

    /// A trigger with this name was created with a different client token.
    #[error("trigger already exists: {0}")]
    AlreadyExists(String),

    /// Client token does not match the one the trigger was created with.
    #[error("client token mismatch for trigger: {0}")]
    TokenMismatch(String),

    /// Schedule expression could not be parsed.
    #[error("invalid schedule expression: {0}")]
    InvalidExpression(String),

    /// SQLite error.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The backing trigger service rejected or failed the call.
    #[error("trigger service unavailable: {0}")]
    Unavailable(String),
}
