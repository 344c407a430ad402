//! Error types for delivery channels.

use thiserror::Error;

/// Errors that can occur when sending through a channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Email has neither an HTML body nor a template.
    #[error("empty email not allowed")]
    EmptyMessage,

    /// Recipient address or number is missing.
    #[error("invalid recipient: {0}")]
    InvalidRecipient(String),

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Provider answered with a non-success status.
    #[error("provider rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },

    /// The channel could not be reached.
    #[error("channel unavailable: {0}")]
    Unavailable(String),
}
