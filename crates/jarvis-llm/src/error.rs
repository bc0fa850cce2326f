//! Error types for the chat client.

use thiserror::Error;

/// Errors that can occur while talking to the inference server.
#[derive(Debug, Error)]
pub enum LlmError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The configured host/port do not form a valid URL.
    #[error("Invalid server endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    /// Server returned a non-success status.
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    /// No data arrived within the configured timeout.
    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),
}
