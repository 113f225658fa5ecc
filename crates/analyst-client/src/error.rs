//! Error types for the backend collaborators

use analyst_core::CoreError;
use thiserror::Error;

/// Result type alias for client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by upload, signaling, report and event stream calls
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with a non-success status.
    #[error("Backend rejected request ({status}): {reason}")]
    Rejected { status: u16, reason: String },

    #[error("Invalid upload: {0}")]
    InvalidUpload(String),

    #[error("Invalid email address: {0:?}")]
    InvalidEmail(String),

    #[error("Signaling error: {0}")]
    Signaling(String),

    #[error("Event stream error: {0}")]
    Stream(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Human-readable reason from an error body: JSON `detail`, then `error`, else `fallback`.
pub(crate) fn rejection_reason(body: &str, fallback: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| {
            ["detail", "error"]
                .iter()
                .find_map(|key| json.get(*key).and_then(|v| v.as_str()).map(str::to_string))
        })
        .filter(|reason| !reason.trim().is_empty())
        .unwrap_or_else(|| fallback.to_string())
}
