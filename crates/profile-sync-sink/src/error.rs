//! Web-system sync error types.

use thiserror::Error;

/// Web-system sync error type.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The web system rejected the request
    #[error("Web system rejected request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using SyncError.
pub type SyncResult<T> = Result<T, SyncError>;
