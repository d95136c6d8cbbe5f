use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Errors from the cloud session lifecycle (bootstrap and authorization).
///
/// Cloneable so every caller waiting on one initialization sees the same
/// failure.
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    #[error("Missing credential: {0} is not configured")]
    MissingCredential(&'static str),

    #[error("{subsystem} client failed to initialize: {reason}")]
    InitFailed {
        subsystem: &'static str,
        reason: String,
    },

    #[error("Timed out after {0:?} waiting for Google clients to load")]
    Timeout(Duration),

    #[error("Google Drive client not initialized")]
    NotReady,

    #[error("Authorization denied: {error}{}", .description.as_deref().map(|d| format!(" ({d})")).unwrap_or_default())]
    AuthorizationDenied {
        error: String,
        description: Option<String>,
    },

    #[error("Invalid authorization callback: {0}")]
    Callback(String),

    #[error(transparent)]
    Http(Arc<reqwest::Error>),

    #[error(transparent)]
    Io(Arc<std::io::Error>),

    #[error(transparent)]
    Json(Arc<serde_json::Error>),
}

impl From<reqwest::Error> for SessionError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(Arc::new(e))
    }
}

impl From<std::io::Error> for SessionError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(Arc::new(e))
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(Arc::new(e))
    }
}

/// Errors from a single Drive API call.
#[derive(Debug, Error)]
pub enum DriveError {
    #[error("Drive API error (HTTP {status}): {message}")]
    HttpStatus { status: u16, message: String },

    #[error("Drive API response is missing the file id")]
    MissingId,

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Errors from a whole sync job.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Google Drive session is not ready")]
    NotReady,

    #[error(transparent)]
    Authorization(#[from] SessionError),

    #[error("Failed to create Drive folder '{folder_name}': {source}")]
    FolderCreation {
        folder_name: String,
        source: DriveError,
    },

    /// Folder creation succeeded but an upload failed; earlier uploads stay
    /// in the remote folder.
    #[error("Synced {uploaded} of {total} photos to folder {folder_id} before failing: {source}")]
    PartialSync {
        folder_id: String,
        uploaded: usize,
        total: usize,
        source: DriveError,
    },
}
