//! Google Drive replication: session bootstrap, account-picker authorization,
//! folder creation and sequential multipart uploads.

pub mod client;
pub mod endpoints;
pub mod error;
pub mod multipart;
pub mod oauth;
pub mod session;
pub mod sync;

pub use client::{DriveApi, DriveClient};
pub use endpoints::Endpoints;
pub use error::{DriveError, SessionError, SyncError};
pub use oauth::InstalledAppFlow;
pub use session::{CloudSession, SessionPhase};
pub use sync::{SyncEngine, SyncReport};

/// Per-file access: the app only sees files it created.
pub const DRIVE_FILE_SCOPE: &str = "https://www.googleapis.com/auth/drive.file";

/// Ask the user to pick an account, then sync `photos` into a folder named
/// after `folder_name`.
///
/// The account picker opens on every call. Requires a ready session.
pub async fn authenticate_and_sync(
    engine: &SyncEngine,
    folder_name: &str,
    photos: &[String],
) -> Result<SyncReport, SyncError> {
    let session = engine.session();
    if !session.is_ready() {
        tracing::error!(
            "Google Drive client not initialized. Check your internet connection or client ID."
        );
        return Err(SyncError::NotReady);
    }

    let token = session.request_authorization(DRIVE_FILE_SCOPE).await?;
    engine.sync(&token, folder_name, photos).await
}
