//! Sync engine: creates one Drive folder per repair record and uploads its
//! photos into it, strictly one after another in input order.

use std::sync::Arc;

use indicatif::ProgressBar;

use super::client::{DriveApi, UploadUnit};
use super::error::SyncError;
use super::multipart::FileMetadata;
use super::session::{AuthorizedToken, CloudSession};
use crate::payload::strip_data_uri;

/// Characters Drive (and most filesystems the folder may be mirrored to)
/// cannot hold in a name.
const ILLEGAL_NAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];
pub const MAX_FOLDER_NAME_CHARS: usize = 100;

const PHOTO_MIME_TYPE: &str = "image/jpeg";

/// Result of a fully successful sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub folder_id: String,
    pub folder_name: String,
    /// Uploaded file ids, in upload order.
    pub file_ids: Vec<String>,
}

/// Map a plate (or any label) to a bounded, filesystem-safe folder name.
///
/// Pure and idempotent: `sanitize_folder_name(sanitize_folder_name(x)) ==
/// sanitize_folder_name(x)`, and the result never exceeds 100 characters.
pub fn sanitize_folder_name(raw: &str) -> String {
    let replaced: String = raw
        .chars()
        .map(|c| if ILLEGAL_NAME_CHARS.contains(&c) { '_' } else { c })
        .collect();
    let truncated: String = replaced.trim().chars().take(MAX_FOLDER_NAME_CHARS).collect();
    // Truncation can expose trailing whitespace from the middle of the input.
    truncated.trim_end().to_string()
}

/// File name for the photo at 0-based `index`.
pub fn photo_file_name(index: usize) -> String {
    format!("photo_{}.jpg", index + 1)
}

pub struct SyncEngine {
    api: Arc<dyn DriveApi>,
    session: Arc<CloudSession>,
    progress: ProgressBar,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl SyncEngine {
    pub fn new(api: Arc<dyn DriveApi>, session: Arc<CloudSession>) -> Self {
        Self {
            api,
            session,
            progress: ProgressBar::hidden(),
        }
    }

    /// Report "upload N of total" on the given bar.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn session(&self) -> &Arc<CloudSession> {
        &self.session
    }

    /// Create a folder named after `folder_name` and upload `photos` into it.
    ///
    /// Every call creates a new folder; existing folders with the same name
    /// are not looked up. An upload failure stops the job and leaves the
    /// photos uploaded so far in place.
    pub async fn sync(
        &self,
        token: &AuthorizedToken,
        folder_name: &str,
        photos: &[String],
    ) -> Result<SyncReport, SyncError> {
        if !self.session.is_ready() {
            return Err(SyncError::NotReady);
        }

        let folder_name = sanitize_folder_name(folder_name);
        let folder_id = self
            .api
            .create_folder(token, &folder_name)
            .await
            .map_err(|source| SyncError::FolderCreation {
                folder_name: folder_name.clone(),
                source,
            })?;
        tracing::info!(folder = %folder_name, folder_id = %folder_id, "Created Drive folder");

        let total = photos.len();
        self.progress.set_length(total as u64);
        self.progress.set_position(0);

        let mut file_ids = Vec::with_capacity(total);
        for (index, photo) in photos.iter().enumerate() {
            tracing::info!("Uploading photo {}/{}...", index + 1, total);
            let unit = UploadUnit {
                metadata: FileMetadata {
                    name: photo_file_name(index),
                    parents: vec![folder_id.clone()],
                    mime_type: PHOTO_MIME_TYPE.to_string(),
                },
                payload: strip_data_uri(photo),
            };

            match self.api.upload_file(token, &unit).await {
                Ok(file_id) => {
                    file_ids.push(file_id);
                    self.progress.inc(1);
                }
                Err(source) => {
                    self.progress.abandon();
                    tracing::error!(
                        "Upload of {} failed after {} of {} photos: {}",
                        unit.metadata.name,
                        file_ids.len(),
                        total,
                        source
                    );
                    return Err(SyncError::PartialSync {
                        folder_id,
                        uploaded: file_ids.len(),
                        total,
                        source,
                    });
                }
            }
        }

        self.progress.finish();
        Ok(SyncReport {
            folder_id,
            folder_name,
            file_ids,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drive::error::DriveError;
    use crate::drive::session::tests::{session, Bootstrap, FakeClient};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Folder(String),
        Upload {
            name: String,
            parent: String,
            payload: String,
        },
    }

    /// Records calls; can delay or fail the upload with a given payload.
    #[derive(Default)]
    struct RecordingDrive {
        calls: Mutex<Vec<Call>>,
        slow_payload: Option<String>,
        failing_payload: Option<String>,
        fail_folder: bool,
    }

    impl RecordingDrive {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn upload_payloads(&self) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    Call::Upload { payload, .. } => Some(payload),
                    Call::Folder(_) => None,
                })
                .collect()
        }
    }

    #[async_trait::async_trait]
    impl DriveApi for RecordingDrive {
        async fn create_folder(
            &self,
            _token: &AuthorizedToken,
            name: &str,
        ) -> Result<String, DriveError> {
            self.calls.lock().unwrap().push(Call::Folder(name.to_string()));
            if self.fail_folder {
                return Err(DriveError::HttpStatus {
                    status: 401,
                    message: "Invalid Credentials".into(),
                });
            }
            Ok("F1".into())
        }

        async fn upload_file(
            &self,
            _token: &AuthorizedToken,
            unit: &UploadUnit<'_>,
        ) -> Result<String, DriveError> {
            if self.slow_payload.as_deref() == Some(unit.payload) {
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
            self.calls.lock().unwrap().push(Call::Upload {
                name: unit.metadata.name.clone(),
                parent: unit.metadata.parents[0].clone(),
                payload: unit.payload.to_string(),
            });
            if self.failing_payload.as_deref() == Some(unit.payload) {
                return Err(DriveError::HttpStatus {
                    status: 500,
                    message: "Backend Error".into(),
                });
            }
            Ok(format!("id-{}", unit.payload))
        }
    }

    fn token() -> AuthorizedToken {
        AuthorizedToken {
            access_token: "t".into(),
            token_type: "Bearer".into(),
            expires_at: None,
            scope: None,
        }
    }

    async fn ready_engine(drive: Arc<RecordingDrive>) -> SyncEngine {
        let storage = FakeClient::new(Bootstrap::Succeed);
        let identity = FakeClient::new(Bootstrap::Succeed);
        let s = Arc::new(session(&storage, &identity));
        s.ensure_ready().await.unwrap();
        SyncEngine::new(drive, s)
    }

    fn photos(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_sanitize_replaces_illegal_chars() {
        assert_eq!(sanitize_folder_name(r#"a<b>c:d"e/f\g|h?i*j"#), "a_b_c_d_e_f_g_h_i_j");
    }

    #[test]
    fn test_sanitize_trims_whitespace() {
        assert_eq!(sanitize_folder_name("  1234BCD \n"), "1234BCD");
    }

    #[test]
    fn test_sanitize_truncates_to_100_chars() {
        let long = "X".repeat(250);
        assert_eq!(sanitize_folder_name(&long).chars().count(), 100);

        let multibyte = "Ñ".repeat(150);
        assert_eq!(sanitize_folder_name(&multibyte).chars().count(), 100);
    }

    #[test]
    fn test_sanitize_is_idempotent_and_bounded() {
        let mut inputs = vec![
            String::new(),
            "   ".to_string(),
            "AB 12 CD".to_string(),
            " <>:\"/\\|?* ".to_string(),
            "ÅÄÖ plate / 2025".to_string(),
            format!("{} {}", "A".repeat(99), "B".repeat(10)),
            format!("{}\t\t{}", "Z".repeat(98), "tail"),
            "\u{3000}wide space\u{3000}".to_string(),
        ];
        inputs.push("é".repeat(101));
        inputs.push(format!("{}?", "q".repeat(100)));

        for input in &inputs {
            let once = sanitize_folder_name(input);
            assert_eq!(sanitize_folder_name(&once), once, "input: {:?}", input);
            assert!(once.chars().count() <= MAX_FOLDER_NAME_CHARS);
        }
    }

    #[test]
    fn test_sanitize_trailing_space_after_truncation() {
        // Character 100 is a space; the result must not end with it.
        let input = format!("{} {}", "A".repeat(99), "B".repeat(10));
        assert_eq!(sanitize_folder_name(&input), "A".repeat(99));
    }

    #[test]
    fn test_photo_file_name_is_one_based() {
        assert_eq!(photo_file_name(0), "photo_1.jpg");
        assert_eq!(photo_file_name(9), "photo_10.jpg");
    }

    #[tokio::test]
    async fn test_sync_creates_folder_and_uploads_in_order() {
        let drive = Arc::new(RecordingDrive::default());
        let engine = ready_engine(drive.clone()).await;

        let report = engine
            .sync(&token(), " 1234/BCD ", &photos(&["P1", "data:image/jpeg;base64,P2", "P3"]))
            .await
            .unwrap();

        assert_eq!(report.folder_id, "F1");
        assert_eq!(report.folder_name, "1234_BCD");
        assert_eq!(report.file_ids, vec!["id-P1", "id-P2", "id-P3"]);
        assert_eq!(
            drive.calls(),
            vec![
                Call::Folder("1234_BCD".into()),
                Call::Upload {
                    name: "photo_1.jpg".into(),
                    parent: "F1".into(),
                    payload: "P1".into()
                },
                Call::Upload {
                    name: "photo_2.jpg".into(),
                    parent: "F1".into(),
                    payload: "P2".into()
                },
                Call::Upload {
                    name: "photo_3.jpg".into(),
                    parent: "F1".into(),
                    payload: "P3".into()
                },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_upload_does_not_reorder() {
        let drive = Arc::new(RecordingDrive {
            slow_payload: Some("P2".into()),
            ..Default::default()
        });
        let engine = ready_engine(drive.clone()).await;

        engine
            .sync(&token(), "ABC", &photos(&["P1", "P2", "P3"]))
            .await
            .unwrap();

        assert_eq!(drive.upload_payloads(), vec!["P1", "P2", "P3"]);
    }

    #[tokio::test]
    async fn test_second_upload_failure_aborts_remaining() {
        let drive = Arc::new(RecordingDrive {
            failing_payload: Some("P2".into()),
            ..Default::default()
        });
        let engine = ready_engine(drive.clone()).await;

        let err = engine
            .sync(&token(), "ABC", &photos(&["P1", "P2", "P3"]))
            .await
            .unwrap_err();

        match err {
            SyncError::PartialSync {
                folder_id,
                uploaded,
                total,
                ..
            } => {
                assert_eq!(folder_id, "F1");
                assert_eq!(uploaded, 1);
                assert_eq!(total, 3);
            }
            other => panic!("expected PartialSync, got {:?}", other),
        }
        // P3 is never attempted
        assert_eq!(drive.upload_payloads(), vec!["P1", "P2"]);
    }

    #[tokio::test]
    async fn test_folder_failure_uploads_nothing() {
        let drive = Arc::new(RecordingDrive {
            fail_folder: true,
            ..Default::default()
        });
        let engine = ready_engine(drive.clone()).await;

        let err = engine
            .sync(&token(), "ABC", &photos(&["P1"]))
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::FolderCreation { .. }));
        assert!(drive.upload_payloads().is_empty());
    }

    #[tokio::test]
    async fn test_sync_fails_fast_when_session_not_ready() {
        let drive = Arc::new(RecordingDrive::default());
        let storage = FakeClient::new(Bootstrap::Succeed);
        let identity = FakeClient::new(Bootstrap::Succeed);
        let engine = SyncEngine::new(drive.clone(), Arc::new(session(&storage, &identity)));

        let err = engine
            .sync(&token(), "ABC", &photos(&["P1"]))
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::NotReady));
        assert!(drive.calls().is_empty());
    }

    #[tokio::test]
    async fn test_same_plate_twice_creates_two_folders() {
        let drive = Arc::new(RecordingDrive::default());
        let engine = ready_engine(drive.clone()).await;

        engine.sync(&token(), "ABC", &photos(&["P1"])).await.unwrap();
        engine.sync(&token(), "ABC", &photos(&["P1"])).await.unwrap();

        let folders = drive
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Folder(_)))
            .count();
        assert_eq!(folders, 2);
    }

    #[tokio::test]
    async fn test_empty_photo_list_still_creates_folder() {
        let drive = Arc::new(RecordingDrive::default());
        let engine = ready_engine(drive.clone()).await;

        let report = engine.sync(&token(), "ABC", &[]).await.unwrap();

        assert!(report.file_ids.is_empty());
        assert_eq!(drive.calls(), vec![Call::Folder("ABC".into())]);
    }
}
