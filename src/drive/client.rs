use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use serde_json::json;

use super::endpoints::Endpoints;
use super::error::{DriveError, SessionError};
use super::multipart::{self, FileMetadata};
use super::session::{AuthorizedToken, StorageBootstrap};
use crate::config::Credential;

pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// One file to upload: metadata plus its base64 payload.
#[derive(Debug, Clone)]
pub struct UploadUnit<'a> {
    pub metadata: FileMetadata,
    pub payload: &'a str,
}

/// The two Drive calls a sync needs.
#[async_trait::async_trait]
pub trait DriveApi: Send + Sync {
    /// Create a folder and return its id.
    async fn create_folder(&self, token: &AuthorizedToken, name: &str)
        -> Result<String, DriveError>;

    /// Upload one file and return its id.
    async fn upload_file(
        &self,
        token: &AuthorizedToken,
        unit: &UploadUnit<'_>,
    ) -> Result<String, DriveError>;
}

#[derive(Debug, Deserialize)]
struct FileResponse {
    #[serde(default)]
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorEnvelope {
    error: GoogleError,
}

#[derive(Debug, Deserialize)]
struct GoogleError {
    #[serde(default)]
    message: Option<String>,
}

/// Drive v3 REST client.
pub struct DriveClient {
    client: reqwest::Client,
    endpoints: Endpoints,
    api_key: Option<Credential>,
}

impl std::fmt::Debug for DriveClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriveClient")
            .field("api_key", &self.api_key.is_some())
            .finish_non_exhaustive()
    }
}

impl DriveClient {
    pub fn new(client: reqwest::Client, endpoints: Endpoints, api_key: Option<Credential>) -> Self {
        Self {
            client,
            endpoints,
            api_key,
        }
    }

    fn key_param(&self) -> Vec<(&'static str, &str)> {
        self.api_key
            .iter()
            .map(|k| ("key", k.expose()))
            .collect()
    }
}

#[async_trait::async_trait]
impl StorageBootstrap for DriveClient {
    async fn initialize(&self) -> Result<(), SessionError> {
        if self.api_key.is_none() {
            return Err(SessionError::MissingCredential("GOOGLE_API_KEY"));
        }

        let response = self
            .client
            .get(self.endpoints.discovery)
            .query(&self.key_param())
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SessionError::InitFailed {
                subsystem: "Drive API",
                reason: error_message(status.as_u16(), &body),
            });
        }

        tracing::debug!("Drive API client initialized");
        Ok(())
    }
}

#[async_trait::async_trait]
impl DriveApi for DriveClient {
    async fn create_folder(
        &self,
        token: &AuthorizedToken,
        name: &str,
    ) -> Result<String, DriveError> {
        let mut query = self.key_param();
        query.push(("fields", "id"));

        let response = self
            .client
            .post(self.endpoints.files)
            .query(&query)
            .bearer_auth(&token.access_token)
            .json(&json!({ "name": name, "mimeType": FOLDER_MIME_TYPE }))
            .send()
            .await?;
        read_file_id(response).await
    }

    async fn upload_file(
        &self,
        token: &AuthorizedToken,
        unit: &UploadUnit<'_>,
    ) -> Result<String, DriveError> {
        let body = multipart::encode(&unit.metadata, unit.payload, &unit.metadata.mime_type)?;

        let mut query = self.key_param();
        query.push(("uploadType", "multipart"));
        query.push(("fields", "id"));

        let response = self
            .client
            .post(self.endpoints.upload)
            .query(&query)
            .bearer_auth(&token.access_token)
            .header(CONTENT_TYPE, multipart::content_type_header())
            .body(body)
            .send()
            .await?;
        read_file_id(response).await
    }
}

async fn read_file_id(response: reqwest::Response) -> Result<String, DriveError> {
    let status = response.status();
    let text = response.text().await?;
    parse_file_id(status.as_u16(), &text)
}

fn parse_file_id(status: u16, body: &str) -> Result<String, DriveError> {
    if !(200..300).contains(&status) {
        return Err(DriveError::HttpStatus {
            status,
            message: error_message(status, body),
        });
    }
    let file: FileResponse = serde_json::from_str(body)?;
    file.id.ok_or(DriveError::MissingId)
}

/// Pull `error.message` out of a Google API error body.
fn error_message(status: u16, body: &str) -> String {
    serde_json::from_str::<GoogleErrorEnvelope>(body)
        .ok()
        .and_then(|e| e.error.message)
        .unwrap_or_else(|| format!("Drive API error: {}", status))
}
