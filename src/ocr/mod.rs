//! Plate recognition: sends one vehicle photo to Gemini's `generateContent`
//! endpoint and normalizes the returned text into plate form (uppercase,
//! alphanumeric only). Rate limits and transient failures are retried with
//! linear backoff before the call gives up.

pub mod error;
pub mod transport;

pub use error::OcrError;
pub use transport::{OcrResponse, OcrTransport};

use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::Credential;
use crate::payload::strip_data_uri;
use crate::retry::{retry_with_backoff, RetryAction, RetryConfig};

const PLATE_PROMPT: &str = "Extract the vehicle license plate number from this image. \
Return ONLY the alphanumeric text. Remove spaces or hyphens. \
Return 'UNKNOWN' if no plate is clearly visible.";

/// Sentinel the model is told to answer with when no plate is visible.
const UNKNOWN_SENTINEL: &str = "UNKNOWN";

const DEFAULT_API_ROOT: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Outcome of one recognition request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionResult {
    PlateText(String),
    Unknown,
    MissingCredential,
    Failure(String),
}

#[derive(Debug, Default, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Default, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Default, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateContentResponse {
    fn first_text(&self) -> Option<&str> {
        self.candidates
            .first()?
            .content
            .as_ref()?
            .parts
            .first()?
            .text
            .as_deref()
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

pub struct RecognitionClient {
    transport: Box<dyn OcrTransport>,
    api_key: Option<Credential>,
    model: String,
    api_root: String,
    retry: RetryConfig,
}

impl std::fmt::Debug for RecognitionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecognitionClient")
            .field("model", &self.model)
            .field("api_key", &self.api_key.is_some())
            .finish_non_exhaustive()
    }
}

impl RecognitionClient {
    pub fn new(
        transport: Box<dyn OcrTransport>,
        api_key: Option<Credential>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            api_key,
            model: model.into(),
            api_root: DEFAULT_API_ROOT.to_string(),
            retry: RetryConfig::default(),
        }
    }

    #[cfg(test)]
    fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    #[cfg(test)]
    fn with_api_root(mut self, api_root: impl Into<String>) -> Self {
        self.api_root = api_root.into();
        self
    }

    /// Recognize the license plate in a base64 JPEG payload.
    ///
    /// A `data:` URI prefix is stripped before transmission. Without a usable
    /// API key this returns `MissingCredential` without touching the network.
    pub async fn recognize(&self, image_payload: &str) -> RecognitionResult {
        let Some(api_key) = &self.api_key else {
            tracing::error!("Recognition API key missing or invalid");
            return RecognitionResult::MissingCredential;
        };

        let body = build_request_body(strip_data_uri(image_payload));
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.api_root,
            self.model,
            api_key.expose()
        );

        tracing::debug!(model = %self.model, "Sending plate recognition request");
        let result = retry_with_backoff(&self.retry, classify, || self.attempt(&url, &body)).await;

        match result {
            Ok(text) => normalize_plate(&text),
            Err(e) => {
                tracing::error!("Plate recognition failed: {}", e);
                RecognitionResult::Failure(e.to_string())
            }
        }
    }

    async fn attempt(&self, url: &str, body: &Value) -> Result<String, OcrError> {
        let resp = self.transport.post_json(url, body).await?;

        if resp.status == 429 {
            return Err(OcrError::RateLimited {
                retry_after: resp.retry_after,
            });
        }
        if !(200..300).contains(&resp.status) {
            let message = serde_json::from_str::<ErrorEnvelope>(&resp.body)
                .ok()
                .and_then(|e| e.error.message)
                .unwrap_or_else(|| format!("Gemini API error: {}", resp.status));
            return Err(OcrError::HttpStatus {
                status: resp.status,
                message,
            });
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&resp.body)?;
        Ok(parsed.first_text().unwrap_or_default().to_string())
    }
}

fn classify(e: &OcrError) -> RetryAction {
    match e.retry_after_secs() {
        Some(secs) => RetryAction::RetryAfter(std::time::Duration::from_secs(secs)),
        None => RetryAction::Retry,
    }
}

fn build_request_body(image_data: &str) -> Value {
    json!({
        "contents": [{
            "parts": [
                { "inlineData": { "mimeType": "image/jpeg", "data": image_data } },
                { "text": PLATE_PROMPT }
            ]
        }]
    })
}

/// Uppercase, keep ASCII alphanumerics only, map empty/sentinel to `Unknown`.
fn normalize_plate(raw: &str) -> RecognitionResult {
    let cleaned: String = raw
        .trim()
        .to_uppercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();

    if cleaned.is_empty() || cleaned == UNKNOWN_SENTINEL {
        RecognitionResult::Unknown
    } else {
        RecognitionResult::PlateText(cleaned)
    }
}
