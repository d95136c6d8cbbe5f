//! `multipart/related` body for Drive's `uploadType=multipart` call: one JSON
//! metadata part followed by one base64-transfer-encoded file part.

use serde::Serialize;

pub const BOUNDARY: &str = "-------314159265358979323846";

/// Metadata part of an upload. Field order is the JSON key order on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileMetadata {
    pub name: String,
    pub parents: Vec<String>,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
}

/// Value for the request's `Content-Type` header.
pub fn content_type_header() -> String {
    format!("multipart/related; boundary=\"{}\"", BOUNDARY)
}

/// Encode one upload body.
///
/// `payload` must already be base64 without a data-URI prefix.
pub fn encode(
    metadata: &FileMetadata,
    payload: &str,
    content_type: &str,
) -> Result<String, serde_json::Error> {
    let metadata_json = serde_json::to_string(metadata)?;
    let delimiter = format!("\r\n--{}\r\n", BOUNDARY);
    let close_delimiter = format!("\r\n--{}--", BOUNDARY);

    let mut body = String::with_capacity(
        metadata_json.len() + payload.len() + 2 * delimiter.len() + close_delimiter.len() + 96,
    );
    body.push_str(&delimiter);
    body.push_str("Content-Type: application/json\r\n\r\n");
    body.push_str(&metadata_json);
    body.push_str(&delimiter);
    body.push_str("Content-Type: ");
    body.push_str(content_type);
    body.push_str("\r\n");
    body.push_str("Content-Transfer-Encoding: base64\r\n");
    body.push_str("\r\n");
    body.push_str(payload);
    body.push_str(&close_delimiter);
    Ok(body)
}
