//! Base64 image payloads as handed over by the capture side.

use std::path::Path;

use anyhow::Context;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Drop a `data:image/jpeg;base64,` style prefix, if present.
pub fn strip_data_uri(payload: &str) -> &str {
    match payload.split_once(',') {
        Some((_, data)) => data,
        None => payload,
    }
}

/// Read a JPEG from disk and base64-encode it as-is.
pub async fn encode_jpeg_file(path: &Path) -> anyhow::Result<String> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read photo {}", path.display()))?;
    if !bytes.starts_with(&[0xFF, 0xD8]) {
        tracing::warn!(path = %path.display(), "File does not look like a JPEG");
    }
    Ok(STANDARD.encode(bytes))
}
