use reqwest::header::RETRY_AFTER;
use serde_json::Value;

use super::error::OcrError;

/// Raw outcome of one recognition HTTP exchange.
#[derive(Debug, Clone)]
pub struct OcrResponse {
    pub status: u16,
    /// `Retry-After` header in whole seconds, when the server sent one.
    pub retry_after: Option<u64>,
    pub body: String,
}

/// Minimal async transport used by the recognition client.
/// The production implementation is `reqwest::Client`.
#[async_trait::async_trait]
pub trait OcrTransport: Send + Sync {
    async fn post_json(&self, url: &str, body: &Value) -> Result<OcrResponse, OcrError>;
}

#[async_trait::async_trait]
impl OcrTransport for reqwest::Client {
    async fn post_json(&self, url: &str, body: &Value) -> Result<OcrResponse, OcrError> {
        let resp = self.post(url).json(body).send().await?;

        let status = resp.status().as_u16();
        let retry_after = resp
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        let body = resp.text().await?;

        Ok(OcrResponse {
            status,
            retry_after,
            body,
        })
    }
}

/// Only the delta-seconds form is honoured; HTTP-date values fall back to
/// the linear backoff.
fn parse_retry_after(value: &str) -> Option<u64> {
    value.trim().parse::<u64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_http::{self, CannedResponse};
    use serde_json::json;

    #[tokio::test]
    async fn test_post_json_reads_status_and_retry_after() {
        let (base, server) = mock_http::serve(vec![CannedResponse::json(
            429,
            r#"{"error":{"code":429,"message":"Resource has been exhausted"}}"#,
        )
        .with_header("Retry-After", "7")])
        .await;
        let body = json!({ "contents": [{ "parts": [{ "text": "hi" }] }] });

        let resp = reqwest::Client::new()
            .post_json(&format!("{}/v1beta/models/m:generateContent?key=k1", base), &body)
            .await
            .unwrap();

        assert_eq!(resp.status, 429);
        assert_eq!(resp.retry_after, Some(7));
        assert!(resp.body.contains("Resource has been exhausted"));

        let requests = server.await.unwrap();
        assert_eq!(
            requests[0].request_line,
            "POST /v1beta/models/m:generateContent?key=k1 HTTP/1.1"
        );
        assert_eq!(requests[0].header("content-type"), Some("application/json"));
        assert_eq!(requests[0].body_json(), body);
    }

    #[tokio::test]
    async fn test_post_json_without_retry_after() {
        let (base, server) =
            mock_http::serve(vec![CannedResponse::json(200, r#"{"candidates":[]}"#)]).await;

        let resp = reqwest::Client::new()
            .post_json(&base, &json!({}))
            .await
            .unwrap();

        assert_eq!(resp.status, 200);
        assert_eq!(resp.retry_after, None);
        assert_eq!(resp.body, r#"{"candidates":[]}"#);
        server.await.unwrap();
    }

    #[test]
    fn test_parse_retry_after_seconds() {
        assert_eq!(parse_retry_after("30"), Some(30));
        assert_eq!(parse_retry_after(" 5 "), Some(5));
    }

    #[test]
    fn test_parse_retry_after_http_date_ignored() {
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
        assert_eq!(parse_retry_after(""), None);
        assert_eq!(parse_retry_after("-3"), None);
    }
}
