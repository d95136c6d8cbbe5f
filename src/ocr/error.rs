use thiserror::Error;

/// Errors from a single recognition attempt.
///
/// Every variant is transient from the client's point of view: the retry loop
/// keeps going until the attempt budget runs out. `RateLimited` additionally
/// carries the server's `Retry-After` hint.
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("Rate limited by recognition API (retry after {retry_after:?}s)")]
    RateLimited { retry_after: Option<u64> },

    #[error("Recognition API error (HTTP {status}): {message}")]
    HttpStatus { status: u16, message: String },

    #[error("Malformed recognition response: {0}")]
    MalformedResponse(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl OcrError {
    /// Server-provided delay before the next attempt, if any.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            OcrError::RateLimited {
                retry_after: Some(secs),
            } if *secs > 0 => Some(*secs),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_after_present() {
        let e = OcrError::RateLimited {
            retry_after: Some(12),
        };
        assert_eq!(e.retry_after_secs(), Some(12));
    }

    #[test]
    fn test_retry_after_zero_is_ignored() {
        let e = OcrError::RateLimited {
            retry_after: Some(0),
        };
        assert_eq!(e.retry_after_secs(), None);
    }

    #[test]
    fn test_retry_after_only_for_rate_limit() {
        let e = OcrError::HttpStatus {
            status: 503,
            message: "unavailable".into(),
        };
        assert_eq!(e.retry_after_secs(), None);
    }

    #[test]
    fn test_display_includes_status() {
        let e = OcrError::HttpStatus {
            status: 400,
            message: "API key not valid".into(),
        };
        assert_eq!(
            e.to_string(),
            "Recognition API error (HTTP 400): API key not valid"
        );
    }
}
