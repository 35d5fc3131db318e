//! YouTube API error types.

use std::path::PathBuf;

use serde_json::Value;
use thiserror::Error;

/// Result type for YouTube operations.
pub type YoutubeResult<T> = Result<T, YoutubeError>;

/// Error reasons that mean the account's daily allowance is spent.
pub const QUOTA_REASONS: &[&str] = &["uploadLimitExceeded", "quotaExceeded"];

/// Errors that can occur while talking to YouTube.
#[derive(Debug, Error)]
pub enum YoutubeError {
    #[error("{reason}: {message}")]
    QuotaExceeded { reason: String, message: String },

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Credentials error: {0}")]
    Credentials(String),

    #[error("Token refresh failed: {0}")]
    TokenRefresh(String),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Upload failed after {0} retries")]
    RetriesExhausted(u32),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Account error: {0}")]
    Account(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl YoutubeError {
    pub fn credentials(msg: impl Into<String>) -> Self {
        Self::Credentials(msg.into())
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    pub fn account(msg: impl Into<String>) -> Self {
        Self::Account(msg.into())
    }

    /// Classify an error response body, detecting quota reasons.
    pub fn from_http_status(status: u16, body: &str) -> Self {
        let parsed: Option<Value> = serde_json::from_str(body).ok();
        let error = parsed.as_ref().and_then(|v| v.get("error"));
        let message = error
            .and_then(|e| e.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| body.trim().to_string());

        let reasons: Vec<&str> = error
            .and_then(|e| e.get("errors"))
            .and_then(Value::as_array)
            .map(|errors| {
                errors
                    .iter()
                    .filter_map(|e| e.get("reason").and_then(Value::as_str))
                    .collect()
            })
            .unwrap_or_default();

        let quota_reason = QUOTA_REASONS
            .iter()
            .find(|r| reasons.contains(*r) || body.contains(**r));
        match quota_reason {
            Some(reason) => Self::QuotaExceeded {
                reason: (*reason).to_string(),
                message,
            },
            None => Self::Http { status, message },
        }
    }

    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }

    /// Server errors and network failures are retried by the uploader.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { status, .. } => matches!(status, 500 | 502 | 503 | 504),
            Self::Network(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_reason_detected() {
        let body = r#"{"error": {"code": 403, "message": "The user has exceeded the number of videos they may upload.",
            "errors": [{"domain": "youtube.video", "reason": "uploadLimitExceeded"}]}}"#;
        let err = YoutubeError::from_http_status(403, body);
        assert!(err.is_quota_exceeded());
        assert!(err.to_string().starts_with("uploadLimitExceeded"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_daily_quota_detected() {
        let body = r#"{"error": {"code": 403, "message": "quota", "errors": [{"reason": "quotaExceeded"}]}}"#;
        assert!(YoutubeError::from_http_status(403, body).is_quota_exceeded());
    }

    #[test]
    fn test_server_errors_retryable() {
        for status in [500, 502, 503, 504] {
            assert!(YoutubeError::from_http_status(status, "oops").is_retryable());
        }
        let err = YoutubeError::from_http_status(400, r#"{"error": {"message": "Bad title"}}"#);
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "HTTP 400: Bad title");
    }
}
