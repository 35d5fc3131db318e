//! Provider error types.
//!
//! These never reach the worker: the generator falls back to the heuristic
//! and the vision analyzer returns `None`.

use thiserror::Error;

pub type AiResult<T> = Result<T, AiError>;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("API key not configured: {0}")]
    MissingApiKey(&'static str),

    #[error("Provider returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Unusable answer: {0}")]
    InvalidAnswer(String),

    #[error("Media error: {0}")]
    Media(#[from] ytpub_media::MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AiError {
    pub fn invalid_answer(msg: impl Into<String>) -> Self {
        Self::InvalidAnswer(msg.into())
    }

    pub(crate) async fn from_response(response: reqwest::Response) -> AiResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(Self::Http {
            status: status.as_u16(),
            body,
        })
    }
}
