//! Queue error types.

use std::path::{Path, PathBuf};

use thiserror::Error;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Task file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid task {path}: {message}")]
    InvalidTask { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QueueError {
    pub fn invalid_task(path: &Path, message: impl Into<String>) -> Self {
        Self::InvalidTask {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }

    /// The file is JSON but not a valid task.
    pub fn is_invalid_task(&self) -> bool {
        matches!(self, Self::InvalidTask { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
