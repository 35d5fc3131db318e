//! Worker error types.

use thiserror::Error;
use ytpub_youtube::YoutubeError;

pub type WorkerResult<T> = Result<T, WorkerError>;

/// Error code stored on tasks blocked by the daily upload limit.
pub const QUOTA_ERROR_CODE: &str = "uploadLimitExceeded";

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Invalid task: {0}")]
    Validation(String),

    /// A file the task depends on is gone. Archived, never retried.
    #[error("{0}")]
    ResourceMissing(String),

    #[error("No YouTube account available")]
    NoAccount,

    #[error("{reason}: {message}")]
    QuotaExceeded { reason: String, message: String },

    #[error("Upload failed: {0}")]
    Upload(YoutubeError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] ytpub_scheduler::SchedulerError),

    #[error("Queue error: {0}")]
    Queue(#[from] ytpub_queue::QueueError),

    #[error("Model error: {0}")]
    Model(#[from] ytpub_models::ModelError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<YoutubeError> for WorkerError {
    fn from(e: YoutubeError) -> Self {
        match e {
            YoutubeError::QuotaExceeded { reason, message } => Self::QuotaExceeded { reason, message },
            other => Self::Upload(other),
        }
    }
}

impl WorkerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn resource_missing(msg: impl Into<String>) -> Self {
        Self::ResourceMissing(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Only this error stops the rest of a sweep.
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }

    /// Known failures are archived; anything else stays in the queue for inspection.
    pub fn is_handled(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::ResourceMissing(_) | Self::NoAccount | Self::QuotaExceeded { .. }
        )
    }
}
