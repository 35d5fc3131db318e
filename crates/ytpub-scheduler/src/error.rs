//! Scheduler error types.

use thiserror::Error;
use ytpub_models::ModelError;

pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Errors surfaced to scheduler callers.
///
/// Persistence failures are logged inside the scheduler and never returned.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("Unknown timezone: {0}")]
    InvalidTimezone(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SchedulerError {
    pub fn is_illegal_transition(&self) -> bool {
        matches!(self, Self::Model(ModelError::IllegalTransition { .. }))
    }
}
