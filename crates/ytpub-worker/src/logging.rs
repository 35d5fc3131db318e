//! Structured task logging and subscriber setup.

use std::path::Path;

use tracing::{error, info, warn, Span};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber.
///
/// `LOG_FORMAT=json` selects JSON lines, otherwise coloured text.
/// `RUST_LOG` overrides the default `info` level.
pub fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

/// Task logger for structured logging with consistent fields.
///
/// Every event carries the task file name and the pipeline stage it belongs to.
#[derive(Debug, Clone)]
pub struct TaskLogger {
    task: String,
    operation: String,
}

impl TaskLogger {
    pub fn new(task: &str, operation: &str) -> Self {
        Self {
            task: task.to_string(),
            operation: operation.to_string(),
        }
    }

    /// Logger named after a task file.
    pub fn for_file(path: &Path, operation: &str) -> Self {
        let task = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::new(&task, operation)
    }

    pub fn log_start(&self, message: &str) {
        info!(
            task = %self.task,
            operation = %self.operation,
            "Task started: {}", message
        );
    }

    pub fn log_step(&self, message: &str) {
        info!(
            task = %self.task,
            operation = %self.operation,
            "Task step: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            task = %self.task,
            operation = %self.operation,
            "Task warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            task = %self.task,
            operation = %self.operation,
            "Task error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            task = %self.task,
            operation = %self.operation,
            "Task completed: {}", message
        );
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Span wrapping all work done for this task.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "task",
            task = %self.task,
            operation = %self.operation
        )
    }
}
