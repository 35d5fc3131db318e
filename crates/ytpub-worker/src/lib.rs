//! Upload worker.
//!
//! This crate provides:
//! - The queue worker sweep and its upload pipeline
//! - The scheduled-task promoter
//! - Application config, email notifications, logging and metrics

pub mod collaborators;
pub mod config;
pub mod error;
pub mod logging;
pub mod metadata;
pub mod metrics;
pub mod notify;
pub mod pipeline;
pub mod promoter;
pub mod retry;
pub mod settings;
pub mod subtitles;
pub mod watcher;

pub use collaborators::Collaborators;
pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult, QUOTA_ERROR_CODE};
pub use logging::{init_tracing, TaskLogger};
pub use notify::{EmailNotifier, Notifier, NotifyError, UploadNotice};
pub use pipeline::{QueueWorker, SweepReport};
pub use promoter::{PromotionReport, ScheduledWorker};
pub use settings::AppConfig;
pub use watcher::QueueWatcher;
