//! Upload scheduling for ytpub.
//!
//! This crate provides:
//! - Per-weekday time slots with priority and capacity
//! - Optimal slot search over a two-week horizon
//! - A persisted store of deferred uploads and their lifecycle

pub mod config;
pub mod error;
pub mod scheduler;
pub mod slots;
mod store;

pub use config::{parse_timezone, SchedulerConfig};
pub use error::{SchedulerError, SchedulerResult};
pub use scheduler::{ScheduleStats, UploadScheduler, SEARCH_HORIZON_DAYS};
pub use slots::SlotTable;
