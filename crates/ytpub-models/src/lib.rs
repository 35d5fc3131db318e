//! Shared data models for the ytpub upload pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Queue tasks and their status state machine
//! - Scheduled tasks, time slots and the scheduler state machine
//! - YouTube categories and privacy values
//! - Enhancement quality presets and layered setting resolution
//! - Metadata helpers (tag normalization, default titles)

pub mod category;
pub mod enhance;
pub mod error;
pub mod metadata;
pub mod schedule;
pub mod task;

pub use category::{category_name, is_valid_category, resolve_category, DEFAULT_CATEGORY_ID};
pub use enhance::{resolve, Codec, EnhanceOverrides, EnhanceSettings, HwAccel, QualityPreset};
pub use error::{ModelError, ModelResult};
pub use metadata::{default_title_for, normalize_tags, truncate_chars};
pub use schedule::{parse_weekday, weekday_name, ScheduleStatus, ScheduledTask, TimeSlot};
pub use task::{
    task_json_schema, ChatId, PrivacyStatus, ScheduleMode, SubtitleRequest, Task, TaskMeta, TaskPrefs,
    TaskStatus,
};
