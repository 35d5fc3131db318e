//! Queue task model.
//!
//! One task is one JSON file in the queue directory. Producers write it,
//! the worker mutates it in place and finally moves it to the archive.
//! Fields this crate does not know about are carried through verbatim.

use std::fmt;
use std::path::PathBuf;

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{ModelError, ModelResult};
use crate::enhance::QualityPreset;

/// Task status persisted in the queue file.
///
/// A missing status is equivalent to a fresh task. "Processing" is never
/// written: an in-flight task is represented by its claim lock instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Done,
    Error,
    Blocked,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Done => "done",
            TaskStatus::Error => "error",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    /// Terminal statuses are never picked up again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Blocked | TaskStatus::Cancelled)
    }

    /// Transition table for queue tasks. `None` is a task without status.
    pub fn can_transition(from: Option<TaskStatus>, to: TaskStatus) -> bool {
        use TaskStatus::*;
        match (from, to) {
            (None, Pending) => true,
            (None | Some(Pending) | Some(Error), Done | Error | Blocked) => true,
            (None | Some(Pending), Cancelled) => true,
            _ => false,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the worker treats a task with respect to time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleMode {
    #[default]
    Now,
    Auto,
    Custom,
}

/// YouTube privacy status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum PrivacyStatus {
    #[default]
    Public,
    Private,
    Unlisted,
}

impl PrivacyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrivacyStatus::Public => "public",
            PrivacyStatus::Private => "private",
            PrivacyStatus::Unlisted => "unlisted",
        }
    }
}

impl std::str::FromStr for PrivacyStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "public" => Ok(PrivacyStatus::Public),
            "private" => Ok(PrivacyStatus::Private),
            "unlisted" => Ok(PrivacyStatus::Unlisted),
            other => Err(ModelError::invalid_value("privacy_status", other)),
        }
    }
}

impl fmt::Display for PrivacyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Telegram chat identifier; producers write either a number or a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum ChatId {
    Int(i64),
    Text(String),
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatId::Int(id) => write!(f, "{}", id),
            ChatId::Text(id) => f.write_str(id),
        }
    }
}

/// User- or AI-supplied metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TaskMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "de_category")]
    #[schemars(with = "Option<u32>")]
    pub category_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privacy_status: Option<PrivacyStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub made_for_kids: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TaskMeta {
    pub fn title(&self) -> Option<&str> {
        non_empty(self.title.as_deref())
    }

    pub fn description(&self) -> Option<&str> {
        non_empty(self.description.as_deref())
    }
}

/// Per-chat preference snapshot copied at task creation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TaskPrefs {
    /// Case-insensitive; unknown names are dropped.
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "de_quality")]
    pub quality: Option<QualityPreset>,
    #[serde(default, alias = "force_ai_title", skip_serializing_if = "std::ops::Not::not")]
    pub ai_title_force: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Subtitle request carried by a task; unset fields fall back to config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SubtitleRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub languages: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replace_existing: Option<bool>,
}

/// A queue task file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Task {
    pub video_path: PathBuf,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,

    #[serde(default)]
    pub meta: TaskMeta,

    #[serde(default)]
    pub prefs: TaskPrefs,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_mode: Option<ScheduleMode>,

    /// ISO datetime; naive values are read in the scheduler timezone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_schedule_time: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_days: Option<Vec<String>>,

    /// Set by the promoter on tasks re-injected from the scheduler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_task_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_time: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moved_to_queue_at: Option<String>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub skip_enhance: bool,

    /// Ingestion path, e.g. `telegram`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<ChatId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received_at: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privacy_status: Option<PrivacyStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "de_category")]
    #[schemars(with = "Option<u32>")]
    pub category_id: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub made_for_kids: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_at: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playlist_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_path: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitles: Option<SubtitleRequest>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enhanced_path: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_at: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub youtube_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitles_result: Option<Value>,

    /// Producer fields unknown to this crate.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Task {
    pub fn new(video_path: impl Into<PathBuf>) -> Self {
        Self {
            video_path: video_path.into(),
            status: Some(TaskStatus::Pending),
            ..Default::default()
        }
    }

    /// Only fresh, pending or previously errored tasks are (re)picked up.
    pub fn is_admissible(&self) -> bool {
        matches!(self.status, None | Some(TaskStatus::Pending) | Some(TaskStatus::Error))
    }

    /// Move to `to`, rejecting transitions outside the table.
    pub fn transition(&mut self, to: TaskStatus) -> ModelResult<()> {
        if !TaskStatus::can_transition(self.status, to) {
            let from = self.status.map(|s| s.as_str()).unwrap_or("absent");
            return Err(ModelError::illegal_transition("task", from, to));
        }
        self.status = Some(to);
        Ok(())
    }

    /// Record a failure with a short error string.
    pub fn fail(&mut self, error: impl Into<String>) -> ModelResult<()> {
        self.transition(TaskStatus::Error)?;
        self.error = Some(error.into());
        Ok(())
    }

    pub fn is_telegram(&self) -> bool {
        self.source
            .as_deref()
            .map(|s| s.eq_ignore_ascii_case("telegram"))
            .unwrap_or(false)
    }

    pub fn schedule_mode(&self) -> ScheduleMode {
        self.schedule_mode.unwrap_or_default()
    }
}

/// JSON schema of the task file, for producers.
pub fn task_json_schema() -> Value {
    let schema = schemars::schema_for!(Task);
    serde_json::to_value(schema).unwrap_or(Value::Null)
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|v| !v.trim().is_empty())
}

/// Accepts `22`, `"22"` or null.
fn de_category<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(u32),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Num(n)) => Ok(Some(n)),
        Some(Raw::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(Raw::Text(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid category_id: {}", s))),
    }
}

fn de_quality<'de, D>(deserializer: D) -> Result<Option<QualityPreset>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    let name = match raw {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => return Ok(None),
        Some(Value::String(s)) => s,
        Some(other) => other.to_string(),
    };
    match name.parse() {
        Ok(preset) => Ok(Some(preset)),
        Err(_) => {
            warn!(quality = %name, "Unknown quality preset ignored");
            Ok(None)
        }
    }
}
