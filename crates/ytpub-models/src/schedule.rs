//! Scheduler models: time slots and scheduled tasks.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ModelError, ModelResult};

/// Lowercase English weekday name, as used in `time_slots.json`.
pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

pub fn parse_weekday(name: &str) -> Option<Weekday> {
    match name.trim().to_ascii_lowercase().as_str() {
        "monday" | "mon" => Some(Weekday::Mon),
        "tuesday" | "tue" => Some(Weekday::Tue),
        "wednesday" | "wed" => Some(Weekday::Wed),
        "thursday" | "thu" => Some(Weekday::Thu),
        "friday" | "fri" => Some(Weekday::Fri),
        "saturday" | "sat" => Some(Weekday::Sat),
        "sunday" | "sun" => Some(Weekday::Sun),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct TimeSlotRepr {
    start_hour: u32,
    #[serde(default)]
    start_minute: u32,
    end_hour: u32,
    #[serde(default)]
    end_minute: u32,
    #[serde(default = "default_priority")]
    priority: u8,
}

fn default_priority() -> u8 {
    1
}

/// A daily upload window. Priority 1 is the most desirable.
///
/// Validated at construction; a window whose end is not after its start
/// crosses midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TimeSlotRepr")]
pub struct TimeSlot {
    start_hour: u32,
    start_minute: u32,
    end_hour: u32,
    end_minute: u32,
    priority: u8,
}

impl TryFrom<TimeSlotRepr> for TimeSlot {
    type Error = ModelError;

    fn try_from(r: TimeSlotRepr) -> Result<Self, Self::Error> {
        TimeSlot::new(r.start_hour, r.start_minute, r.end_hour, r.end_minute, r.priority)
    }
}

impl TimeSlot {
    pub fn new(start_hour: u32, start_minute: u32, end_hour: u32, end_minute: u32, priority: u8) -> ModelResult<Self> {
        if start_hour > 23 || end_hour > 23 {
            return Err(ModelError::invalid_slot(format!(
                "hours must be within 0-23 (got {}-{})",
                start_hour, end_hour
            )));
        }
        if start_minute > 59 || end_minute > 59 {
            return Err(ModelError::invalid_slot(format!(
                "minutes must be within 0-59 (got {}-{})",
                start_minute, end_minute
            )));
        }
        Ok(Self {
            start_hour,
            start_minute,
            end_hour,
            end_minute,
            priority,
        })
    }

    /// Whole-hour window, the shape of the built-in table.
    pub fn hours(start_hour: u32, end_hour: u32, priority: u8) -> ModelResult<Self> {
        Self::new(start_hour, 0, end_hour, 0, priority)
    }

    pub fn priority(&self) -> u8 {
        self.priority
    }

    pub fn start(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.start_hour, self.start_minute, 0).unwrap_or(NaiveTime::MIN)
    }

    pub fn end(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.end_hour, self.end_minute, 0).unwrap_or(NaiveTime::MIN)
    }

    pub fn crosses_midnight(&self) -> bool {
        self.end() <= self.start()
    }

    pub fn contains_time(&self, t: NaiveTime) -> bool {
        if self.crosses_midnight() {
            t >= self.start() || t <= self.end()
        } else {
            self.start() <= t && t <= self.end()
        }
    }

    /// Local start and end of the window opening on `date`.
    pub fn window_on(&self, date: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
        let start = date.and_time(self.start());
        let mut end = date.and_time(self.end());
        if self.crosses_midnight() {
            end += Duration::days(1);
        }
        (start, end)
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}-{:02}:{:02} (p{})",
            self.start_hour, self.start_minute, self.end_hour, self.end_minute, self.priority
        )
    }
}

/// Scheduled task status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    #[default]
    Scheduled,
    Ready,
    Processing,
    Completed,
    Failed,
}

impl ScheduleStatus {
    pub const ALL: [ScheduleStatus; 5] = [
        ScheduleStatus::Scheduled,
        ScheduleStatus::Ready,
        ScheduleStatus::Processing,
        ScheduleStatus::Completed,
        ScheduleStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleStatus::Scheduled => "scheduled",
            ScheduleStatus::Ready => "ready",
            ScheduleStatus::Processing => "processing",
            ScheduleStatus::Completed => "completed",
            ScheduleStatus::Failed => "failed",
        }
    }

    /// Entries in these states occupy slot capacity.
    pub fn is_pending(&self) -> bool {
        matches!(self, ScheduleStatus::Scheduled | ScheduleStatus::Ready)
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, ScheduleStatus::Completed | ScheduleStatus::Failed)
    }

    /// Forward state machine. A retried attempt goes back to scheduled from
    /// ready or processing; `failed` is terminal apart from re-failing.
    pub fn can_transition_to(&self, to: ScheduleStatus) -> bool {
        use ScheduleStatus::*;
        matches!(
            (*self, to),
            (Scheduled, Ready)
                | (Scheduled, Scheduled)
                | (Scheduled, Failed)
                | (Ready, Processing)
                | (Ready, Failed)
                | (Ready, Scheduled)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, Scheduled)
                | (Failed, Failed)
        )
    }
}

impl fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An upload deferred to a future time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ScheduledTask {
    pub task_id: String,
    pub original_task_path: PathBuf,
    pub scheduled_time: DateTime<FixedOffset>,
    #[serde(default)]
    pub status: ScheduleStatus,
    pub created_at: DateTime<FixedOffset>,
    #[serde(default)]
    pub attempts: u32,
    pub max_attempts: u32,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl ScheduledTask {
    /// `sched_{unix_ts}_{stem}`.
    pub fn make_id(scheduled_time: &DateTime<FixedOffset>, task_path: &std::path::Path) -> String {
        let stem = task_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("sched_{}_{}", scheduled_time.timestamp(), stem)
    }

    pub fn transition(&mut self, to: ScheduleStatus) -> ModelResult<()> {
        if !self.status.can_transition_to(to) {
            return Err(ModelError::illegal_transition("scheduled task", self.status, to));
        }
        self.status = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::path::Path;

    #[test]
    fn test_slot_validation() {
        assert!(TimeSlot::new(24, 0, 10, 0, 1).is_err());
        assert!(TimeSlot::new(8, 60, 10, 0, 1).is_err());
        assert!(TimeSlot::new(8, 0, 10, 59, 1).is_ok());
    }

    #[test]
    fn test_slot_deserialize_validates() {
        let ok: TimeSlot = serde_json::from_str(r#"{"start_hour":18,"end_hour":21,"priority":1}"#).unwrap();
        assert_eq!(ok.start(), NaiveTime::from_hms_opt(18, 0, 0).unwrap());
        assert!(serde_json::from_str::<TimeSlot>(r#"{"start_hour":25,"end_hour":21}"#).is_err());
    }

    #[test]
    fn test_contains_time_across_midnight() {
        let night = TimeSlot::hours(22, 2, 1).unwrap();
        assert!(night.crosses_midnight());
        assert!(night.contains_time(NaiveTime::from_hms_opt(23, 30, 0).unwrap()));
        assert!(night.contains_time(NaiveTime::from_hms_opt(1, 0, 0).unwrap()));
        assert!(!night.contains_time(NaiveTime::from_hms_opt(12, 0, 0).unwrap()));

        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let (start, end) = night.window_on(date);
        assert_eq!(end - start, Duration::hours(4));
    }

    #[test]
    fn test_weekday_names() {
        assert_eq!(weekday_name(Weekday::Wed), "wednesday");
        assert_eq!(parse_weekday("Friday"), Some(Weekday::Fri));
        assert_eq!(parse_weekday("someday"), None);
    }

    #[test]
    fn test_schedule_transitions() {
        use ScheduleStatus::*;
        assert!(Scheduled.can_transition_to(Ready));
        assert!(Ready.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Scheduled));
        assert!(!Failed.can_transition_to(Scheduled));
        assert!(Failed.can_transition_to(Failed));
        assert!(!Completed.can_transition_to(Scheduled));
        assert!(!Scheduled.can_transition_to(Completed));
        assert!(!Ready.can_transition_to(Completed));
    }

    #[test]
    fn test_task_id_format() {
        let t = FixedOffset::east_opt(3600).unwrap().with_ymd_and_hms(2024, 1, 1, 18, 0, 0).unwrap();
        let id = ScheduledTask::make_id(&t, Path::new("/q/task_123.json"));
        assert_eq!(id, format!("sched_{}_task_123", t.timestamp()));
    }
}
