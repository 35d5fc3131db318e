//! `scheduled_tasks.json` persistence.

use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{error, warn};
use ytpub_models::{ScheduleStatus, ScheduledTask};

use crate::error::SchedulerResult;

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

/// On-disk record. Timestamps stay strings until normalized into the zone.
#[derive(Debug, Deserialize)]
struct StoredTask {
    task_id: String,
    scheduled_time: String,
    original_task_path: PathBuf,
    #[serde(default)]
    status: ScheduleStatus,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    attempts: u32,
    #[serde(default)]
    max_attempts: Option<u32>,
    #[serde(default)]
    metadata: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub(crate) struct TaskStore {
    path: PathBuf,
    timezone: Tz,
}

impl TaskStore {
    pub(crate) fn new(path: PathBuf, timezone: Tz) -> Self {
        Self { path, timezone }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Load every record, normalized into the store's zone.
    ///
    /// Malformed records and records with unreadable timestamps are skipped
    /// with a warning. A file that is not a JSON array is copied aside to
    /// `<file>.corrupt` before the error is returned.
    pub(crate) fn load(&self, default_max_attempts: u32) -> SchedulerResult<Vec<ScheduledTask>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read(&self.path)?;
        let values: Vec<Value> = match serde_json::from_slice(&raw) {
            Ok(values) => values,
            Err(e) => {
                let aside = self.corrupt_path();
                match std::fs::copy(&self.path, &aside) {
                    Ok(_) => warn!(path = %aside.display(), "Unreadable scheduled tasks file copied aside"),
                    Err(copy_err) => error!(path = %aside.display(), "Failed to copy unreadable scheduled tasks file: {}", copy_err),
                }
                return Err(e.into());
            }
        };

        let mut records = Vec::with_capacity(values.len());
        for (index, value) in values.into_iter().enumerate() {
            match serde_json::from_value::<StoredTask>(value) {
                Ok(record) => records.push(record),
                Err(e) => warn!(index, "Skipping malformed scheduled task: {}", e),
            }
        }

        let mut tasks = Vec::with_capacity(records.len());
        for record in records {
            let Some(scheduled_time) = normalize_time(&record.scheduled_time, self.timezone) else {
                warn!(task_id = %record.task_id, value = %record.scheduled_time, "Skipping scheduled task with unreadable time");
                continue;
            };
            let created_at = record
                .created_at
                .as_deref()
                .and_then(|s| normalize_time(s, self.timezone))
                .unwrap_or_else(|| Utc::now().with_timezone(&self.timezone).fixed_offset());

            tasks.push(ScheduledTask {
                task_id: record.task_id,
                original_task_path: record.original_task_path,
                scheduled_time,
                status: record.status,
                created_at,
                attempts: record.attempts,
                max_attempts: record.max_attempts.unwrap_or(default_max_attempts),
                metadata: record.metadata,
            });
        }
        Ok(tasks)
    }

    pub(crate) fn corrupt_path(&self) -> PathBuf {
        self.path.with_extension("json.corrupt")
    }

    /// Replace the whole file with `tasks` through a temp file.
    pub(crate) fn save(&self, tasks: &[ScheduledTask]) -> SchedulerResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(tasks)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Parse an ISO timestamp; naive values are read as local time in `tz`.
pub(crate) fn normalize_time(value: &str, tz: Tz) -> Option<DateTime<FixedOffset>> {
    let value = value.trim();
    if let Ok(aware) = DateTime::parse_from_rfc3339(value) {
        return Some(aware.with_timezone(&tz).fixed_offset());
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .and_then(|naive| localize(tz, naive))
}

/// Local wall time in `tz`; the earlier instant on DST overlaps, `None` in gaps.
pub(crate) fn localize(tz: Tz, naive: NaiveDateTime) -> Option<DateTime<FixedOffset>> {
    tz.from_local_datetime(&naive).earliest().map(|dt| dt.fixed_offset())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_naive_time_is_local() {
        let t = normalize_time("2024-07-01T18:00:00", chrono_tz::Europe::Paris).unwrap();
        assert_eq!(t.offset().local_minus_utc(), 2 * 3600);
        assert_eq!(t.hour(), 18);
    }

    #[test]
    fn test_aware_time_is_converted() {
        let t = normalize_time("2024-01-15T17:00:00+00:00", chrono_tz::Europe::Paris).unwrap();
        assert_eq!(t.hour(), 18);
        assert_eq!(t.offset().local_minus_utc(), 3600);
    }

    #[test]
    fn test_dst_gap_has_no_local_time() {
        let naive = NaiveDateTime::parse_from_str("2024-03-31T02:30:00", "%Y-%m-%dT%H:%M:%S").unwrap();
        assert!(localize(chrono_tz::Europe::Paris, naive).is_none());
        assert!(normalize_time("not a date", chrono_tz::UTC).is_none());
    }

    #[test]
    fn test_load_normalizes_and_skips_bad_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scheduled_tasks.json");
        std::fs::write(
            &path,
            r#"[
                {"task_id": "sched_1_a", "scheduled_time": "2024-07-01T18:00:00",
                 "original_task_path": "queue_archive/task_a.json", "status": "scheduled",
                 "created_at": "2024-06-30T10:00:00.123456", "attempts": 0, "max_attempts": 3},
                {"task_id": "sched_2_b", "scheduled_time": "garbage",
                 "original_task_path": "queue_archive/task_b.json", "status": "scheduled"}
            ]"#,
        )
        .unwrap();

        let store = TaskStore::new(path, chrono_tz::Europe::Paris);
        let tasks = store.load(5).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].scheduled_time.to_rfc3339(), "2024-07-01T18:00:00+02:00");
        assert_eq!(tasks[0].max_attempts, 3);

        store.save(&tasks).unwrap();
        assert_eq!(store.load(5).unwrap(), tasks);
    }

    #[test]
    fn test_malformed_record_does_not_hide_the_others() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scheduled_tasks.json");
        std::fs::write(
            &path,
            r#"[
                {"task_id": "sched_1_a", "scheduled_time": "2024-07-01T18:00:00+02:00",
                 "original_task_path": "queue_archive/task_a.json", "status": "scheduled"},
                {"task_id": "sched_2_b", "scheduled_time": "2024-07-01T19:00:00+02:00",
                 "original_task_path": "queue_archive/task_b.json", "status": "cancelled"},
                {"task_id": "sched_3_c", "scheduled_time": "2024-07-01T20:00:00+02:00",
                 "original_task_path": "queue_archive/task_c.json", "attempts": "two"}
            ]"#,
        )
        .unwrap();

        let tasks = TaskStore::new(path, chrono_tz::Europe::Paris).load(3).unwrap();
        let ids: Vec<_> = tasks.iter().map(|t| t.task_id.as_str()).collect();
        assert_eq!(ids, vec!["sched_1_a"]);
    }

    #[test]
    fn test_unreadable_file_is_copied_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scheduled_tasks.json");
        std::fs::write(&path, b"[{ truncated").unwrap();

        let store = TaskStore::new(path, chrono_tz::UTC);
        assert!(store.load(3).is_err());
        assert_eq!(std::fs::read(store.corrupt_path()).unwrap(), b"[{ truncated");
    }
}
