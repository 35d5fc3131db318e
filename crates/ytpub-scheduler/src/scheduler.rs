//! Time-slot upload scheduler.
//!
//! Picks the best future slot for an upload, tracks demand against each
//! slot's capacity and owns the lifecycle of deferred uploads.
//!
//! The in-memory task list is authoritative for the life of the process;
//! failed writes to `scheduled_tasks.json` are logged and ignored.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use chrono::{DateTime, Datelike, Duration, FixedOffset, Utc, Weekday};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use ytpub_models::{parse_weekday, ScheduleStatus, ScheduledTask, TimeSlot};

use crate::config::SchedulerConfig;
use crate::error::SchedulerResult;
use crate::slots::SlotTable;
use crate::store::{localize, TaskStore};

/// Days searched by [`UploadScheduler::find_next_optimal_slot`], today included.
pub const SEARCH_HORIZON_DAYS: i64 = 14;

/// Counts reported by [`UploadScheduler::get_schedule_stats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScheduleStats {
    pub total_scheduled: usize,
    pub by_status: BTreeMap<String, usize>,
    pub next_24h: usize,
    pub next_week: usize,
    pub overdue: usize,
}

/// Upload scheduler backed by a schedule directory.
#[derive(Debug)]
pub struct UploadScheduler {
    config: SchedulerConfig,
    slots: SlotTable,
    tasks: Vec<ScheduledTask>,
    store: TaskStore,
}

impl UploadScheduler {
    /// Open the schedule directory, creating it and the default slot table if needed.
    pub fn open(config: SchedulerConfig) -> Self {
        if let Err(e) = std::fs::create_dir_all(&config.schedule_dir) {
            error!(dir = %config.schedule_dir.display(), "Failed to create schedule directory: {}", e);
        }
        let slots = SlotTable::load_or_init(&config.slots_file());
        let store = TaskStore::new(config.tasks_file(), config.timezone);
        let tasks = store.load(config.max_attempts).unwrap_or_else(|e| {
            error!(path = %store.path().display(), "Failed to load scheduled tasks: {}", e);
            Vec::new()
        });
        debug!(tasks = tasks.len(), "Scheduler opened");

        Self {
            config,
            slots,
            tasks,
            store,
        }
    }

    /// Replace the slot table. Used when slots come from elsewhere than `time_slots.json`.
    pub fn with_slots(mut self, slots: SlotTable) -> Self {
        self.slots = slots;
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Current time in the scheduler's zone.
    pub fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.config.timezone).fixed_offset()
    }

    pub fn slots_for(&self, day: Weekday) -> &[TimeSlot] {
        self.slots.slots_for(day)
    }

    pub fn tasks(&self) -> &[ScheduledTask] {
        &self.tasks
    }

    pub fn get_task(&self, task_id: &str) -> Option<&ScheduledTask> {
        self.tasks.iter().find(|t| t.task_id == task_id)
    }

    /// Earliest free slot strictly after `from + min_delay_hours`.
    ///
    /// Days are searched over a two-week horizon starting from the floor's
    /// local date, slots by ascending priority number. When nothing fits,
    /// returns the floor plus 24 hours.
    pub fn find_next_optimal_slot(
        &self,
        from: Option<DateTime<FixedOffset>>,
        preferred_days: Option<&[String]>,
        min_delay_hours: i64,
    ) -> DateTime<FixedOffset> {
        let tz = self.config.timezone;
        let from = from.unwrap_or_else(|| self.now());
        let floor = from + Duration::hours(min_delay_hours);
        let preferred: Option<HashSet<Weekday>> = preferred_days
            .filter(|days| !days.is_empty())
            .map(|days| days.iter().filter_map(|d| parse_weekday(d)).collect());

        let first_day = floor.with_timezone(&tz).date_naive();
        for offset in 0..SEARCH_HORIZON_DAYS {
            let date = first_day + Duration::days(offset);
            let weekday = date.weekday();
            if preferred.as_ref().is_some_and(|days| !days.contains(&weekday)) {
                continue;
            }

            for slot in self.slots.slots_for(weekday) {
                let (start_local, end_local) = slot.window_on(date);
                let Some(start) = localize(tz, start_local) else {
                    continue;
                };
                if start <= floor {
                    continue;
                }
                let end = localize(tz, end_local).unwrap_or(start);
                if self.occupancy(start, end) < self.config.slot_capacity {
                    debug!(slot = %slot, start = %start, "Optimal slot found");
                    return start;
                }
            }
        }

        let fallback = floor + Duration::hours(24);
        info!(fallback = %fallback, "No free slot within {} days, falling back", SEARCH_HORIZON_DAYS);
        fallback
    }

    /// Pending tasks whose time falls inside `[start, end]`.
    fn occupancy(&self, start: DateTime<FixedOffset>, end: DateTime<FixedOffset>) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.status.is_pending() && start <= t.scheduled_time && t.scheduled_time <= end)
            .count()
    }

    /// Schedule `task_path` at `scheduled_time`, or at the next optimal slot.
    pub fn schedule_task(
        &mut self,
        task_path: &Path,
        scheduled_time: Option<DateTime<FixedOffset>>,
        preferred_days: Option<&[String]>,
    ) -> ScheduledTask {
        let now = self.now();
        self.schedule_task_at(task_path, scheduled_time, preferred_days, now)
    }

    /// [`Self::schedule_task`] with an explicit current time.
    pub fn schedule_task_at(
        &mut self,
        task_path: &Path,
        scheduled_time: Option<DateTime<FixedOffset>>,
        preferred_days: Option<&[String]>,
        now: DateTime<FixedOffset>,
    ) -> ScheduledTask {
        let tz = self.config.timezone;
        let scheduled_time = match scheduled_time {
            Some(t) => t.with_timezone(&tz).fixed_offset(),
            None => self.find_next_optimal_slot(Some(now), preferred_days, 1),
        };

        let task = ScheduledTask {
            task_id: ScheduledTask::make_id(&scheduled_time, task_path),
            original_task_path: task_path.to_path_buf(),
            scheduled_time,
            status: ScheduleStatus::Scheduled,
            created_at: now.with_timezone(&tz).fixed_offset(),
            attempts: 0,
            max_attempts: self.config.max_attempts,
            metadata: Default::default(),
        };
        self.tasks.push(task.clone());
        self.persist();

        info!(task_id = %task.task_id, scheduled_time = %task.scheduled_time, "Task scheduled");
        task
    }

    /// Flip due `scheduled` tasks to `ready` and return them.
    pub fn get_ready_tasks(&mut self, current_time: Option<DateTime<FixedOffset>>) -> Vec<ScheduledTask> {
        let now = current_time.unwrap_or_else(|| self.now());
        let mut ready = Vec::new();
        for task in self
            .tasks
            .iter_mut()
            .filter(|t| t.status == ScheduleStatus::Scheduled && t.scheduled_time <= now)
        {
            task.status = ScheduleStatus::Ready;
            ready.push(task.clone());
        }
        if !ready.is_empty() {
            self.persist();
        }
        ready
    }

    pub fn mark_task_processing(&mut self, task_id: &str) -> SchedulerResult<bool> {
        self.set_status(task_id, ScheduleStatus::Processing)
    }

    pub fn mark_task_completed(&mut self, task_id: &str) -> SchedulerResult<bool> {
        self.set_status(task_id, ScheduleStatus::Completed)
    }

    /// Record a failed attempt.
    ///
    /// With `retry` and budget left the task goes back to `scheduled` after
    /// the retry delay; otherwise it is frozen at `failed`. A task already
    /// frozen stays frozen.
    pub fn mark_task_failed(&mut self, task_id: &str, retry: bool) -> SchedulerResult<bool> {
        let now = self.now();
        self.mark_task_failed_at(task_id, retry, now)
    }

    /// [`Self::mark_task_failed`] with an explicit current time.
    pub fn mark_task_failed_at(&mut self, task_id: &str, retry: bool, now: DateTime<FixedOffset>) -> SchedulerResult<bool> {
        let retry_delay = self.config.retry_delay;
        let Some(task) = self.tasks.iter_mut().find(|t| t.task_id == task_id) else {
            return Ok(false);
        };

        let attempts = task.attempts + 1;
        let revivable = task.status != ScheduleStatus::Failed;
        if retry && revivable && attempts < task.max_attempts {
            task.transition(ScheduleStatus::Scheduled)?;
            task.attempts = attempts;
            task.scheduled_time = now + retry_delay;
            info!(task_id, attempt = attempts, scheduled_time = %task.scheduled_time, "Scheduled task rescheduled after failure");
        } else {
            task.transition(ScheduleStatus::Failed)?;
            task.attempts = attempts;
            error!(task_id, attempts, "Scheduled task failed permanently");
        }
        self.persist();
        Ok(true)
    }

    /// Cancel a task that has not been promoted yet.
    pub fn cancel_task(&mut self, task_id: &str) -> bool {
        let Some(task) = self
            .tasks
            .iter_mut()
            .find(|t| t.task_id == task_id && t.status.is_pending())
        else {
            return false;
        };
        task.status = ScheduleStatus::Failed;
        task.metadata.insert("cancelled".into(), true.into());
        self.persist();
        info!(task_id, "Scheduled task cancelled");
        true
    }

    /// Move a task that has not been promoted yet to `new_time`.
    pub fn reschedule_task(&mut self, task_id: &str, new_time: DateTime<FixedOffset>) -> bool {
        let tz = self.config.timezone;
        let Some(task) = self
            .tasks
            .iter_mut()
            .find(|t| t.task_id == task_id && t.status.is_pending())
        else {
            return false;
        };
        task.scheduled_time = new_time.with_timezone(&tz).fixed_offset();
        task.status = ScheduleStatus::Scheduled;
        let scheduled_time = task.scheduled_time;
        self.persist();
        info!(task_id, scheduled_time = %scheduled_time, "Scheduled task moved");
        true
    }

    pub fn get_schedule_stats(&self, now: Option<DateTime<FixedOffset>>) -> ScheduleStats {
        let now = now.unwrap_or_else(|| self.now());
        let mut stats = ScheduleStats {
            total_scheduled: self.tasks.len(),
            ..Default::default()
        };
        for task in &self.tasks {
            *stats.by_status.entry(task.status.as_str().to_string()).or_default() += 1;

            let until = task.scheduled_time - now;
            if until < Duration::zero() {
                stats.overdue += 1;
            } else if until < Duration::hours(24) {
                stats.next_24h += 1;
            } else if until < Duration::days(7) {
                stats.next_week += 1;
            }
        }
        stats
    }

    /// Drop completed and failed tasks created more than `days_old` days ago.
    pub fn cleanup_old_tasks(&mut self, days_old: i64) -> usize {
        let now = self.now();
        self.cleanup_old_tasks_at(days_old, now)
    }

    pub fn cleanup_old_tasks_at(&mut self, days_old: i64, now: DateTime<FixedOffset>) -> usize {
        let cutoff = now - Duration::days(days_old);
        let before = self.tasks.len();
        self.tasks
            .retain(|t| !(t.status.is_finished() && t.created_at < cutoff));
        let removed = before - self.tasks.len();
        if removed > 0 {
            self.persist();
            info!(removed, "Old scheduled tasks removed");
        }
        removed
    }

    fn set_status(&mut self, task_id: &str, to: ScheduleStatus) -> SchedulerResult<bool> {
        let Some(task) = self.tasks.iter_mut().find(|t| t.task_id == task_id) else {
            warn!(task_id, status = %to, "Scheduled task not found");
            return Ok(false);
        };
        task.transition(to)?;
        self.persist();
        debug!(task_id, status = %to, "Scheduled task updated");
        Ok(true)
    }

    fn persist(&self) {
        if let Err(e) = self.store.save(&self.tasks) {
            error!(path = %self.store.path().display(), "Failed to save scheduled tasks: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};
    use tempfile::TempDir;

    fn scheduler(dir: &TempDir) -> UploadScheduler {
        UploadScheduler::open(SchedulerConfig::new(dir.path()))
    }

    /// Monday 2024-07-01 at the given Paris wall time.
    fn monday(hour: u32, minute: u32) -> DateTime<FixedOffset> {
        chrono_tz::Europe::Paris
            .with_ymd_and_hms(2024, 7, 1, hour, minute, 0)
            .unwrap()
            .fixed_offset()
    }

    #[test]
    fn test_first_slot_is_best_priority_after_floor() {
        let dir = TempDir::new().unwrap();
        let s = scheduler(&dir);
        let slot = s.find_next_optimal_slot(Some(monday(9, 0)), None, 1);
        assert_eq!(slot, monday(18, 0));
    }

    #[test]
    fn test_slot_start_must_be_after_floor() {
        let dir = TempDir::new().unwrap();
        let s = scheduler(&dir);
        // floor 18:00 exactly: the evening slot is not strictly after it
        let slot = s.find_next_optimal_slot(Some(monday(17, 0)), None, 1);
        assert_eq!(slot.date_naive().weekday(), Weekday::Tue);
        assert_eq!(slot.hour(), 18);
    }

    #[test]
    fn test_preferred_days_filter() {
        let dir = TempDir::new().unwrap();
        let s = scheduler(&dir);
        let days = vec!["Saturday".to_string()];
        let slot = s.find_next_optimal_slot(Some(monday(9, 0)), Some(&days), 1);
        assert_eq!(slot.date_naive().weekday(), Weekday::Sat);
        assert_eq!(slot.hour(), 10);
    }

    #[test]
    fn test_capacity_pushes_to_next_slot() {
        let dir = TempDir::new().unwrap();
        let mut s = scheduler(&dir);
        let now = monday(9, 0);
        let path = Path::new("queue_archive/task_a.json");

        let placed: Vec<_> = (0..4)
            .map(|_| s.schedule_task_at(path, None, None, now).scheduled_time)
            .collect();
        assert_eq!(&placed[..3], &[monday(18, 0); 3]);
        assert_eq!(placed[3], monday(12, 0));
    }

    #[test]
    fn test_schedule_task_id_and_persistence() {
        let dir = TempDir::new().unwrap();
        let mut s = scheduler(&dir);
        let at = monday(20, 30);
        let task = s.schedule_task_at(Path::new("/a/task_42.json"), Some(at), None, monday(9, 0));
        assert_eq!(task.task_id, format!("sched_{}_task_42", at.timestamp()));
        assert_eq!(task.status, ScheduleStatus::Scheduled);

        let reopened = scheduler(&dir);
        assert_eq!(reopened.get_task(&task.task_id), Some(&task));
    }

    #[test]
    fn test_ready_tasks_flip_once() {
        let dir = TempDir::new().unwrap();
        let mut s = scheduler(&dir);
        let task = s.schedule_task_at(Path::new("t.json"), Some(monday(12, 0)), None, monday(9, 0));

        assert!(s.get_ready_tasks(Some(monday(11, 59))).is_empty());
        let ready = s.get_ready_tasks(Some(monday(12, 0)));
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].status, ScheduleStatus::Ready);
        assert!(s.get_ready_tasks(Some(monday(13, 0))).is_empty());
        assert!(s.mark_task_processing(&task.task_id).unwrap());
        assert!(s.mark_task_completed(&task.task_id).unwrap());
        assert!(!s.mark_task_completed("sched_0_missing").unwrap());
    }

    #[test]
    fn test_illegal_transition_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut s = scheduler(&dir);
        let task = s.schedule_task_at(Path::new("t.json"), Some(monday(12, 0)), None, monday(9, 0));
        let err = s.mark_task_completed(&task.task_id).unwrap_err();
        assert!(err.is_illegal_transition());
        assert_eq!(s.get_task(&task.task_id).unwrap().status, ScheduleStatus::Scheduled);
    }

    #[test]
    fn test_failed_retry_budget() {
        let dir = TempDir::new().unwrap();
        let mut s = scheduler(&dir);
        let id = s
            .schedule_task_at(Path::new("t.json"), Some(monday(12, 0)), None, monday(9, 0))
            .task_id;
        s.get_ready_tasks(Some(monday(12, 0)));
        s.mark_task_processing(&id).unwrap();

        assert!(s.mark_task_failed_at(&id, true, monday(12, 5)).unwrap());
        let task = s.get_task(&id).unwrap();
        assert_eq!(task.status, ScheduleStatus::Scheduled);
        assert_eq!(task.attempts, 1);
        assert_eq!(task.scheduled_time, monday(13, 5));

        s.mark_task_failed_at(&id, true, monday(13, 10)).unwrap();
        assert_eq!(s.get_task(&id).unwrap().status, ScheduleStatus::Scheduled);
        s.mark_task_failed_at(&id, true, monday(14, 15)).unwrap();
        let task = s.get_task(&id).unwrap();
        assert_eq!(task.status, ScheduleStatus::Failed);
        assert_eq!(task.attempts, 3);
    }

    #[test]
    fn test_failed_without_retry_is_terminal() {
        let dir = TempDir::new().unwrap();
        let mut s = scheduler(&dir);
        let id = s
            .schedule_task_at(Path::new("t.json"), Some(monday(12, 0)), None, monday(9, 0))
            .task_id;
        s.mark_task_failed_at(&id, false, monday(12, 0)).unwrap();
        assert_eq!(s.get_task(&id).unwrap().status, ScheduleStatus::Failed);
        assert!(s.get_ready_tasks(Some(monday(23, 0))).is_empty());

        // a later retry request does not revive it, budget or not
        assert!(s.mark_task_failed_at(&id, true, monday(12, 30)).unwrap());
        let task = s.get_task(&id).unwrap();
        assert_eq!(task.status, ScheduleStatus::Failed);
        assert_eq!(task.attempts, 2);
        assert_eq!(task.scheduled_time, monday(12, 0));
        assert!(s.get_ready_tasks(Some(monday(23, 0))).is_empty());
    }

    #[test]
    fn test_cancel_and_reschedule_only_pending() {
        let dir = TempDir::new().unwrap();
        let mut s = scheduler(&dir);
        let a = s.schedule_task_at(Path::new("a.json"), Some(monday(12, 0)), None, monday(9, 0)).task_id;
        let b = s.schedule_task_at(Path::new("b.json"), Some(monday(12, 30)), None, monday(9, 0)).task_id;

        assert!(s.reschedule_task(&a, monday(19, 0)));
        assert_eq!(s.get_task(&a).unwrap().scheduled_time, monday(19, 0));

        assert!(s.cancel_task(&b));
        assert_eq!(s.get_task(&b).unwrap().status, ScheduleStatus::Failed);
        assert!(!s.cancel_task(&b));
        assert!(!s.reschedule_task(&b, monday(20, 0)));
    }

    #[test]
    fn test_stats_buckets() {
        let dir = TempDir::new().unwrap();
        let mut s = scheduler(&dir);
        let now = monday(9, 0);
        s.schedule_task_at(Path::new("a.json"), Some(monday(8, 0)), None, now);
        s.schedule_task_at(Path::new("b.json"), Some(monday(20, 0)), None, now);
        s.schedule_task_at(Path::new("c.json"), Some(now + Duration::days(3)), None, now);
        s.schedule_task_at(Path::new("d.json"), Some(now + Duration::days(10)), None, now);

        let stats = s.get_schedule_stats(Some(now));
        assert_eq!(stats.total_scheduled, 4);
        assert_eq!(stats.by_status.get("scheduled"), Some(&4));
        assert_eq!((stats.overdue, stats.next_24h, stats.next_week), (1, 1, 1));
    }

    #[test]
    fn test_cleanup_removes_old_finished_tasks() {
        let dir = TempDir::new().unwrap();
        let mut s = scheduler(&dir);
        let long_ago = monday(9, 0) - Duration::days(40);
        let old = s.schedule_task_at(Path::new("a.json"), Some(monday(12, 0)), None, long_ago).task_id;
        s.schedule_task_at(Path::new("b.json"), Some(monday(12, 0)), None, long_ago);
        s.mark_task_failed_at(&old, false, monday(9, 0)).unwrap();

        assert_eq!(s.cleanup_old_tasks_at(30, monday(9, 0)), 1);
        assert_eq!(s.tasks().len(), 1);
        assert!(s.get_task(&old).is_none());
    }
}
