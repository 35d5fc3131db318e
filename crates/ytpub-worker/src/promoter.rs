//! Scheduled-task promoter.
//!
//! Moves due scheduled tasks back into the live queue as
//! `scheduled_{task_id}.json`, stamped with their schedule identity.

use std::time::Duration;

use chrono::{DateTime, FixedOffset, Timelike, Utc};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use ytpub_models::{ScheduledTask, Task};
use ytpub_queue::{TaskQueue, SCHEDULED_PREFIX};
use ytpub_scheduler::{SchedulerConfig, UploadScheduler};

use crate::error::WorkerResult;
use crate::metrics;
use crate::retry::FailureTracker;

/// Finished scheduled tasks older than this are purged hourly.
pub const CLEANUP_DAYS: i64 = 7;

/// Counts for one promotion pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromotionReport {
    pub promoted: usize,
    /// Original task missing or unusable; failed for good.
    pub failed: usize,
    /// Queue write failed; rescheduled.
    pub retried: usize,
}

/// Why one ready task could not be promoted.
#[derive(Debug)]
enum PromoteFailure {
    Unreadable(String),
    Write(String),
}

/// Periodic promoter daemon.
pub struct ScheduledWorker {
    scheduler_config: SchedulerConfig,
    queue: TaskQueue,
    interval: Duration,
    shutdown: watch::Sender<bool>,
}

impl ScheduledWorker {
    pub fn new(scheduler_config: SchedulerConfig, queue: TaskQueue, interval: Duration) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            scheduler_config,
            queue,
            interval,
            shutdown,
        }
    }

    /// Promote everything due now.
    pub async fn process_ready_tasks(&self) -> WorkerResult<PromotionReport> {
        let now = Utc::now().with_timezone(&self.scheduler_config.timezone).fixed_offset();
        self.process_ready_tasks_at(now).await
    }

    /// Promote everything due at `now`.
    pub async fn process_ready_tasks_at(&self, now: DateTime<FixedOffset>) -> WorkerResult<PromotionReport> {
        let mut scheduler = UploadScheduler::open(self.scheduler_config.clone());
        let ready = scheduler.get_ready_tasks(Some(now));
        let mut report = PromotionReport::default();
        if ready.is_empty() {
            debug!("No scheduled task ready");
            return Ok(report);
        }
        info!(tasks = ready.len(), "Promoting ready scheduled tasks");

        for scheduled in &ready {
            match self.promote(scheduled, now).await {
                Ok(path) => {
                    scheduler.mark_task_processing(&scheduled.task_id)?;
                    info!(task_id = %scheduled.task_id, task = %path.display(), "Scheduled task moved to queue");
                    report.promoted += 1;
                    metrics::record_promotion("promoted");
                }
                Err(PromoteFailure::Unreadable(reason)) => {
                    error!(task_id = %scheduled.task_id, "Original task unusable: {}", reason);
                    scheduler.mark_task_failed_at(&scheduled.task_id, false, now)?;
                    report.failed += 1;
                    metrics::record_promotion("failed");
                }
                Err(PromoteFailure::Write(reason)) => {
                    warn!(task_id = %scheduled.task_id, "Queue write failed, will retry: {}", reason);
                    scheduler.mark_task_failed_at(&scheduled.task_id, true, now)?;
                    report.retried += 1;
                    metrics::record_promotion("retried");
                }
            }
        }
        Ok(report)
    }

    async fn promote(&self, scheduled: &ScheduledTask, now: DateTime<FixedOffset>) -> Result<std::path::PathBuf, PromoteFailure> {
        let mut raw = self
            .queue
            .read_raw(&scheduled.original_task_path)
            .await
            .map_err(|e| PromoteFailure::Unreadable(e.to_string()))?;

        let Value::Object(map) = &mut raw else {
            return Err(PromoteFailure::Unreadable("task file is not a JSON object".into()));
        };
        map.insert("scheduled_task_id".into(), Value::String(scheduled.task_id.clone()));
        map.insert("scheduled_time".into(), Value::String(scheduled.scheduled_time.to_rfc3339()));
        map.insert("moved_to_queue_at".into(), Value::String(now.to_rfc3339()));

        let task: Task = serde_json::from_value(raw).map_err(|e| PromoteFailure::Unreadable(e.to_string()))?;
        let file_name = format!("{}{}.json", SCHEDULED_PREFIX, scheduled.task_id);
        self.queue
            .enqueue(&file_name, &task)
            .await
            .map_err(|e| PromoteFailure::Write(e.to_string()))
    }

    /// Purge finished scheduled tasks.
    pub fn cleanup(&self) -> usize {
        UploadScheduler::open(self.scheduler_config.clone()).cleanup_old_tasks(CLEANUP_DAYS)
    }

    /// Run until [`Self::shutdown`] is called.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            interval_secs = self.interval.as_secs(),
            schedule_dir = %self.scheduler_config.schedule_dir.display(),
            "Starting scheduled worker"
        );
        let mut shutdown_rx = self.shutdown.subscribe();
        let mut interval = tokio::time::interval(self.interval);
        let mut failures = FailureTracker::new(5);

        while !*shutdown_rx.borrow() {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping scheduled worker");
                        break;
                    }
                }
                _ = interval.tick() => {
                    match self.tick().await {
                        Ok(()) => failures.record_success(),
                        Err(e) => {
                            if failures.record_failure() {
                                error!("Scheduled worker iteration failed: {}", e);
                            }
                        }
                    }
                }
            }
        }

        info!("Scheduled worker stopped");
        Ok(())
    }

    async fn tick(&self) -> WorkerResult<()> {
        let report = self.process_ready_tasks().await?;
        if report != PromotionReport::default() {
            info!(
                promoted = report.promoted,
                failed = report.failed,
                retried = report.retried,
                "Promotion pass finished"
            );
        }
        if Utc::now().with_timezone(&self.scheduler_config.timezone).minute() == 0 {
            let removed = self.cleanup();
            if removed > 0 {
                info!(removed, "Old scheduled tasks purged");
            }
        }
        Ok(())
    }

    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }
}

