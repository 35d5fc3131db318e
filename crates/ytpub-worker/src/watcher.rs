//! Queue watcher: re-runs the sweep on a fixed interval.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::error::WorkerResult;
use crate::pipeline::{QueueWorker, SweepReport};
use crate::retry::FailureTracker;

pub struct QueueWatcher {
    worker: QueueWorker,
    interval: Duration,
    archive_retention: Option<Duration>,
    shutdown: watch::Sender<bool>,
}

impl QueueWatcher {
    pub fn new(worker: QueueWorker, interval: Duration, archive_retention: Option<Duration>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            worker,
            interval,
            archive_retention,
            shutdown,
        }
    }

    /// One sweep, skipped when nothing is pending, followed by archive cleanup.
    pub async fn run_once(&self) -> WorkerResult<SweepReport> {
        let queue = self.worker.queue();
        queue.init().await?;
        if queue.list_pending().await?.is_empty() {
            debug!("Queue empty, sweep skipped");
            return Ok(SweepReport::default());
        }

        let report = self.worker.process_queue().await?;

        if let Some(retention) = self.archive_retention {
            let removed = queue.cleanup_archive(retention).await?;
            if removed > 0 {
                info!(removed, "Old archived tasks deleted");
            }
        }
        Ok(report)
    }

    /// Sweep every interval until [`Self::shutdown`] is called.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            interval_secs = self.interval.as_secs(),
            queue = %self.worker.queue().queue_dir().display(),
            "Starting queue watcher"
        );
        let mut shutdown_rx = self.shutdown.subscribe();
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut failures = FailureTracker::new(5);

        while !*shutdown_rx.borrow() {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping queue watcher");
                        break;
                    }
                }
                _ = interval.tick() => {
                    match self.run_once().await {
                        Ok(_) => failures.record_success(),
                        Err(e) => {
                            if failures.record_failure() {
                                error!("Queue sweep failed: {}", e);
                            }
                        }
                    }
                }
            }
        }

        info!("Queue watcher stopped");
        Ok(())
    }

    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }
}
