//! Scheduled-task promoter binary.

use std::sync::Arc;

use tracing::{error, info};

use ytpub_queue::TaskQueue;
use ytpub_worker::{init_tracing, ScheduledWorker, WorkerConfig};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    info!("Starting scheduled-worker");

    let config = WorkerConfig::from_env();
    let worker = Arc::new(ScheduledWorker::new(
        config.scheduler.clone(),
        TaskQueue::new(config.queue.clone()),
        config.scheduler_interval,
    ));

    if config.oneshot {
        match worker.process_ready_tasks().await {
            Ok(report) => info!("Promotion finished: {:?}", report),
            Err(e) => {
                error!("Promotion failed: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    let signal_worker = Arc::clone(&worker);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        signal_worker.shutdown();
    });

    if let Err(e) = worker.run().await {
        error!("Scheduled worker error: {}", e);
        std::process::exit(1);
    }

    info!("Scheduled worker shutdown complete");
}
