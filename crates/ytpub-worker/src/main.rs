//! Upload queue worker binary.

use std::sync::Arc;

use tracing::{error, info};

use ytpub_queue::TaskQueue;
use ytpub_worker::metrics::init_metrics;
use ytpub_worker::{init_tracing, AppConfig, Collaborators, QueueWatcher, QueueWorker, WorkerConfig};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        eprintln!("Failed to install rustls crypto provider");
        std::process::exit(1);
    }

    dotenvy::dotenv().ok();
    init_tracing();

    info!("Starting ytpub-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    if let Some(addr) = config.metrics_addr {
        init_metrics(addr);
    }

    let settings = AppConfig::load_or_default(&config.config_path);
    let collaborators = match Collaborators::production(&settings) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to create collaborators: {}", e);
            std::process::exit(1);
        }
    };

    let worker = QueueWorker::new(
        TaskQueue::new(config.queue.clone()),
        config.scheduler.clone(),
        settings,
        collaborators,
        config.work_dir.clone(),
    );
    let watcher = Arc::new(QueueWatcher::new(worker, config.poll_interval, config.archive_retention));

    if config.oneshot {
        match watcher.run_once().await {
            Ok(report) => info!("Sweep finished: {:?}", report),
            Err(e) => {
                error!("Sweep failed: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    let signal_watcher = Arc::clone(&watcher);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        signal_watcher.shutdown();
    });

    if let Err(e) = watcher.run().await {
        error!("Watcher error: {}", e);
        std::process::exit(1);
    }

    info!("Worker shutdown complete");
}
