//! Process configuration from the environment.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use ytpub_queue::QueueConfig;
use ytpub_scheduler::SchedulerConfig;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Queue and archive directories
    pub queue: QueueConfig,
    /// Schedule directory and slot policy
    pub scheduler: SchedulerConfig,
    /// Application config file (YAML or JSON)
    pub config_path: PathBuf,
    /// Scratch space for thumbnails and subtitles
    pub work_dir: PathBuf,
    /// Queue watcher period
    pub poll_interval: Duration,
    /// Promoter period
    pub scheduler_interval: Duration,
    /// Run one sweep and exit
    pub oneshot: bool,
    /// Archived tasks older than this are deleted after each sweep
    pub archive_retention: Option<Duration>,
    /// Prometheus listener, disabled when unset
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue: QueueConfig::default(),
            scheduler: SchedulerConfig::default(),
            config_path: PathBuf::from("config/video.yaml"),
            work_dir: PathBuf::from("work"),
            poll_interval: Duration::from_secs(30),
            scheduler_interval: Duration::from_secs(60),
            oneshot: false,
            archive_retention: None,
            metrics_addr: None,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            queue: QueueConfig::from_env(),
            scheduler: SchedulerConfig::from_env(),
            config_path: std::env::var("YTPUB_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("config/video.yaml")),
            work_dir: std::env::var("YTPUB_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("work")),
            poll_interval: Duration::from_secs(
                std::env::var("YTPUB_POLL_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            scheduler_interval: Duration::from_secs(
                std::env::var("YTPUB_SCHEDULER_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),
            oneshot: std::env::var("YTPUB_ONESHOT")
                .map(|v| parse_flag(&v))
                .unwrap_or(false),
            archive_retention: std::env::var("YTPUB_ARCHIVE_RETENTION_DAYS")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .filter(|days| *days > 0)
                .map(|days| Duration::from_secs(days * 24 * 3600)),
            metrics_addr: std::env::var("METRICS_ADDR").ok().and_then(|s| s.parse().ok()),
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
