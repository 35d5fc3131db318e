//! Scheduler configuration.

use std::path::PathBuf;

use chrono::Duration;
use chrono_tz::Tz;
use tracing::warn;

use crate::error::{SchedulerError, SchedulerResult};

pub const DEFAULT_TIMEZONE: Tz = chrono_tz::Europe::Paris;

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Directory holding `scheduled_tasks.json` and `time_slots.json`
    pub schedule_dir: PathBuf,
    /// Zone in which slots are expressed and naive timestamps are read
    pub timezone: Tz,
    /// Maximum pending uploads inside one slot window
    pub slot_capacity: usize,
    /// Retry budget given to new scheduled tasks
    pub max_attempts: u32,
    /// Delay before a failed task is retried
    pub retry_delay: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            schedule_dir: PathBuf::from("schedule"),
            timezone: DEFAULT_TIMEZONE,
            slot_capacity: 3,
            max_attempts: 3,
            retry_delay: Duration::hours(1),
        }
    }
}

impl SchedulerConfig {
    pub fn new(schedule_dir: impl Into<PathBuf>) -> Self {
        Self {
            schedule_dir: schedule_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    /// Create config from environment variables.
    ///
    /// An unknown `YTPUB_TIMEZONE` falls back to the default zone with a warning.
    pub fn from_env() -> Self {
        let timezone = match std::env::var("YTPUB_TIMEZONE") {
            Ok(name) => parse_timezone(&name).unwrap_or_else(|e| {
                warn!("{}, using {}", e, DEFAULT_TIMEZONE);
                DEFAULT_TIMEZONE
            }),
            Err(_) => DEFAULT_TIMEZONE,
        };

        Self {
            schedule_dir: std::env::var("YTPUB_SCHEDULE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("schedule")),
            timezone,
            slot_capacity: std::env::var("YTPUB_SLOT_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
            max_attempts: std::env::var("YTPUB_MAX_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
            retry_delay: Duration::minutes(
                std::env::var("YTPUB_RETRY_DELAY_MINS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),
        }
    }

    pub fn tasks_file(&self) -> PathBuf {
        self.schedule_dir.join("scheduled_tasks.json")
    }

    pub fn slots_file(&self) -> PathBuf {
        self.schedule_dir.join("time_slots.json")
    }
}

/// Parse an IANA zone name such as `Europe/Paris`.
pub fn parse_timezone(name: &str) -> SchedulerResult<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| SchedulerError::InvalidTimezone(name.to_string()))
}
