//! Scheduled tasks survive bad neighbours in `scheduled_tasks.json`.

use std::path::Path;

use chrono::TimeZone;
use tempfile::TempDir;
use ytpub_scheduler::{SchedulerConfig, UploadScheduler};

const SEEDED: &str = r#"[
    {"task_id": "sched_1_a", "scheduled_time": "2030-07-01T18:00:00+02:00",
     "original_task_path": "queue_archive/task_a.json", "status": "scheduled",
     "created_at": "2030-06-30T10:00:00+02:00", "attempts": 0, "max_attempts": 3},
    {"task_id": "sched_2_b", "scheduled_time": "2030-07-01T19:00:00+02:00",
     "original_task_path": "queue_archive/task_b.json", "status": "cancelled"}
]"#;

#[test]
fn bad_record_does_not_wipe_valid_tasks() {
    let dir = TempDir::new().unwrap();
    let config = SchedulerConfig::new(dir.path());
    std::fs::write(config.tasks_file(), SEEDED).unwrap();

    let mut scheduler = UploadScheduler::open(config.clone());
    assert_eq!(scheduler.tasks().len(), 1);

    let now = chrono_tz::Europe::Paris
        .with_ymd_and_hms(2030, 6, 30, 9, 0, 0)
        .unwrap()
        .fixed_offset();
    let added = scheduler.schedule_task_at(Path::new("task_c.json"), None, None, now);

    let reopened = UploadScheduler::open(config);
    let mut ids: Vec<_> = reopened.tasks().iter().map(|t| t.task_id.clone()).collect();
    ids.sort();
    let mut expected = vec!["sched_1_a".to_string(), added.task_id];
    expected.sort();
    assert_eq!(ids, expected);
}

#[test]
fn unreadable_store_is_kept_aside_before_overwrite() {
    let dir = TempDir::new().unwrap();
    let config = SchedulerConfig::new(dir.path());
    std::fs::write(config.tasks_file(), b"[{\"task_id\": ").unwrap();

    let mut scheduler = UploadScheduler::open(config.clone());
    assert!(scheduler.tasks().is_empty());
    scheduler.schedule_task(Path::new("task_a.json"), None, None);

    let aside = config.tasks_file().with_extension("json.corrupt");
    assert_eq!(std::fs::read(aside).unwrap(), b"[{\"task_id\": ");
    assert_eq!(UploadScheduler::open(config).tasks().len(), 1);
}
