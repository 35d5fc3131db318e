//! Task queue over a directory of JSON files.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use ytpub_models::{Task, TaskStatus};

use crate::error::{QueueError, QueueResult};

/// Prefix of producer-written tasks.
pub const TASK_PREFIX: &str = "task_";
/// Prefix of tasks re-injected by the scheduler.
pub const SCHEDULED_PREFIX: &str = "scheduled_";

const LOCK_SUFFIX: &str = ".lock";

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub queue_dir: PathBuf,
    pub archive_dir: PathBuf,
    /// Claim locks older than this are considered abandoned.
    pub stale_lock_after: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            queue_dir: PathBuf::from("queue"),
            archive_dir: PathBuf::from("queue_archive"),
            stale_lock_after: Duration::from_secs(3600),
        }
    }
}

impl QueueConfig {
    pub fn new(queue_dir: impl Into<PathBuf>, archive_dir: impl Into<PathBuf>) -> Self {
        Self {
            queue_dir: queue_dir.into(),
            archive_dir: archive_dir.into(),
            ..Default::default()
        }
    }

    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            queue_dir: std::env::var("YTPUB_QUEUE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.queue_dir),
            archive_dir: std::env::var("YTPUB_ARCHIVE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.archive_dir),
            stale_lock_after: Duration::from_secs(
                std::env::var("YTPUB_LOCK_STALE_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3600),
            ),
        }
    }
}

/// Exclusive claim on one task file.
#[derive(Debug)]
pub struct TaskClaim {
    path: PathBuf,
    lock_path: PathBuf,
}

impl TaskClaim {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    pid: u32,
    token: String,
    claimed_at: String,
}

/// File-based task queue.
#[derive(Debug, Clone)]
pub struct TaskQueue {
    config: QueueConfig,
}

impl TaskQueue {
    pub fn new(config: QueueConfig) -> Self {
        Self { config }
    }

    /// Create from environment variables.
    pub fn from_env() -> Self {
        Self::new(QueueConfig::from_env())
    }

    /// Create the queue and archive directories.
    pub async fn init(&self) -> QueueResult<()> {
        tokio::fs::create_dir_all(&self.config.queue_dir).await?;
        tokio::fs::create_dir_all(&self.config.archive_dir).await?;
        Ok(())
    }

    pub fn queue_dir(&self) -> &Path {
        &self.config.queue_dir
    }

    pub fn archive_dir(&self) -> &Path {
        &self.config.archive_dir
    }

    /// Where `path` lands once archived.
    pub fn archive_path_for(&self, path: &Path) -> PathBuf {
        match path.file_name() {
            Some(name) => self.config.archive_dir.join(name),
            None => self.config.archive_dir.join(path),
        }
    }

    /// `task_*.json` and `scheduled_*.json` files, in lexicographic order.
    pub async fn list_task_files(&self) -> QueueResult<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.config.queue_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(files),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if is_task_file_name(&name) && entry.file_type().await?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        Ok(files)
    }

    /// Task files a worker may pick up: admissible status and not claimed.
    ///
    /// Files that cannot be read are included so the worker can report them.
    pub async fn list_pending(&self) -> QueueResult<Vec<PathBuf>> {
        let mut pending = Vec::new();
        for path in self.list_task_files().await? {
            if self.is_claimed(&path).await {
                continue;
            }
            let admissible = match self.read_raw(&path).await {
                Ok(raw) => is_admissible_raw(&raw),
                Err(_) => true,
            };
            if admissible {
                pending.push(path);
            }
        }
        Ok(pending)
    }

    /// Raw JSON body of a task file.
    pub async fn read_raw(&self, path: &Path) -> QueueResult<Value> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(QueueError::NotFound(path.to_path_buf()))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Load and validate a task.
    pub async fn load(&self, path: &Path) -> QueueResult<Task> {
        let raw = self.read_raw(path).await?;
        serde_json::from_value(raw).map_err(|e| QueueError::invalid_task(path, e.to_string()))
    }

    /// Replace the whole file through a temp file and a rename.
    pub async fn save(&self, path: &Path, task: &Task) -> QueueResult<()> {
        let body = serde_json::to_vec_pretty(task)?;
        write_atomic(path, &body).await
    }

    /// Write a new task file into the queue directory.
    pub async fn enqueue(&self, file_name: &str, task: &Task) -> QueueResult<PathBuf> {
        tokio::fs::create_dir_all(&self.config.queue_dir).await?;
        let path = self.config.queue_dir.join(file_name);
        let body = serde_json::to_vec_pretty(task)?;
        write_atomic(&path, &body).await?;
        info!(task = %path.display(), "Task enqueued");
        Ok(path)
    }

    /// Try to take the exclusive lock on `path`.
    ///
    /// Returns `None` when another worker holds a live claim.
    pub async fn claim(&self, path: &Path) -> QueueResult<Option<TaskClaim>> {
        if !tokio::fs::try_exists(path).await? {
            return Err(QueueError::NotFound(path.to_path_buf()));
        }
        let lock_path = lock_path_for(path);

        for attempt in 0..2 {
            match create_lock(&lock_path).await {
                Ok(()) => {
                    debug!(task = %path.display(), "Task claimed");
                    return Ok(Some(TaskClaim {
                        path: path.to_path_buf(),
                        lock_path,
                    }));
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if attempt == 0 && self.is_stale(&lock_path).await {
                        warn!(lock = %lock_path.display(), "Reclaiming stale task lock");
                        let _ = tokio::fs::remove_file(&lock_path).await;
                        continue;
                    }
                    return Ok(None);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(None)
    }

    /// Drop the claim, leaving the task file in the queue.
    pub async fn release(&self, claim: TaskClaim) -> QueueResult<()> {
        remove_if_exists(&claim.lock_path).await
    }

    /// Move a task file into the archive directory.
    pub async fn archive(&self, path: &Path) -> QueueResult<PathBuf> {
        tokio::fs::create_dir_all(&self.config.archive_dir).await?;
        let dest = self.archive_path_for(path);
        move_file(path, &dest).await?;
        info!(task = %path.display(), archive = %dest.display(), "Task archived");
        Ok(dest)
    }

    /// Persist the final state, archive it and release the claim.
    pub async fn complete(&self, claim: TaskClaim, task: &Task) -> QueueResult<PathBuf> {
        self.save(&claim.path, task).await?;
        let dest = self.archive(&claim.path).await;
        self.release(claim).await?;
        dest
    }

    /// Persist a failed task; archived when `archive` is set, otherwise left in place.
    pub async fn fail(&self, claim: TaskClaim, task: &Task, archive: bool) -> QueueResult<Option<PathBuf>> {
        self.save(&claim.path, task).await?;
        let dest = if archive {
            Some(self.archive(&claim.path).await)
        } else {
            None
        };
        self.release(claim).await?;
        dest.transpose()
    }

    /// Mark a file that is JSON but not a valid task as errored, then archive it.
    pub async fn reject(&self, claim: TaskClaim, message: &str) -> QueueResult<PathBuf> {
        let mut raw = self.read_raw(&claim.path).await?;
        if let Value::Object(map) = &mut raw {
            map.insert("status".into(), Value::String(TaskStatus::Error.as_str().into()));
            map.insert("error".into(), Value::String(message.to_string()));
        }
        write_atomic(&claim.path, &serde_json::to_vec_pretty(&raw)?).await?;
        let dest = self.archive(&claim.path).await;
        self.release(claim).await?;
        dest
    }

    /// Delete archived tasks older than `older_than`. Returns how many were removed.
    pub async fn cleanup_archive(&self, older_than: Duration) -> QueueResult<usize> {
        let cutoff = SystemTime::now().checked_sub(older_than).unwrap_or(SystemTime::UNIX_EPOCH);
        let mut removed = 0;
        let mut entries = match tokio::fs::read_dir(&self.config.archive_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !is_task_file_name(&name) {
                continue;
            }
            let modified = entry.metadata().await?.modified()?;
            if modified < cutoff {
                tokio::fs::remove_file(entry.path()).await?;
                removed += 1;
            }
        }
        if removed > 0 {
            info!(removed, "Old archived tasks removed");
        }
        Ok(removed)
    }

    async fn is_claimed(&self, path: &Path) -> bool {
        let lock_path = lock_path_for(path);
        match tokio::fs::try_exists(&lock_path).await {
            Ok(true) => !self.is_stale(&lock_path).await,
            _ => false,
        }
    }

    async fn is_stale(&self, lock_path: &Path) -> bool {
        let Ok(meta) = tokio::fs::metadata(lock_path).await else {
            return false;
        };
        meta.modified()
            .ok()
            .and_then(|m| m.elapsed().ok())
            .map(|age| age > self.config.stale_lock_after)
            .unwrap_or(false)
    }
}

fn is_task_file_name(name: &str) -> bool {
    name.ends_with(".json") && (name.starts_with(TASK_PREFIX) || name.starts_with(SCHEDULED_PREFIX))
}

/// Same admission rule as [`Task::is_admissible`], on the raw body.
fn is_admissible_raw(raw: &Value) -> bool {
    match raw.get("status") {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s == TaskStatus::Pending.as_str() || s == TaskStatus::Error.as_str(),
        Some(_) => true,
    }
}

fn lock_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(LOCK_SUFFIX);
    path.with_file_name(name)
}

async fn create_lock(lock_path: &Path) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(lock_path)
        .await?;
    let info = LockInfo {
        pid: std::process::id(),
        token: uuid::Uuid::new_v4().to_string(),
        claimed_at: Utc::now().to_rfc3339(),
    };
    let body = serde_json::to_vec(&info).map_err(std::io::Error::other)?;
    file.write_all(&body).await?;
    file.flush().await
}

async fn write_atomic(path: &Path, body: &[u8]) -> QueueResult<()> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4()));
    tokio::fs::write(&tmp, body).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

/// Rename, falling back to copy + remove across filesystems.
async fn move_file(from: &Path, to: &Path) -> QueueResult<()> {
    match tokio::fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(QueueError::NotFound(from.to_path_buf())),
        Err(rename_err) => {
            debug!(error = %rename_err, "Rename failed, copying instead");
            tokio::fs::copy(from, to).await?;
            tokio::fs::remove_file(from).await?;
            Ok(())
        }
    }
}

async fn remove_if_exists(path: &Path) -> QueueResult<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
