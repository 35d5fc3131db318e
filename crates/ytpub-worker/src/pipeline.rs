//! Queue worker: one sweep over the pending task files.
//!
//! Each task is claimed, run through the upload pipeline and settled:
//! - uploaded tasks are marked `done` and archived
//! - deferred tasks are handed to the scheduler and archived untouched
//! - known failures are marked `error` (or `blocked` on quota) and archived
//! - unexpected failures are marked `error` and left in the queue
//!
//! A quota-exceeded upload stops the sweep; the remaining tasks wait for the next one.

use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::{debug, error, info, warn, Instrument};
use ytpub_media::generate_with_fallback;
use ytpub_models::{EnhanceOverrides, EnhanceSettings, ModelResult, ScheduleMode, Task, TaskStatus};
use ytpub_queue::{TaskClaim, TaskQueue};
use ytpub_scheduler::{SchedulerConfig, UploadScheduler};
use ytpub_youtube::{Credentials, UploadRequest, UPLOAD_API_COST, YOUTUBE_SCOPES};

use crate::collaborators::Collaborators;
use crate::error::{WorkerError, WorkerResult, QUOTA_ERROR_CODE};
use crate::logging::TaskLogger;
use crate::metadata::{resolve_metadata, resolve_upload_category};
use crate::metrics;
use crate::notify::UploadNotice;
use crate::settings::AppConfig;
use crate::subtitles::{generate_and_upload, SubtitleOptions};

/// Delay applied before an automatically derived `publish_at`, in hours.
const AUTO_PUBLISH_MIN_DELAY_HOURS: i64 = 1;

/// Counts for one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub done: usize,
    pub errored: usize,
    pub blocked: usize,
    pub scheduled: usize,
    pub rejected: usize,
    pub skipped: usize,
    /// Stopped early on a quota-exceeded upload.
    pub aborted: bool,
}

impl SweepReport {
    pub fn processed(&self) -> usize {
        self.done + self.errored + self.blocked + self.scheduled + self.rejected
    }
}

/// How a task left the pipeline without an error.
#[derive(Debug)]
enum Disposition {
    Uploaded,
    Deferred,
}

/// When a task asked to be uploaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deferral {
    Now,
    /// Next optimal slot.
    Auto,
    At(DateTime<FixedOffset>),
}

impl Deferral {
    /// Deferral requested by `task` as seen at `now`. Custom times in the
    /// past, missing or unparseable are processed immediately.
    pub fn for_task(task: &Task, tz: Tz, now: DateTime<FixedOffset>) -> Self {
        match task.schedule_mode() {
            ScheduleMode::Now => Deferral::Now,
            ScheduleMode::Auto => Deferral::Auto,
            ScheduleMode::Custom => match task.custom_schedule_time.as_deref() {
                Some(raw) => match parse_schedule_time(raw, tz) {
                    Some(at) if at > now => Deferral::At(at),
                    Some(at) => {
                        debug!(custom_schedule_time = %at, "Custom schedule time already passed");
                        Deferral::Now
                    }
                    None => {
                        warn!(custom_schedule_time = raw, "Unparseable custom schedule time, processing now");
                        Deferral::Now
                    }
                },
                None => {
                    warn!("Custom schedule mode without a time, processing now");
                    Deferral::Now
                }
            },
        }
    }
}

/// RFC3339, or a naive ISO datetime read in `tz`.
pub fn parse_schedule_time(raw: &str, tz: Tz) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at);
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .and_then(|naive| tz.from_local_datetime(&naive).earliest())
        .map(|at| at.fixed_offset())
}

/// `<stem>.enhanced.mp4` next to the source video.
pub fn enhanced_path_for(video: &Path) -> PathBuf {
    let stem = video
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "video".to_string());
    video.with_file_name(format!("{}.enhanced.mp4", stem))
}

/// The queue worker.
pub struct QueueWorker {
    queue: TaskQueue,
    scheduler_config: SchedulerConfig,
    settings: AppConfig,
    collab: Collaborators,
    work_dir: PathBuf,
}

impl QueueWorker {
    pub fn new(
        queue: TaskQueue,
        scheduler_config: SchedulerConfig,
        settings: AppConfig,
        collab: Collaborators,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            queue,
            scheduler_config,
            settings,
            collab,
            work_dir: work_dir.into(),
        }
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    pub fn settings(&self) -> &AppConfig {
        &self.settings
    }

    /// Scheduler state is re-read on every use; the promoter writes the same store.
    fn scheduler(&self) -> UploadScheduler {
        UploadScheduler::open(self.scheduler_config.clone())
    }

    /// Drain every pending task once, in file name order.
    pub async fn process_queue(&self) -> WorkerResult<SweepReport> {
        self.queue.init().await?;
        let pending = self.queue.list_pending().await?;
        let mut report = SweepReport::default();
        if pending.is_empty() {
            debug!(queue = %self.queue.queue_dir().display(), "No pending tasks");
            return Ok(report);
        }

        info!(tasks = pending.len(), "Queue sweep started");
        for path in &pending {
            match self.process_file(path, &mut report).await {
                Ok(ControlFlow::Continue(())) => {}
                Ok(ControlFlow::Break(())) => {
                    report.aborted = true;
                    metrics::record_sweep_aborted();
                    warn!(task = %path.display(), "Upload quota exceeded, stopping sweep");
                    break;
                }
                Err(e) => error!(task = %path.display(), "Failed to settle task: {}", e),
            }
        }

        info!(
            done = report.done,
            errored = report.errored,
            blocked = report.blocked,
            scheduled = report.scheduled,
            rejected = report.rejected,
            skipped = report.skipped,
            aborted = report.aborted,
            "Queue sweep finished"
        );
        Ok(report)
    }

    async fn process_file(&self, path: &Path, report: &mut SweepReport) -> WorkerResult<ControlFlow<()>> {
        let claim = match self.queue.claim(path).await {
            Ok(Some(claim)) => claim,
            Ok(None) => {
                debug!(task = %path.display(), "Task claimed by another worker");
                report.skipped += 1;
                return Ok(ControlFlow::Continue(()));
            }
            Err(e) if e.is_not_found() => {
                debug!(task = %path.display(), "Task file vanished before claim");
                report.skipped += 1;
                return Ok(ControlFlow::Continue(()));
            }
            Err(e) => return Err(e.into()),
        };

        let mut task = match self.queue.load(path).await {
            Ok(task) => task,
            Err(e) if e.is_invalid_task() => {
                warn!(task = %path.display(), "Rejecting invalid task: {}", e);
                self.queue.reject(claim, &e.to_string()).await?;
                report.rejected += 1;
                metrics::record_task("rejected");
                return Ok(ControlFlow::Continue(()));
            }
            Err(e) => {
                warn!(task = %path.display(), "Unreadable task file skipped: {}", e);
                self.queue.release(claim).await?;
                report.skipped += 1;
                return Ok(ControlFlow::Continue(()));
            }
        };

        // the file may have changed between listing and claiming
        if !task.is_admissible() {
            debug!(task = %path.display(), status = ?task.status, "Task not admissible, left untouched");
            self.queue.release(claim).await?;
            report.skipped += 1;
            return Ok(ControlFlow::Continue(()));
        }

        let logger = TaskLogger::for_file(path, "upload");
        let outcome = self
            .run_task(&mut task, path, &logger)
            .instrument(logger.create_span())
            .await;

        match outcome {
            Ok(Disposition::Uploaded) => {
                self.queue.complete(claim, &task).await?;
                report.done += 1;
                metrics::record_task("done");
                Ok(ControlFlow::Continue(()))
            }
            Ok(Disposition::Deferred) => {
                self.queue.release(claim).await?;
                report.scheduled += 1;
                metrics::record_task("scheduled");
                Ok(ControlFlow::Continue(()))
            }
            Err(e) => self.settle_failure(claim, task, e, &logger, report).await,
        }
    }

    async fn settle_failure(
        &self,
        claim: TaskClaim,
        mut task: Task,
        error: WorkerError,
        logger: &TaskLogger,
        report: &mut SweepReport,
    ) -> WorkerResult<ControlFlow<()>> {
        if let Err(e) = mark_failed(&mut task, &error) {
            self.queue.release(claim).await?;
            return Err(e.into());
        }

        let archive = error.is_handled();
        if archive {
            logger.log_error(&error.to_string());
            if let Some(id) = &task.scheduled_task_id {
                if let Err(e) = self.scheduler().mark_task_failed(id, false) {
                    warn!(task_id = %id, "Failed to mark scheduled task failed: {}", e);
                }
            }
        } else {
            logger.log_error(&format!("Unexpected failure, task left in queue: {}", error));
        }
        self.queue.fail(claim, &task, archive).await?;

        if error.is_quota_exceeded() {
            report.blocked += 1;
            metrics::record_task("blocked");
            return Ok(ControlFlow::Break(()));
        }
        report.errored += 1;
        metrics::record_task(if archive { "error" } else { "failed" });
        Ok(ControlFlow::Continue(()))
    }

    async fn run_task(&self, task: &mut Task, path: &Path, logger: &TaskLogger) -> WorkerResult<Disposition> {
        logger.log_start(&task.video_path.display().to_string());

        if task.scheduled_task_id.is_none() && self.defer(task, path, logger).await {
            return Ok(Disposition::Deferred);
        }

        let video = std::path::absolute(&task.video_path)?;
        if !tokio::fs::try_exists(&video).await.unwrap_or(false) {
            return Err(WorkerError::resource_missing(format!("Video not found: {}", video.display())));
        }

        let media = self.enhance(task, &video, logger).await;

        let meta = resolve_metadata(task, &video, &self.settings, self.collab.metadata.as_ref()).await;
        logger.log_step(&format!("Metadata resolved (ai: {})", meta.ai_used));

        let vision_category = match &self.collab.vision {
            Some(vision) => vision.analyze_video(&media).await.map(|a| a.category_id),
            None => None,
        };
        let category_id = resolve_upload_category(vision_category, meta.ai_category, task, &self.settings);

        let thumbnail_path = self.thumbnail(task, &media, path, &meta.title).await;

        let credentials = self.acquire_credentials(task).await?;
        let request = self.upload_request(task, media.clone(), &meta.title, &meta.description, meta.tags, category_id, thumbnail_path);

        let started = Instant::now();
        let response = match self.collab.uploader.upload(&credentials, &request).await {
            Ok(response) => {
                metrics::record_upload("success", started.elapsed());
                response
            }
            Err(e) => {
                metrics::record_upload(if e.is_quota_exceeded() { "quota" } else { "error" }, started.elapsed());
                return Err(e.into());
            }
        };
        logger.log_step(&format!("Uploaded as {}", response.id));
        task.youtube_id = Some(response.id.clone());

        self.after_upload(task, &request, &credentials, &media, &response.id).await;

        task.transition(TaskStatus::Done)?;
        logger.log_completion(&format!("https://youtu.be/{}", response.id));
        Ok(Disposition::Uploaded)
    }

    /// Hand the task to the scheduler and archive its file. Returns whether it was deferred.
    async fn defer(&self, task: &Task, path: &Path, logger: &TaskLogger) -> bool {
        let tz = self.scheduler_config.timezone;
        let now = Utc::now().with_timezone(&tz).fixed_offset();
        let at = match Deferral::for_task(task, tz, now) {
            Deferral::Now => return false,
            Deferral::Auto => None,
            Deferral::At(at) => Some(at),
        };

        let mut scheduler = self.scheduler();
        let archived_path = self.queue.archive_path_for(path);
        let scheduled = scheduler.schedule_task(&archived_path, at, task.preferred_days.as_deref());
        match self.queue.archive(path).await {
            Ok(_) => {
                logger.log_completion(&format!(
                    "Scheduled as {} for {}",
                    scheduled.task_id,
                    scheduled.scheduled_time.to_rfc3339()
                ));
                true
            }
            Err(e) => {
                logger.log_warning(&format!("Could not archive scheduled task, processing now: {}", e));
                scheduler.cancel_task(&scheduled.task_id);
                false
            }
        }
    }

    /// Enhanced file, or the original when enhancement is off or fails.
    async fn enhance(&self, task: &mut Task, video: &Path, logger: &TaskLogger) -> PathBuf {
        if task.skip_enhance || !self.settings.enhance.enabled {
            logger.log_step("Enhancement skipped");
            return video.to_path_buf();
        }

        let task_overrides = task
            .extra
            .get("enhance")
            .cloned()
            .and_then(|v| serde_json::from_value::<EnhanceOverrides>(v).ok())
            .unwrap_or_default();
        let preset = task.prefs.quality.or(self.settings.enhance.quality);
        let settings = EnhanceSettings::resolve(&task_overrides, &self.settings.enhance.overrides, preset);

        let output = enhanced_path_for(video);
        match self.collab.enhancer.enhance(video, &output, &settings).await {
            Ok(enhanced) => {
                logger.log_step(&format!("Enhanced into {}", enhanced.display()));
                task.enhanced_path = Some(enhanced.clone());
                enhanced
            }
            Err(e) => {
                logger.log_warning(&format!("Enhancement failed, uploading original: {}", e));
                video.to_path_buf()
            }
        }
    }

    async fn thumbnail(&self, task: &Task, media: &Path, path: &Path, title: &str) -> Option<PathBuf> {
        if let Some(explicit) = task.thumbnail_path.as_ref().or(self.settings.thumbnail_path.as_ref()) {
            if tokio::fs::try_exists(explicit).await.unwrap_or(false) {
                return Some(explicit.clone());
            }
            warn!(thumbnail = %explicit.display(), "Configured thumbnail not found, generating one");
        }

        if let Err(e) = tokio::fs::create_dir_all(&self.work_dir).await {
            warn!(dir = %self.work_dir.display(), "Cannot create work directory: {}", e);
        }
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "task".to_string());
        let output = self.work_dir.join(format!("{}_thumb.jpg", stem));
        generate_with_fallback(self.collab.thumbnails.as_ref(), media, &output, title).await
    }

    async fn acquire_credentials(&self, task: &mut Task) -> WorkerResult<Credentials> {
        let Some(pool) = &self.collab.accounts else {
            let creds = &self.settings.credentials;
            return Ok(self
                .collab
                .credentials
                .get_credentials(YOUTUBE_SCOPES, &creds.client_secrets, &creds.token)
                .await?);
        };

        let account = match &task.chat_id {
            Some(chat_id) => pool.get_chat_account(&chat_id.to_string()),
            None => pool.get_best_account_for_upload(),
        }
        .ok_or(WorkerError::NoAccount)?;
        info!(account_id = %account.account_id, "Uploading with account");
        task.account_id = Some(account.account_id.clone());
        Ok(pool.get_credentials_for_account(&account.account_id).await?)
    }

    #[allow(clippy::too_many_arguments)]
    fn upload_request(
        &self,
        task: &Task,
        video_path: PathBuf,
        title: &str,
        description: &str,
        tags: Vec<String>,
        category_id: u32,
        thumbnail_path: Option<PathBuf>,
    ) -> UploadRequest {
        let settings = &self.settings;
        let privacy_status = task
            .privacy_status
            .or(task.meta.privacy_status)
            .or(settings.privacy_status)
            .unwrap_or_default();

        let publish_at = task.publish_at.clone().or_else(|| settings.publish_at.clone()).or_else(|| {
            (privacy_status == ytpub_models::PrivacyStatus::Private).then(|| {
                self.scheduler()
                    .find_next_optimal_slot(None, task.preferred_days.as_deref(), AUTO_PUBLISH_MIN_DELAY_HOURS)
                    .to_rfc3339()
            })
        });

        let default_language = task
            .meta
            .language
            .clone()
            .or_else(|| settings.default_language.clone())
            .or_else(|| settings.language.clone())
            .unwrap_or_else(|| "fr".to_string());
        let default_audio_language = settings
            .default_audio_language
            .clone()
            .unwrap_or_else(|| default_language.clone());

        UploadRequest {
            video_path,
            title: title.to_string(),
            description: description.to_string(),
            tags,
            category_id,
            privacy_status,
            publish_at,
            thumbnail_path,
            made_for_kids: task.made_for_kids.or(task.meta.made_for_kids).or(settings.made_for_kids),
            embeddable: settings.embeddable,
            license: settings.license.clone(),
            public_stats_viewable: settings.public_stats_viewable,
            default_language: Some(default_language),
            default_audio_language: Some(default_audio_language),
            recording_date: task.received_at.clone(),
        }
    }

    /// Best-effort side effects of a successful upload.
    async fn after_upload(
        &self,
        task: &mut Task,
        request: &UploadRequest,
        credentials: &Credentials,
        media: &Path,
        youtube_id: &str,
    ) {
        if let Some(notifier) = &self.collab.notifier {
            let notice = UploadNotice {
                youtube_id: youtube_id.to_string(),
                title: request.title.clone(),
                privacy_status: request.privacy_status.as_str().to_string(),
                publish_at: request.publish_at.clone(),
            };
            if let Err(e) = notifier.notify_upload(&notice).await {
                warn!(youtube_id, "Upload notification failed: {}", e);
            }
        }

        if let Some(playlist_id) = task.playlist_id.as_ref().or(self.settings.playlist_id.as_ref()) {
            match self.collab.playlists.add_to_playlist(credentials, playlist_id, youtube_id).await {
                Ok(item) => info!(youtube_id, playlist_id = %playlist_id, item = %item, "Added to playlist"),
                Err(e) => warn!(youtube_id, playlist_id = %playlist_id, "Playlist insertion failed: {}", e),
            }
        }

        if let Some(options) = self.subtitle_options(task) {
            let report = generate_and_upload(
                self.collab.subtitles.as_ref(),
                self.collab.captions.as_ref(),
                credentials,
                media,
                youtube_id,
                &self.work_dir.join(format!("subs_{}", youtube_id)),
                &options,
            )
            .await;
            info!(youtube_id, succeeded = report.succeeded(), requested = options.languages.len(), "Subtitles processed");
            task.subtitles_result = serde_json::to_value(&report).ok();
        }

        if let (Some(pool), Some(account_id)) = (&self.collab.accounts, &task.account_id) {
            pool.record_upload(account_id, UPLOAD_API_COST);
        }

        if let Some(id) = &task.scheduled_task_id {
            match self.scheduler().mark_task_completed(id) {
                Ok(true) => info!(task_id = %id, "Scheduled task completed"),
                Ok(false) => warn!(task_id = %id, "Scheduled task not found"),
                Err(e) => warn!(task_id = %id, "Failed to mark scheduled task completed: {}", e),
            }
        }
    }

    fn subtitle_options(&self, task: &Task) -> Option<SubtitleOptions> {
        let config = &self.settings.subtitles;
        let request = task.subtitles.as_ref();
        let enabled = request.and_then(|r| r.enabled).unwrap_or(config.enabled);
        if !enabled {
            return None;
        }
        let languages = match request {
            Some(r) if !r.languages.is_empty() => r.languages.clone(),
            _ => config.languages.clone(),
        };
        Some(SubtitleOptions {
            languages,
            replace_existing: request
                .and_then(|r| r.replace_existing)
                .unwrap_or(config.replace_existing),
            draft: config.draft,
        })
    }
}

/// Failure fields written to the task file.
fn mark_failed(task: &mut Task, error: &WorkerError) -> ModelResult<()> {
    match error {
        WorkerError::QuotaExceeded { message, .. } => {
            task.transition(TaskStatus::Blocked)?;
            task.error = Some(QUOTA_ERROR_CODE.to_string());
            task.error_message = Some(format!("YouTube daily upload limit reached: {}", message));
            task.blocked_at = Some(Utc::now().to_rfc3339());
        }
        other => task.fail(other.to_string())?,
    }
    Ok(())
}
