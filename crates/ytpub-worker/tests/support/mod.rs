//! Fake collaborators and a temp-dir harness for worker tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tempfile::TempDir;
use ytpub_ai::{GeneratedMetadata, MetaRequest, MetadataGenerator};
use ytpub_media::{EnhanceError, Enhancer, MediaError, MediaResult, SubtitleGenerator, SubtitleJob, ThumbnailGenerator};
use ytpub_models::{EnhanceSettings, Task};
use ytpub_queue::{QueueConfig, TaskQueue};
use ytpub_scheduler::SchedulerConfig;
use ytpub_worker::{AppConfig, Collaborators, QueueWorker};
use ytpub_youtube::{
    AccountPool, CaptionService, CaptionTrack, CredentialProvider, Credentials, PlaylistService, UploadRequest,
    UploadResponse, Uploader, YoutubeAccount, YoutubeError, YoutubeResult,
};

// =============================================================================
// Fakes
// =============================================================================

/// Enhancer that records the settings it was given.
///
/// On success it writes the requested output file; otherwise it fails like a
/// machine without ffmpeg, so the original file is uploaded.
pub struct RecordingEnhancer {
    pub succeed: bool,
    pub calls: Mutex<Vec<EnhanceSettings>>,
}

impl RecordingEnhancer {
    pub fn failing() -> Self {
        Self {
            succeed: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn succeeding() -> Self {
        Self {
            succeed: true,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn last(&self) -> EnhanceSettings {
        self.calls.lock().unwrap().last().cloned().expect("enhancer not called")
    }
}

#[async_trait]
impl Enhancer for RecordingEnhancer {
    async fn enhance(&self, _input: &Path, output: &Path, settings: &EnhanceSettings) -> Result<PathBuf, EnhanceError> {
        self.calls.lock().unwrap().push(settings.clone());
        if !self.succeed {
            return Err(EnhanceError::Media(MediaError::internal("ffmpeg unavailable")));
        }
        std::fs::write(output, b"enhanced").map_err(|e| EnhanceError::Media(MediaError::internal(e.to_string())))?;
        Ok(output.to_path_buf())
    }
}

pub struct FixedMetadata {
    pub answer: GeneratedMetadata,
    pub calls: AtomicUsize,
}

impl FixedMetadata {
    pub fn new(title: &str, tags: &[&str]) -> Self {
        Self {
            answer: GeneratedMetadata {
                title: title.to_string(),
                description: "Description générée".to_string(),
                tags: tags.iter().map(|t| t.to_string()).collect(),
                category_id: Some(27),
                hashtags: Vec::new(),
            },
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl MetadataGenerator for FixedMetadata {
    async fn generate(&self, _request: &MetaRequest) -> GeneratedMetadata {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer.clone()
    }
}

/// Thumbnail tiers that all succeed or all fail.
pub struct FakeThumbnails {
    pub fail: bool,
}

#[async_trait]
impl ThumbnailGenerator for FakeThumbnails {
    async fn best_frame(&self, _video: &Path, _output: &Path) -> MediaResult<()> {
        self.outcome("best frame")
    }

    async fn raw_frame(&self, _video: &Path, _output: &Path) -> MediaResult<()> {
        self.outcome("raw frame")
    }

    async fn placeholder(&self, _output: &Path, _title: &str) -> MediaResult<()> {
        self.outcome("placeholder")
    }
}

impl FakeThumbnails {
    fn outcome(&self, tier: &str) -> MediaResult<()> {
        if self.fail {
            Err(MediaError::internal(format!("{} failed", tier)))
        } else {
            Ok(())
        }
    }
}

pub struct NoSubtitles;

#[async_trait]
impl SubtitleGenerator for NoSubtitles {
    async fn detect_language(&self, _video: &Path) -> MediaResult<Option<String>> {
        Ok(Some("fr".to_string()))
    }

    async fn generate(&self, _video: &Path, output_dir: &Path, _source: &str, job: &SubtitleJob) -> MediaResult<PathBuf> {
        Ok(output_dir.join(format!("{}.srt", job.language)))
    }
}

pub struct StaticCredentials;

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn get_credentials(&self, _scopes: &[&str], _secrets: &Path, _token: &Path) -> YoutubeResult<Credentials> {
        Ok(Credentials::new("test-token", None))
    }
}

/// How the recording uploader answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadBehavior {
    Succeed,
    QuotaExceeded,
    BadRequest,
}

/// Uploader that records every request.
pub struct RecordingUploader {
    pub behavior: UploadBehavior,
    pub requests: Mutex<Vec<UploadRequest>>,
}

impl RecordingUploader {
    pub fn new(behavior: UploadBehavior) -> Self {
        Self {
            behavior,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last(&self) -> UploadRequest {
        self.requests.lock().unwrap().last().cloned().expect("no upload recorded")
    }
}

#[async_trait]
impl Uploader for RecordingUploader {
    async fn upload(&self, _credentials: &Credentials, request: &UploadRequest) -> YoutubeResult<UploadResponse> {
        let n = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.clone());
            requests.len()
        };
        match self.behavior {
            UploadBehavior::Succeed => Ok(UploadResponse {
                id: format!("yt{}", n),
                body: Value::Null,
            }),
            UploadBehavior::QuotaExceeded => Err(YoutubeError::QuotaExceeded {
                reason: "uploadLimitExceeded".to_string(),
                message: "The user has exceeded the number of videos they may upload.".to_string(),
            }),
            UploadBehavior::BadRequest => Err(YoutubeError::Http {
                status: 400,
                message: "Bad request".to_string(),
            }),
        }
    }
}

pub struct NoCaptions;

#[async_trait]
impl CaptionService for NoCaptions {
    async fn list_captions(&self, _c: &Credentials, _video_id: &str) -> YoutubeResult<Vec<CaptionTrack>> {
        Ok(Vec::new())
    }

    async fn insert_caption(&self, _c: &Credentials, _v: &str, language: &str, _srt: &Path, _draft: bool) -> YoutubeResult<String> {
        Ok(format!("cap_{}", language))
    }

    async fn update_caption(&self, _c: &Credentials, caption_id: &str, _srt: &Path, _draft: bool) -> YoutubeResult<String> {
        Ok(caption_id.to_string())
    }
}

pub struct RecordingPlaylists {
    pub added: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl PlaylistService for RecordingPlaylists {
    async fn add_to_playlist(&self, _c: &Credentials, playlist_id: &str, video_id: &str) -> YoutubeResult<String> {
        self.added
            .lock()
            .unwrap()
            .push((playlist_id.to_string(), video_id.to_string()));
        Ok("item1".to_string())
    }
}

/// Multi-account pool with every account saturated.
pub struct ExhaustedPool;

#[async_trait]
impl AccountPool for ExhaustedPool {
    fn get_chat_account(&self, _chat_id: &str) -> Option<YoutubeAccount> {
        None
    }

    fn get_best_account_for_upload(&self) -> Option<YoutubeAccount> {
        None
    }

    async fn get_credentials_for_account(&self, account_id: &str) -> YoutubeResult<Credentials> {
        Err(YoutubeError::account(format!("unknown account {}", account_id)))
    }

    fn record_upload(&self, _account_id: &str, _api_calls_used: u64) {}
}

// =============================================================================
// Harness
// =============================================================================

pub struct Harness {
    pub dir: TempDir,
    pub enhancer: Arc<RecordingEnhancer>,
    pub uploader: Arc<RecordingUploader>,
    pub metadata: Arc<FixedMetadata>,
    pub playlists: Arc<RecordingPlaylists>,
    pub thumbnails_fail: bool,
    pub accounts: Option<Arc<dyn AccountPool>>,
    pub settings: AppConfig,
}

impl Harness {
    pub fn new(behavior: UploadBehavior) -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("queue")).unwrap();
        std::fs::create_dir_all(dir.path().join("videos")).unwrap();
        Self {
            dir,
            enhancer: Arc::new(RecordingEnhancer::failing()),
            uploader: Arc::new(RecordingUploader::new(behavior)),
            metadata: Arc::new(FixedMetadata::new("Titre IA", &["ia", "seo"])),
            playlists: Arc::new(RecordingPlaylists {
                added: Mutex::new(Vec::new()),
            }),
            thumbnails_fail: false,
            accounts: None,
            settings: AppConfig::default(),
        }
    }

    pub fn queue(&self) -> TaskQueue {
        TaskQueue::new(QueueConfig::new(self.queue_dir(), self.archive_dir()))
    }

    pub fn queue_dir(&self) -> PathBuf {
        self.dir.path().join("queue")
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.dir.path().join("archive")
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig::new(self.dir.path().join("schedule"))
    }

    /// Create an empty video file and return its path.
    pub fn video(&self, name: &str) -> PathBuf {
        let path = self.dir.path().join("videos").join(name);
        std::fs::write(&path, b"not really a video").unwrap();
        path
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            enhancer: self.enhancer.clone(),
            metadata: self.metadata.clone(),
            vision: None,
            thumbnails: Arc::new(FakeThumbnails {
                fail: self.thumbnails_fail,
            }),
            subtitles: Arc::new(NoSubtitles),
            credentials: Arc::new(StaticCredentials),
            uploader: self.uploader.clone(),
            captions: Arc::new(NoCaptions),
            playlists: self.playlists.clone(),
            accounts: self.accounts.clone(),
            notifier: None,
        }
    }

    pub fn worker(&self) -> QueueWorker {
        QueueWorker::new(
            self.queue(),
            self.scheduler_config(),
            self.settings.clone(),
            self.collaborators(),
            self.dir.path().join("work"),
        )
    }

    /// Write `task` as `name` in the queue directory.
    pub fn write_task(&self, name: &str, task: &Task) -> PathBuf {
        let path = self.queue_dir().join(name);
        std::fs::write(&path, serde_json::to_vec_pretty(task).unwrap()).unwrap();
        path
    }

    pub fn write_raw(&self, name: &str, body: &Value) -> PathBuf {
        let path = self.queue_dir().join(name);
        std::fs::write(&path, serde_json::to_vec_pretty(body).unwrap()).unwrap();
        path
    }

    pub fn read_json(&self, path: &Path) -> Value {
        serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
    }

    pub fn archived(&self, name: &str) -> Value {
        self.read_json(&self.archive_dir().join(name))
    }

    pub fn queued(&self, name: &str) -> Value {
        self.read_json(&self.queue_dir().join(name))
    }
}
