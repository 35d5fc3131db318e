//! Subtitle generation through the Whisper CLI.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{info, warn};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// How a subtitle track is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubtitleMode {
    /// Transcribe in the spoken language.
    Transcribe,
    /// Whisper's built-in translation to English.
    Translate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleJob {
    pub language: String,
    pub mode: SubtitleMode,
}

/// Jobs to run plus requested languages that cannot be produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubtitlePlan {
    pub jobs: Vec<SubtitleJob>,
    pub skipped: Vec<String>,
}

/// Transcribe the source language, translate to English when asked, skip the rest.
pub fn plan_subtitles(source_language: &str, requested: &[String]) -> SubtitlePlan {
    let source = source_language.trim().to_lowercase();
    let mut plan = SubtitlePlan::default();
    for lang in requested {
        let lang = lang.trim().to_lowercase();
        if lang.is_empty() || plan.jobs.iter().any(|j| j.language == lang) {
            continue;
        }
        if lang == source {
            plan.jobs.push(SubtitleJob {
                language: lang,
                mode: SubtitleMode::Transcribe,
            });
        } else if lang == "en" {
            plan.jobs.push(SubtitleJob {
                language: lang,
                mode: SubtitleMode::Translate,
            });
        } else {
            plan.skipped.push(lang);
        }
    }
    plan
}

/// Subtitle generation collaborator.
#[async_trait]
pub trait SubtitleGenerator: Send + Sync {
    /// Spoken language of the video, if it can be detected.
    async fn detect_language(&self, video: &Path) -> MediaResult<Option<String>>;

    /// Produce an SRT file for `job` inside `output_dir`.
    async fn generate(&self, video: &Path, output_dir: &Path, source_language: &str, job: &SubtitleJob) -> MediaResult<PathBuf>;
}

/// Whisper command-line implementation.
#[derive(Debug, Clone)]
pub struct WhisperCli {
    model: String,
    detect_timeout: Duration,
    generate_timeout: Duration,
}

impl Default for WhisperCli {
    fn default() -> Self {
        Self::new("base")
    }
}

#[derive(Debug, Deserialize)]
struct WhisperJson {
    language: Option<String>,
}

impl WhisperCli {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            detect_timeout: Duration::from_secs(120),
            generate_timeout: Duration::from_secs(600),
        }
    }

    pub fn is_available() -> bool {
        which::which("whisper").is_ok()
    }

    async fn run(&self, args: Vec<String>, timeout: Duration) -> MediaResult<()> {
        if !Self::is_available() {
            return Err(MediaError::WhisperNotFound);
        }
        let child = Command::new("whisper")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();
        let output = tokio::time::timeout(timeout, child)
            .await
            .map_err(|_| MediaError::Timeout(timeout.as_secs()))??;
        if !output.status.success() {
            return Err(MediaError::whisper_failed(String::from_utf8_lossy(&output.stderr).trim().to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl SubtitleGenerator for WhisperCli {
    async fn detect_language(&self, video: &Path) -> MediaResult<Option<String>> {
        let tmp = tempfile::Builder::new().prefix("ytpub-lang-").tempdir()?;
        let dir = tmp.path().to_path_buf();
        let sample = dir.join("audio_sample.wav");

        // 30 s mono 16 kHz sample is enough for language identification
        let cmd = FfmpegCommand::new(video, &sample)
            .duration(30.0)
            .output_args(["-vn", "-acodec", "pcm_s16le", "-ar", "16000", "-ac", "1"]);
        let result = async {
            FfmpegRunner::new().with_timeout(60).run(&cmd).await?;
            self.run(
                vec![
                    sample.to_string_lossy().to_string(),
                    "--model".into(),
                    self.model.clone(),
                    "--output_format".into(),
                    "json".into(),
                    "--output_dir".into(),
                    dir.to_string_lossy().to_string(),
                ],
                self.detect_timeout,
            )
            .await?;
            let raw = tokio::fs::read(sample.with_extension("json")).await?;
            let parsed: WhisperJson = serde_json::from_slice(&raw)?;
            Ok::<_, MediaError>(parsed.language.map(|l| l.to_lowercase()))
        }
        .await;

        drop(tmp);
        result
    }

    async fn generate(&self, video: &Path, output_dir: &Path, source_language: &str, job: &SubtitleJob) -> MediaResult<PathBuf> {
        if !video.exists() {
            return Err(MediaError::FileNotFound(video.to_path_buf()));
        }
        tokio::fs::create_dir_all(output_dir).await?;

        let mut args = vec![
            video.to_string_lossy().to_string(),
            "--model".to_string(),
            self.model.clone(),
            "--output_format".to_string(),
            "srt".to_string(),
            "--output_dir".to_string(),
            output_dir.to_string_lossy().to_string(),
            "--language".to_string(),
            source_language.to_string(),
        ];
        if job.mode == SubtitleMode::Translate {
            args.push("--task".to_string());
            args.push("translate".to_string());
        }

        info!(video = %video.display(), language = %job.language, mode = ?job.mode, "Generating subtitles");
        self.run(args, self.generate_timeout).await?;

        let stem = video
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let produced = output_dir.join(format!("{}.srt", stem));
        let target = output_dir.join(format!("{}.{}.srt", stem, job.language));
        if !produced.exists() {
            warn!(expected = %produced.display(), "Whisper produced no SRT file");
            return Err(MediaError::FileNotFound(produced));
        }
        tokio::fs::rename(&produced, &target).await?;

        if !is_valid_srt(&tokio::fs::read_to_string(&target).await?) {
            return Err(MediaError::whisper_failed(format!("invalid SRT output: {}", target.display())));
        }
        Ok(target)
    }
}

/// An SRT needs at least one sequence number and one timing line.
pub fn is_valid_srt(content: &str) -> bool {
    let mut has_sequence = false;
    let mut has_timing = false;
    for line in content.lines().map(str::trim) {
        if !line.is_empty() && line.chars().all(|c| c.is_ascii_digit()) {
            has_sequence = true;
        }
        if line.contains("-->") {
            has_timing = true;
        }
    }
    has_sequence && has_timing
}
