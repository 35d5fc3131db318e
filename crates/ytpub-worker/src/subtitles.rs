//! Subtitle generation and caption upload after a successful upload.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};
use ytpub_media::{plan_subtitles, probe_audio_language, SubtitleGenerator};
use ytpub_youtube::{sanitize_language, upload_captions_smart, CaptionOutcome, CaptionService, Credentials};

/// Options for one subtitle run, merged from the task and the config.
#[derive(Debug, Clone)]
pub struct SubtitleOptions {
    pub languages: Vec<String>,
    pub replace_existing: bool,
    pub draft: bool,
}

/// Stored on the task as `subtitles_result`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubtitleReport {
    pub source_language: String,
    pub languages: BTreeMap<String, CaptionOutcome>,
}

impl SubtitleReport {
    pub fn succeeded(&self) -> usize {
        self.languages.values().filter(|o| o.is_success()).count()
    }
}

/// Spoken language: whisper detection, then the audio stream tag, then the
/// first requested language.
pub async fn detect_source_language(generator: &dyn SubtitleGenerator, video: &Path, requested: &[String]) -> String {
    match generator.detect_language(video).await {
        Ok(Some(lang)) => {
            if let Some(lang) = sanitize_language(&lang) {
                return lang;
            }
        }
        Ok(None) => {}
        Err(e) => warn!(video = %video.display(), "Language detection failed: {}", e),
    }

    if let Some(lang) = probe_audio_language(video).await.and_then(|l| sanitize_language(&l)) {
        return lang;
    }

    requested
        .iter()
        .map(|l| l.trim().to_lowercase())
        .find(|l| !l.is_empty())
        .unwrap_or_else(|| "fr".to_string())
}

/// Generate one SRT per requested language and upload them as captions.
///
/// Languages that cannot be produced or uploaded are reported as failed;
/// nothing here fails the task.
pub async fn generate_and_upload(
    generator: &dyn SubtitleGenerator,
    captions: &dyn CaptionService,
    credentials: &Credentials,
    video: &Path,
    youtube_id: &str,
    output_dir: &Path,
    options: &SubtitleOptions,
) -> SubtitleReport {
    let source_language = detect_source_language(generator, video, &options.languages).await;
    let plan = plan_subtitles(&source_language, &options.languages);
    info!(
        youtube_id,
        source_language = %source_language,
        jobs = plan.jobs.len(),
        skipped = plan.skipped.len(),
        "Subtitle plan ready"
    );

    let mut failures = BTreeMap::new();
    for lang in &plan.skipped {
        failures.insert(
            lang.clone(),
            CaptionOutcome::Failed {
                error: format!("translation to {} is not supported", lang),
            },
        );
    }

    if let Err(e) = tokio::fs::create_dir_all(output_dir).await {
        warn!(dir = %output_dir.display(), "Cannot create subtitle directory: {}", e);
    }

    let mut files: BTreeMap<String, PathBuf> = BTreeMap::new();
    for job in &plan.jobs {
        match generator.generate(video, output_dir, &source_language, job).await {
            Ok(srt) => {
                files.insert(job.language.clone(), srt);
            }
            Err(e) => {
                warn!(youtube_id, language = %job.language, "Subtitle generation failed: {}", e);
                failures.insert(job.language.clone(), CaptionOutcome::Failed { error: e.to_string() });
            }
        }
    }

    let mut languages = if files.is_empty() {
        BTreeMap::new()
    } else {
        upload_captions_smart(captions, credentials, youtube_id, &files, options.replace_existing, options.draft).await
    };
    languages.extend(failures);

    SubtitleReport {
        source_language,
        languages,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use ytpub_media::{MediaError, MediaResult, SubtitleJob, SubtitleMode};
    use ytpub_youtube::{CaptionTrack, YoutubeResult};

    struct FakeWhisper {
        detected: Option<String>,
        jobs: Mutex<Vec<SubtitleJob>>,
    }

    #[async_trait]
    impl SubtitleGenerator for FakeWhisper {
        async fn detect_language(&self, _video: &Path) -> MediaResult<Option<String>> {
            Ok(self.detected.clone())
        }

        async fn generate(&self, _video: &Path, output_dir: &Path, _source: &str, job: &SubtitleJob) -> MediaResult<PathBuf> {
            self.jobs.lock().unwrap().push(job.clone());
            if job.mode == SubtitleMode::Translate {
                return Err(MediaError::internal("whisper crashed"));
            }
            Ok(output_dir.join(format!("{}.srt", job.language)))
        }
    }

    struct FakeCaptions {
        existing: Vec<CaptionTrack>,
    }

    #[async_trait]
    impl CaptionService for FakeCaptions {
        async fn list_captions(&self, _c: &Credentials, _video_id: &str) -> YoutubeResult<Vec<CaptionTrack>> {
            Ok(self.existing.clone())
        }

        async fn insert_caption(&self, _c: &Credentials, _v: &str, language: &str, _srt: &Path, _draft: bool) -> YoutubeResult<String> {
            Ok(format!("cap_{}", language))
        }

        async fn update_caption(&self, _c: &Credentials, caption_id: &str, _srt: &Path, _draft: bool) -> YoutubeResult<String> {
            Ok(caption_id.to_string())
        }
    }

    fn options(languages: &[&str]) -> SubtitleOptions {
        SubtitleOptions {
            languages: languages.iter().map(|l| l.to_string()).collect(),
            replace_existing: false,
            draft: false,
        }
    }

    #[tokio::test]
    async fn test_per_language_outcomes() {
        let dir = tempfile::tempdir().unwrap();
        let whisper = FakeWhisper {
            detected: Some("fr".into()),
            jobs: Mutex::new(Vec::new()),
        };
        let captions = FakeCaptions { existing: Vec::new() };
        let creds = Credentials::new("token", None);

        let report = generate_and_upload(
            &whisper,
            &captions,
            &creds,
            Path::new("/videos/v.mp4"),
            "yt1",
            dir.path(),
            &options(&["fr", "en", "de"]),
        )
        .await;

        assert_eq!(report.source_language, "fr");
        assert_eq!(
            report.languages.get("fr"),
            Some(&CaptionOutcome::Inserted {
                caption_id: "cap_fr".into()
            })
        );
        assert!(matches!(report.languages.get("en"), Some(CaptionOutcome::Failed { .. })));
        assert!(matches!(report.languages.get("de"), Some(CaptionOutcome::Failed { .. })));
        assert_eq!(report.succeeded(), 1);
    }

    #[tokio::test]
    async fn test_existing_track_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let whisper = FakeWhisper {
            detected: Some("fra".into()),
            jobs: Mutex::new(Vec::new()),
        };
        let captions = FakeCaptions {
            existing: vec![CaptionTrack {
                id: "old".into(),
                language: "fr".into(),
                name: None,
            }],
        };
        let creds = Credentials::new("token", None);

        let report = generate_and_upload(
            &whisper,
            &captions,
            &creds,
            Path::new("/videos/v.mp4"),
            "yt1",
            dir.path(),
            &options(&["fr"]),
        )
        .await;

        assert_eq!(report.source_language, "fr");
        assert_eq!(
            report.languages.get("fr"),
            Some(&CaptionOutcome::Skipped {
                caption_id: "old".into()
            })
        );
    }
}
