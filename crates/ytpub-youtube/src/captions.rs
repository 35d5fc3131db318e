//! Caption tracks: list, insert, update and the per-language smart upload.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info};

use crate::client::{check_response, YoutubeClient};
use crate::credentials::Credentials;
use crate::error::{YoutubeError, YoutubeResult};

const CAPTION_CONTENT_TYPE: &str = "application/octet-stream";

/// YouTube expects a region for Chinese; other codes pass through.
pub fn normalize_caption_language(language: &str) -> String {
    match language {
        "zh" => "zh-CN".to_string(),
        other => other.to_string(),
    }
}

/// An existing caption track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptionTrack {
    pub id: String,
    pub language: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Result for one language of a smart upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum CaptionOutcome {
    Inserted { caption_id: String },
    Updated { caption_id: String },
    Skipped { caption_id: String },
    Failed { error: String },
}

impl CaptionOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }
}

/// Caption collaborator.
#[async_trait]
pub trait CaptionService: Send + Sync {
    async fn list_captions(&self, credentials: &Credentials, video_id: &str) -> YoutubeResult<Vec<CaptionTrack>>;

    async fn insert_caption(
        &self,
        credentials: &Credentials,
        video_id: &str,
        language: &str,
        srt_path: &Path,
        draft: bool,
    ) -> YoutubeResult<String>;

    async fn update_caption(
        &self,
        credentials: &Credentials,
        caption_id: &str,
        srt_path: &Path,
        draft: bool,
    ) -> YoutubeResult<String>;
}

#[derive(Deserialize)]
struct CaptionListResponse {
    #[serde(default)]
    items: Vec<CaptionItem>,
}

#[derive(Deserialize)]
struct CaptionItem {
    id: String,
    snippet: CaptionSnippet,
}

#[derive(Deserialize)]
struct CaptionSnippet {
    language: String,
    #[serde(default)]
    name: Option<String>,
}

impl YoutubeClient {
    async fn send_caption(&self, method: reqwest::Method, credentials: &Credentials, metadata: Value, srt_path: &Path) -> YoutubeResult<String> {
        let bytes = tokio::fs::read(srt_path)
            .await
            .map_err(|_| YoutubeError::FileNotFound(srt_path.to_path_buf()))?;
        let url = format!("{}?uploadType=resumable&part=snippet", self.upload_url("captions"));
        let session = self
            .start_resumable_session(method, &url, credentials, &metadata, CAPTION_CONTENT_TYPE, bytes.len() as u64)
            .await?;
        let body = self.finish_session(&session, credentials, CAPTION_CONTENT_TYPE, bytes).await?;
        body.get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| YoutubeError::invalid_response("caption response without id"))
    }
}

#[async_trait]
impl CaptionService for YoutubeClient {
    async fn list_captions(&self, credentials: &Credentials, video_id: &str) -> YoutubeResult<Vec<CaptionTrack>> {
        let response = self
            .api_request(reqwest::Method::GET, &self.api_url("captions"), credentials)
            .query(&[("part", "snippet"), ("videoId", video_id)])
            .send()
            .await?;
        let list: CaptionListResponse = check_response(response).await?.json().await?;
        Ok(list
            .items
            .into_iter()
            .map(|item| CaptionTrack {
                id: item.id,
                language: item.snippet.language,
                name: item.snippet.name,
            })
            .collect())
    }

    async fn insert_caption(
        &self,
        credentials: &Credentials,
        video_id: &str,
        language: &str,
        srt_path: &Path,
        draft: bool,
    ) -> YoutubeResult<String> {
        let metadata = json!({
            "snippet": {
                "videoId": video_id,
                "language": normalize_caption_language(language),
                "name": format!("Sous-titres {}", language.to_uppercase()),
                "isDraft": draft,
            }
        });
        let id = self.send_caption(reqwest::Method::POST, credentials, metadata, srt_path).await?;
        info!(youtube_id = %video_id, language = %language, caption_id = %id, "Caption inserted");
        Ok(id)
    }

    async fn update_caption(
        &self,
        credentials: &Credentials,
        caption_id: &str,
        srt_path: &Path,
        draft: bool,
    ) -> YoutubeResult<String> {
        let metadata = json!({ "id": caption_id, "snippet": { "isDraft": draft } });
        let id = self.send_caption(reqwest::Method::PUT, credentials, metadata, srt_path).await?;
        info!(caption_id = %id, "Caption updated");
        Ok(id)
    }
}

/// Upload one SRT per language, updating or skipping languages that already
/// have a track. Failures are recorded per language.
pub async fn upload_captions_smart(
    service: &dyn CaptionService,
    credentials: &Credentials,
    video_id: &str,
    files: &BTreeMap<String, PathBuf>,
    replace_existing: bool,
    draft: bool,
) -> BTreeMap<String, CaptionOutcome> {
    let existing = match service.list_captions(credentials, video_id).await {
        Ok(tracks) => tracks,
        Err(e) => {
            error!(youtube_id = %video_id, "Listing captions failed: {}", e);
            Vec::new()
        }
    };

    let mut results = BTreeMap::new();
    for (language, srt) in files {
        let youtube_lang = normalize_caption_language(language);
        let current = existing.iter().find(|t| t.language == youtube_lang);
        let outcome = match current {
            Some(track) if !replace_existing => CaptionOutcome::Skipped {
                caption_id: track.id.clone(),
            },
            Some(track) => match service.update_caption(credentials, &track.id, srt, draft).await {
                Ok(caption_id) => CaptionOutcome::Updated { caption_id },
                Err(e) => CaptionOutcome::Failed { error: e.to_string() },
            },
            None => match service.insert_caption(credentials, video_id, language, srt, draft).await {
                Ok(caption_id) => CaptionOutcome::Inserted { caption_id },
                Err(e) => CaptionOutcome::Failed { error: e.to_string() },
            },
        };
        if let CaptionOutcome::Failed { error } = &outcome {
            error!(youtube_id = %video_id, language = %language, "Caption upload failed: {}", error);
        }
        results.insert(language.clone(), outcome);
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeCaptions {
        existing: Vec<CaptionTrack>,
        fail_insert_for: Option<String>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CaptionService for FakeCaptions {
        async fn list_captions(&self, _: &Credentials, _: &str) -> YoutubeResult<Vec<CaptionTrack>> {
            Ok(self.existing.clone())
        }

        async fn insert_caption(&self, _: &Credentials, _: &str, language: &str, _: &Path, _: bool) -> YoutubeResult<String> {
            self.calls.lock().unwrap().push(format!("insert:{}", language));
            if self.fail_insert_for.as_deref() == Some(language) {
                return Err(YoutubeError::Http { status: 400, message: "bad".into() });
            }
            Ok(format!("cap-{}", language))
        }

        async fn update_caption(&self, _: &Credentials, caption_id: &str, _: &Path, _: bool) -> YoutubeResult<String> {
            self.calls.lock().unwrap().push(format!("update:{}", caption_id));
            Ok(caption_id.to_string())
        }
    }

    fn files(langs: &[&str]) -> BTreeMap<String, PathBuf> {
        langs
            .iter()
            .map(|l| (l.to_string(), PathBuf::from(format!("{}.srt", l))))
            .collect()
    }

    fn creds() -> Credentials {
        Credentials::new("t", None)
    }

    #[test]
    fn test_language_normalization() {
        assert_eq!(normalize_caption_language("zh"), "zh-CN");
        assert_eq!(normalize_caption_language("pt"), "pt");
    }

    #[tokio::test]
    async fn test_smart_upload_skips_existing() {
        let fake = FakeCaptions {
            existing: vec![CaptionTrack { id: "old".into(), language: "fr".into(), name: None }],
            ..Default::default()
        };
        let results = upload_captions_smart(&fake, &creds(), "vid", &files(&["fr", "en"]), false, false).await;
        assert_eq!(results["fr"], CaptionOutcome::Skipped { caption_id: "old".into() });
        assert_eq!(results["en"], CaptionOutcome::Inserted { caption_id: "cap-en".into() });
        assert_eq!(*fake.calls.lock().unwrap(), vec!["insert:en".to_string()]);
    }

    #[tokio::test]
    async fn test_smart_upload_replaces_and_records_failures() {
        let fake = FakeCaptions {
            existing: vec![CaptionTrack { id: "zh-track".into(), language: "zh-CN".into(), name: None }],
            fail_insert_for: Some("en".into()),
            ..Default::default()
        };
        let results = upload_captions_smart(&fake, &creds(), "vid", &files(&["zh", "en"]), true, false).await;
        assert_eq!(results["zh"], CaptionOutcome::Updated { caption_id: "zh-track".into() });
        assert!(!results["en"].is_success());
    }
}
