//! Resumable video upload with retry and quota detection.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use rand::Rng;
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, RANGE};
use reqwest::{Body, StatusCode};
use serde_json::{json, Map, Value};
use tokio::io::AsyncSeekExt;
use tracing::{error, info, warn};
use url::Url;
use ytpub_models::PrivacyStatus;

use crate::client::{check_response, YoutubeClient};
use crate::credentials::Credentials;
use crate::error::{YoutubeError, YoutubeResult};

pub const MAX_TAGS: usize = 20;
pub const MAX_TAG_CHARS: usize = 100;
/// A past `publish_at` is moved this far into the future.
pub const PUBLISH_AT_MIN_DELAY_MINS: i64 = 10;

const VIDEO_CONTENT_TYPE: &str = "video/*";

const ISO_639_2_TO_1: &[(&str, &str)] = &[
    ("eng", "en"),
    ("fra", "fr"),
    ("fre", "fr"),
    ("spa", "es"),
    ("deu", "de"),
    ("ger", "de"),
    ("por", "pt"),
    ("ita", "it"),
    ("ara", "ar"),
    ("jpn", "ja"),
    ("kor", "ko"),
    ("rus", "ru"),
    ("zho", "zh"),
    ("chi", "zh"),
];

/// Fully resolved upload fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadRequest {
    pub video_path: PathBuf,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub category_id: u32,
    pub privacy_status: PrivacyStatus,
    pub publish_at: Option<String>,
    pub thumbnail_path: Option<PathBuf>,
    pub made_for_kids: Option<bool>,
    pub embeddable: Option<bool>,
    /// `youtube` or `creativeCommon`
    pub license: Option<String>,
    pub public_stats_viewable: Option<bool>,
    pub default_language: Option<String>,
    pub default_audio_language: Option<String>,
    pub recording_date: Option<String>,
}

/// Final API answer for an inserted video.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadResponse {
    pub id: String,
    pub body: Value,
}

/// Upload collaborator.
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(&self, credentials: &Credentials, request: &UploadRequest) -> YoutubeResult<UploadResponse>;
}

/// Retry policy for resumable uploads.
#[derive(Debug, Clone)]
pub struct UploadRetryConfig {
    pub max_retries: u32,
    /// Upper bound of the backoff window, in backoff units.
    pub max_backoff: u32,
    /// Length of one backoff unit.
    pub backoff_unit: Duration,
}

impl Default for UploadRetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 8,
            max_backoff: 60,
            backoff_unit: Duration::from_secs(1),
        }
    }
}

impl UploadRetryConfig {
    /// Uniform between 1 and `min(max_backoff, 2^retry)` units.
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let upper = 2f64.powi(retry.min(16) as i32).min(self.max_backoff as f64);
        let units = if upper > 1.0 {
            rand::rng().random_range(1.0..=upper)
        } else {
            1.0
        };
        self.backoff_unit.mul_f64(units)
    }
}

enum TransferState {
    /// Server holds bytes up to, not including, this offset.
    Incomplete(u64),
    Done(Value),
}

#[async_trait]
impl Uploader for YoutubeClient {
    async fn upload(&self, credentials: &Credentials, request: &UploadRequest) -> YoutubeResult<UploadResponse> {
        let path = &request.video_path;
        let total = match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => meta.len(),
            _ => return Err(YoutubeError::FileNotFound(path.clone())),
        };

        let (parts, resource) = build_video_resource(request, Utc::now());
        info!(body = %resource, "Upload body");
        let url = format!("{}?uploadType=resumable&part={}", self.upload_url("videos"), parts);

        let mut session: Option<Url> = None;
        let mut offset = 0u64;
        let mut query_status = false;
        let mut retries = 0u32;

        let body = loop {
            let step = match session.clone() {
                None => match self
                    .start_resumable_session(reqwest::Method::POST, &url, credentials, &resource, VIDEO_CONTENT_TYPE, total)
                    .await
                {
                    Ok(opened) => {
                        session = Some(opened);
                        Ok(TransferState::Incomplete(0))
                    }
                    Err(e) => Err(e),
                },
                Some(s) if query_status => self.query_upload_status(&s, total, credentials).await,
                Some(s) => self.send_from(&s, path, offset, total, credentials).await,
            };

            match step {
                Ok(TransferState::Done(body)) => break body,
                Ok(TransferState::Incomplete(next)) => {
                    if total > 0 && next > 0 {
                        info!("Upload progress: {:.2}%", next as f64 * 100.0 / total as f64);
                    }
                    offset = next;
                    query_status = false;
                }
                Err(e) if e.is_retryable() => {
                    retries += 1;
                    if retries > self.retry.max_retries {
                        error!(video = %path.display(), "Upload retries exhausted: {}", e);
                        return Err(YoutubeError::RetriesExhausted(self.retry.max_retries));
                    }
                    let delay = self.retry.backoff_delay(retries);
                    warn!(retry = retries, delay_ms = delay.as_millis() as u64, "Upload interrupted, retrying: {}", e);
                    tokio::time::sleep(delay).await;
                    query_status = session.is_some();
                }
                Err(e) => return Err(e),
            }
        };

        let id = body
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| YoutubeError::invalid_response("upload response without video id"))?;
        info!(youtube_id = %id, "Upload finished");

        if let Some(thumbnail) = &request.thumbnail_path {
            self.set_thumbnail(credentials, &id, thumbnail).await;
        }
        Ok(UploadResponse { id, body })
    }
}

impl YoutubeClient {
    async fn send_from(
        &self,
        session: &Url,
        path: &Path,
        offset: u64,
        total: u64,
        credentials: &Credentials,
    ) -> YoutubeResult<TransferState> {
        let mut file = tokio::fs::File::open(path).await?;
        file.seek(SeekFrom::Start(offset)).await?;
        let mut request = self
            .http
            .put(session.clone())
            .bearer_auth(credentials.access_token())
            .header(CONTENT_LENGTH, total - offset)
            .header(CONTENT_TYPE, VIDEO_CONTENT_TYPE);
        if offset > 0 {
            request = request.header(CONTENT_RANGE, format!("bytes {}-{}/{}", offset, total - 1, total));
        }
        let response = request.body(Body::from(file)).send().await?;
        transfer_state(response).await
    }

    async fn query_upload_status(&self, session: &Url, total: u64, credentials: &Credentials) -> YoutubeResult<TransferState> {
        let response = self
            .http
            .put(session.clone())
            .bearer_auth(credentials.access_token())
            .header(CONTENT_LENGTH, 0)
            .header(CONTENT_RANGE, format!("bytes */{}", total))
            .timeout(self.config.request_timeout)
            .send()
            .await?;
        transfer_state(response).await
    }

    /// Best-effort: failures are logged.
    async fn set_thumbnail(&self, credentials: &Credentials, video_id: &str, thumbnail: &Path) {
        let bytes = match tokio::fs::read(thumbnail).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(thumbnail = %thumbnail.display(), "Thumbnail unreadable, skipped: {}", e);
                return;
            }
        };
        let content_type = match thumbnail.extension().and_then(|e| e.to_str()).map(str::to_lowercase) {
            Some(ext) if ext == "png" => "image/png",
            _ => "image/jpeg",
        };
        let url = self.upload_url("thumbnails/set");
        let result = self
            .api_request(reqwest::Method::POST, &url, credentials)
            .query(&[("videoId", video_id), ("uploadType", "media")])
            .header(CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await;
        match result {
            Ok(response) => match check_response(response).await {
                Ok(_) => info!(youtube_id = %video_id, "Thumbnail set"),
                Err(e) => error!(youtube_id = %video_id, "Failed to set thumbnail: {}", e),
            },
            Err(e) => error!(youtube_id = %video_id, "Failed to set thumbnail: {}", e),
        }
    }
}

async fn transfer_state(response: reqwest::Response) -> YoutubeResult<TransferState> {
    let status = response.status();
    if status == StatusCode::PERMANENT_REDIRECT {
        let next = response
            .headers()
            .get(RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_range_end)
            .map_or(0, |end| end + 1);
        return Ok(TransferState::Incomplete(next));
    }
    let response = check_response(response).await?;
    Ok(TransferState::Done(response.json().await?))
}

/// Last byte index of a `bytes=0-N` header.
fn parse_range_end(value: &str) -> Option<u64> {
    value.trim().strip_prefix("bytes=")?.split_once('-')?.1.trim().parse().ok()
}

/// Parts and `videos` resource for an insert call.
pub fn build_video_resource(request: &UploadRequest, now: DateTime<Utc>) -> (String, Value) {
    let publish_at = request
        .publish_at
        .as_deref()
        .and_then(|p| ensure_future_publish_at(p, now));
    let mut privacy = request.privacy_status;
    if request.publish_at.is_some() && privacy != PrivacyStatus::Private {
        warn!("publish_at set, forcing privacy_status=private");
        privacy = PrivacyStatus::Private;
    }

    let mut snippet = Map::new();
    snippet.insert("title".into(), json!(request.title));
    snippet.insert("description".into(), json!(request.description));
    snippet.insert("tags".into(), json!(sanitize_tags(&request.tags)));
    snippet.insert("categoryId".into(), json!(request.category_id.to_string()));
    if let Some(lang) = request.default_language.as_deref().and_then(sanitize_language) {
        snippet.insert("defaultLanguage".into(), json!(lang));
    }
    if let Some(lang) = request.default_audio_language.as_deref().and_then(sanitize_language) {
        snippet.insert("defaultAudioLanguage".into(), json!(lang));
    }

    let mut status = Map::new();
    status.insert("privacyStatus".into(), json!(privacy.as_str()));
    if let Some(embeddable) = request.embeddable {
        status.insert("embeddable".into(), json!(embeddable));
    }
    if let Some(license) = request.license.as_deref().filter(|l| !l.is_empty()) {
        status.insert("license".into(), json!(license));
    }
    if let Some(stats) = request.public_stats_viewable {
        status.insert("publicStatsViewable".into(), json!(stats));
    }
    if let Some(publish_at) = publish_at {
        status.insert("publishAt".into(), json!(publish_at));
    }
    if let Some(kids) = request.made_for_kids {
        status.insert("madeForKids".into(), json!(kids));
    }

    let mut resource = json!({ "snippet": snippet, "status": status });
    let mut parts = String::from("snippet,status");
    if let Some(raw) = request.recording_date.as_deref() {
        let recording = to_rfc3339_utc(raw).unwrap_or_else(|| raw.to_string());
        resource["recordingDetails"] = json!({ "recordingDate": recording });
        parts.push_str(",recordingDetails");
    }
    (parts, resource)
}

/// Map a language tag to a simple BCP-47 code YouTube accepts, or drop it.
pub fn sanitize_language(lang: &str) -> Option<String> {
    let lang = lang.trim();
    if lang.is_empty() {
        return None;
    }
    let lower = lang.to_lowercase();
    if let Some((_, two)) = ISO_639_2_TO_1.iter().find(|(three, _)| *three == lower) {
        return Some((*two).to_string());
    }
    if lang.len() == 2 && lang.chars().all(|c| c.is_ascii_alphabetic()) {
        return Some(lower);
    }
    if (2..=8).contains(&lang.len()) && (lang.contains('-') || lang.contains('_')) {
        return Some(lang.replace('_', "-"));
    }
    warn!(language = %lang, "Suspicious language code ignored");
    None
}

/// Trim, drop empties, cap each tag at 100 chars and the list at 20.
pub fn sanitize_tags(tags: &[String]) -> Vec<String> {
    tags.iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(|t| t.chars().take(MAX_TAG_CHARS).collect())
        .take(MAX_TAGS)
        .collect()
}

/// ISO timestamp as RFC 3339 UTC with second precision; naive values are UTC.
pub fn to_rfc3339_utc(ts: &str) -> Option<String> {
    let ts = ts.trim();
    let utc = DateTime::parse_from_rfc3339(ts)
        .or_else(|_| DateTime::parse_from_str(ts, "%Y-%m-%d %H:%M:%S%.f%:z"))
        .map(|t| t.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(ts, fmt).ok())
                .map(|n| n.and_utc())
        });
    match utc {
        Some(t) => Some(t.to_rfc3339_opts(SecondsFormat::Secs, true)),
        None => {
            warn!(value = %ts, "Timestamp is not RFC 3339, ignored");
            None
        }
    }
}

/// Normalized `publish_at`, pushed to `now + 10 min` when not in the future.
pub fn ensure_future_publish_at(publish_at: &str, now: DateTime<Utc>) -> Option<String> {
    let normalized = to_rfc3339_utc(publish_at)?;
    let at = DateTime::parse_from_rfc3339(&normalized).ok()?.with_timezone(&Utc);
    if at <= now {
        let adjusted = now + chrono::Duration::minutes(PUBLISH_AT_MIN_DELAY_MINS);
        return Some(adjusted.to_rfc3339_opts(SecondsFormat::Secs, true));
    }
    Some(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_sanitize_language() {
        assert_eq!(sanitize_language("fra").as_deref(), Some("fr"));
        assert_eq!(sanitize_language("ENG").as_deref(), Some("en"));
        assert_eq!(sanitize_language("FR").as_deref(), Some("fr"));
        assert_eq!(sanitize_language("en_US").as_deref(), Some("en-US"));
        assert_eq!(sanitize_language("pt-BR").as_deref(), Some("pt-BR"));
        assert_eq!(sanitize_language("french"), None);
        assert_eq!(sanitize_language("  "), None);
    }

    #[test]
    fn test_sanitize_tags_caps() {
        let long = "x".repeat(150);
        let mut tags: Vec<String> = (0..30).map(|i| format!("tag{}", i)).collect();
        tags.insert(0, "  ".into());
        tags.insert(1, long);
        let out = sanitize_tags(&tags);
        assert_eq!(out.len(), MAX_TAGS);
        assert_eq!(out[0].chars().count(), MAX_TAG_CHARS);
        assert_eq!(out[1], "tag0");
    }

    #[test]
    fn test_timestamps() {
        assert_eq!(to_rfc3339_utc("2024-07-01T20:00:00+02:00").as_deref(), Some("2024-07-01T18:00:00Z"));
        assert_eq!(to_rfc3339_utc("2024-07-01T18:00:00.123456").as_deref(), Some("2024-07-01T18:00:00Z"));
        assert_eq!(to_rfc3339_utc("tomorrow"), None);
        assert_eq!(
            ensure_future_publish_at("2024-07-01T11:00:00Z", now()).as_deref(),
            Some("2024-07-01T12:10:00Z")
        );
        assert_eq!(
            ensure_future_publish_at("2024-07-02T09:00:00+02:00", now()).as_deref(),
            Some("2024-07-02T07:00:00Z")
        );
    }

    #[test]
    fn test_publish_at_forces_private() {
        let request = UploadRequest {
            title: "T".into(),
            privacy_status: PrivacyStatus::Public,
            publish_at: Some("2024-07-02T18:00:00Z".into()),
            category_id: 22,
            ..Default::default()
        };
        let (parts, body) = build_video_resource(&request, now());
        assert_eq!(parts, "snippet,status");
        assert_eq!(body["status"]["privacyStatus"], "private");
        assert_eq!(body["status"]["publishAt"], "2024-07-02T18:00:00Z");
        assert_eq!(body["snippet"]["categoryId"], "22");
    }

    #[test]
    fn test_recording_details_part() {
        let request = UploadRequest {
            recording_date: Some("2024-07-01T10:00:00+02:00".into()),
            default_language: Some("klingon".into()),
            default_audio_language: Some("fre".into()),
            made_for_kids: Some(false),
            ..Default::default()
        };
        let (parts, body) = build_video_resource(&request, now());
        assert_eq!(parts, "snippet,status,recordingDetails");
        assert_eq!(body["recordingDetails"]["recordingDate"], "2024-07-01T08:00:00Z");
        assert!(body["snippet"].get("defaultLanguage").is_none());
        assert_eq!(body["snippet"]["defaultAudioLanguage"], "fr");
        assert_eq!(body["status"]["madeForKids"], false);
    }

    #[test]
    fn test_backoff_window() {
        let config = UploadRetryConfig::default();
        for retry in 1..=10 {
            let delay = config.backoff_delay(retry);
            assert!(delay >= Duration::from_secs(1));
            assert!(delay <= Duration::from_secs(60));
        }
        assert!(config.backoff_delay(1) <= Duration::from_secs(2));
    }

    #[test]
    fn test_parse_range() {
        assert_eq!(parse_range_end("bytes=0-1023"), Some(1023));
        assert_eq!(parse_range_end("garbage"), None);
    }
}
