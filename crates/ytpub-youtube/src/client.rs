//! YouTube Data API REST client.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::credentials::Credentials;
use crate::error::{YoutubeError, YoutubeResult};
use crate::uploader::UploadRetryConfig;

const API_BASE: &str = "https://www.googleapis.com/youtube/v3";
const UPLOAD_BASE: &str = "https://www.googleapis.com/upload/youtube/v3";

/// Client configuration.
#[derive(Debug, Clone)]
pub struct YoutubeConfig {
    /// Metadata endpoints (`/videos`, `/captions`, `/playlistItems`)
    pub api_base: String,
    /// Media upload endpoints
    pub upload_base: String,
    /// Timeout for metadata calls; media transfers are not bounded
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for YoutubeConfig {
    fn default() -> Self {
        Self {
            api_base: API_BASE.to_string(),
            upload_base: UPLOAD_BASE.to_string(),
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl YoutubeConfig {
    /// Point both API roots at another host, keeping Google's paths.
    pub fn with_base_url(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            api_base: format!("{}/youtube/v3", base),
            upload_base: format!("{}/upload/youtube/v3", base),
            ..Default::default()
        }
    }
}

/// YouTube REST client shared by the uploader, captions and playlists.
#[derive(Debug, Clone)]
pub struct YoutubeClient {
    pub(crate) http: Client,
    pub(crate) config: YoutubeConfig,
    pub(crate) retry: UploadRetryConfig,
}

impl YoutubeClient {
    pub fn new(config: YoutubeConfig) -> YoutubeResult<Self> {
        let http = Client::builder()
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent(concat!("ytpub-youtube/", env!("CARGO_PKG_VERSION")))
            // 308 is the resumable protocol's "incomplete", never a redirect
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self {
            http,
            config,
            retry: UploadRetryConfig::default(),
        })
    }

    pub fn with_retry(mut self, retry: UploadRetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> &YoutubeConfig {
        &self.config
    }

    pub(crate) fn api_url(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_base, path.trim_start_matches('/'))
    }

    pub(crate) fn upload_url(&self, path: &str) -> String {
        format!("{}/{}", self.config.upload_base, path.trim_start_matches('/'))
    }

    /// Authorized metadata request with the default timeout.
    pub(crate) fn api_request(&self, method: reqwest::Method, url: &str, credentials: &Credentials) -> RequestBuilder {
        self.http
            .request(method, url)
            .bearer_auth(credentials.access_token())
            .timeout(self.config.request_timeout)
    }

    /// Open a resumable upload session and return its URL.
    pub(crate) async fn start_resumable_session(
        &self,
        method: reqwest::Method,
        url: &str,
        credentials: &Credentials,
        metadata: &Value,
        content_type: &str,
        content_length: u64,
    ) -> YoutubeResult<Url> {
        let response = self
            .api_request(method, url, credentials)
            .header("X-Upload-Content-Type", content_type)
            .header("X-Upload-Content-Length", content_length.to_string())
            .json(metadata)
            .send()
            .await?;
        let response = check_response(response).await?;

        let location = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| YoutubeError::invalid_response("resumable session without Location header"))?;
        let base = Url::parse(url).map_err(|e| YoutubeError::invalid_response(e.to_string()))?;
        let session = base
            .join(location)
            .map_err(|e| YoutubeError::invalid_response(format!("bad session URL {}: {}", location, e)))?;
        debug!(session = %session, "Resumable session opened");
        Ok(session)
    }

    /// Send a small media body in one request to an open session.
    pub(crate) async fn finish_session(
        &self,
        session: &Url,
        credentials: &Credentials,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> YoutubeResult<Value> {
        let response = self
            .http
            .put(session.clone())
            .bearer_auth(credentials.access_token())
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .timeout(self.config.request_timeout)
            .send()
            .await?;
        Ok(check_response(response).await?.json().await?)
    }
}

/// Turn a non-success response into a classified error.
pub(crate) async fn check_response(response: Response) -> YoutubeResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(YoutubeError::from_http_status(status.as_u16(), &body))
}
