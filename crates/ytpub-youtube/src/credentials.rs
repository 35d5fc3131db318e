//! OAuth credentials from a client-secrets file and a stored token.
//!
//! The stored token is reused while valid and refreshed through the token
//! endpoint when it has expired. Interactive consent is not handled here: a
//! missing token is a credentials error.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::{YoutubeError, YoutubeResult};

/// Scopes needed to upload videos and manage captions.
pub const YOUTUBE_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/youtube.upload",
    "https://www.googleapis.com/auth/youtube.force-ssl",
];

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Refresh this long before the recorded expiry.
const REFRESH_MARGIN_SECS: i64 = 60;

/// A usable access token.
#[derive(Clone)]
pub struct Credentials {
    access_token: String,
    expires_at: Option<DateTime<Utc>>,
}

impl Credentials {
    pub fn new(access_token: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at,
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Credential collaborator.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn get_credentials(&self, scopes: &[&str], client_secrets: &Path, token_path: &Path) -> YoutubeResult<Credentials>;
}

#[derive(Debug, Clone, Deserialize)]
struct ClientSecret {
    client_id: String,
    client_secret: String,
    #[serde(default)]
    token_uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecret>,
    web: Option<ClientSecret>,
}

/// Token file as written by Google's client libraries.
#[derive(Debug, Serialize, Deserialize)]
struct StoredToken {
    #[serde(alias = "access_token", default, skip_serializing_if = "Option::is_none")]
    token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    client_secret: Option<String>,
    #[serde(default)]
    scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expiry: Option<String>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl StoredToken {
    fn expiry(&self) -> Option<DateTime<Utc>> {
        let raw = self.expiry.as_deref()?;
        DateTime::parse_from_rfc3339(raw)
            .map(|t| t.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .map(|n| n.and_utc())
            })
    }

    fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.token.is_some()
            && self
                .expiry()
                .map_or(true, |exp| exp > now + chrono::Duration::seconds(REFRESH_MARGIN_SECS))
    }
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Default provider reading token files and refreshing over HTTP.
#[derive(Debug, Clone)]
pub struct OAuthCredentialProvider {
    http: Client,
}

impl Default for OAuthCredentialProvider {
    fn default() -> Self {
        Self { http: Client::new() }
    }
}

impl OAuthCredentialProvider {
    pub fn new() -> YoutubeResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("ytpub-youtube/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http })
    }

    async fn refresh(
        &self,
        token: &mut StoredToken,
        refresh_token: &str,
        client_secrets: &Path,
    ) -> YoutubeResult<DateTime<Utc>> {
        let secret = match (&token.client_id, &token.client_secret) {
            (Some(id), Some(secret)) => ClientSecret {
                client_id: id.clone(),
                client_secret: secret.clone(),
                token_uri: token.token_uri.clone(),
            },
            _ => read_client_secret(client_secrets).await?,
        };
        let token_uri = token
            .token_uri
            .clone()
            .or(secret.token_uri.clone())
            .unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string());

        let response = self
            .http
            .post(&token_uri)
            .form(&[
                ("client_id", secret.client_id.as_str()),
                ("client_secret", secret.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(YoutubeError::TokenRefresh(format!("HTTP {}: {}", status.as_u16(), body.trim())));
        }
        let refreshed: RefreshResponse = response
            .json()
            .await
            .map_err(|e| YoutubeError::TokenRefresh(format!("unreadable token response: {}", e)))?;

        let expires_at = Utc::now() + chrono::Duration::seconds(refreshed.expires_in.unwrap_or(3600));
        token.token = Some(refreshed.access_token);
        token.expiry = Some(expires_at.to_rfc3339_opts(SecondsFormat::Micros, true));
        token.token_uri = Some(token_uri);
        Ok(expires_at)
    }
}

#[async_trait]
impl CredentialProvider for OAuthCredentialProvider {
    async fn get_credentials(&self, scopes: &[&str], client_secrets: &Path, token_path: &Path) -> YoutubeResult<Credentials> {
        let raw = match tokio::fs::read(token_path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if !client_secrets.exists() {
                    return Err(YoutubeError::credentials(format!(
                        "client secrets not found: {}",
                        client_secrets.display()
                    )));
                }
                return Err(YoutubeError::credentials(format!(
                    "no stored token at {}; authorize the account first",
                    token_path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };
        let mut token: StoredToken = serde_json::from_slice(&raw)
            .map_err(|e| YoutubeError::credentials(format!("invalid token file {}: {}", token_path.display(), e)))?;

        let unlisted: Vec<&str> = scopes
            .iter()
            .copied()
            .filter(|s| !token.scopes.is_empty() && !token.scopes.iter().any(|t| t == s))
            .collect();
        if !unlisted.is_empty() {
            debug!(scopes = ?unlisted, "Stored token does not list requested scopes");
        }

        if token.is_valid(Utc::now()) {
            let expires_at = token.expiry();
            let access = token.token.clone().unwrap_or_default();
            return Ok(Credentials::new(access, expires_at));
        }

        let Some(refresh_token) = token.refresh_token.clone() else {
            return Err(YoutubeError::credentials(format!(
                "token at {} expired and has no refresh token",
                token_path.display()
            )));
        };

        let expires_at = self.refresh(&mut token, &refresh_token, client_secrets).await?;
        tokio::fs::write(token_path, serde_json::to_vec_pretty(&token)?).await?;
        info!(token = %token_path.display(), "Access token refreshed");

        Ok(Credentials::new(token.token.unwrap_or_default(), Some(expires_at)))
    }
}

async fn read_client_secret(path: &Path) -> YoutubeResult<ClientSecret> {
    let raw = tokio::fs::read(path)
        .await
        .map_err(|e| YoutubeError::credentials(format!("client secrets {}: {}", path.display(), e)))?;
    let file: ClientSecretsFile = serde_json::from_slice(&raw)
        .map_err(|e| YoutubeError::credentials(format!("invalid client secrets {}: {}", path.display(), e)))?;
    file.installed
        .or(file.web)
        .ok_or_else(|| YoutubeError::credentials("client secrets have neither `installed` nor `web` entry"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn write_json(path: &Path, value: Value) {
        std::fs::write(path, serde_json::to_vec(&value).unwrap()).unwrap();
    }

    #[tokio::test]
    async fn test_valid_token_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let token_path = dir.path().join("token.json");
        let expiry = (Utc::now() + chrono::Duration::hours(1)).to_rfc3339();
        write_json(&token_path, json!({"token": "abc", "refresh_token": "r", "expiry": expiry}));

        let creds = OAuthCredentialProvider::default()
            .get_credentials(YOUTUBE_SCOPES, &dir.path().join("missing.json"), &token_path)
            .await
            .unwrap();
        assert_eq!(creds.access_token(), "abc");
        assert!(!format!("{:?}", creds).contains("abc"));
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed_and_saved() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "fresh", "expires_in": 3599, "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let secrets = dir.path().join("client_secret.json");
        write_json(
            &secrets,
            json!({"installed": {"client_id": "id", "client_secret": "s", "token_uri": format!("{}/token", server.uri())}}),
        );
        let token_path = dir.path().join("token.json");
        write_json(
            &token_path,
            json!({"token": "stale", "refresh_token": "r", "expiry": "2020-01-01T00:00:00Z", "universe_domain": "googleapis.com"}),
        );

        let creds = OAuthCredentialProvider::default()
            .get_credentials(YOUTUBE_SCOPES, &secrets, &token_path)
            .await
            .unwrap();
        assert_eq!(creds.access_token(), "fresh");

        let saved: Value = serde_json::from_slice(&std::fs::read(&token_path).unwrap()).unwrap();
        assert_eq!(saved["token"], "fresh");
        assert_eq!(saved["refresh_token"], "r");
        assert_eq!(saved["universe_domain"], "googleapis.com");
    }

    #[tokio::test]
    async fn test_missing_token_is_credentials_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = OAuthCredentialProvider::default()
            .get_credentials(YOUTUBE_SCOPES, &dir.path().join("secrets.json"), &dir.path().join("token.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, YoutubeError::Credentials(msg) if msg.contains("client secrets not found")));
    }
}
