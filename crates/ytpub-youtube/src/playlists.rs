//! Playlist insertion.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use crate::client::{check_response, YoutubeClient};
use crate::credentials::Credentials;
use crate::error::{YoutubeError, YoutubeResult};

/// Playlist collaborator.
#[async_trait]
pub trait PlaylistService: Send + Sync {
    /// Append a video and return the playlist item id.
    async fn add_to_playlist(&self, credentials: &Credentials, playlist_id: &str, video_id: &str) -> YoutubeResult<String>;
}

#[async_trait]
impl PlaylistService for YoutubeClient {
    async fn add_to_playlist(&self, credentials: &Credentials, playlist_id: &str, video_id: &str) -> YoutubeResult<String> {
        let body = json!({
            "snippet": {
                "playlistId": playlist_id,
                "resourceId": { "kind": "youtube#video", "videoId": video_id },
            }
        });
        let response = self
            .api_request(reqwest::Method::POST, &self.api_url("playlistItems"), credentials)
            .query(&[("part", "snippet")])
            .json(&body)
            .send()
            .await?;
        let item: Value = check_response(response).await?.json().await?;
        let id = item
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| YoutubeError::invalid_response("playlist item without id"))?;
        info!(playlist_id = %playlist_id, youtube_id = %video_id, "Added to playlist");
        Ok(id)
    }
}
