//! Resumable upload against a mock YouTube endpoint.

use std::path::PathBuf;
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};
use ytpub_models::PrivacyStatus;
use ytpub_youtube::{Credentials, UploadRequest, UploadRetryConfig, Uploader, YoutubeClient, YoutubeConfig, YoutubeError};

const VIDEOS: &str = "/upload/youtube/v3/videos";
const SESSION: &str = "/upload/session/abc";

fn client(server: &MockServer, max_retries: u32) -> YoutubeClient {
    YoutubeClient::new(YoutubeConfig::with_base_url(&server.uri()))
        .unwrap()
        .with_retry(UploadRetryConfig {
            max_retries,
            max_backoff: 4,
            backoff_unit: Duration::from_millis(1),
        })
}

fn video(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("clip.mp4");
    std::fs::write(&path, b"0123456789").unwrap();
    path
}

fn request(video_path: PathBuf) -> UploadRequest {
    UploadRequest {
        video_path,
        title: "Mon titre".into(),
        description: "desc".into(),
        tags: vec!["a".into(), "b".into()],
        category_id: 22,
        privacy_status: PrivacyStatus::Public,
        ..Default::default()
    }
}

fn creds() -> Credentials {
    Credentials::new("token", None)
}

async fn mount_session(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(VIDEOS))
        .and(query_param("uploadType", "resumable"))
        .respond_with(ResponseTemplate::new(200).insert_header("Location", SESSION))
        .mount(server)
        .await;
}

#[tokio::test]
async fn upload_returns_video_id() {
    let server = MockServer::start().await;
    mount_session(&server).await;
    Mock::given(method("PUT"))
        .and(path(SESSION))
        .and(header("authorization", "Bearer token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "vid123"})))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let response = client(&server, 3).upload(&creds(), &request(video(&dir))).await.unwrap();
    assert_eq!(response.id, "vid123");
}

#[tokio::test]
async fn quota_exceeded_is_distinct_and_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(VIDEOS))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": {
                "code": 403,
                "message": "The user has exceeded the number of videos they may upload.",
                "errors": [{"domain": "youtube.video", "reason": "uploadLimitExceeded"}]
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let err = client(&server, 3).upload(&creds(), &request(video(&dir))).await.unwrap_err();
    assert!(err.is_quota_exceeded());
    assert!(matches!(err, YoutubeError::QuotaExceeded { ref reason, .. } if reason == "uploadLimitExceeded"));
}

#[tokio::test]
async fn client_errors_propagate_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(VIDEOS))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": {"message": "Invalid title"}})))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let err = client(&server, 3).upload(&creds(), &request(video(&dir))).await.unwrap_err();
    assert!(matches!(err, YoutubeError::Http { status: 400, .. }));
}

#[tokio::test]
async fn server_error_is_retried_then_succeeds() {
    let server = MockServer::start().await;
    mount_session(&server).await;
    Mock::given(method("PUT"))
        .and(path(SESSION))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(SESSION))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "vid-retry"})))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let response = client(&server, 3).upload(&creds(), &request(video(&dir))).await.unwrap();
    assert_eq!(response.id, "vid-retry");
}

#[tokio::test]
async fn retries_are_capped() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(VIDEOS))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let err = client(&server, 2).upload(&creds(), &request(video(&dir))).await.unwrap_err();
    assert!(matches!(err, YoutubeError::RetriesExhausted(2)));
}

#[tokio::test]
async fn incomplete_upload_resumes_from_server_offset() {
    let server = MockServer::start().await;
    mount_session(&server).await;
    Mock::given(method("PUT"))
        .and(path(SESSION))
        .respond_with(ResponseTemplate::new(308).insert_header("Range", "bytes=0-4"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(SESSION))
        .and(header("content-range", "bytes 5-9/10"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "vid-resumed"})))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let response = client(&server, 3).upload(&creds(), &request(video(&dir))).await.unwrap();
    assert_eq!(response.id, "vid-resumed");
}

#[tokio::test]
async fn publish_at_sends_private_and_sets_thumbnail() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(VIDEOS))
        .and(body_partial_json(json!({
            "status": {"privacyStatus": "private", "publishAt": "2099-01-01T18:00:00Z"}
        })))
        .respond_with(ResponseTemplate::new(200).insert_header("Location", SESSION))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(SESSION))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "vid-private"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/upload/youtube/v3/thumbnails/set"))
        .and(query_param("videoId", "vid-private"))
        .and(header("content-type", "image/jpeg"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let thumbnail = dir.path().join("thumb.jpg");
    std::fs::write(&thumbnail, b"jpeg").unwrap();
    let mut req = request(video(&dir));
    req.publish_at = Some("2099-01-01T19:00:00+01:00".into());
    req.thumbnail_path = Some(thumbnail);

    let response = client(&server, 3).upload(&creds(), &req).await.unwrap();
    assert_eq!(response.id, "vid-private");
}

#[tokio::test]
async fn missing_video_fails_before_any_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST")).respond_with(ResponseTemplate::new(200)).expect(0).mount(&server).await;

    let err = client(&server, 3)
        .upload(&creds(), &request(PathBuf::from("/nonexistent/clip.mp4")))
        .await
        .unwrap_err();
    assert!(matches!(err, YoutubeError::FileNotFound(_)));
}
