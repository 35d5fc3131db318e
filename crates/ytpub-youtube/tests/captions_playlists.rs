use std::collections::BTreeMap;

use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};
use ytpub_youtube::{
    upload_captions_smart, CaptionOutcome, CaptionService, Credentials, PlaylistService, YoutubeClient, YoutubeConfig,
};

fn client(server: &MockServer) -> YoutubeClient {
    YoutubeClient::new(YoutubeConfig::with_base_url(&server.uri())).unwrap()
}

#[tokio::test]
async fn playlist_item_inserted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/youtube/v3/playlistItems"))
        .and(query_param("part", "snippet"))
        .and(body_partial_json(json!({
            "snippet": {"playlistId": "PL1", "resourceId": {"kind": "youtube#video", "videoId": "vid"}}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "item-1"})))
        .expect(1)
        .mount(&server)
        .await;

    let id = client(&server)
        .add_to_playlist(&Credentials::new("t", None), "PL1", "vid")
        .await
        .unwrap();
    assert_eq!(id, "item-1");
}

#[tokio::test]
async fn smart_upload_inserts_missing_and_skips_existing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/youtube/v3/captions"))
        .and(query_param("videoId", "vid"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"id": "cap-fr", "snippet": {"language": "fr", "name": "FR"}}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/upload/youtube/v3/captions"))
        .and(body_partial_json(json!({"snippet": {"videoId": "vid", "language": "zh-CN"}})))
        .respond_with(ResponseTemplate::new(200).insert_header("Location", "/upload/captions-session/1"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/upload/captions-session/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "cap-zh"})))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut files = BTreeMap::new();
    for lang in ["fr", "zh"] {
        let srt = dir.path().join(format!("{}.srt", lang));
        std::fs::write(&srt, "1\n00:00:00,000 --> 00:00:01,000\nSalut\n").unwrap();
        files.insert(lang.to_string(), srt);
    }

    let yt = client(&server);
    let creds = Credentials::new("t", None);
    assert_eq!(yt.list_captions(&creds, "vid").await.unwrap().len(), 1);

    let results = upload_captions_smart(&yt, &creds, "vid", &files, false, false).await;
    assert_eq!(results["fr"], CaptionOutcome::Skipped { caption_id: "cap-fr".into() });
    assert_eq!(results["zh"], CaptionOutcome::Inserted { caption_id: "cap-zh".into() });
}
