//! Video category detection with a local vision model.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};
use ytpub_media::{get_duration, FfmpegCommand, FfmpegRunner};

use crate::error::{AiError, AiResult};
use crate::request::parse_json_answer;

/// "Entertainment".
pub const DEFAULT_VISION_CATEGORY: u32 = 24;

const DEFAULT_VISION_MODEL: &str = "llava";

const VISION_PROMPT: &str = r#"Analyze this video frame and respond with JSON:
{"content_type": "main category such as gaming, education, music", "tags": ["tag1", "tag2"], "description": "brief description", "confidence": 0.8}
Focus on the main subject and activity shown."#;

/// YouTube category for a detected content type.
pub fn category_for_content_type(content_type: &str) -> u32 {
    match content_type.trim().to_lowercase().as_str() {
        "gaming" | "games" | "videogames" | "esports" => 20,
        "education" | "learning" | "course" => 27,
        "entertainment" => 24,
        "comedy" | "funny" | "humor" => 23,
        "music" | "song" | "concert" | "instrument" => 10,
        "technology" | "tech" | "science" | "programming" | "coding" => 28,
        "news" | "politics" | "current events" => 25,
        "sports" | "football" | "basketball" | "soccer" | "fitness" | "workout" => 17,
        "howto" | "diy" | "tutorial" | "guide" | "recipe" | "cooking" => 26,
        "travel" => 19,
        "vlog" | "lifestyle" | "personal" | "daily" => 22,
        "pets" | "animals" | "cats" | "dogs" | "nature" => 15,
        "cars" | "automotive" | "vehicles" => 2,
        "film" | "movie" | "cinema" | "trailer" => 1,
        _ => DEFAULT_VISION_CATEGORY,
    }
}

/// What the model saw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisionAnalysis {
    pub content_type: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub confidence: f64,
    pub category_id: u32,
}

impl VisionAnalysis {
    fn from_answer(value: &Value) -> Self {
        let content_type = value
            .get("content_type")
            .and_then(Value::as_str)
            .filter(|c| !c.trim().is_empty())
            .unwrap_or("entertainment")
            .to_string();
        Self {
            category_id: category_for_content_type(&content_type),
            tags: value
                .get("tags")
                .and_then(Value::as_array)
                .map(|t| t.iter().filter_map(Value::as_str).map(str::to_string).collect())
                .unwrap_or_default(),
            description: value.get("description").and_then(Value::as_str).unwrap_or_default().to_string(),
            confidence: value.get("confidence").and_then(Value::as_f64).unwrap_or(0.0),
            content_type,
        }
    }
}

/// Vision collaborator; failures yield `None`.
#[async_trait]
pub trait VisionAnalyzer: Send + Sync {
    async fn analyze_video(&self, video: &Path) -> Option<VisionAnalysis>;
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Ollama `/api/generate` with one frame taken at mid-duration.
#[derive(Debug, Clone)]
pub struct OllamaVision {
    http: Client,
    host: String,
    model: String,
    runner: FfmpegRunner,
}

impl OllamaVision {
    pub fn new(host: Option<String>, model: Option<String>) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            http,
            host: host.unwrap_or_else(|| "http://localhost:11434".to_string()),
            model: model.unwrap_or_else(|| DEFAULT_VISION_MODEL.to_string()),
            runner: FfmpegRunner::new().with_timeout(60),
        }
    }

    async fn extract_frame(&self, video: &Path, output: &Path) -> AiResult<()> {
        let duration = get_duration(video).await.unwrap_or(0.0);
        let cmd = FfmpegCommand::new(video, output)
            .seek((duration / 2.0).max(0.0))
            .single_frame()
            .output_args(["-q:v", "2"]);
        self.runner.run(&cmd).await?;
        Ok(())
    }

    /// Ask the model about one image.
    pub async fn analyze_frame(&self, frame: &Path) -> AiResult<VisionAnalysis> {
        let image = tokio::fs::read(frame).await?;
        let response = self
            .http
            .post(format!("{}/api/generate", self.host.trim_end_matches('/')))
            .json(&json!({
                "model": self.model,
                "prompt": VISION_PROMPT,
                "images": [base64::engine::general_purpose::STANDARD.encode(image)],
                "stream": false,
                "format": "json",
            }))
            .send()
            .await?;
        let generated: GenerateResponse = AiError::from_response(response).await?.json().await?;
        let value = parse_json_answer(&generated.response).ok_or_else(|| AiError::invalid_answer("no JSON object"))?;
        Ok(VisionAnalysis::from_answer(&value))
    }
}

#[async_trait]
impl VisionAnalyzer for OllamaVision {
    async fn analyze_video(&self, video: &Path) -> Option<VisionAnalysis> {
        let dir = match tempfile::tempdir() {
            Ok(dir) => dir,
            Err(e) => {
                warn!("Vision analysis skipped, no temp dir: {}", e);
                return None;
            }
        };
        let frame = dir.path().join("frame.jpg");
        let result = match self.extract_frame(video, &frame).await {
            Ok(()) => self.analyze_frame(&frame).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(analysis) => {
                info!(
                    video = %video.display(),
                    content_type = %analysis.content_type,
                    category_id = analysis.category_id,
                    confidence = analysis.confidence,
                    "Vision analysis done"
                );
                Some(analysis)
            }
            Err(e) => {
                warn!(video = %video.display(), "Vision analysis failed: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_category_mapping() {
        assert_eq!(category_for_content_type("Gaming"), 20);
        assert_eq!(category_for_content_type("tutorial"), 26);
        assert_eq!(category_for_content_type("cooking"), 26);
        assert_eq!(category_for_content_type("something else"), DEFAULT_VISION_CATEGORY);
    }

    #[tokio::test]
    async fn test_analyze_frame_maps_category() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(json!({"model": "llava", "format": "json", "stream": false})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "response": "{\"content_type\": \"music\", \"tags\": [\"guitar\"], \"confidence\": 0.9}"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let frame = dir.path().join("frame.jpg");
        std::fs::write(&frame, b"jpeg").unwrap();

        let vision = OllamaVision::new(Some(server.uri()), None);
        let analysis = vision.analyze_frame(&frame).await.unwrap();
        assert_eq!(analysis.category_id, 10);
        assert_eq!(analysis.tags, vec!["guitar"]);
    }

    #[tokio::test]
    async fn test_missing_video_yields_none() {
        let vision = OllamaVision::new(Some("http://127.0.0.1:9".into()), None);
        assert!(vision.analyze_video(Path::new("/nonexistent/video.mp4")).await.is_none());
    }
}
