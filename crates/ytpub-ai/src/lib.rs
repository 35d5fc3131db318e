//! Metadata and category suggestions for uploads.
//!
//! - [`SeoGenerator`]: title, description, tags and category from OpenAI or
//!   Ollama, falling back to a keyword heuristic
//! - [`OllamaVision`]: content type of a video from one frame

pub mod error;
pub mod generator;
pub mod heuristic;
pub mod request;
pub mod vision;

pub use error::{AiError, AiResult};
pub use generator::{GeneratorConfig, MetadataGenerator, SeoGenerator};
pub use heuristic::guess_category;
pub use request::{parse_json_answer, GeneratedMetadata, MetaRequest, Provider};
pub use vision::{category_for_content_type, OllamaVision, VisionAnalysis, VisionAnalyzer, DEFAULT_VISION_CATEGORY};
