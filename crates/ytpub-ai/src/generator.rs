//! SEO metadata generation with provider fallback.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::error::{AiError, AiResult};
use crate::heuristic;
use crate::request::{parse_json_answer, GeneratedMetadata, MetaRequest, Provider};

const OPENAI_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";
const DEFAULT_OLLAMA_MODEL: &str = "llama3.1:8b-instruct";

const CATEGORY_GUIDE: &str = "Catégories YouTube: Gaming (20), Education (27), Entertainment (24), \
Music (10), Science & Technology (28), News (25), Sports (17), Comedy (23), Howto & Style (26), \
People & Blogs (22, défaut).";

/// Metadata-generation collaborator. Never fails: providers fall back to the heuristic.
#[async_trait]
pub trait MetadataGenerator: Send + Sync {
    async fn generate(&self, request: &MetaRequest) -> GeneratedMetadata;
}

/// Provider endpoints and defaults.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub openai_base: String,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub ollama_host: String,
    pub ollama_model: String,
    pub timeout: Duration,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            openai_base: OPENAI_BASE.to_string(),
            openai_api_key: None,
            openai_model: DEFAULT_OPENAI_MODEL.to_string(),
            ollama_host: DEFAULT_OLLAMA_HOST.to_string(),
            ollama_model: DEFAULT_OLLAMA_MODEL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl GeneratorConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            openai_base: std::env::var("OPENAI_BASE_URL").unwrap_or(defaults.openai_base),
            openai_api_key: std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()),
            openai_model: std::env::var("OPENAI_MODEL").unwrap_or(defaults.openai_model),
            ollama_host: std::env::var("OLLAMA_HOST").unwrap_or(defaults.ollama_host),
            ollama_model: std::env::var("OLLAMA_MODEL").unwrap_or(defaults.ollama_model),
            timeout: defaults.timeout,
        }
    }
}

/// Default generator talking to OpenAI or Ollama.
#[derive(Debug, Clone)]
pub struct SeoGenerator {
    http: Client,
    config: GeneratorConfig,
}

#[derive(Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct OllamaChat {
    message: ChatMessage,
}

impl SeoGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { http, config }
    }

    pub fn from_env() -> Self {
        Self::new(GeneratorConfig::from_env())
    }

    fn system_prompt(req: &MetaRequest) -> String {
        let mut prompt = format!(
            "Tu es un expert YouTube SEO. Écris en {lang}, ton {tone}.\n\
             - Titre accrocheur de {max_title} caractères maximum.\n\
             - Description de 2 à 3 paragraphes, mots-clés en tête, appel à s'abonner.\n\
             - Jusqu'à {max_tags} tags sans #.\n",
            lang = req.language,
            tone = req.tone,
            max_title = req.max_title_chars,
            max_tags = req.max_tags,
        );
        if req.include_hashtags {
            prompt.push_str("- 3 à 5 hashtags en fin de description.\n");
        }
        if req.include_category {
            prompt.push_str(CATEGORY_GUIDE);
            prompt.push_str("\n- Choisis le category_id le plus adapté.\n");
        }
        prompt.push_str(
            "Réponds uniquement avec un objet JSON {\"title\", \"description\", \"tags\", \"hashtags\"",
        );
        if req.include_category {
            prompt.push_str(", \"category_id\"");
        }
        prompt.push('}');
        prompt
    }

    fn user_prompt(req: &MetaRequest) -> String {
        let mut parts = vec![format!("Sujet: {}", req.topic)];
        if let Some(text) = req.input_text.as_deref().filter(|t| !t.trim().is_empty()) {
            parts.push(format!("Contexte fourni: {}", text.trim()));
        }
        if !req.target_keywords.is_empty() {
            parts.push(format!("Mots-clés cibles: {}", req.target_keywords.join(", ")));
        }
        if let Some(style) = &req.channel_style {
            parts.push(format!("Style de la chaîne: {}", style));
        }
        parts.join("\n\n")
    }

    fn messages(req: &MetaRequest) -> Value {
        json!([
            {"role": "system", "content": Self::system_prompt(req)},
            {"role": "user", "content": Self::user_prompt(req)},
        ])
    }

    async fn openai(&self, req: &MetaRequest) -> AiResult<GeneratedMetadata> {
        let key = self
            .config
            .openai_api_key
            .as_deref()
            .ok_or(AiError::MissingApiKey("OPENAI_API_KEY"))?;
        let model = req.model.as_deref().unwrap_or(&self.config.openai_model);
        let response = self
            .http
            .post(format!("{}/chat/completions", self.config.openai_base.trim_end_matches('/')))
            .bearer_auth(key)
            .json(&json!({
                "model": model,
                "messages": Self::messages(req),
                "temperature": 0.7,
                "max_tokens": 800,
            }))
            .send()
            .await?;
        let completion: ChatCompletion = AiError::from_response(response).await?.json().await?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AiError::invalid_answer("no choices"))?;
        Self::read_answer(&content, req)
    }

    async fn ollama(&self, req: &MetaRequest) -> AiResult<GeneratedMetadata> {
        let host = req.host.as_deref().unwrap_or(&self.config.ollama_host);
        let model = req.model.as_deref().unwrap_or(&self.config.ollama_model);
        let response = self
            .http
            .post(format!("{}/api/chat", host.trim_end_matches('/')))
            .json(&json!({
                "model": model,
                "messages": Self::messages(req),
                "stream": false,
                "options": {"temperature": 0.7, "top_p": 0.9},
            }))
            .send()
            .await?;
        let chat: OllamaChat = AiError::from_response(response).await?.json().await?;
        Self::read_answer(&chat.message.content.unwrap_or_default(), req)
    }

    fn read_answer(content: &str, req: &MetaRequest) -> AiResult<GeneratedMetadata> {
        let value = parse_json_answer(content).ok_or_else(|| AiError::invalid_answer("no JSON object"))?;
        let mut meta = GeneratedMetadata::from_answer(&value, req.max_tags);
        if meta.title.is_empty() && meta.description.is_empty() && meta.tags.is_empty() {
            return Err(AiError::invalid_answer("empty metadata"));
        }
        if !req.include_category {
            meta.category_id = None;
        }
        Ok(meta)
    }
}

#[async_trait]
impl MetadataGenerator for SeoGenerator {
    async fn generate(&self, request: &MetaRequest) -> GeneratedMetadata {
        let result = match request.provider {
            Provider::Heuristic => return heuristic::generate(request),
            Provider::OpenAi => self.openai(request).await,
            Provider::Ollama => self.ollama(request).await,
        };
        match result {
            Ok(meta) => {
                info!(provider = %request.provider, tags = meta.tags.len(), "Metadata generated");
                meta
            }
            Err(e) => {
                warn!(provider = %request.provider, "Metadata provider failed, using heuristic: {}", e);
                heuristic::generate(request)
            }
        }
    }
}
