//! Request and result types of the metadata generator.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Backend used to write metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Provider {
    #[default]
    OpenAi,
    Ollama,
    /// Keyword heuristic, no network.
    Heuristic,
}

impl Provider {
    /// Unset means OpenAI; `none` and unknown names mean the heuristic.
    pub fn from_name(name: Option<&str>) -> Self {
        match name.map(|n| n.trim().to_lowercase()).as_deref() {
            None | Some("") | Some("openai") => Self::OpenAi,
            Some("ollama") => Self::Ollama,
            Some(_) => Self::Heuristic,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::OpenAi => "openai",
            Self::Ollama => "ollama",
            Self::Heuristic => "none",
        })
    }
}

/// What to write metadata about.
#[derive(Debug, Clone, PartialEq)]
pub struct MetaRequest {
    pub topic: String,
    pub language: String,
    pub tone: String,
    pub target_keywords: Vec<String>,
    pub channel_style: Option<String>,
    pub include_hashtags: bool,
    pub max_tags: usize,
    pub max_title_chars: usize,
    pub provider: Provider,
    pub model: Option<String>,
    pub host: Option<String>,
    /// Free text the metadata should be derived from.
    pub input_text: Option<String>,
    pub include_category: bool,
}

impl MetaRequest {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            language: "fr".to_string(),
            tone: "informatif".to_string(),
            target_keywords: Vec::new(),
            channel_style: None,
            include_hashtags: true,
            max_tags: 15,
            max_title_chars: 70,
            provider: Provider::default(),
            model: None,
            host: None,
            input_text: None,
            include_category: true,
        }
    }

    /// Input text, else topic, trimmed.
    pub(crate) fn source_text(&self) -> &str {
        self.input_text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| self.topic.trim())
    }
}

/// Generated metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneratedMetadata {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hashtags: Vec<String>,
}

impl GeneratedMetadata {
    /// Read a model's JSON answer leniently: missing fields become empty,
    /// `category_id` may be a number or a numeric string.
    pub fn from_answer(value: &Value, max_tags: usize) -> Self {
        let text = |key: &str| value.get(key).and_then(Value::as_str).unwrap_or_default().trim().to_string();
        let list = |key: &str| -> Vec<String> {
            value
                .get(key)
                .and_then(Value::as_array)
                .map(|items| items.iter().filter_map(Value::as_str).map(str::to_string).collect())
                .unwrap_or_default()
        };
        let category_id = value.get("category_id").and_then(|c| match c {
            Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        });

        let mut tags = list("tags");
        tags.truncate(max_tags);
        Self {
            title: text("title"),
            description: text("description"),
            tags,
            category_id,
            hashtags: list("hashtags"),
        }
    }
}

/// JSON object inside a model answer, tolerating code fences and chatter.
pub fn parse_json_answer(text: &str) -> Option<Value> {
    let t = text.trim().trim_matches('`');
    let start = t.find('{')?;
    let end = t.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Value>(&t[start..=end]).ok().filter(Value::is_object)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_provider_names() {
        assert_eq!(Provider::from_name(None), Provider::OpenAi);
        assert_eq!(Provider::from_name(Some("Ollama")), Provider::Ollama);
        assert_eq!(Provider::from_name(Some("none")), Provider::Heuristic);
        assert_eq!(Provider::from_name(Some("mistral")), Provider::Heuristic);
    }

    #[test]
    fn test_request_defaults() {
        let req = MetaRequest::new("topic");
        assert_eq!(req.max_tags, 15);
        assert_eq!(req.max_title_chars, 70);
        assert_eq!(req.language, "fr");
        assert_eq!(req.tone, "informatif");
    }

    #[test]
    fn test_parse_fenced_answer() {
        let answer = "```json\n{\"title\": \"T\", \"tags\": [\"a\"]}\n```";
        assert_eq!(parse_json_answer(answer).unwrap()["title"], "T");
        assert!(parse_json_answer("no json here").is_none());
        assert!(parse_json_answer("{broken").is_none());
    }

    #[test]
    fn test_from_answer_is_lenient() {
        let value = json!({"title": " Titre ", "tags": ["a", 3, "b", "c"], "category_id": "27"});
        let meta = GeneratedMetadata::from_answer(&value, 2);
        assert_eq!(meta.title, "Titre");
        assert_eq!(meta.description, "");
        assert_eq!(meta.tags, vec!["a", "b"]);
        assert_eq!(meta.category_id, Some(27));
    }
}
