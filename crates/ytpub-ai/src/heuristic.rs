//! Offline metadata from keywords in the input text.

use ytpub_models::{normalize_tags, truncate_chars, DEFAULT_CATEGORY_ID};

use crate::request::{GeneratedMetadata, MetaRequest};

pub const FALLBACK_TITLE: &str = "Nouvelle vidéo";
pub const SUBSCRIBE_FOOTER: &str = "\n--\nAbonnez-vous pour plus de contenus !";

const KEYWORD_TAGS: usize = 5;

/// Keyword families checked in order; the first hit wins.
const CATEGORY_KEYWORDS: &[(u32, &[&str])] = &[
    (20, &["jeu", "gaming", "game", "stream", "joueur", "gamer"]),
    (27, &["tutoriel", "cours", "apprendre", "formation", "éducation", "tutorial", "learn"]),
    (10, &["musique", "music", "chanson", "concert", "album"]),
    (28, &["tech", "technologie", "science", "informatique", "programming", "code"]),
    (17, &["sport", "fitness", "football", "basketball", "workout"]),
    (23, &["humour", "comedy", "funny", "blague", "sketch"]),
    (26, &["diy", "bricolage", "recette", "cuisine", "howto", "guide"]),
    (25, &["actualité", "news", "politique", "journal"]),
];

/// Category guessed from keyword families, default 22.
pub fn guess_category(text: &str) -> u32 {
    let text = text.to_lowercase();
    CATEGORY_KEYWORDS
        .iter()
        .find(|(_, words)| words.iter().any(|w| text.contains(w)))
        .map_or(DEFAULT_CATEGORY_ID, |(id, _)| *id)
}

pub fn generate(req: &MetaRequest) -> GeneratedMetadata {
    let base = req.source_text();
    let title = base
        .lines()
        .next()
        .map(|line| truncate_chars(line.trim(), req.max_title_chars))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| FALLBACK_TITLE.to_string());

    let input = req.input_text.as_deref().map(str::trim).filter(|t| !t.is_empty());
    let description = match input {
        Some(text) => format!("{}\n{}", text, SUBSCRIBE_FOOTER),
        None => SUBSCRIBE_FOOTER.to_string(),
    };

    let keywords = input
        .map(|text| {
            text.to_lowercase()
                .split_whitespace()
                .filter(|w| w.chars().count() > 3 && w.chars().all(char::is_alphabetic))
                .take(KEYWORD_TAGS)
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    let topic = req.topic.trim().to_lowercase();
    let mut tags = normalize_tags(keywords.iter().map(String::as_str).chain((!topic.is_empty()).then_some(topic.as_str())));
    tags.truncate(req.max_tags);

    GeneratedMetadata {
        title,
        description,
        tags,
        category_id: req.include_category.then(|| guess_category(base)),
        hashtags: Vec::new(),
    }
}
