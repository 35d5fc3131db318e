//! Title, description, tags and category for one upload.

use std::path::Path;

use tracing::debug;
use ytpub_ai::{MetaRequest, MetadataGenerator, Provider};
use ytpub_models::{default_title_for, normalize_tags, resolve_category, Task};

use crate::settings::AppConfig;

/// Metadata handed to the uploader.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMetadata {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    /// Category suggested by the generator, if it was asked.
    pub ai_category: Option<u32>,
    pub ai_used: bool,
}

/// Whether the generator has to be called for `task`.
///
/// Telegram tasks and forced titles always go through it; other tasks only
/// when the user left a field empty.
pub fn needs_ai(task: &Task, settings: &AppConfig) -> bool {
    task.meta.title().is_none()
        || task.meta.description().is_none()
        || task.meta.tags.iter().all(|t| t.trim().is_empty())
        || task.is_telegram()
        || force_ai_title(task, settings)
}

fn force_ai_title(task: &Task, settings: &AppConfig) -> bool {
    task.prefs.ai_title_force || settings.seo.force_ai_title
}

/// Generator request for `task`.
pub fn meta_request(task: &Task, video: &Path, settings: &AppConfig) -> MetaRequest {
    let mut req = MetaRequest::new(default_title_for(video));
    if let Some(lang) = task.meta.language.clone().or_else(|| settings.language.clone()) {
        req.language = lang;
    }
    if let Some(tone) = task.meta.tone.clone().or_else(|| settings.tone.clone()) {
        req.tone = tone;
    }
    req.provider = Provider::from_name(settings.seo.provider.as_deref());
    req.model = settings.seo.model.clone();
    req.host = settings.seo.host.clone();
    req.target_keywords = settings.seo.target_keywords.clone();
    req.channel_style = settings.seo.channel_style.clone();
    req.include_hashtags = settings.seo.include_hashtags;
    // a description without a title is the best source for the generator
    if task.meta.title().is_none() {
        req.input_text = task.meta.description().map(str::to_string);
    }
    req
}

/// Merge user metadata, generated metadata and config fallbacks.
pub async fn resolve_metadata(
    task: &Task,
    video: &Path,
    settings: &AppConfig,
    generator: &dyn MetadataGenerator,
) -> ResolvedMetadata {
    let user_title = task.meta.title();
    let user_description = task.meta.description();
    let user_tags: Vec<&str> = task
        .meta
        .tags
        .iter()
        .map(String::as_str)
        .filter(|t| !t.trim().is_empty())
        .collect();

    if !needs_ai(task, settings) {
        return ResolvedMetadata {
            title: user_title.unwrap_or_default().to_string(),
            description: user_description.unwrap_or_default().to_string(),
            tags: normalize_tags(user_tags),
            ai_category: None,
            ai_used: false,
        };
    }

    let generated = generator.generate(&meta_request(task, video, settings)).await;
    let ai_title = Some(generated.title.trim()).filter(|t| !t.is_empty());
    let ai_description = Some(generated.description.trim()).filter(|d| !d.is_empty());
    let refine = task.is_telegram() || force_ai_title(task, settings);
    debug!(refine, "Metadata generated for task");

    let title = if refine {
        ai_title.or(user_title)
    } else {
        user_title.or(ai_title)
    }
    .map(str::to_string)
    .or_else(|| settings.title.clone())
    .unwrap_or_else(|| default_title_for(video));

    let description = user_description
        .or(ai_description)
        .map(str::to_string)
        .or_else(|| settings.description.clone())
        .unwrap_or_default();

    let ai_tags: Vec<&str> = generated.tags.iter().map(String::as_str).collect();
    let tags = if task.is_telegram() && !ai_tags.is_empty() {
        normalize_tags(ai_tags)
    } else if !user_tags.is_empty() {
        normalize_tags(user_tags)
    } else if !ai_tags.is_empty() {
        normalize_tags(ai_tags)
    } else {
        normalize_tags(settings.tags.iter().map(String::as_str))
    };

    ResolvedMetadata {
        title,
        description,
        tags,
        ai_category: generated.category_id,
        ai_used: true,
    }
}

/// Vision first, then the generator, then explicit task and config values.
/// Unknown ids fall back to the default category.
pub fn resolve_upload_category(
    vision: Option<u32>,
    ai: Option<u32>,
    task: &Task,
    settings: &AppConfig,
) -> u32 {
    resolve_category([vision, ai, task.category_id, task.meta.category_id, settings.category_id])
}
