//! Metadata helpers shared by the worker and the AI generator.

use std::collections::HashSet;
use std::path::Path;

/// Maximum length of a title derived from a file name.
pub const DEFAULT_TITLE_MAX_CHARS: usize = 90;

/// Trim, strip a leading `#`, lowercase and dedupe, keeping first occurrence order.
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    tags.into_iter()
        .map(|t| t.as_ref().trim().trim_start_matches('#').trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// Title built from the video file name.
pub fn default_title_for(video_path: &Path) -> String {
    let stem = video_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    truncate_chars(&stem.replace('_', " "), DEFAULT_TITLE_MAX_CHARS)
}

/// Truncate on a char boundary.
pub fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_tags() {
        let tags = normalize_tags(["  #Rust ", "rust", "Tokio", "", "#", "tokio", "Async IO"]);
        assert_eq!(tags, vec!["rust", "tokio", "async io"]);
    }

    #[test]
    fn test_default_title_from_file_name() {
        let title = default_title_for(Path::new("/tmp/ma_super_video_demo_final.mp4"));
        assert_eq!(title, "ma super video demo final");

        let long = format!("/tmp/{}.mp4", "a_".repeat(80));
        assert!(default_title_for(Path::new(&long)).chars().count() <= DEFAULT_TITLE_MAX_CHARS);
    }

    #[test]
    fn test_truncate_multibyte() {
        assert_eq!(truncate_chars("éléphant", 3), "élé");
    }
}
