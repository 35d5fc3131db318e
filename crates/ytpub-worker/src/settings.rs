//! Application configuration file.
//!
//! YAML or JSON, read with the `config` crate. Keys can be overridden from the
//! environment with a `YTPUB__` prefix and `__` as the nesting separator, e.g.
//! `YTPUB__SEO__PROVIDER=ollama`. Enumerated values (quality, codec, hwaccel,
//! privacy) are checked while deserializing, the rest by `validator`.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{info, warn};
use validator::{Validate, ValidationError};
use ytpub_models::{is_valid_category, EnhanceOverrides, PrivacyStatus, QualityPreset};

use crate::error::{WorkerError, WorkerResult};

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_category"))]
pub struct AppConfig {
    pub title: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub category_id: Option<u32>,
    pub privacy_status: Option<PrivacyStatus>,
    /// RFC3339 publication time
    pub publish_at: Option<String>,
    pub made_for_kids: Option<bool>,
    pub embeddable: Option<bool>,
    /// `youtube` or `creativeCommon`
    pub license: Option<String>,
    pub public_stats_viewable: Option<bool>,
    pub default_language: Option<String>,
    pub default_audio_language: Option<String>,
    pub thumbnail_path: Option<PathBuf>,
    pub playlist_id: Option<String>,
    /// Language of generated metadata
    pub language: Option<String>,
    pub tone: Option<String>,
    #[validate(nested)]
    pub enhance: EnhanceConfig,
    pub seo: SeoConfig,
    #[validate(nested)]
    pub subtitles: SubtitleConfig,
    pub multi_accounts: MultiAccountConfig,
    pub vision: VisionConfig,
    #[validate(nested)]
    pub notifications: NotificationConfig,
    pub credentials: CredentialsConfig,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_enhance"))]
pub struct EnhanceConfig {
    pub enabled: bool,
    pub quality: Option<QualityPreset>,
    #[serde(flatten)]
    pub overrides: EnhanceOverrides,
}

impl Default for EnhanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            quality: None,
            overrides: EnhanceOverrides::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SeoConfig {
    /// `openai`, `ollama` or `none`
    pub provider: Option<String>,
    pub model: Option<String>,
    pub host: Option<String>,
    pub target_keywords: Vec<String>,
    pub channel_style: Option<String>,
    pub include_hashtags: bool,
    pub force_ai_title: bool,
}

impl Default for SeoConfig {
    fn default() -> Self {
        Self {
            provider: None,
            model: None,
            host: None,
            target_keywords: Vec::new(),
            channel_style: None,
            include_hashtags: true,
            force_ai_title: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct SubtitleConfig {
    pub enabled: bool,
    #[validate(length(min = 1))]
    pub languages: Vec<String>,
    /// Whisper model name
    pub model: String,
    pub replace_existing: bool,
    pub draft: bool,
}

impl Default for SubtitleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            languages: vec!["fr".to_string(), "en".to_string()],
            model: "base".to_string(),
            replace_existing: false,
            draft: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MultiAccountConfig {
    pub enabled: bool,
    /// Holds `accounts.json` and `quota_usage.json`
    pub config_dir: PathBuf,
}

impl Default for MultiAccountConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            config_dir: PathBuf::from("config/accounts"),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    pub enabled: bool,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub host: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(default)]
pub struct NotificationConfig {
    #[validate(nested)]
    pub email: EmailConfig,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct EmailConfig {
    pub enabled: bool,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: Option<String>,
    #[validate(email)]
    pub from: Option<String>,
    #[validate(email)]
    pub to: Option<String>,
    /// STARTTLS on the submission port; plain SMTP otherwise
    pub starttls: bool,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: "localhost".to_string(),
            smtp_port: 587,
            username: None,
            from: None,
            to: None,
            starttls: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    pub client_secrets: PathBuf,
    pub token: PathBuf,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            client_secrets: PathBuf::from("config/client_secret.json"),
            token: PathBuf::from("config/token.json"),
        }
    }
}

fn validate_category(config: &AppConfig) -> Result<(), ValidationError> {
    match config.category_id {
        Some(id) if !is_valid_category(id) => Err(ValidationError::new("unknown_category_id")),
        _ => Ok(()),
    }
}

fn validate_enhance(config: &EnhanceConfig) -> Result<(), ValidationError> {
    if config.overrides.crf.is_some_and(|crf| crf > 51) {
        return Err(ValidationError::new("crf_out_of_range"));
    }
    if config.overrides.fps.is_some_and(|fps| fps <= 0.0) {
        return Err(ValidationError::new("fps_not_positive"));
    }
    Ok(())
}

impl AppConfig {
    /// Load and validate `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> WorkerResult<Self> {
        let built = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix("YTPUB")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| WorkerError::config_error(e.to_string()))?;

        let settings: AppConfig = built
            .try_deserialize()
            .map_err(|e| WorkerError::config_error(e.to_string()))?;
        settings
            .validate()
            .map_err(|e| WorkerError::config_error(e.to_string()))?;
        Ok(settings)
    }

    /// [`Self::load`], falling back to the defaults on any error.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(settings) => {
                info!(config = %path.display(), "Configuration loaded");
                settings
            }
            Err(e) => {
                warn!(config = %path.display(), "Config not loaded ({}), continuing with defaults", e);
                Self::default()
            }
        }
    }
}
