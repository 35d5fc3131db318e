//! External collaborators injected into the queue worker.

use std::sync::Arc;

use tracing::{info, warn};
use ytpub_ai::{MetadataGenerator, OllamaVision, SeoGenerator, VisionAnalyzer};
use ytpub_media::{Enhancer, FfmpegEnhancer, FfmpegThumbnailer, SubtitleGenerator, ThumbnailGenerator, WhisperCli};
use ytpub_youtube::{
    AccountPool, CaptionService, CredentialProvider, MultiAccountManager, OAuthCredentialProvider, PlaylistService,
    Uploader, YoutubeClient, YoutubeConfig,
};

use crate::error::{WorkerError, WorkerResult};
use crate::notify::{EmailNotifier, Notifier};
use crate::settings::AppConfig;

/// Everything the pipeline talks to outside its own process.
///
/// Tests build this by hand with fakes; binaries use [`Collaborators::production`].
#[derive(Clone)]
pub struct Collaborators {
    pub enhancer: Arc<dyn Enhancer>,
    pub metadata: Arc<dyn MetadataGenerator>,
    /// Set only when vision analysis is enabled.
    pub vision: Option<Arc<dyn VisionAnalyzer>>,
    pub thumbnails: Arc<dyn ThumbnailGenerator>,
    pub subtitles: Arc<dyn SubtitleGenerator>,
    pub credentials: Arc<dyn CredentialProvider>,
    pub uploader: Arc<dyn Uploader>,
    pub captions: Arc<dyn CaptionService>,
    pub playlists: Arc<dyn PlaylistService>,
    /// Set only in multi-account mode.
    pub accounts: Option<Arc<dyn AccountPool>>,
    pub notifier: Option<Arc<dyn Notifier>>,
}

impl Collaborators {
    /// Default implementations wired from the application config.
    pub fn production(settings: &AppConfig) -> WorkerResult<Self> {
        let youtube = Arc::new(
            YoutubeClient::new(YoutubeConfig::default())
                .map_err(|e| WorkerError::config_error(format!("YouTube client: {}", e)))?,
        );
        let credentials: Arc<dyn CredentialProvider> = Arc::new(
            OAuthCredentialProvider::new()
                .map_err(|e| WorkerError::config_error(format!("OAuth client: {}", e)))?,
        );

        let accounts = if settings.multi_accounts.enabled {
            let manager = MultiAccountManager::open(settings.multi_accounts.config_dir.clone(), credentials.clone())
                .map_err(|e| WorkerError::config_error(format!("Account manager: {}", e)))?;
            info!(dir = %settings.multi_accounts.config_dir.display(), "Multi-account mode enabled");
            Some(Arc::new(manager) as Arc<dyn AccountPool>)
        } else {
            None
        };

        let vision = if settings.vision.enabled {
            match settings.vision.provider.as_deref().unwrap_or("ollama") {
                "ollama" => Some(Arc::new(OllamaVision::new(
                    settings.vision.host.clone(),
                    settings.vision.model.clone(),
                )) as Arc<dyn VisionAnalyzer>),
                other => {
                    warn!(provider = other, "Unsupported vision provider, vision analysis disabled");
                    None
                }
            }
        } else {
            None
        };

        let notifier = EmailNotifier::from_config(&settings.notifications.email)
            .map(|n| Arc::new(n) as Arc<dyn Notifier>);

        Ok(Self {
            enhancer: Arc::new(FfmpegEnhancer::default()),
            metadata: Arc::new(SeoGenerator::from_env()),
            vision,
            thumbnails: Arc::new(FfmpegThumbnailer::default()),
            subtitles: Arc::new(WhisperCli::new(settings.subtitles.model.clone())),
            credentials,
            uploader: youtube.clone(),
            captions: youtube.clone(),
            playlists: youtube,
            accounts,
            notifier,
        })
    }
}
