//! YouTube Data API v3 collaborators.
//!
//! Production client with:
//! - OAuth token reuse and refresh
//! - Resumable upload with retry, backoff and jitter
//! - Quota-exceeded detection
//! - Captions, playlists and multi-account balancing

pub mod accounts;
pub mod captions;
pub mod client;
pub mod credentials;
pub mod error;
pub mod playlists;
pub mod uploader;

pub use accounts::{AccountPool, AccountStatus, MultiAccountManager, QuotaUsage, YoutubeAccount, UPLOAD_API_COST};
pub use captions::{normalize_caption_language, upload_captions_smart, CaptionOutcome, CaptionService, CaptionTrack};
pub use client::{YoutubeClient, YoutubeConfig};
pub use credentials::{CredentialProvider, Credentials, OAuthCredentialProvider, YOUTUBE_SCOPES};
pub use error::{YoutubeError, YoutubeResult};
pub use playlists::PlaylistService;
pub use uploader::{
    ensure_future_publish_at, sanitize_language, sanitize_tags, to_rfc3339_utc, UploadRequest, UploadResponse,
    UploadRetryConfig, Uploader,
};
