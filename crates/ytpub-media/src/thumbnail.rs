//! Thumbnail generation with a three-tier fallback.
//!
//! 1. best frame: ffmpeg `thumbnail` filter around 30% of the video
//! 2. raw frame: a single frame at a fixed timestamp
//! 3. placeholder: a generated gradient image
//!
//! [`generate_with_fallback`] never fails; it returns `None` when every tier did.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use image::{Rgb, RgbImage};
use tracing::{error, info, warn};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::probe::get_duration;

pub const THUMBNAIL_WIDTH: u32 = 1280;
pub const THUMBNAIL_HEIGHT: u32 = 720;
/// Timestamp of the raw-frame tier, in seconds.
pub const RAW_FRAME_TIMESTAMP: f64 = 5.0;
/// Relative position of the best-frame tier.
pub const BEST_FRAME_POSITION: f64 = 0.30;

/// Thumbnail tiers.
#[async_trait]
pub trait ThumbnailGenerator: Send + Sync {
    async fn best_frame(&self, video: &Path, output: &Path) -> MediaResult<()>;
    async fn raw_frame(&self, video: &Path, output: &Path) -> MediaResult<()>;
    async fn placeholder(&self, output: &Path, title: &str) -> MediaResult<()>;
}

/// Run the tiers in order and return the first thumbnail produced.
pub async fn generate_with_fallback(
    generator: &dyn ThumbnailGenerator,
    video: &Path,
    output: &Path,
    title: &str,
) -> Option<PathBuf> {
    match generator.best_frame(video, output).await {
        Ok(()) => {
            info!(thumbnail = %output.display(), "Thumbnail generated from best frame");
            return Some(output.to_path_buf());
        }
        Err(e) => info!(video = %video.display(), "Best-frame thumbnail failed, trying raw frame: {}", e),
    }

    match generator.raw_frame(video, output).await {
        Ok(()) => {
            info!(thumbnail = %output.display(), "Thumbnail generated from raw frame");
            return Some(output.to_path_buf());
        }
        Err(e) => warn!(video = %video.display(), error = %e, "Raw-frame thumbnail failed, using placeholder"),
    }

    match generator.placeholder(output, title).await {
        Ok(()) => Some(output.to_path_buf()),
        Err(e) => {
            error!(video = %video.display(), "Placeholder thumbnail failed, uploading without thumbnail: {}", e);
            None
        }
    }
}

/// Default generator backed by ffmpeg and the `image` crate.
#[derive(Debug, Clone, Default)]
pub struct FfmpegThumbnailer {
    runner: FfmpegRunner,
}

impl FfmpegThumbnailer {
    pub fn new(runner: FfmpegRunner) -> Self {
        Self { runner }
    }

    fn frame_filter() -> String {
        format!(
            "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2",
            w = THUMBNAIL_WIDTH,
            h = THUMBNAIL_HEIGHT
        )
    }

    async fn run_frame(&self, cmd: FfmpegCommand, output: &Path) -> MediaResult<()> {
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        self.runner.run(&cmd).await?;
        ensure_written(output).await
    }
}

#[async_trait]
impl ThumbnailGenerator for FfmpegThumbnailer {
    async fn best_frame(&self, video: &Path, output: &Path) -> MediaResult<()> {
        let duration = get_duration(video).await?;
        if duration <= 0.0 {
            return Err(MediaError::InvalidVideo("unknown duration".to_string()));
        }
        let cmd = FfmpegCommand::new(video, output)
            .seek(duration * BEST_FRAME_POSITION)
            .video_filter(format!("thumbnail=100,{}", Self::frame_filter()))
            .single_frame()
            .output_args(["-q:v", "2"]);
        self.run_frame(cmd, output).await
    }

    async fn raw_frame(&self, video: &Path, output: &Path) -> MediaResult<()> {
        let cmd = FfmpegCommand::new(video, output)
            .seek(RAW_FRAME_TIMESTAMP)
            .video_filter(Self::frame_filter())
            .single_frame()
            .output_args(["-q:v", "2"]);
        self.run_frame(cmd, output).await
    }

    async fn placeholder(&self, output: &Path, title: &str) -> MediaResult<()> {
        let output = output.to_path_buf();
        let seed = title_seed(title);
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::task::spawn_blocking(move || render_placeholder(seed).save(&output))
            .await
            .map_err(|e| MediaError::internal(format!("placeholder task failed: {}", e)))??;
        Ok(())
    }
}

async fn ensure_written(output: &Path) -> MediaResult<()> {
    match tokio::fs::metadata(output).await {
        Ok(meta) if meta.len() > 0 => Ok(()),
        _ => Err(MediaError::FileNotFound(output.to_path_buf())),
    }
}

fn title_seed(title: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    title.hash(&mut hasher);
    hasher.finish()
}

/// Vertical gradient whose hue depends on the seed.
fn render_placeholder(seed: u64) -> RgbImage {
    let accent = [
        (seed & 0xff) as u8 | 0x40,
        ((seed >> 8) & 0xff) as u8 | 0x40,
        ((seed >> 16) & 0xff) as u8 | 0x40,
    ];
    RgbImage::from_fn(THUMBNAIL_WIDTH, THUMBNAIL_HEIGHT, |_, y| {
        let t = y as f32 / THUMBNAIL_HEIGHT as f32;
        let mix = |c: u8| (16.0 * (1.0 - t) + c as f32 * t) as u8;
        Rgb([mix(accent[0]), mix(accent[1]), mix(accent[2])])
    })
}
