//! Video enhancement through ffmpeg.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};
use ytpub_models::{Codec, EnhanceSettings, HwAccel};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::EnhanceError;
use crate::probe::get_duration;

const X264_PRESETS: &[&str] = &[
    "ultrafast", "superfast", "veryfast", "faster", "fast", "medium", "slow", "slower", "veryslow",
];

/// Enhancement collaborator.
#[async_trait]
pub trait Enhancer: Send + Sync {
    /// Enhance `input` into `output` and return the written path.
    async fn enhance(&self, input: &Path, output: &Path, settings: &EnhanceSettings) -> Result<PathBuf, EnhanceError>;
}

/// Default enhancer spawning ffmpeg.
#[derive(Debug, Clone, Default)]
pub struct FfmpegEnhancer {
    runner: FfmpegRunner,
}

impl FfmpegEnhancer {
    pub fn new(runner: FfmpegRunner) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl Enhancer for FfmpegEnhancer {
    async fn enhance(&self, input: &Path, output: &Path, settings: &EnhanceSettings) -> Result<PathBuf, EnhanceError> {
        if !input.exists() {
            return Err(EnhanceError::InputNotFound(input.to_path_buf()));
        }
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(crate::error::MediaError::from)?;
        }

        let cmd = build_enhance_command(input, output, settings)?;
        let total_ms = get_duration(input).await.map(|d| (d * 1000.0) as i64).unwrap_or(0);
        let last_bucket = Arc::new(AtomicU8::new(0));
        let file = input.display().to_string();

        info!(input = %file, output = %output.display(), crf = settings.crf, "Enhancing video");
        self.runner
            .run_with_progress(&cmd, move |p| {
                let bucket = (p.percentage(total_ms) / 10.0) as u8;
                if bucket > last_bucket.swap(bucket, Ordering::Relaxed) {
                    info!(input = %file, "Enhance progress: {}%", bucket * 10);
                }
            })
            .await?;

        Ok(output.to_path_buf())
    }
}

/// Translate resolved settings into an ffmpeg invocation.
pub fn build_enhance_command(input: &Path, output: &Path, s: &EnhanceSettings) -> Result<FfmpegCommand, EnhanceError> {
    let mut filters: Vec<String> = Vec::new();

    if s.deinterlace {
        filters.push("yadif=1".to_string());
    }
    if let Some(expr) = parse_scale(s.scale.as_deref())? {
        filters.push(format!("scale={}", expr));
    }
    if s.denoise {
        filters.push("hqdn3d=1.5:1.5:6:6".to_string());
    }
    if s.deband {
        filters.push("gradfun=20:30".to_string());
    }
    if s.deblock {
        filters.push("deblock=alpha=0.5:beta=0.5".to_string());
    }
    if s.sharpen || s.sharpen_amount.is_some() {
        let amount = s.sharpen_amount.map(|a| (a * 1.5).clamp(0.0, 1.5)).unwrap_or(0.8);
        filters.push(format!("unsharp=5:5:{}:5:5:0.0", amount));
    }
    if s.contrast.is_some() || s.saturation.is_some() {
        filters.push(format!(
            "eq=contrast={}:saturation={}",
            s.contrast.unwrap_or(1.0),
            s.saturation.unwrap_or(1.0)
        ));
    } else if s.color_fix {
        filters.push("eq=contrast=1.05:saturation=1.10".to_string());
    }
    if let Some(fps) = s.fps.filter(|f| *f > 0.0) {
        filters.push(format!("fps={}", fps));
    }

    let mut cmd = FfmpegCommand::new(input, output).log_level("info");
    if !filters.is_empty() {
        cmd = cmd.video_filter(filters.join(","));
    }

    let preset = if X264_PRESETS.contains(&s.preset.as_str()) {
        s.preset.as_str()
    } else {
        "medium"
    };
    let target_height = infer_target_height(s.scale.as_deref());

    cmd = match (s.codec, s.hwaccel) {
        (Codec::H264, HwAccel::Videotoolbox) => {
            let br = s
                .bitrate
                .clone()
                .unwrap_or_else(|| default_bitrate_for_height(target_height, Codec::H264).to_string());
            cmd.video_codec("h264_videotoolbox").video_bitrate(br)
        }
        (Codec::H264, _) => {
            let cmd = cmd.video_codec("libx264").preset(preset);
            match &s.bitrate {
                Some(br) => cmd
                    .video_bitrate(br.clone())
                    .output_args(["-maxrate", br.as_str(), "-bufsize", "2M"]),
                None => cmd.crf(s.crf),
            }
        }
        (Codec::Hevc, HwAccel::Videotoolbox) => {
            let br = s
                .bitrate
                .clone()
                .unwrap_or_else(|| default_bitrate_for_height(target_height, Codec::Hevc).to_string());
            cmd.video_codec("hevc_videotoolbox")
                .video_bitrate(br)
                .output_args(["-tag:v", "hvc1"])
        }
        (Codec::Hevc, _) => {
            let cmd = cmd.video_codec("libx265").preset(preset);
            let cmd = match &s.bitrate {
                Some(br) => cmd.video_bitrate(br.clone()),
                None => cmd.crf(s.crf),
            };
            cmd.output_args(["-tag:v", "hvc1"])
        }
        (Codec::Vp9, _) | (Codec::Av1, _) => {
            let encoder = if s.codec == Codec::Vp9 { "libvpx-vp9" } else { "libaom-av1" };
            let mut cmd = cmd.video_codec(encoder);
            if s.codec == Codec::Vp9 {
                cmd = cmd.output_args(["-row-mt", "1"]);
            }
            cmd = cmd.output_args(["-cpu-used".to_string(), cpu_used_for(preset).to_string()]);
            match &s.bitrate {
                Some(br) => cmd.video_bitrate(br.clone()),
                None => cmd.crf(s.crf).video_bitrate("0"),
            }
        }
    };

    cmd = cmd.output_args(["-pix_fmt", "yuv420p"]);

    if s.loudnorm {
        cmd = cmd.audio_filter("loudnorm=I=-23:TP=-2:LRA=7");
    }
    cmd = if s.reencode_audio || s.loudnorm {
        cmd.audio_codec("aac").audio_bitrate(s.audio_bitrate.clone())
    } else {
        cmd.audio_codec("copy")
    };

    let cmd = cmd.output_args(["-movflags", "+faststart"]);
    debug!(args = ?cmd.build_args(), "Built enhance command");
    Ok(cmd)
}

/// Convert `1080p`, `1920x1080` or `1.5x` into a `scale=` filter expression.
fn parse_scale(scale: Option<&str>) -> Result<Option<String>, EnhanceError> {
    let Some(raw) = scale else {
        return Ok(None);
    };
    let s = raw.trim().to_lowercase();
    if s.is_empty() {
        return Ok(None);
    }
    if let Some(h) = s.strip_suffix('p').and_then(|h| h.parse::<u32>().ok()) {
        return Ok(Some(format!("-2:{}:flags=lanczos", h)));
    }
    if let Some((w, h)) = s.split_once('x') {
        if let (Ok(w), Ok(h)) = (w.parse::<u32>(), h.parse::<u32>()) {
            return Ok(Some(format!("{}:{}:flags=lanczos", w, h)));
        }
    }
    if let Some(factor) = s.strip_suffix('x').and_then(|f| f.parse::<f64>().ok()) {
        return Ok(Some(format!("iw*{}:ih*{}:flags=lanczos", factor, factor)));
    }
    Err(EnhanceError::InvalidScale(raw.to_string()))
}

fn infer_target_height(scale: Option<&str>) -> Option<u32> {
    let s = scale?.trim().to_lowercase();
    if let Some(h) = s.strip_suffix('p').and_then(|h| h.parse().ok()) {
        return Some(h);
    }
    s.split_once('x').and_then(|(_, h)| h.parse().ok())
}

/// Hardware encoders take a bitrate instead of a CRF.
fn default_bitrate_for_height(height: Option<u32>, codec: Codec) -> &'static str {
    let hevc = codec == Codec::Hevc;
    match height {
        None => if hevc { "3M" } else { "4M" },
        Some(h) if h <= 720 => if hevc { "3M" } else { "4M" },
        Some(h) if h <= 1080 => if hevc { "6M" } else { "8M" },
        Some(h) if h <= 1440 => if hevc { "10M" } else { "12M" },
        Some(_) => if hevc { "16M" } else { "20M" },
    }
}

fn cpu_used_for(preset: &str) -> u8 {
    X264_PRESETS
        .iter()
        .position(|p| *p == preset)
        .map(|i| 8 - i as u8)
        .unwrap_or(3)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ytpub_models::{EnhanceOverrides, QualityPreset};

    fn args_for(settings: &EnhanceSettings) -> Vec<String> {
        build_enhance_command(Path::new("in.mp4"), Path::new("out.mp4"), settings)
            .unwrap()
            .build_args()
    }

    #[test]
    fn test_default_settings_use_libx264_crf() {
        let args = args_for(&EnhanceSettings::default());
        let joined = args.join(" ");
        assert!(joined.contains("-c:v libx264 -preset medium"));
        assert!(joined.contains("-crf 18"));
        assert!(joined.contains("-c:a copy"));
        assert!(!joined.contains("-vf"));
    }

    #[test]
    fn test_youtube_preset_filters() {
        let s = EnhanceSettings::resolve(&EnhanceOverrides::default(), &EnhanceOverrides::default(), Some(QualityPreset::Youtube));
        let args = args_for(&s);
        let vf = &args[args.iter().position(|a| a == "-vf").unwrap() + 1];
        assert!(vf.starts_with("scale=-2:1080:flags=lanczos"));
        assert!(vf.contains("unsharp"));
        assert!(vf.contains("eq=contrast=1.05"));
        assert!(!vf.contains("hqdn3d"));
    }

    #[test]
    fn test_loudnorm_forces_audio_reencode() {
        let s = EnhanceSettings {
            loudnorm: true,
            ..Default::default()
        };
        let joined = args_for(&s).join(" ");
        assert!(joined.contains("-af loudnorm"));
        assert!(joined.contains("-c:a aac -b:a 192k"));
    }

    #[test]
    fn test_videotoolbox_uses_bitrate() {
        let s = EnhanceSettings {
            hwaccel: HwAccel::Videotoolbox,
            scale: Some("1440p".into()),
            ..Default::default()
        };
        let joined = args_for(&s).join(" ");
        assert!(joined.contains("h264_videotoolbox -b:v 12M"));
        assert!(!joined.contains("-crf"));
    }

    #[test]
    fn test_scale_parsing() {
        assert_eq!(parse_scale(Some("1920x1080")).unwrap().unwrap(), "1920:1080:flags=lanczos");
        assert_eq!(parse_scale(Some("2x")).unwrap().unwrap(), "iw*2:ih*2:flags=lanczos");
        assert!(parse_scale(None).unwrap().is_none());
        assert!(matches!(parse_scale(Some("huge")), Err(EnhanceError::InvalidScale(_))));
    }

    #[tokio::test]
    async fn test_missing_input_is_enhance_error() {
        let err = FfmpegEnhancer::default()
            .enhance(Path::new("/nonexistent/in.mp4"), Path::new("/tmp/out.mp4"), &EnhanceSettings::default())
            .await
            .unwrap_err();
        assert!(matches!(err, EnhanceError::InputNotFound(_)));
    }
}
