//! Enhancement settings and quality presets.
//!
//! Settings are resolved per field with the precedence
//! task override > config override > quality preset > built-in default.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Default CRF when neither a preset nor an override sets one.
pub const DEFAULT_CRF: u8 = 18;
/// Default x264 preset.
pub const DEFAULT_PRESET: &str = "medium";
/// Default AAC bitrate when audio is re-encoded.
pub const DEFAULT_AUDIO_BITRATE: &str = "192k";

/// Named quality preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum QualityPreset {
    Low,
    Medium,
    High,
    Youtube,
    Max,
}

impl QualityPreset {
    pub const ALL: [QualityPreset; 5] = [
        QualityPreset::Low,
        QualityPreset::Medium,
        QualityPreset::High,
        QualityPreset::Youtube,
        QualityPreset::Max,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QualityPreset::Low => "low",
            QualityPreset::Medium => "medium",
            QualityPreset::High => "high",
            QualityPreset::Youtube => "youtube",
            QualityPreset::Max => "max",
        }
    }

    /// Values this preset contributes. Unset fields fall through to defaults.
    pub fn defaults(&self) -> EnhanceOverrides {
        let base = EnhanceOverrides {
            denoise: Some(true),
            sharpen: Some(true),
            color_fix: Some(true),
            preset: Some("slow".to_string()),
            ..Default::default()
        };
        match self {
            QualityPreset::Low => EnhanceOverrides {
                crf: Some(23),
                preset: Some("fast".to_string()),
                sharpen: Some(false),
                ..base
            },
            QualityPreset::Medium => EnhanceOverrides {
                scale: Some("1080p".to_string()),
                crf: Some(20),
                preset: Some("medium".to_string()),
                ..base
            },
            QualityPreset::High => EnhanceOverrides {
                scale: Some("1440p".to_string()),
                crf: Some(18),
                ..base
            },
            QualityPreset::Youtube => EnhanceOverrides {
                scale: Some("1080p".to_string()),
                crf: Some(18),
                denoise: Some(false),
                ..base
            },
            QualityPreset::Max => EnhanceOverrides {
                scale: Some("2160p".to_string()),
                crf: Some(17),
                ..base
            },
        }
    }
}

impl FromStr for QualityPreset {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        QualityPreset::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ModelError::invalid_value("quality", s))
    }
}

impl fmt::Display for QualityPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output video codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum Codec {
    #[default]
    H264,
    Hevc,
    Vp9,
    Av1,
}

/// Hardware acceleration backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum HwAccel {
    #[default]
    None,
    Auto,
    Videotoolbox,
}

/// Partial enhancement settings, as written in a task or the config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EnhanceOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codec: Option<Codec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hwaccel: Option<HwAccel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fps: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub denoise: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sharpen: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deinterlace: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_fix: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deband: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deblock: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sharpen_amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contrast: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saturation: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crf: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reencode_audio: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loudnorm: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_bitrate: Option<String>,
}

/// Fully resolved enhancement settings handed to the enhancer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EnhanceSettings {
    pub codec: Codec,
    pub hwaccel: HwAccel,
    pub scale: Option<String>,
    pub fps: Option<f64>,
    pub denoise: bool,
    pub sharpen: bool,
    pub deinterlace: bool,
    pub color_fix: bool,
    pub deband: bool,
    pub deblock: bool,
    pub sharpen_amount: Option<f64>,
    pub contrast: Option<f64>,
    pub saturation: Option<f64>,
    pub crf: u8,
    pub bitrate: Option<String>,
    pub preset: String,
    pub reencode_audio: bool,
    pub loudnorm: bool,
    pub audio_bitrate: String,
}

impl Default for EnhanceSettings {
    fn default() -> Self {
        Self {
            codec: Codec::H264,
            hwaccel: HwAccel::None,
            scale: None,
            fps: None,
            denoise: false,
            sharpen: false,
            deinterlace: false,
            color_fix: false,
            deband: false,
            deblock: false,
            sharpen_amount: None,
            contrast: None,
            saturation: None,
            crf: DEFAULT_CRF,
            bitrate: None,
            preset: DEFAULT_PRESET.to_string(),
            reencode_audio: false,
            loudnorm: false,
            audio_bitrate: DEFAULT_AUDIO_BITRATE.to_string(),
        }
    }
}

/// Pick the first set value in precedence order: task, config, preset.
pub fn resolve<T>(task: Option<T>, config: Option<T>, preset: T) -> T {
    task.or(config).unwrap_or(preset)
}

fn resolve_opt<T>(task: Option<T>, config: Option<T>, preset: Option<T>) -> Option<T> {
    task.or(config).or(preset)
}

impl EnhanceSettings {
    /// Layer task and config overrides over the preset and the defaults.
    pub fn resolve(task: &EnhanceOverrides, config: &EnhanceOverrides, preset: Option<QualityPreset>) -> Self {
        let p = preset.map(|q| q.defaults()).unwrap_or_default();
        let d = EnhanceSettings::default();
        let t = task.clone();
        let c = config.clone();

        Self {
            codec: resolve(t.codec, c.codec, p.codec.unwrap_or(d.codec)),
            hwaccel: resolve(t.hwaccel, c.hwaccel, p.hwaccel.unwrap_or(d.hwaccel)),
            scale: resolve_opt(t.scale, c.scale, p.scale),
            fps: resolve_opt(t.fps, c.fps, p.fps),
            denoise: resolve(t.denoise, c.denoise, p.denoise.unwrap_or(d.denoise)),
            sharpen: resolve(t.sharpen, c.sharpen, p.sharpen.unwrap_or(d.sharpen)),
            deinterlace: resolve(t.deinterlace, c.deinterlace, p.deinterlace.unwrap_or(d.deinterlace)),
            color_fix: resolve(t.color_fix, c.color_fix, p.color_fix.unwrap_or(d.color_fix)),
            deband: resolve(t.deband, c.deband, p.deband.unwrap_or(d.deband)),
            deblock: resolve(t.deblock, c.deblock, p.deblock.unwrap_or(d.deblock)),
            sharpen_amount: resolve_opt(t.sharpen_amount, c.sharpen_amount, p.sharpen_amount),
            contrast: resolve_opt(t.contrast, c.contrast, p.contrast),
            saturation: resolve_opt(t.saturation, c.saturation, p.saturation),
            crf: resolve(t.crf, c.crf, p.crf.unwrap_or(d.crf)),
            bitrate: resolve_opt(t.bitrate, c.bitrate, p.bitrate),
            preset: resolve(t.preset, c.preset, p.preset.unwrap_or(d.preset)),
            reencode_audio: resolve(t.reencode_audio, c.reencode_audio, p.reencode_audio.unwrap_or(d.reencode_audio)),
            loudnorm: resolve(t.loudnorm, c.loudnorm, p.loudnorm.unwrap_or(d.loudnorm)),
            audio_bitrate: resolve(t.audio_bitrate, c.audio_bitrate, p.audio_bitrate.unwrap_or(d.audio_bitrate)),
        }
    }
}
