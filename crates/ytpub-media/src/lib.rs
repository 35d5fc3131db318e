//! Media tooling for the upload pipeline.
//!
//! Thin async wrappers over external CLIs:
//! - `ffmpeg` for enhancement and frame extraction
//! - `ffprobe` for duration and audio language
//! - `whisper` for subtitle generation
//!
//! Each concern is exposed behind a trait so the worker can inject fakes.

pub mod command;
pub mod enhance;
pub mod error;
pub mod probe;
pub mod progress;
pub mod subtitles;
pub mod thumbnail;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use enhance::{build_enhance_command, Enhancer, FfmpegEnhancer};
pub use error::{EnhanceError, MediaError, MediaResult};
pub use probe::{get_duration, probe_audio_language, probe_video, VideoInfo};
pub use progress::FfmpegProgress;
pub use subtitles::{plan_subtitles, SubtitleGenerator, SubtitleJob, SubtitleMode, SubtitlePlan, WhisperCli};
pub use thumbnail::{generate_with_fallback, FfmpegThumbnailer, ThumbnailGenerator};
