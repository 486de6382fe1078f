//! Encoding configuration for conversion and combination output.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Audio codec used for conversion output (MP3)
pub const DEFAULT_AUDIO_CODEC: &str = "libmp3lame";
/// Extension of conversion output
pub const DEFAULT_AUDIO_EXTENSION: &str = "mp3";
/// Default audio bitrate for conversion
pub const DEFAULT_AUDIO_BITRATE: &str = "128k";

/// Video codec used for combination output (H.264)
pub const DEFAULT_VIDEO_CODEC: &str = "libx264";
/// Audio codec used for combination output
pub const DEFAULT_COMBINE_AUDIO_CODEC: &str = "aac";
/// Extension of combination output
pub const DEFAULT_VIDEO_EXTENSION: &str = "mp4";

/// Container produced by the fast-start remux.
pub const NORMALIZED_EXTENSION: &str = "mp4";

/// Audio-only conversion settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AudioEncoding {
    /// Audio codec (e.g., "libmp3lame")
    #[serde(default = "default_audio_codec")]
    pub codec: String,

    /// Audio bitrate (e.g., "128k")
    #[serde(default = "default_audio_bitrate")]
    pub bitrate: String,

    /// Output file extension
    #[serde(default = "default_audio_extension")]
    pub extension: String,
}

fn default_audio_codec() -> String {
    DEFAULT_AUDIO_CODEC.to_string()
}
fn default_audio_bitrate() -> String {
    DEFAULT_AUDIO_BITRATE.to_string()
}
fn default_audio_extension() -> String {
    DEFAULT_AUDIO_EXTENSION.to_string()
}

impl Default for AudioEncoding {
    fn default() -> Self {
        Self {
            codec: default_audio_codec(),
            bitrate: default_audio_bitrate(),
            extension: default_audio_extension(),
        }
    }
}

impl AudioEncoding {
    /// Conversion settings with a caller-supplied bitrate.
    pub fn with_bitrate(bitrate: impl Into<String>) -> Self {
        Self {
            bitrate: bitrate.into(),
            ..Default::default()
        }
    }
}

/// Re-encode settings for combination output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct VideoEncoding {
    /// Video codec (e.g., "libx264")
    #[serde(default = "default_video_codec")]
    pub codec: String,

    /// Audio codec (e.g., "aac")
    #[serde(default = "default_combine_audio_codec")]
    pub audio_codec: String,

    /// Output file extension
    #[serde(default = "default_video_extension")]
    pub extension: String,

    /// Additional FFmpeg output arguments
    #[serde(default)]
    pub extra_args: Vec<String>,
}

fn default_video_codec() -> String {
    DEFAULT_VIDEO_CODEC.to_string()
}
fn default_combine_audio_codec() -> String {
    DEFAULT_COMBINE_AUDIO_CODEC.to_string()
}
fn default_video_extension() -> String {
    DEFAULT_VIDEO_EXTENSION.to_string()
}

impl Default for VideoEncoding {
    fn default() -> Self {
        Self {
            codec: default_video_codec(),
            audio_codec: default_combine_audio_codec(),
            extension: default_video_extension(),
            extra_args: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_defaults() {
        let enc = AudioEncoding::default();
        assert_eq!(enc.codec, "libmp3lame");
        assert_eq!(enc.bitrate, "128k");
        assert_eq!(enc.extension, "mp3");
    }

    #[test]
    fn test_partial_deserialize_fills_defaults() {
        let enc: VideoEncoding = serde_json::from_str(r#"{"codec":"libx265"}"#).unwrap();
        assert_eq!(enc.codec, "libx265");
        assert_eq!(enc.audio_codec, "aac");
        assert_eq!(enc.extension, "mp4");
        assert!(enc.extra_args.is_empty());
    }
}
