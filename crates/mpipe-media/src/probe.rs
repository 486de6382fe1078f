//! FFprobe container and codec information.

use serde::Deserialize;
use std::path::Path;

use mpipe_models::CodecSummary;

use crate::command::ToolRunner;
use crate::error::{MediaError, MediaResult};

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    format_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
}

/// Probe a local media file for container and codec names.
///
/// Callers treat any error as a diagnostic only.
pub async fn probe_media(tools: &dyn ToolRunner, path: impl AsRef<Path>) -> MediaResult<CodecSummary> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    let args = [
        "-v",
        "quiet",
        "-print_format",
        "json",
        "-show_format",
        "-show_streams",
    ]
    .iter()
    .map(|s| s.to_string())
    .chain(std::iter::once(path.to_string_lossy().to_string()))
    .collect::<Vec<_>>();

    let output = tools.run_tool("ffprobe", &args).await?;

    if !output.success() {
        return Err(MediaError::FfprobeFailed {
            message: "FFprobe failed".to_string(),
            stderr: Some(output.stderr),
        });
    }

    parse_probe_output(output.stdout.as_bytes())
}

/// Parse `ffprobe -print_format json` output.
///
/// The first stream of each kind wins.
pub fn parse_probe_output(raw: &[u8]) -> MediaResult<CodecSummary> {
    let probe: FfprobeOutput = serde_json::from_slice(raw)?;

    let codec_of = |kind: &str| {
        probe
            .streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some(kind))
            .and_then(|s| s.codec_name.clone())
    };

    Ok(CodecSummary {
        format_name: probe.format.as_ref().and_then(|f| f.format_name.clone()),
        video_codec: codec_of("video"),
        audio_codec: codec_of("audio"),
    })
}
