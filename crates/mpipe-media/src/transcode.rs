//! Audio conversion and order-preserving concatenation.
//!
//! Concatenation always goes through the `concat` filter with a full
//! re-encode. Inputs come from arbitrary sources and their codec parameters
//! are not guaranteed to match, so the concat demuxer with stream copy is
//! not an option.

use std::path::{Path, PathBuf};
use tracing::info;

use mpipe_models::{AudioEncoding, VideoEncoding};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// How a combination was carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombinePlan {
    /// Single input re-encoded straight into the output container
    Direct,
    /// `segments` inputs joined with the concat filter
    Concat { segments: usize },
}

/// Re-encode the audio of `input` into an audio-only file.
pub async fn convert_audio(
    ffmpeg: &FfmpegRunner,
    input: &Path,
    output: &Path,
    encoding: &AudioEncoding,
) -> MediaResult<()> {
    info!(
        "Converting {} -> {} ({} @ {})",
        input.display(),
        output.display(),
        encoding.codec,
        encoding.bitrate
    );

    ffmpeg.run(&build_convert_command(input, output, encoding)).await?;
    Ok(())
}

/// Concatenate `inputs` in the given order into `output`.
pub async fn combine_videos(
    ffmpeg: &FfmpegRunner,
    inputs: &[PathBuf],
    output: &Path,
    encoding: &VideoEncoding,
) -> MediaResult<CombinePlan> {
    let (cmd, plan) = build_combine_command(inputs, output, encoding)?;

    info!(
        "Combining {} input(s) -> {} ({:?})",
        inputs.len(),
        output.display(),
        plan
    );

    ffmpeg.run(&cmd).await?;
    Ok(plan)
}

/// FFmpeg invocation for audio extraction.
pub fn build_convert_command(input: &Path, output: &Path, encoding: &AudioEncoding) -> FfmpegCommand {
    FfmpegCommand::new(input, output)
        .no_video()
        .audio_codec(&encoding.codec)
        .audio_bitrate(&encoding.bitrate)
}

/// FFmpeg invocation for combination, plus the plan it implements.
pub fn build_combine_command(
    inputs: &[PathBuf],
    output: &Path,
    encoding: &VideoEncoding,
) -> MediaResult<(FfmpegCommand, CombinePlan)> {
    let (cmd, plan) = match inputs.len() {
        0 => {
            return Err(MediaError::InvalidInput(
                "combination needs at least one input".to_string(),
            ))
        }
        1 => (FfmpegCommand::new(&inputs[0], output), CombinePlan::Direct),
        n => (
            FfmpegCommand::with_inputs(inputs, output)
                .filter_complex(concat_filter(n))
                .map("[outv]")
                .map("[outa]"),
            CombinePlan::Concat { segments: n },
        ),
    };

    let cmd = cmd
        .video_codec(&encoding.codec)
        .audio_codec(&encoding.audio_codec)
        .output_args(encoding.extra_args.iter().cloned());

    Ok((cmd, plan))
}

/// `[0:v][0:a][1:v][1:a]...concat=n=N:v=1:a=1[outv][outa]`
pub fn concat_filter(segments: usize) -> String {
    let mut filter: String = (0..segments).map(|i| format!("[{i}:v][{i}:a]")).collect();
    filter.push_str(&format!("concat=n={segments}:v=1:a=1[outv][outa]"));
    filter
}
