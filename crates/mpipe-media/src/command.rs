//! FFmpeg command builder and external tool runner.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::{MediaError, MediaResult};

/// FFmpeg verbosity; only errors reach the captured stderr.
const LOG_LEVEL: &str = "error";

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Input file paths, in the order they are passed with `-i`
    inputs: Vec<PathBuf>,
    /// Output file path
    output: PathBuf,
    /// Output arguments (after the last -i)
    output_args: Vec<String>,
    /// Whether to overwrite output
    overwrite: bool,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command with a single input.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self::with_inputs([input], output)
    }

    /// Create a command over several inputs; `-i` order follows the iterator.
    pub fn with_inputs<I, P>(inputs: I, output: impl AsRef<Path>) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        Self {
            inputs: inputs.into_iter().map(|p| p.as_ref().to_path_buf()).collect(),
            output: output.as_ref().to_path_buf(),
            output_args: Vec::new(),
            overwrite: true,
        }
    }

    /// Add output arguments (after -i).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set filter complex.
    pub fn filter_complex(self, filter: impl Into<String>) -> Self {
        self.output_arg("-filter_complex").output_arg(filter)
    }

    /// Map a stream or filter label into the output.
    pub fn map(self, label: impl Into<String>) -> Self {
        self.output_arg("-map").output_arg(label)
    }

    /// Set video codec.
    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    /// Set audio codec.
    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    /// Set audio bitrate.
    pub fn audio_bitrate(self, bitrate: impl Into<String>) -> Self {
        self.output_arg("-b:a").output_arg(bitrate)
    }

    /// Drop all video streams.
    pub fn no_video(self) -> Self {
        self.output_arg("-vn")
    }

    /// Copy every stream without re-encoding.
    pub fn codec_copy(self) -> Self {
        self.output_arg("-c").output_arg("copy")
    }

    /// Move the index (moov atom) to the front of the file.
    pub fn faststart(self) -> Self {
        self.output_arg("-movflags").output_arg("+faststart")
    }

    /// Input paths in `-i` order.
    pub fn inputs(&self) -> &[PathBuf] {
        &self.inputs
    }

    /// Output path.
    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        // Overwrite flag
        if self.overwrite {
            args.push("-y".to_string());
        }

        args.push("-nostdin".to_string());

        args.push("-v".to_string());
        args.push(LOG_LEVEL.to_string());

        // Input files
        for input in &self.inputs {
            args.push("-i".to_string());
            args.push(input.to_string_lossy().to_string());
        }

        // Output args
        args.extend(self.output_args.clone());

        // Output file
        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Captured result of an external tool invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Capability to run an external program to completion.
///
/// Implementations must terminate the child process when the returned
/// future is dropped, so that timeouts and cancellation never leave an
/// encoder running.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    async fn run_tool(&self, program: &str, args: &[String]) -> MediaResult<ToolOutput>;
}

/// `ToolRunner` backed by real child processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessToolRunner;

impl ProcessToolRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ToolRunner for ProcessToolRunner {
    async fn run_tool(&self, program: &str, args: &[String]) -> MediaResult<ToolOutput> {
        let binary =
            which::which(program).map_err(|_| MediaError::ToolNotFound(program.to_string()))?;

        debug!("Running {} {}", program, args.join(" "));

        let output = Command::new(binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        Ok(ToolOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code(),
        })
    }
}

/// Runner for FFmpeg commands on top of a `ToolRunner`.
#[derive(Clone)]
pub struct FfmpegRunner {
    tools: Arc<dyn ToolRunner>,
}

impl FfmpegRunner {
    /// Create a new runner.
    pub fn new(tools: Arc<dyn ToolRunner>) -> Self {
        Self { tools }
    }

    /// Underlying tool runner (shared with ffprobe calls).
    pub fn tools(&self) -> &Arc<dyn ToolRunner> {
        &self.tools
    }

    /// Run an FFmpeg command; a non-zero exit carries the captured stderr.
    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<ToolOutput> {
        let args = cmd.build_args();
        let output = self.tools.run_tool("ffmpeg", &args).await?;

        if output.success() {
            return Ok(output);
        }

        let message = match output.exit_code {
            Some(code) => format!("FFmpeg exited with status {}", code),
            None => "FFmpeg was terminated by a signal".to_string(),
        };
        let stderr = output.stderr.trim();
        Err(MediaError::ffmpeg_failed(
            message,
            (!stderr.is_empty()).then(|| stderr.to_string()),
            output.exit_code,
        ))
    }
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::ToolNotFound("ffmpeg".to_string()))
}

/// Check if FFprobe is available.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::ToolNotFound("ffprobe".to_string()))
}
