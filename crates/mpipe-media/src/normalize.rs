//! Fast-start normalization (stream-copy remux with the index up front).
//!
//! Normalization is an optimization: when the remux fails the caller gets
//! the untouched original back as an explicit `Fallback`, never an error.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use mpipe_models::encoding::NORMALIZED_EXTENSION;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::fs_utils::{file_size, remove_file_logged};

/// Outcome of normalizing one asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizeResult {
    /// Remux succeeded; the original has been handed over (deleted).
    Normalized { path: PathBuf },
    /// Remux failed; `path` is the original input, left in place.
    Fallback { path: PathBuf, reason: String },
}

impl NormalizeResult {
    /// Path the next stage should consume.
    pub fn path(&self) -> &Path {
        match self {
            NormalizeResult::Normalized { path } | NormalizeResult::Fallback { path, .. } => path,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, NormalizeResult::Fallback { .. })
    }

    pub fn into_path(self) -> PathBuf {
        match self {
            NormalizeResult::Normalized { path } | NormalizeResult::Fallback { path, .. } => path,
        }
    }
}

/// `{input}_fixed.mp4` next to the input.
pub fn normalized_path_for(input: &Path) -> PathBuf {
    let mut name: OsString = input
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!("_fixed.{}", NORMALIZED_EXTENSION));
    input.with_file_name(name)
}

/// Remux `input` with `-c copy -movflags +faststart`.
///
/// On success the original file is deleted. On failure any partial output
/// is removed and the original is returned unchanged.
pub async fn normalize_faststart(ffmpeg: &FfmpegRunner, input: &Path) -> NormalizeResult {
    let fixed = normalized_path_for(input);

    let cmd = FfmpegCommand::new(input, &fixed).codec_copy().faststart();

    let failure = match ffmpeg.run(&cmd).await {
        Ok(_) => match file_size(&fixed).await {
            Ok(size) if size > 0 => None,
            Ok(_) => Some("remux produced an empty file".to_string()),
            Err(e) => Some(format!("remux output missing: {}", e)),
        },
        Err(e) => Some(match e.diagnostic() {
            Some(stderr) => format!("{}: {}", e, stderr),
            None => e.to_string(),
        }),
    };

    if let Some(reason) = failure {
        warn!(
            input = %input.display(),
            reason = %reason,
            "Fast-start remux failed, continuing with original"
        );
        remove_file_logged(&fixed).await;
        return NormalizeResult::Fallback {
            path: input.to_path_buf(),
            reason,
        };
    }

    if !remove_file_logged(input).await {
        warn!(
            input = %input.display(),
            "Original kept on disk after successful remux"
        );
    }

    info!(
        input = %input.display(),
        output = %fixed.display(),
        "Normalized to fast-start layout"
    );
    NormalizeResult::Normalized { path: fixed }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{ToolOutput, ToolRunner};
    use crate::error::MediaResult;
    use async_trait::async_trait;
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Writes the output path (last argument) when `succeed` is set.
    struct RemuxStub {
        succeed: bool,
    }

    #[async_trait]
    impl ToolRunner for RemuxStub {
        async fn run_tool(&self, _program: &str, args: &[String]) -> MediaResult<ToolOutput> {
            let output = args.last().unwrap();
            if self.succeed {
                tokio::fs::write(output, b"remuxed").await?;
                Ok(ToolOutput {
                    exit_code: Some(0),
                    ..Default::default()
                })
            } else {
                // Leave a partial file behind like a crashed remux would.
                tokio::fs::write(output, b"par").await?;
                Ok(ToolOutput {
                    stderr: "moov atom not found".into(),
                    exit_code: Some(1),
                    ..Default::default()
                })
            }
        }
    }

    #[test]
    fn test_normalized_path_for() {
        assert_eq!(
            normalized_path_for(Path::new("/work/job1_input_0")),
            PathBuf::from("/work/job1_input_0_fixed.mp4")
        );
    }

    #[tokio::test]
    async fn test_success_replaces_original() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("job1_input_0");
        tokio::fs::write(&input, b"original").await.unwrap();

        let ffmpeg = FfmpegRunner::new(Arc::new(RemuxStub { succeed: true }));
        let result = normalize_faststart(&ffmpeg, &input).await;

        assert!(!result.is_fallback());
        assert_eq!(result.path(), dir.path().join("job1_input_0_fixed.mp4"));
        assert!(result.path().exists());
        assert!(!input.exists());
    }

    #[tokio::test]
    async fn test_failure_falls_back_to_original() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("job1_input_0");
        tokio::fs::write(&input, b"original").await.unwrap();

        let ffmpeg = FfmpegRunner::new(Arc::new(RemuxStub { succeed: false }));
        let result = normalize_faststart(&ffmpeg, &input).await;

        match &result {
            NormalizeResult::Fallback { path, reason } => {
                assert_eq!(path, &input);
                assert!(reason.contains("moov atom not found"));
            }
            other => panic!("expected fallback, got {other:?}"),
        }
        assert!(input.exists());
        assert!(!normalized_path_for(&input).exists());
    }
}
