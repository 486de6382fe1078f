//! Pipeline error types.

use thiserror::Error;

use mpipe_media::MediaError;
use mpipe_models::{JobValidationError, Stage};

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid job: {0}")]
    InvalidJob(#[from] JobValidationError),

    #[error("Fetch of source {index} failed: {message}")]
    Fetch { index: usize, message: String },

    #[error("Source {index} ({url}) downloaded as an empty file")]
    EmptyDownload { index: usize, url: String },

    #[error("Transcode failed: {message}")]
    Transcode {
        message: String,
        diagnostic: Option<String>,
    },

    #[error("Output verification failed: {0}")]
    Verification(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Job cancelled")]
    Cancelled,

    #[error("{stage} timed out after {secs}s")]
    Timeout { stage: Stage, secs: u64 },

    #[error("Internal error during {stage}: {message}")]
    Internal { stage: Stage, message: String },
}

impl PipelineError {
    pub fn fetch(index: usize, err: &MediaError) -> Self {
        Self::Fetch {
            index,
            message: err.to_string(),
        }
    }

    pub fn transcode(err: MediaError) -> Self {
        let diagnostic = err.diagnostic().map(str::to_string);
        Self::Transcode {
            message: err.to_string(),
            diagnostic,
        }
    }

    pub fn verification(msg: impl Into<String>) -> Self {
        Self::Verification(msg.into())
    }

    pub fn publish(msg: impl Into<String>) -> Self {
        Self::Publish(msg.into())
    }

    pub fn internal(stage: Stage, msg: impl Into<String>) -> Self {
        Self::Internal {
            stage,
            message: msg.into(),
        }
    }

    /// Stage the failure is attributed to.
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::InvalidJob(_) => Stage::Validate,
            PipelineError::Fetch { .. } | PipelineError::EmptyDownload { .. } => Stage::Fetch,
            PipelineError::Transcode { .. } => Stage::Transcode,
            PipelineError::Verification(_) => Stage::Verify,
            PipelineError::Publish(_) => Stage::Publish,
            PipelineError::Cancelled => Stage::Cancel,
            PipelineError::Timeout { stage, .. } | PipelineError::Internal { stage, .. } => *stage,
        }
    }

    /// Captured tool output, if the failure carries any.
    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            PipelineError::Transcode { diagnostic, .. } => diagnostic.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_mapping() {
        assert_eq!(
            PipelineError::from(JobValidationError::NoSources).stage(),
            Stage::Validate
        );
        assert_eq!(
            PipelineError::EmptyDownload {
                index: 1,
                url: "https://a/b.mp4".into()
            }
            .stage(),
            Stage::Fetch
        );
        assert_eq!(PipelineError::Cancelled.stage(), Stage::Cancel);
        assert_eq!(
            PipelineError::Timeout {
                stage: Stage::Transcode,
                secs: 5
            }
            .stage(),
            Stage::Transcode
        );
    }

    #[test]
    fn test_transcode_keeps_diagnostic() {
        let err = PipelineError::transcode(MediaError::ffmpeg_failed(
            "FFmpeg exited with status 1",
            Some("Unknown encoder 'libmp3lame'".into()),
            Some(1),
        ));
        assert_eq!(err.stage(), Stage::Transcode);
        assert_eq!(err.diagnostic(), Some("Unknown encoder 'libmp3lame'"));
    }
}
