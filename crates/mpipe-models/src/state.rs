//! Per-job pipeline state machine and stage tags.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pipeline stage a failure or diagnostic is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Validate,
    Fetch,
    Probe,
    Normalize,
    Transcode,
    Verify,
    Publish,
    Cancel,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Validate => "validate",
            Stage::Fetch => "fetch",
            Stage::Probe => "probe",
            Stage::Normalize => "normalize",
            Stage::Transcode => "transcode",
            Stage::Verify => "verify",
            Stage::Publish => "publish",
            Stage::Cancel => "cancel",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of a job inside the pipeline.
///
/// Linear: `Pending -> Fetching -> Normalizing -> Transcoding -> Verifying
/// -> Publishing -> Done`. `Normalizing` and `Publishing` may be skipped.
/// `Failed` is reachable from any non-terminal state and is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    #[default]
    Pending,
    Fetching,
    Normalizing,
    Transcoding,
    Verifying,
    Publishing,
    Done,
    Failed,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Pending => "pending",
            PipelineState::Fetching => "fetching",
            PipelineState::Normalizing => "normalizing",
            PipelineState::Transcoding => "transcoding",
            PipelineState::Verifying => "verifying",
            PipelineState::Publishing => "publishing",
            PipelineState::Done => "done",
            PipelineState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }

    /// Check whether moving to `next` is a legal transition.
    pub fn can_transition_to(&self, next: PipelineState) -> bool {
        use PipelineState::*;

        if self.is_terminal() {
            return false;
        }
        if next == Failed {
            return true;
        }

        matches!(
            (*self, next),
            (Pending, Fetching)
                | (Fetching, Normalizing)
                | (Fetching, Transcoding)
                | (Normalizing, Transcoding)
                | (Transcoding, Verifying)
                | (Verifying, Publishing)
                | (Verifying, Done)
                | (Publishing, Done)
        )
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
