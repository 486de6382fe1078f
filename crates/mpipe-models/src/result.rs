//! Job results returned to the caller layer.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::job::JobId;
use crate::state::Stage;

/// Final status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Done,
    Failed,
}

/// Best-effort codec metadata from probing a local asset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CodecSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_codec: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_codec: Option<String>,
}

/// What happened to one source on its way to the transcoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SourceReport {
    /// Position in the output timeline
    pub index: usize,
    /// Declared order from the submission
    pub order: u32,
    pub url: String,
    /// Size of the downloaded file
    pub size_bytes: u64,
    /// Whether the fast-start remux succeeded (false = original was used)
    pub normalized: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probe: Option<CodecSummary>,
}

/// Why a job failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct JobFailure {
    pub stage: Stage,
    pub message: String,
    /// Raw diagnostic output of the external tool, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    pub job_id: JobId,
    pub status: JobStatus,

    /// Local artifact (present while it is still on disk)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobFailure>,

    /// Non-fatal problems (probe failures, normalization fallbacks, cleanup warnings)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<SourceReport>,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl JobResult {
    pub fn is_done(&self) -> bool {
        self.status == JobStatus::Done
    }

    /// Stage tag of the failure, if the job failed.
    pub fn failed_stage(&self) -> Option<Stage> {
        self.error.as_ref().map(|e| e.stage)
    }
}
