//! Job submissions consumed by the pipeline.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;
use url::Url;
use uuid::Uuid;

use crate::encoding::DEFAULT_AUDIO_BITRATE;

/// Maximum length of a caller-supplied job ID.
pub const MAX_JOB_ID_LEN: usize = 128;

/// URL schemes a source may use.
pub const ALLOWED_SOURCE_SCHEMES: &[&str] = &["http", "https", "file"];

/// Scheme for local sources, only accepted when explicitly enabled.
pub const FILE_SCHEME: &str = "file";

/// Separator between the job ID and the rest of a temporary filename.
pub const FILENAME_SEPARATOR: char = '_';

/// Unique identifier for a job.
///
/// Used verbatim in every temporary filename the job creates, so it is
/// restricted to `[A-Za-z0-9-]`. Excluding `_` keeps the ID an unambiguous
/// prefix: no job can name a file another job owns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check that the ID is safe to embed in a filename.
    pub fn validate(&self) -> Result<(), JobValidationError> {
        if self.0.is_empty() {
            return Err(JobValidationError::EmptyJobId);
        }
        if self.0.len() > MAX_JOB_ID_LEN {
            return Err(JobValidationError::JobIdTooLong(self.0.len()));
        }
        if !self
            .0
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Err(JobValidationError::InvalidJobId(self.0.clone()));
        }
        Ok(())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of work a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobMode {
    /// Single input, audio extraction at a target bitrate
    Convert,
    /// One or more inputs concatenated in order and re-encoded
    Combine,
}

impl JobMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobMode::Convert => "convert",
            JobMode::Combine => "combine",
        }
    }
}

impl fmt::Display for JobMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A remote media URL and its position in the output timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SourceDescriptor {
    /// Remote URL of the media
    pub url: String,
    /// Ordinal position (ascending = earlier in the output)
    pub order: u32,
}

impl SourceDescriptor {
    pub fn new(url: impl Into<String>, order: u32) -> Self {
        Self {
            url: url.into(),
            order,
        }
    }
}

/// A job as submitted by the caller layer.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobRequest {
    /// Caller-supplied job ID (namespaces all files)
    pub job_id: JobId,

    /// Conversion or combination
    pub mode: JobMode,

    /// Target bitrate for conversion (e.g., "128k")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<String>,

    /// Sources in submission order (not necessarily output order)
    pub sources: Vec<SourceDescriptor>,
}

impl JobRequest {
    /// Create a conversion job for a single source.
    pub fn convert(job_id: impl Into<String>, url: impl Into<String>, bitrate: Option<String>) -> Self {
        Self {
            job_id: JobId::from_string(job_id),
            mode: JobMode::Convert,
            bitrate,
            sources: vec![SourceDescriptor::new(url, 0)],
        }
    }

    /// Create a combination job.
    pub fn combine(job_id: impl Into<String>, sources: Vec<SourceDescriptor>) -> Self {
        Self {
            job_id: JobId::from_string(job_id),
            mode: JobMode::Combine,
            bitrate: None,
            sources,
        }
    }

    /// Bitrate to use for conversion, falling back to the default.
    pub fn effective_bitrate(&self) -> &str {
        self.bitrate.as_deref().unwrap_or(DEFAULT_AUDIO_BITRATE)
    }

    /// Sources sorted by their declared `order`.
    ///
    /// The index in the returned vector is the source index used in
    /// temporary filenames.
    pub fn ordered_sources(&self) -> Vec<SourceDescriptor> {
        let mut sources = self.sources.clone();
        sources.sort_by_key(|s| s.order);
        sources
    }

    /// Validate the request.
    ///
    /// Checks:
    /// - Job ID is filename-safe
    /// - Source count matches the mode
    /// - Order values are unique
    /// - Every URL parses and uses an allowed scheme (`file` is rejected)
    /// - Bitrate (if given) looks like `128k` / `1M` / `96000`
    pub fn validate(&self) -> Result<(), JobValidationError> {
        self.validate_with_file_urls(false)
    }

    /// Same as [`validate`](Self::validate), optionally accepting `file://`
    /// sources.
    pub fn validate_with_file_urls(&self, allow_file_urls: bool) -> Result<(), JobValidationError> {
        self.job_id.validate()?;

        match self.mode {
            JobMode::Convert if self.sources.len() != 1 => {
                return Err(JobValidationError::ConvertSourceCount(self.sources.len()));
            }
            JobMode::Combine if self.sources.is_empty() => {
                return Err(JobValidationError::NoSources);
            }
            _ => {}
        }

        let mut seen = HashSet::new();
        for source in &self.sources {
            if !seen.insert(source.order) {
                return Err(JobValidationError::DuplicateOrder(source.order));
            }
            validate_source_url(&source.url, allow_file_urls)?;
        }

        if let Some(bitrate) = &self.bitrate {
            validate_bitrate(bitrate)?;
        }

        Ok(())
    }
}

fn validate_source_url(raw: &str, allow_file_urls: bool) -> Result<(), JobValidationError> {
    let parsed =
        Url::parse(raw).map_err(|e| JobValidationError::InvalidUrl(raw.to_string(), e.to_string()))?;
    if !ALLOWED_SOURCE_SCHEMES.contains(&parsed.scheme()) {
        return Err(JobValidationError::UnsupportedScheme(parsed.scheme().to_string()));
    }
    if parsed.scheme() == FILE_SCHEME && !allow_file_urls {
        return Err(JobValidationError::FileUrlsDisabled(raw.to_string()));
    }
    Ok(())
}

/// Validate a bitrate string such as `128k`, `1M` or `96000`.
pub fn validate_bitrate(bitrate: &str) -> Result<(), JobValidationError> {
    let digits = bitrate
        .strip_suffix(['k', 'K', 'm', 'M'])
        .unwrap_or(bitrate);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) || digits.starts_with('0') {
        return Err(JobValidationError::InvalidBitrate(bitrate.to_string()));
    }
    Ok(())
}

/// Job request validation error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobValidationError {
    #[error("Job ID cannot be empty")]
    EmptyJobId,

    #[error("Job ID is {0} characters long (max 128)")]
    JobIdTooLong(usize),

    #[error("Job ID '{0}' may only contain letters, digits and '-'")]
    InvalidJobId(String),

    #[error("Convert jobs take exactly one source, got {0}")]
    ConvertSourceCount(usize),

    #[error("Combine jobs need at least one source")]
    NoSources,

    #[error("Source order {0} is used more than once")]
    DuplicateOrder(u32),

    #[error("Invalid source URL '{0}': {1}")]
    InvalidUrl(String, String),

    #[error("Unsupported URL scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("Local file source '{0}' rejected: file URLs are disabled")]
    FileUrlsDisabled(String),

    #[error("Invalid bitrate '{0}'")]
    InvalidBitrate(String),
}
