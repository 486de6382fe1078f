//! Shared data models for the media pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Job submissions (convert / combine) and their sources
//! - Job results, failures and per-source reports
//! - The per-job pipeline state machine
//! - Encoding defaults for conversion and combination

pub mod encoding;
pub mod job;
pub mod result;
pub mod state;

// Re-export common types
pub use encoding::{AudioEncoding, VideoEncoding};
pub use job::{JobId, JobMode, JobRequest, JobValidationError, SourceDescriptor};
pub use result::{CodecSummary, JobFailure, JobResult, JobStatus, SourceReport};
pub use state::{PipelineState, Stage};
