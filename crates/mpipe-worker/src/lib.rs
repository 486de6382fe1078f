//! Media pipeline orchestrator.
//!
//! Takes a `JobRequest` (convert or combine), drives it through fetch,
//! normalize, transcode, verify and publish, and reports a `JobResult`.

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod workspace;

pub use config::PipelineConfig;
pub use error::{PipelineError, PipelineResult};
pub use logging::JobLogger;
pub use pipeline::{Pipeline, PipelineOutput};
pub use workspace::JobWorkspace;
