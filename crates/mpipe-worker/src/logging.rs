//! Structured job logging.

use tracing::{error, info, warn, Span};

use mpipe_models::{JobId, JobMode};

/// Logs job lifecycle events with the job ID and mode attached.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    operation: String,
}

impl JobLogger {
    pub fn new(job_id: &JobId, mode: JobMode) -> Self {
        Self {
            job_id: job_id.to_string(),
            operation: mode.as_str().to_string(),
        }
    }

    pub fn from_string(job_id: &str, operation: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            operation: operation.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job completed: {}", message
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Span the whole job runs inside.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            operation = %self.operation
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_logger_creation() {
        let job_id = JobId::from_string("job-42");
        let logger = JobLogger::new(&job_id, JobMode::Combine);

        assert_eq!(logger.job_id(), "job-42");
        assert_eq!(logger.operation(), "combine");
    }

    #[test]
    fn test_job_logger_from_string() {
        let logger = JobLogger::from_string("job-7", "convert");
        assert_eq!(logger.job_id(), "job-7");
        assert_eq!(logger.operation(), "convert");
    }
}
