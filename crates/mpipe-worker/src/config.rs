//! Pipeline configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Working directory for intermediate and output files
    pub work_dir: PathBuf,
    /// Maximum sources fetched and normalized concurrently per job
    pub max_fetch_parallel: usize,
    /// Per-source download timeout
    pub fetch_timeout: Duration,
    /// Per-file probe timeout
    pub probe_timeout: Duration,
    /// Per-file fast-start remux timeout
    pub normalize_timeout: Duration,
    /// Conversion / combination timeout
    pub encode_timeout: Duration,
    /// Upload timeout
    pub publish_timeout: Duration,
    /// Keep the local artifact after a successful publish
    pub keep_published_artifacts: bool,
    /// Connect timeout for HTTP fetches
    pub connect_timeout: Duration,
    /// Accept `file://` sources (local runs only)
    pub allow_file_urls: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("/tmp/mpipe"),
            max_fetch_parallel: 2,
            fetch_timeout: Duration::from_secs(600),
            probe_timeout: Duration::from_secs(30),
            normalize_timeout: Duration::from_secs(600),
            encode_timeout: Duration::from_secs(3600), // 1 hour
            publish_timeout: Duration::from_secs(600),
            keep_published_artifacts: false,
            connect_timeout: Duration::from_secs(30),
            allow_file_urls: false,
        }
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

fn env_secs(name: &str, default: u64) -> Duration {
    Duration::from_secs(
        std::env::var(name)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(default),
    )
}

impl PipelineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            work_dir: std::env::var("MPIPE_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/tmp/mpipe")),
            max_fetch_parallel: std::env::var("MPIPE_MAX_FETCH_PARALLEL")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(2),
            fetch_timeout: env_secs("MPIPE_FETCH_TIMEOUT_SECS", 600),
            probe_timeout: env_secs("MPIPE_PROBE_TIMEOUT_SECS", 30),
            normalize_timeout: env_secs("MPIPE_NORMALIZE_TIMEOUT_SECS", 600),
            encode_timeout: env_secs("MPIPE_ENCODE_TIMEOUT_SECS", 3600),
            publish_timeout: env_secs("MPIPE_PUBLISH_TIMEOUT_SECS", 600),
            keep_published_artifacts: env_flag("MPIPE_KEEP_PUBLISHED"),
            connect_timeout: env_secs("MPIPE_CONNECT_TIMEOUT_SECS", 30),
            allow_file_urls: env_flag("MPIPE_ALLOW_FILE_URLS"),
        }
    }

    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = dir.into();
        self
    }

    pub fn with_max_fetch_parallel(mut self, limit: usize) -> Self {
        self.max_fetch_parallel = limit.max(1);
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn with_normalize_timeout(mut self, timeout: Duration) -> Self {
        self.normalize_timeout = timeout;
        self
    }

    pub fn with_encode_timeout(mut self, timeout: Duration) -> Self {
        self.encode_timeout = timeout;
        self
    }

    pub fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = timeout;
        self
    }

    pub fn with_keep_published_artifacts(mut self, keep: bool) -> Self {
        self.keep_published_artifacts = keep;
        self
    }

    pub fn with_allow_file_urls(mut self, allow: bool) -> Self {
        self.allow_file_urls = allow;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.work_dir, PathBuf::from("/tmp/mpipe"));
        assert_eq!(config.max_fetch_parallel, 2);
        assert_eq!(config.encode_timeout, Duration::from_secs(3600));
        assert!(!config.keep_published_artifacts);
        assert!(!config.allow_file_urls);
    }

    #[test]
    fn test_builders() {
        let config = PipelineConfig::default()
            .with_work_dir("/data/work")
            .with_max_fetch_parallel(0)
            .with_probe_timeout(Duration::from_secs(5))
            .with_keep_published_artifacts(true);

        assert_eq!(config.work_dir, PathBuf::from("/data/work"));
        assert_eq!(config.max_fetch_parallel, 1);
        assert_eq!(config.probe_timeout, Duration::from_secs(5));
        assert!(config.keep_published_artifacts);
    }
}
