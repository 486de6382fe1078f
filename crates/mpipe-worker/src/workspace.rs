//! Per-job file naming and cleanup ledger.
//!
//! Every path a job may create is tracked here before the step that creates
//! it runs. Cleanup removes exactly the tracked paths, so concurrent jobs
//! sharing a working directory never touch each other's files.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;

use mpipe_media::fs_utils::{ensure_dir, remove_file_logged};
use mpipe_media::MediaResult;
use mpipe_models::job::FILENAME_SEPARATOR as SEP;
use mpipe_models::JobId;

#[derive(Debug)]
pub struct JobWorkspace {
    root: PathBuf,
    job_id: JobId,
    tracked: Mutex<Vec<PathBuf>>,
}

impl JobWorkspace {
    pub fn new(root: impl Into<PathBuf>, job_id: &JobId) -> Self {
        Self {
            root: root.into(),
            job_id: job_id.clone(),
            tracked: Mutex::new(Vec::new()),
        }
    }

    /// Create the working directory if needed.
    pub async fn prepare(&self) -> MediaResult<()> {
        ensure_dir(&self.root).await
    }

    /// `{job}_input` for a single source, `{job}_input_{index}` otherwise.
    pub fn input_path(&self, index: Option<usize>) -> PathBuf {
        match index {
            Some(i) => self.root.join(format!("{}{SEP}input{SEP}{}", self.job_id, i)),
            None => self.root.join(format!("{}{SEP}input", self.job_id)),
        }
    }

    /// `{job}.{extension}`
    pub fn output_path(&self, extension: &str) -> PathBuf {
        self.root.join(format!("{}.{}", self.job_id, extension))
    }

    /// Register a path for cleanup.
    pub fn track(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        let mut tracked = self.tracked.lock().unwrap_or_else(|e| e.into_inner());
        if !tracked.contains(&path) {
            tracked.push(path);
        }
    }

    /// Stop tracking a path so cleanup leaves it in place.
    pub fn release(&self, path: &Path) {
        let mut tracked = self.tracked.lock().unwrap_or_else(|e| e.into_inner());
        tracked.retain(|p| p != path);
    }

    pub fn tracked(&self) -> Vec<PathBuf> {
        self.tracked
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Remove every tracked path. Returns a warning per path left behind.
    pub async fn cleanup(&self) -> Vec<String> {
        let paths = std::mem::take(&mut *self.tracked.lock().unwrap_or_else(|e| e.into_inner()));
        let mut warnings = Vec::new();

        for path in paths {
            if remove_file_logged(&path).await {
                debug!(path = %path.display(), "Removed intermediate file");
            } else {
                warnings.push(format!("cleanup: could not remove {}", path.display()));
            }
        }

        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_naming() {
        let ws = JobWorkspace::new("/work", &JobId::from_string("job1"));
        assert_eq!(ws.input_path(None), PathBuf::from("/work/job1_input"));
        assert_eq!(ws.input_path(Some(2)), PathBuf::from("/work/job1_input_2"));
        assert_eq!(ws.output_path("mp3"), PathBuf::from("/work/job1.mp3"));
    }

    #[tokio::test]
    async fn test_cleanup_removes_only_tracked() {
        let dir = TempDir::new().unwrap();
        let ws = JobWorkspace::new(dir.path(), &JobId::from_string("job1"));

        let mine = ws.input_path(Some(0));
        let released = ws.output_path("mp4");
        let never_created = ws.input_path(Some(1));
        let other = dir.path().join("job2_input_0");
        for p in [&mine, &released, &other] {
            tokio::fs::write(p, b"x").await.unwrap();
        }

        ws.track(&mine);
        ws.track(&mine);
        ws.track(&never_created);
        ws.track(&released);
        ws.release(&released);
        assert_eq!(ws.tracked().len(), 2);

        let warnings = ws.cleanup().await;
        assert!(warnings.is_empty());
        assert!(!mine.exists());
        assert!(released.exists());
        assert!(other.exists());
        assert!(ws.tracked().is_empty());
    }
}
