//! Publishing of finished artifacts.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;
use url::Url;

use crate::client::{content_type_for, S3Client};
use crate::error::{StorageError, StorageResult};
use crate::gcs::GcsPublisher;

/// Makes a local artifact durable somewhere else and returns its URL.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait ArtifactPublisher: Send + Sync {
    /// Upload `local_path` and return the URL it is reachable under.
    ///
    /// The local file is left in place; deleting it is the caller's decision.
    async fn upload(&self, local_path: &Path) -> StorageResult<String>;
}

pub(crate) fn file_name_of(path: &Path) -> StorageResult<&str> {
    path.file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| StorageError::InvalidKey(path.display().to_string()))
}

#[async_trait]
impl ArtifactPublisher for S3Client {
    async fn upload(&self, local_path: &Path) -> StorageResult<String> {
        let key = self.config().object_key(file_name_of(local_path)?);
        self.upload_file(local_path, &key, content_type_for(local_path))
            .await?;
        Ok(self.config().object_url(&key))
    }
}

/// Copies artifacts into a directory. Meant for development and tests.
#[derive(Debug, Clone)]
pub struct LocalDirPublisher {
    dir: PathBuf,
}

impl LocalDirPublisher {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl ArtifactPublisher for LocalDirPublisher {
    async fn upload(&self, local_path: &Path) -> StorageResult<String> {
        let name = file_name_of(local_path)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        let dest = self.dir.join(name);
        tokio::fs::copy(local_path, &dest).await?;

        let absolute = tokio::fs::canonicalize(&dest).await?;
        let url = Url::from_file_path(&absolute)
            .map_err(|_| StorageError::InvalidKey(absolute.display().to_string()))?;

        info!("Published {} to {}", local_path.display(), url);
        Ok(url.to_string())
    }
}

/// Which publisher to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublisherKind {
    S3,
    Gcs,
    Local,
    None,
}

impl FromStr for PublisherKind {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "s3" | "r2" => Ok(PublisherKind::S3),
            "gcs" | "gcp" => Ok(PublisherKind::Gcs),
            "local" => Ok(PublisherKind::Local),
            "" | "none" => Ok(PublisherKind::None),
            other => Err(StorageError::config_error(format!(
                "unknown PUBLISHER '{}' (expected s3, gcs, local or none)",
                other
            ))),
        }
    }
}

/// Build the publisher selected by `PUBLISHER` (`s3`, `gcs`, `local`, `none`).
///
/// Exactly one backend is used; a misconfigured one is an error, never a
/// reason to try another. `local` writes into `LOCAL_PUBLISH_DIR`. Returns
/// `None` when publishing is disabled.
pub fn publisher_from_env() -> StorageResult<Option<Arc<dyn ArtifactPublisher>>> {
    let kind: PublisherKind = std::env::var("PUBLISHER")
        .unwrap_or_default()
        .parse()?;

    let publisher: Option<Arc<dyn ArtifactPublisher>> = match kind {
        PublisherKind::S3 => Some(Arc::new(S3Client::from_env()?)),
        PublisherKind::Gcs => Some(Arc::new(GcsPublisher::from_env()?)),
        PublisherKind::Local => {
            let dir = std::env::var("LOCAL_PUBLISH_DIR")
                .map_err(|_| StorageError::config_error("LOCAL_PUBLISH_DIR not set"))?;
            Some(Arc::new(LocalDirPublisher::new(dir)))
        }
        PublisherKind::None => None,
    };

    Ok(publisher)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_publisher_kind_parse() {
        assert_eq!("S3".parse::<PublisherKind>().unwrap(), PublisherKind::S3);
        assert_eq!("local".parse::<PublisherKind>().unwrap(), PublisherKind::Local);
        assert_eq!("gcs".parse::<PublisherKind>().unwrap(), PublisherKind::Gcs);
        assert_eq!("".parse::<PublisherKind>().unwrap(), PublisherKind::None);
        assert!("azure".parse::<PublisherKind>().is_err());
    }

    #[tokio::test]
    async fn test_local_publisher_copies_and_keeps_source() {
        let work = TempDir::new().unwrap();
        let public = TempDir::new().unwrap();
        let artifact = work.path().join("job1.mp3");
        tokio::fs::write(&artifact, b"audio").await.unwrap();

        let publisher = LocalDirPublisher::new(public.path().join("out"));
        let url = publisher.upload(&artifact).await.unwrap();

        assert!(url.starts_with("file://"));
        assert!(url.ends_with("/out/job1.mp3"));
        assert!(artifact.exists());
        assert_eq!(
            tokio::fs::read(public.path().join("out/job1.mp3")).await.unwrap(),
            b"audio"
        );
    }

    #[tokio::test]
    async fn test_local_publisher_missing_source() {
        let public = TempDir::new().unwrap();
        let publisher = LocalDirPublisher::new(public.path());
        let err = publisher
            .upload(Path::new("/nonexistent/job1.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Io(_)));
    }

    #[tokio::test]
    async fn test_mock_publisher() {
        let mut mock = MockArtifactPublisher::new();
        mock.expect_upload()
            .times(1)
            .returning(|p| Ok(format!("https://cdn/{}", p.display())));

        let url = mock.upload(Path::new("a.mp4")).await.unwrap();
        assert_eq!(url, "https://cdn/a.mp4");
    }
}
