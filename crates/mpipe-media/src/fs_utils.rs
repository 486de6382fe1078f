//! Filesystem helpers for staged media files.

use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;

use crate::error::{MediaError, MediaResult};

/// Size of a file in bytes.
///
/// Returns `FileNotFound` rather than a bare IO error when the path is missing.
pub async fn file_size(path: impl AsRef<Path>) -> MediaResult<u64> {
    let path = path.as_ref();
    match fs::metadata(path).await {
        Ok(metadata) => Ok(metadata.len()),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(MediaError::FileNotFound(path.to_path_buf())),
        Err(e) => Err(MediaError::from(e)),
    }
}

/// Create a directory (and parents) if missing.
pub async fn ensure_dir(path: impl AsRef<Path>) -> MediaResult<()> {
    fs::create_dir_all(path.as_ref()).await?;
    Ok(())
}

/// Delete a file, logging instead of failing.
///
/// A file that is already gone counts as removed. Returns `false` only when
/// the file still exists after the attempt.
pub async fn remove_file_logged(path: impl AsRef<Path>) -> bool {
    let path = path.as_ref();
    match fs::remove_file(path).await {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "Removed file");
            true
        }
        Err(e) if e.kind() == ErrorKind::NotFound => true,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove file");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_file_size() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.bin");
        fs::write(&path, b"12345").await.unwrap();

        assert_eq!(file_size(&path).await.unwrap(), 5);
        assert!(matches!(
            file_size(dir.path().join("missing")).await,
            Err(MediaError::FileNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_remove_file_logged() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.bin");
        fs::write(&path, b"x").await.unwrap();

        assert!(remove_file_logged(&path).await);
        assert!(!path.exists());
        // Already gone
        assert!(remove_file_logged(&path).await);
    }

    #[tokio::test]
    async fn test_ensure_dir_nested() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");
        ensure_dir(&nested).await.unwrap();
        assert!(nested.is_dir());
    }
}
