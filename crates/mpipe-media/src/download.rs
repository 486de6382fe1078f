//! Source media download.
//!
//! `HttpFetcher` streams HTTP(S) bodies straight to disk. Copying `file://`
//! URLs is opt-in, for local runs that should stay off the network. A
//! fetcher only guarantees a complete file or an error; checking for empty
//! content is the caller's job.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use url::Url;

use crate::error::{MediaError, MediaResult};
use crate::fs_utils::remove_file_logged;

/// Retrieves a remote resource to a local path.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Download `url` to `dest` and return the local path.
    async fn fetch(&self, url: &str, dest: &Path) -> MediaResult<PathBuf>;
}

/// Fetcher for `http` and `https` URLs, and `file` URLs when enabled.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    allow_file_urls: bool,
}

impl HttpFetcher {
    /// Create a fetcher with the given connect timeout.
    pub fn new(connect_timeout: Duration) -> MediaResult<Self> {
        let client = Client::builder()
            .user_agent(concat!("mpipe/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| MediaError::download_failed(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            allow_file_urls: false,
        })
    }

    /// Accept `file://` URLs, copying from the local filesystem.
    pub fn allow_file_urls(mut self, allow: bool) -> Self {
        self.allow_file_urls = allow;
        self
    }

    async fn fetch_http(&self, url: &str, dest: &Path) -> MediaResult<u64> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| MediaError::download_failed(format!("request to {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MediaError::download_failed(format!(
                "{} returned HTTP {}",
                url, status
            )));
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut written: u64 = 0;
        let mut body = response.bytes_stream();

        while let Some(chunk) = body.next().await {
            let chunk = chunk
                .map_err(|e| MediaError::download_failed(format!("reading body of {} failed: {}", url, e)))?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }

        file.flush().await?;
        file.sync_all().await?;
        Ok(written)
    }

    async fn fetch_file(&self, source: &Path, dest: &Path) -> MediaResult<u64> {
        if !source.exists() {
            return Err(MediaError::FileNotFound(source.to_path_buf()));
        }
        Ok(tokio::fs::copy(source, dest).await?)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> MediaResult<PathBuf> {
        let parsed = Url::parse(url)
            .map_err(|e| MediaError::download_failed(format!("invalid URL {}: {}", url, e)))?;

        if parsed.scheme() == "file" && !self.allow_file_urls {
            return Err(MediaError::download_failed(format!(
                "file URLs are disabled: {}",
                url
            )));
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        debug!("Fetching {} to {}", url, dest.display());

        let result = match parsed.scheme() {
            "http" | "https" => self.fetch_http(url, dest).await,
            "file" => {
                let source = parsed
                    .to_file_path()
                    .map_err(|_| MediaError::download_failed(format!("invalid file URL {}", url)))?;
                self.fetch_file(&source, dest).await
            }
            other => Err(MediaError::download_failed(format!(
                "unsupported URL scheme '{}'",
                other
            ))),
        };

        match result {
            Ok(bytes) => {
                info!(url = url, path = %dest.display(), bytes, "Download complete");
                Ok(dest.to_path_buf())
            }
            Err(e) => {
                remove_file_logged(dest).await;
                Err(e)
            }
        }
    }
}
