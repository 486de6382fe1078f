//! Google Cloud Storage publisher over the JSON API.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gcp_auth::{CustomServiceAccount, TokenProvider};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Body, Client};
use tracing::{debug, info};

use crate::client::content_type_for;
use crate::error::{StorageError, StorageResult};
use crate::publisher::{file_name_of, ArtifactPublisher};

/// OAuth scope for object uploads.
pub const GCS_SCOPE: &str = "https://www.googleapis.com/auth/devstorage.read_write";

const DEFAULT_API_BASE: &str = "https://storage.googleapis.com";

/// Configuration for the GCS publisher.
#[derive(Debug, Clone)]
pub struct GcsConfig {
    pub bucket_name: String,
    /// Service account JSON; `GOOGLE_APPLICATION_CREDENTIALS` is used when absent
    pub credentials_json: Option<String>,
    /// Public base URL objects are served from (CDN or bucket domain)
    pub public_base_url: Option<String>,
    /// Prefix prepended to every object key
    pub key_prefix: String,
    /// JSON API host, overridable for emulators
    pub api_base: String,
}

impl GcsConfig {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Create config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> StorageResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |name: &str| lookup(name).filter(|v| !v.is_empty());

        Ok(Self {
            bucket_name: optional("GCP_BUCKET_NAME")
                .ok_or_else(|| StorageError::config_error("GCP_BUCKET_NAME not set"))?,
            credentials_json: optional("GCP_SA_CREDENTIALS"),
            public_base_url: optional("GCP_PUBLIC_BASE_URL"),
            key_prefix: lookup("GCP_KEY_PREFIX").unwrap_or_default(),
            api_base: optional("GCS_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
        })
    }

    /// Object key for a local file name.
    pub fn object_key(&self, file_name: &str) -> String {
        let prefix = self.key_prefix.trim_matches('/');
        if prefix.is_empty() {
            file_name.to_string()
        } else {
            format!("{}/{}", prefix, file_name)
        }
    }

    /// URL under which an uploaded object is reachable.
    pub fn object_url(&self, key: &str) -> String {
        let base = self
            .public_base_url
            .as_deref()
            .map(|b| b.trim_end_matches('/').to_string())
            .unwrap_or_else(|| format!("https://storage.googleapis.com/{}", self.bucket_name));
        format!("{}/{}", base, key)
    }

    fn upload_endpoint(&self) -> String {
        format!(
            "{}/upload/storage/v1/b/{}/o",
            self.api_base.trim_end_matches('/'),
            self.bucket_name
        )
    }
}

/// Publishes artifacts to a GCS bucket with service account credentials.
#[derive(Clone)]
pub struct GcsPublisher {
    http: Client,
    config: GcsConfig,
    auth: Arc<dyn TokenProvider>,
}

impl GcsPublisher {
    pub fn new(config: GcsConfig) -> StorageResult<Self> {
        let auth = create_auth_provider(&config)?;
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .user_agent(concat!("mpipe-storage/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| StorageError::config_error(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http, config, auth })
    }

    /// Create from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Self::new(GcsConfig::from_env()?)
    }

    pub fn config(&self) -> &GcsConfig {
        &self.config
    }

    async fn access_token(&self) -> StorageResult<String> {
        let token = self
            .auth
            .token(&[GCS_SCOPE])
            .await
            .map_err(|e| StorageError::upload_failed(format!("failed to get GCS token: {}", e)))?;
        Ok(token.as_str().to_string())
    }

    /// Fetch a token, proving the credentials are usable.
    pub async fn check_credentials(&self) -> StorageResult<()> {
        self.access_token().await.map(|_| ())
    }
}

fn create_auth_provider(config: &GcsConfig) -> StorageResult<Arc<dyn TokenProvider>> {
    if let Some(json) = &config.credentials_json {
        let sa = CustomServiceAccount::from_json(json).map_err(|e| {
            StorageError::config_error(format!("invalid GCP_SA_CREDENTIALS: {}", e))
        })?;
        return Ok(Arc::new(sa));
    }

    let service_account = CustomServiceAccount::from_env().map_err(|e| {
        StorageError::config_error(format!("failed to load service account: {}", e))
    })?;

    match service_account {
        Some(sa) => Ok(Arc::new(sa)),
        None => Err(StorageError::config_error(
            "neither GCP_SA_CREDENTIALS nor GOOGLE_APPLICATION_CREDENTIALS is set",
        )),
    }
}

/// Simple media upload of `path` to `key`.
async fn put_object(
    http: &Client,
    config: &GcsConfig,
    path: &Path,
    key: &str,
    token: &str,
) -> StorageResult<()> {
    let file = tokio::fs::File::open(path).await?;
    let len = file.metadata().await?.len();
    debug!("Uploading {} to gs://{}/{}", path.display(), config.bucket_name, key);

    let response = http
        .post(config.upload_endpoint())
        .query(&[("uploadType", "media"), ("name", key)])
        .bearer_auth(token)
        .header(CONTENT_TYPE, content_type_for(path))
        .header(CONTENT_LENGTH, len)
        .body(Body::from(file))
        .send()
        .await
        .map_err(|e| StorageError::upload_failed(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(StorageError::upload_failed(format!(
            "GCS returned HTTP {}: {}",
            status,
            body.trim()
        )));
    }

    info!("Uploaded {} to gs://{}/{}", path.display(), config.bucket_name, key);
    Ok(())
}

#[async_trait]
impl ArtifactPublisher for GcsPublisher {
    async fn upload(&self, local_path: &Path) -> StorageResult<String> {
        let key = self.config.object_key(file_name_of(local_path)?);
        let token = self.access_token().await?;
        put_object(&self.http, &self.config, local_path, &key, &token).await?;
        Ok(self.config.object_url(&key))
    }
}
