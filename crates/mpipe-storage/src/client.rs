//! S3-compatible client implementation.

use std::path::Path;

use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};

/// Configuration for the S3 client.
#[derive(Debug, Clone)]
pub struct S3Config {
    /// S3 API endpoint URL
    pub endpoint_url: String,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Bucket name
    pub bucket_name: String,
    /// Region ("auto" works for R2)
    pub region: String,
    /// Public base URL objects are served from (CDN or bucket domain)
    pub public_base_url: Option<String>,
    /// Prefix prepended to every object key
    pub key_prefix: String,
}

impl S3Config {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Create config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> StorageResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| {
            lookup(name)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| StorageError::config_error(format!("{} not set", name)))
        };

        Ok(Self {
            endpoint_url: required("S3_ENDPOINT_URL")?,
            access_key_id: required("S3_ACCESS_KEY")?,
            secret_access_key: required("S3_SECRET_KEY")?,
            bucket_name: required("S3_BUCKET_NAME")?,
            region: lookup("S3_REGION").unwrap_or_else(|| "auto".to_string()),
            public_base_url: lookup("S3_PUBLIC_BASE_URL").filter(|v| !v.is_empty()),
            key_prefix: lookup("S3_KEY_PREFIX").unwrap_or_default(),
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
        match &self.public_base_url {
            Some(base) => format!("{}/{}", base.trim_end_matches('/'), key),
            None => format!(
                "{}/{}/{}",
                self.endpoint_url.trim_end_matches('/'),
                self.bucket_name,
                key
            ),
        }
    }
}

/// S3-compatible storage client.
#[derive(Clone)]
pub struct S3Client {
    client: Client,
    config: S3Config,
}

impl S3Client {
    /// Create a new client from configuration.
    pub fn new(config: S3Config) -> Self {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "mpipe",
        );

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(sdk_config),
            config,
        }
    }

    /// Create from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self::new(S3Config::from_env()?))
    }

    pub fn config(&self) -> &S3Config {
        &self.config
    }

    /// Upload a file.
    pub async fn upload_file(
        &self,
        path: impl AsRef<Path>,
        key: &str,
        content_type: &str,
    ) -> StorageResult<()> {
        let path = path.as_ref();
        debug!("Uploading {} to {}", path.display(), key);

        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        self.client
            .put_object()
            .bucket(&self.config.bucket_name)
            .key(key)
            .body(body)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        info!("Uploaded {} to {}", path.display(), key);
        Ok(())
    }

    /// Check connectivity by performing a head bucket operation.
    pub async fn check_connectivity(&self) -> StorageResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.config.bucket_name)
            .send()
            .await
            .map_err(|e| StorageError::config_error(format!("S3 connectivity check failed: {}", e)))?;
        Ok(())
    }
}

/// Content type for an artifact, by extension.
pub fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("mp3") => "audio/mpeg",
        Some("m4a") => "audio/mp4",
        Some("wav") => "audio/wav",
        Some("mp4") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("webm") => "video/webm",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn base_vars() -> HashMap<String, String> {
        vars(&[
            ("S3_ENDPOINT_URL", "https://nyc3.digitaloceanspaces.com/"),
            ("S3_ACCESS_KEY", "AK"),
            ("S3_SECRET_KEY", "SK"),
            ("S3_BUCKET_NAME", "media"),
        ])
    }

    #[test]
    fn test_config_requires_credentials() {
        let mut env = base_vars();
        env.remove("S3_SECRET_KEY");
        let err = S3Config::from_lookup(|k| env.get(k).cloned()).unwrap_err();
        assert!(err.to_string().contains("S3_SECRET_KEY"));
    }

    #[test]
    fn test_object_url_without_public_base() {
        let env = base_vars();
        let config = S3Config::from_lookup(|k| env.get(k).cloned()).unwrap();
        assert_eq!(config.region, "auto");
        assert_eq!(
            config.object_url("job1.mp3"),
            "https://nyc3.digitaloceanspaces.com/media/job1.mp3"
        );
    }

    #[test]
    fn test_object_key_and_public_url() {
        let mut env = base_vars();
        env.insert("S3_PUBLIC_BASE_URL".into(), "https://cdn.example.com/".into());
        env.insert("S3_KEY_PREFIX".into(), "/outputs/".into());
        let config = S3Config::from_lookup(|k| env.get(k).cloned()).unwrap();

        let key = config.object_key("job1.mp4");
        assert_eq!(key, "outputs/job1.mp4");
        assert_eq!(config.object_url(&key), "https://cdn.example.com/outputs/job1.mp4");
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for(Path::new("/w/a.mp3")), "audio/mpeg");
        assert_eq!(content_type_for(Path::new("/w/a.MP4")), "video/mp4");
        assert_eq!(content_type_for(Path::new("/w/a")), "application/octet-stream");
    }
}
