//! S3-compatible client implementation.

use std::path::Path;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};
use crate::store::{content_type_for, ObjectStore};

/// Configuration for the S3 client.
///
/// Bucket names are not part of the configuration; every call names its own
/// bucket.
#[derive(Clone)]
pub struct S3Config {
    /// S3 API endpoint URL
    pub endpoint_url: String,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Region
    pub region: String,
}

impl std::fmt::Debug for S3Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Config")
            .field("endpoint_url", &self.endpoint_url)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("region", &self.region)
            .finish()
    }
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            endpoint_url: "http://localhost:9000".to_string(),
            access_key_id: "minioadmin".to_string(),
            secret_access_key: "minioadmin".to_string(),
            region: "us-east-1".to_string(),
        }
    }
}

impl S3Config {
    /// Create config from environment variables, falling back to a local MinIO.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            endpoint_url: std::env::var("S3_ENDPOINT_URL").unwrap_or(defaults.endpoint_url),
            access_key_id: std::env::var("S3_ACCESS_KEY_ID").unwrap_or(defaults.access_key_id),
            secret_access_key: std::env::var("S3_SECRET_ACCESS_KEY")
                .unwrap_or(defaults.secret_access_key),
            region: std::env::var("S3_REGION").unwrap_or(defaults.region),
        }
    }

    fn validate(&self) -> StorageResult<()> {
        if self.endpoint_url.is_empty() {
            return Err(StorageError::config_error("S3_ENDPOINT_URL is empty"));
        }
        if self.access_key_id.is_empty() || self.secret_access_key.is_empty() {
            return Err(StorageError::config_error("S3 credentials are empty"));
        }
        Ok(())
    }
}

/// S3-compatible object store.
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    /// Create a new client from configuration.
    pub fn new(config: S3Config) -> StorageResult<Self> {
        config.validate()?;

        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "mediaq",
        );

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        info!("Configured object store at {}", config.endpoint_url);

        Ok(Self {
            client: Client::from_conf(sdk_config),
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Self::new(S3Config::from_env())
    }

    /// Check connectivity and credentials by heading a bucket.
    pub async fn check_connectivity(&self, bucket: &str) -> StorageResult<()> {
        self.client
            .head_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| {
                let not_found = e
                    .as_service_error()
                    .map(|se| se.is_not_found())
                    .unwrap_or(false);
                if not_found {
                    StorageError::BucketNotFound(bucket.to_string())
                } else {
                    StorageError::from_code(
                        e.code(),
                        bucket,
                        "",
                        DisplayErrorContext(&e).to_string(),
                        StorageError::AwsSdk,
                    )
                }
            })?;
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put_object(&self, bucket: &str, key: &str, local_path: &Path) -> StorageResult<()> {
        debug!("Uploading {} to {}/{}", local_path.display(), bucket, key);

        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .content_type(content_type_for(local_path))
            .send()
            .await
            .map_err(|e| {
                StorageError::from_code(
                    e.code(),
                    bucket,
                    key,
                    DisplayErrorContext(&e).to_string(),
                    StorageError::UploadFailed,
                )
            })?;

        info!("Uploaded {} to {}/{}", local_path.display(), bucket, key);
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str, local_path: &Path) -> StorageResult<()> {
        debug!("Downloading {}/{} to {}", bucket, key, local_path.display());

        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                StorageError::from_code(
                    e.code(),
                    bucket,
                    key,
                    DisplayErrorContext(&e).to_string(),
                    StorageError::DownloadFailed,
                )
            })?;

        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::download_failed(e.to_string()))?
            .into_bytes();

        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(local_path, &bytes).await?;

        info!("Downloaded {}/{} to {}", bucket, key, local_path.display());
        Ok(())
    }

    async fn exists(&self, bucket: &str, key: &str) -> StorageResult<bool> {
        match self.client.head_object().bucket(bucket).key(key).send().await {
            Ok(_) => Ok(true),
            Err(e) => {
                let not_found = e
                    .as_service_error()
                    .map(|se| se.is_not_found())
                    .unwrap_or(false);
                if not_found {
                    return Ok(false);
                }
                match StorageError::from_code(
                    e.code(),
                    bucket,
                    key,
                    DisplayErrorContext(&e).to_string(),
                    StorageError::AwsSdk,
                ) {
                    StorageError::NotFound(_) => Ok(false),
                    other => Err(other),
                }
            }
        }
    }
}
