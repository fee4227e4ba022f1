//! S3 client implementation.

use std::path::Path;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};
use crate::store::ObjectStore;

/// Configuration for the S3 client.
///
/// Every field is optional: without overrides the AWS default provider chain
/// resolves region and credentials.
#[derive(Debug, Clone, Default)]
pub struct S3Config {
    /// Custom S3 API endpoint (MinIO, R2, LocalStack, ...)
    pub endpoint_url: Option<String>,
    /// Region override
    pub region: Option<String>,
    /// Static access key ID
    pub access_key_id: Option<String>,
    /// Static secret access key
    pub secret_access_key: Option<String>,
}

impl S3Config {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Create config from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> StorageResult<Self> {
        let read = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let config = Self {
            endpoint_url: read("S3_ENDPOINT_URL"),
            region: read("S3_REGION"),
            access_key_id: read("S3_ACCESS_KEY_ID"),
            secret_access_key: read("S3_SECRET_ACCESS_KEY"),
        };

        if config.access_key_id.is_some() != config.secret_access_key.is_some() {
            return Err(StorageError::config_error(
                "S3_ACCESS_KEY_ID and S3_SECRET_ACCESS_KEY must be set together",
            ));
        }

        Ok(config)
    }
}

/// S3-backed object store.
#[derive(Clone)]
pub struct S3Store {
    client: Client,
}

impl S3Store {
    /// Create a new client from configuration.
    pub async fn new(config: S3Config) -> StorageResult<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());

        if let Some(region) = config.region {
            loader = loader.region(Region::new(region));
        }

        if let (Some(access_key_id), Some(secret_access_key)) =
            (config.access_key_id, config.secret_access_key)
        {
            let credentials = Credentials::new(access_key_id, secret_access_key, None, None, "vframe-env");
            loader = loader.credentials_provider(credentials);
        }

        let shared = loader.load().await;
        let mut builder = Builder::from(&shared);

        if let Some(endpoint_url) = config.endpoint_url {
            builder = builder.endpoint_url(endpoint_url).force_path_style(true);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
        })
    }

    /// Create from environment variables.
    pub async fn from_env() -> StorageResult<Self> {
        Self::new(S3Config::from_env()?).await
    }

    /// Check that `bucket` is reachable with the configured credentials.
    pub async fn check_bucket(&self, bucket: &str) -> StorageResult<()> {
        self.client
            .head_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| StorageError::config_error(format!("Bucket {} unreachable: {}", bucket, DisplayErrorContext(&e))))?;
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn download_to_file(&self, bucket: &str, key: &str, path: &Path) -> StorageResult<u64> {
        let location = format!("{}/{}", bucket, key);
        debug!("Downloading {} to {}", location, path.display());

        let mut response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify_get_error(&location, e))?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::File::create(path).await?;
        let mut written = 0u64;

        while let Some(chunk) = response
            .body
            .try_next()
            .await
            .map_err(|e| StorageError::download_failed(format!("{}: {}", location, e)))?
        {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }

        file.flush().await?;
        file.sync_all().await?;

        info!("Downloaded {} ({} bytes) to {}", location, written, path.display());
        Ok(written)
    }

    async fn upload_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        content_type: &str,
    ) -> StorageResult<()> {
        debug!("Uploading {} to {}/{}", path.display(), bucket, key);

        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::upload_failed(format!("{}: {}", path.display(), e)))?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(format!("{}/{}: {}", bucket, key, DisplayErrorContext(&e))))?;

        info!("Uploaded {} to {}/{}", path.display(), bucket, key);
        Ok(())
    }
}

fn classify_get_error(location: &str, err: SdkError<GetObjectError>) -> StorageError {
    let detail = DisplayErrorContext(&err).to_string();
    let service_error = err.into_service_error();

    if service_error.is_no_such_key() {
        StorageError::not_found(location)
    } else if service_error.code() == Some("AccessDenied") {
        StorageError::AccessDenied(location.to_string())
    } else {
        StorageError::download_failed(format!("{}: {}", location, detail))
    }
}
