//! Cloudflare R2 video store (S3 API).

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use vguard_models::content_type_for;

use crate::error::{StorageError, StorageResult};
use crate::range::ByteRange;
use crate::store::{ChunkStream, ObjectInfo, UploadStream, VideoStore};

/// Configuration for R2 client.
#[derive(Debug, Clone)]
pub struct R2Config {
    /// R2 endpoint URL (S3 API endpoint)
    pub endpoint_url: String,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Bucket name
    pub bucket_name: String,
    /// Region (usually "auto" for R2)
    pub region: String,
}

impl R2Config {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self {
            endpoint_url: std::env::var("R2_ENDPOINT_URL")
                .map_err(|_| StorageError::config_error("R2_ENDPOINT_URL not set"))?,
            access_key_id: std::env::var("R2_ACCESS_KEY_ID")
                .map_err(|_| StorageError::config_error("R2_ACCESS_KEY_ID not set"))?,
            secret_access_key: std::env::var("R2_SECRET_ACCESS_KEY")
                .map_err(|_| StorageError::config_error("R2_SECRET_ACCESS_KEY not set"))?,
            bucket_name: std::env::var("R2_BUCKET_NAME")
                .map_err(|_| StorageError::config_error("R2_BUCKET_NAME not set"))?,
            region: std::env::var("R2_REGION").unwrap_or_else(|_| "auto".to_string()),
        })
    }
}

/// Video store backed by an R2 bucket.
#[derive(Clone)]
pub struct R2VideoStore {
    client: Client,
    bucket: String,
}

impl R2VideoStore {
    /// Create a new R2 store from configuration.
    pub fn new(config: R2Config) -> Self {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "r2",
        );

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(sdk_config),
            bucket: config.bucket_name,
        }
    }

    /// Create from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self::new(R2Config::from_env()?))
    }

    fn is_missing(message: &str) -> bool {
        message.contains("NoSuchKey") || message.contains("NotFound")
    }

    /// Spool the upload to a temp file so the size limit is enforced before
    /// anything reaches the bucket.
    async fn spool(
        mut body: UploadStream<'_>,
        max_bytes: u64,
    ) -> StorageResult<(tempfile::TempPath, u64)> {
        let temp = tempfile::NamedTempFile::new()?;
        let (std_file, temp_path) = temp.into_parts();
        let mut file = tokio::fs::File::from_std(std_file);
        let mut written: u64 = 0;

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| StorageError::upload_failed(e.to_string()))?;
            written += chunk.len() as u64;
            if written > max_bytes {
                return Err(StorageError::TooLarge { limit: max_bytes });
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        Ok((temp_path, written))
    }
}

#[async_trait]
impl VideoStore for R2VideoStore {
    async fn put(&self, key: &str, body: UploadStream<'_>, max_bytes: u64) -> StorageResult<u64> {
        match self.head(key).await {
            Ok(_) => return Err(StorageError::AlreadyExists(key.to_string())),
            Err(StorageError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        // The temp file is removed when `temp_path` drops
        let (temp_path, size) = Self::spool(body, max_bytes).await?;
        debug!("Uploading {} bytes to {}", size, key);

        let body = ByteStream::from_path(&temp_path)
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type(content_type_for(key))
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        info!("Uploaded {} ({} bytes)", key, size);
        Ok(size)
    }

    async fn head(&self, key: &str) -> StorageResult<ObjectInfo> {
        let response = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let message = e.to_string();
                if Self::is_missing(&message) {
                    StorageError::not_found(key)
                } else {
                    StorageError::AwsSdk(message)
                }
            })?;

        Ok(ObjectInfo {
            key: key.to_string(),
            size: response.content_length().unwrap_or(0) as u64,
            last_modified: response
                .last_modified()
                .and_then(|t| t.to_millis().ok())
                .map(|ms| ms as u64),
        })
    }

    async fn read_range(
        &self,
        key: &str,
        range: Option<ByteRange>,
        chunk_size: usize,
    ) -> StorageResult<ChunkStream> {
        let mut request = self.client.get_object().bucket(&self.bucket).key(key);

        if let Some(r) = range {
            request = request.range(r.to_header());
        }

        let response = request.send().await.map_err(|e| {
            let message = e.to_string();
            if Self::is_missing(&message) {
                StorageError::not_found(key)
            } else {
                StorageError::download_failed(message)
            }
        })?;

        let reader = response.body.into_async_read();
        Ok(ReaderStream::with_capacity(reader, chunk_size).boxed())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        debug!("Deleting {}", key);

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::delete_failed(e.to_string()))?;

        Ok(())
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<ObjectInfo>> {
        debug!("Listing objects with prefix: {}", prefix);

        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix);

            if let Some(token) = continuation_token {
                request = request.continuation_token(token);
            }

            let response = request
                .send()
                .await
                .map_err(|e| StorageError::ListFailed(e.to_string()))?;

            for obj in response.contents() {
                objects.push(ObjectInfo {
                    key: obj.key().unwrap_or_default().to_string(),
                    size: obj.size().unwrap_or(0) as u64,
                    last_modified: obj
                        .last_modified()
                        .and_then(|t| t.to_millis().ok())
                        .map(|ms| ms as u64),
                });
            }

            if response.is_truncated() == Some(true) {
                continuation_token = response.next_continuation_token().map(str::to_string);
            } else {
                break;
            }
        }

        Ok(objects)
    }

    async fn check_connectivity(&self) -> StorageResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| StorageError::AwsSdk(format!("R2 connectivity check failed: {}", e)))?;
        Ok(())
    }
}
