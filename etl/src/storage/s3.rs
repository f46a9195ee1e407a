use async_trait::async_trait;
use aws_sdk_s3::Client as S3Client;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use common::{Error, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

/// Object storage bound to one bucket.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    fn bucket(&self) -> &str;
    async fn upload_file(&self, local_path: &Path, key: &str) -> Result<()>;
}

pub struct S3Storage {
    bucket: String,
    client: Arc<S3Client>,
}

impl S3Storage {
    pub fn new(client: Arc<S3Client>, bucket: &str) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
        }
    }

    fn transfer_error(&self, path: &str, key: &str, reason: String) -> Error {
        Error::Transfer {
            path: path.to_string(),
            bucket: self.bucket.clone(),
            key: key.to_string(),
            reason,
        }
    }

    async fn send(&self, key: &str, body: ByteStream) -> std::result::Result<(), String> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| match e {
                SdkError::ServiceError(err) => err.into_err().to_string(),
                _ => e.to_string(),
            })?;
        Ok(())
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn upload_file(&self, local_path: &Path, key: &str) -> Result<()> {
        let path = local_path.display().to_string();
        info!(file = %path, destination = %format!("s3://{}/{}", self.bucket, key), "Uploading file");

        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| self.transfer_error(&path, key, e.to_string()))?;

        self.send(key, body).await.map_err(|reason| {
            error!(file = %path, bucket = %self.bucket, key, error = %reason, "Upload failed");
            self.transfer_error(&path, key, reason)
        })?;

        info!(bucket = %self.bucket, key, "File uploaded");
        Ok(())
    }
}
