use async_trait::async_trait;

use crate::db::models::{AttachmentDescriptor, AttachmentFile};
use crate::db::repository::WriteOutcome;
use crate::error::StoreError;

/// Trait for attachment binary storage.
///
/// Abstracted as a trait so tests can use a mock without a real S3 instance.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BinaryStore: Send + Sync {
    /// Store a payload under `attachment_id`. Reports `Conflict` when that id
    /// is already stored.
    async fn insert_binary(
        &self,
        attachment_id: &str,
        file: &AttachmentFile,
    ) -> Result<WriteOutcome, StoreError>;

    /// Overwrite the payload and metadata stored under `attachment_id`.
    async fn update_binary(
        &self,
        attachment_id: &str,
        file: &AttachmentFile,
        metadata: &AttachmentDescriptor,
    ) -> Result<(), StoreError>;
}

/// S3 implementation of BinaryStore.
///
/// Only available when the `backend` feature is enabled.
#[cfg(feature = "backend")]
pub struct S3BinaryStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    prefix: String,
}

#[cfg(feature = "backend")]
impl S3BinaryStore {
    /// Create a new S3 binary store.
    ///
    /// `endpoint` supports MinIO / LocalStack; credentials and region come
    /// from the usual AWS environment variables.
    pub async fn connect(bucket: String, endpoint: Option<&str>, prefix: String) -> Self {
        let mut config_loader = aws_config::defaults(aws_config::BehaviorVersion::latest());

        if let Some(endpoint) = endpoint {
            config_loader = config_loader.endpoint_url(endpoint);
        }

        let sdk_config = config_loader.load().await;
        let client = aws_sdk_s3::Client::new(&sdk_config);

        Self::new(client, bucket, prefix)
    }

    /// Create with explicit values (useful for testing / DI).
    pub fn new(client: aws_sdk_s3::Client, bucket: String, prefix: String) -> Self {
        Self {
            client,
            bucket,
            prefix,
        }
    }

    fn key(&self, attachment_id: &str) -> String {
        format!("{}{}", self.prefix, attachment_id)
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                let service_err = e.into_service_error();
                if service_err.is_not_found() {
                    Ok(false)
                } else {
                    Err(StoreError::Backend(format!(
                        "Failed to inspect object '{}': {}",
                        key, service_err
                    )))
                }
            }
        }
    }

    async fn put(
        &self,
        key: &str,
        file: &AttachmentFile,
        metadata: &[(&str, String)],
    ) -> Result<(), StoreError> {
        let content = tokio::fs::read(&file.path).await.map_err(|e| {
            StoreError::Backend(format!("Failed to read '{}': {}", file.path.display(), e))
        })?;

        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .metadata("file-name", file.name.clone());

        for (name, value) in metadata {
            request = request.metadata(*name, value.clone());
        }

        request
            .body(content.into())
            .send()
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to put object '{}': {}", key, e)))?;

        Ok(())
    }
}

#[cfg(feature = "backend")]
#[async_trait]
impl BinaryStore for S3BinaryStore {
    async fn insert_binary(
        &self,
        attachment_id: &str,
        file: &AttachmentFile,
    ) -> Result<WriteOutcome, StoreError> {
        let key = self.key(attachment_id);
        if self.exists(&key).await? {
            return Ok(WriteOutcome::Conflict);
        }

        self.put(&key, file, &[]).await?;
        Ok(WriteOutcome::Written)
    }

    async fn update_binary(
        &self,
        attachment_id: &str,
        file: &AttachmentFile,
        metadata: &AttachmentDescriptor,
    ) -> Result<(), StoreError> {
        let key = self.key(attachment_id);
        let fields = [
            ("name", metadata.name.clone()),
            ("extension", metadata.extension.clone()),
            ("related-documents", metadata.related_documents().join(",")),
        ];

        self.put(&key, file, &fields).await
    }
}
