use async_trait::async_trait;
use aws_sdk_s3::{error::DisplayErrorContext, presigning::PresigningConfig, primitives::ByteStream};
use chrono::Utc;

use crate::config::Settings;

use super::{object_key, Attachment, BlobError, BlobStore, StoredAttachment};

pub struct S3BlobStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    prefix: String,
    public_base_url: Option<String>,
    presigning: PresigningConfig,
}

impl S3BlobStore {
    /// Fails when the configured URL lifetime is outside what S3 can presign.
    pub fn new(client: aws_sdk_s3::Client, settings: &Settings) -> Result<Self, BlobError> {
        let presigning = PresigningConfig::expires_in(settings.attachment_url_ttl)
            .map_err(|e| BlobError::Url(e.to_string()))?;

        Ok(Self {
            client,
            bucket: settings.attachments_bucket.clone(),
            prefix: settings.attachments_prefix.clone(),
            public_base_url: settings.attachments_public_base_url.clone(),
            presigning,
        })
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn upload(&self, attachment: &Attachment) -> Result<StoredAttachment, BlobError> {
        let key = object_key(&self.prefix, &attachment.filename, Utc::now());

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type(&attachment.mime_type)
            .body(ByteStream::from(attachment.bytes.clone()))
            .send()
            .await
            .map_err(|e| BlobError::Upload(DisplayErrorContext(&e).to_string()))?;

        tracing::info!("Stored attachment s3://{}/{}", self.bucket, key);

        let url = self.download_url(&key).await?;
        Ok(StoredAttachment { key, url })
    }

    async fn download_url(&self, key: &str) -> Result<String, BlobError> {
        if let Some(base) = &self.public_base_url {
            return Ok(format!("{}/{}", base.trim_end_matches('/'), key));
        }

        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(self.presigning.clone())
            .await
            .map_err(|e| BlobError::Url(DisplayErrorContext(&e).to_string()))?;

        Ok(presigned.uri().to_string())
    }
}
