//! Attachment storage.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use ulid::Ulid;

/// S3 adapter
pub mod s3;

pub use s3::S3BlobStore;

#[derive(Clone, PartialEq, Eq)]
pub struct Attachment {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub filename: String,
}

impl std::fmt::Debug for Attachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attachment")
            .field("bytes", &self.bytes.len())
            .field("mime_type", &self.mime_type)
            .field("filename", &self.filename)
            .finish()
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StoredAttachment {
    pub key: String,
    pub url: String,
}

#[derive(Error, Debug)]
pub enum BlobError {
    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Could not produce a download URL: {0}")]
    Url(String),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload(&self, attachment: &Attachment) -> Result<StoredAttachment, BlobError>;

    /// A URL that is valid from now, for an object stored earlier.
    async fn download_url(&self, key: &str) -> Result<String, BlobError>;
}

/// Collision-free object key: `<prefix>/<unix millis>_<ulid>_<filename>`.
pub fn object_key(prefix: &str, filename: &str, now: DateTime<Utc>) -> String {
    let name = sanitize_filename(filename);
    let stem = format!("{}_{}_{}", now.timestamp_millis(), Ulid::new(), name);
    match prefix.trim_matches('/') {
        "" => stem,
        prefix => format!("{prefix}/{stem}"),
    }
}

fn sanitize_filename(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '-' | '_' => c,
            _ => '_',
        })
        .collect();

    match cleaned.trim_matches('.') {
        "" => "file".to_string(),
        _ => cleaned,
    }
}
