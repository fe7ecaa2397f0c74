//! Object storage for run artifacts.
//!
//! Artifact rows only record keys; the bytes live in an S3-compatible bucket
//! behind [`ObjectStore`]. [`b2::B2ObjectStore`] talks to Backblaze B2.

use async_trait::async_trait;

pub mod b2;

/// Errors raised by an [`ObjectStore`].
#[derive(Debug, thiserror::Error)]
pub enum ObjectStoreError {
    #[error("invalid object key '{0}'")]
    InvalidKey(String),

    #[error("object store client misconfigured: {0}")]
    Config(String),

    #[error("object store unavailable: {0}")]
    Unavailable(String),

    /// The bucket answered with a non-success status.
    #[error("object store rejected request with status {status}")]
    Rejected { status: u16 },

    #[error("object store call timed out")]
    Timeout,
}

impl ObjectStoreError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout | Self::Unavailable(_) => true,
            Self::Rejected { status } => *status >= 500 || *status == 429,
            Self::InvalidKey(_) | Self::Config(_) => false,
        }
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync + std::fmt::Debug {
    /// Name of the bucket objects are written to.
    fn bucket_name(&self) -> &str;

    /// Store `body` under `key`, replacing any existing object.
    async fn put_object(
        &self,
        key: &str,
        body: &[u8],
        content_type: &str,
    ) -> Result<(), ObjectStoreError>;
}

/// Reject keys the bucket would misinterpret.
pub fn validate_key(key: &str) -> Result<(), ObjectStoreError> {
    if key.is_empty() || key.starts_with('/') || key.len() > 1024 {
        return Err(ObjectStoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}
