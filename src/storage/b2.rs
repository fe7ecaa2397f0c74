use std::time::Duration;

use async_trait::async_trait;
use s3::creds::Credentials;
use s3::{Bucket, Region};

use super::{ObjectStore, ObjectStoreError, validate_key};
use crate::config::StorageConfig;

/// Backblaze B2 through its S3-compatible API, using path-style addressing.
#[derive(Debug)]
pub struct B2ObjectStore {
    bucket: Box<Bucket>,
    call_timeout: Duration,
}

impl B2ObjectStore {
    pub fn new(config: &StorageConfig, call_timeout: Duration) -> Result<Self, ObjectStoreError> {
        let region = Region::Custom {
            region: config.region.clone(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
        };
        let credentials = Credentials::new(
            Some(&config.key_id),
            Some(&config.app_key),
            None,
            None,
            None,
        )
        .map_err(|e| ObjectStoreError::Config(e.to_string()))?;

        let bucket = Bucket::new(&config.bucket, region, credentials)
            .map_err(|e| ObjectStoreError::Config(e.to_string()))?
            .with_path_style();

        Ok(Self {
            bucket,
            call_timeout,
        })
    }
}

#[async_trait]
impl ObjectStore for B2ObjectStore {
    fn bucket_name(&self) -> &str {
        &self.bucket.name
    }

    async fn put_object(
        &self,
        key: &str,
        body: &[u8],
        content_type: &str,
    ) -> Result<(), ObjectStoreError> {
        validate_key(key)?;

        let response = tokio::time::timeout(
            self.call_timeout,
            self.bucket
                .put_object_with_content_type(key, body, content_type),
        )
        .await
        .map_err(|_elapsed| {
            tracing::warn!(timeout = ?self.call_timeout, key, "object store call timed out");
            ObjectStoreError::Timeout
        })?
        .map_err(|e| ObjectStoreError::Unavailable(e.to_string()))?;

        let status = response.status_code();
        if !(200..300).contains(&status) {
            return Err(ObjectStoreError::Rejected { status });
        }

        tracing::debug!(bucket = %self.bucket.name, key, bytes = body.len(), "object stored");
        Ok(())
    }
}
