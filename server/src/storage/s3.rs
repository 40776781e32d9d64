//! S3-compatible object storage via `rust-s3`.
//!
//! Directory markers are zero-byte objects whose key ends in `/`. Listings are
//! a single `ListObjectsV2` page; truncation is reported to the caller.

use super::{Backend, Flavor, Listing, ObjectData, ObjectMeta, StorageError};
use crate::config::S3Config;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use s3::bucket::Bucket;
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::region::Region;

pub struct S3Backend {
    bucket: Bucket,
}

fn non_empty(value: &str) -> Option<&str> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

fn s3_error(err: S3Error) -> StorageError {
    StorageError::S3(err.to_string())
}

impl S3Backend {
    pub fn new(config: &S3Config) -> Result<Self, StorageError> {
        if config.bucket.is_empty() {
            return Err(StorageError::S3("S3_BUCKET_NAME is not set".into()));
        }

        let region = match non_empty(&config.endpoint) {
            Some(endpoint) => Region::Custom {
                region: config.region.clone(),
                endpoint: endpoint.to_string(),
            },
            None => config
                .region
                .parse::<Region>()
                .map_err(|e| StorageError::S3(format!("invalid region {}: {}", config.region, e)))?,
        };

        // Missing keys fall back to the environment / profile chain
        let credentials = Credentials::new(
            non_empty(&config.access_key_id),
            non_empty(&config.secret_access_key),
            None,
            None,
            None,
        )
        .map_err(|e| StorageError::S3(format!("invalid credentials: {}", e)))?;

        let mut bucket = Bucket::new(&config.bucket, region, credentials).map_err(s3_error)?;
        if non_empty(&config.endpoint).is_some() {
            bucket = bucket.with_path_style();
        }

        tracing::info!("S3 bucket: {} (region {})", config.bucket, config.region);
        Ok(Self { bucket })
    }
}

/// Map a failed request, turning a 404 into `NotFound`
fn classify_error(key: &str, err: S3Error) -> StorageError {
    match err {
        S3Error::HttpFailWithBody(404, _) => StorageError::NotFound(key.to_string()),
        other => s3_error(other),
    }
}

/// `rust-s3` has no DeleteObjects call, so `delete_many` keeps the trait's
/// one-request-per-key loop.
#[async_trait]
impl Backend for S3Backend {
    fn flavor(&self) -> Flavor {
        Flavor::ObjectStore
    }

    fn name(&self) -> &'static str {
        "s3"
    }

    async fn list(&self, prefix: &str, delimiter: Option<char>) -> Result<Listing, StorageError> {
        let (page, _status) = self
            .bucket
            .list_page(prefix.to_string(), delimiter.map(String::from), None, None, None)
            .await
            .map_err(s3_error)?;

        let objects = page
            .contents
            .into_iter()
            .map(|object| ObjectMeta {
                last_modified: DateTime::parse_from_rfc3339(&object.last_modified)
                    .ok()
                    .map(|t| t.with_timezone(&Utc)),
                key: object.key,
                size: object.size,
            })
            .collect();

        let common_prefixes = page
            .common_prefixes
            .unwrap_or_default()
            .into_iter()
            .map(|p| p.prefix)
            .collect();

        tracing::debug!("s3: listed prefix {:?} (truncated: {})", prefix, page.is_truncated);
        Ok(Listing {
            objects,
            common_prefixes,
            truncated: page.is_truncated,
        })
    }

    async fn get(&self, key: &str) -> Result<ObjectData, StorageError> {
        let response = self
            .bucket
            .get_object(key)
            .await
            .map_err(|e| classify_error(key, e))?;
        let content_type = response.headers().get("content-type").cloned();
        Ok(ObjectData {
            bytes: response.bytes().to_vec(),
            content_type,
        })
    }

    async fn put(&self, key: &str, bytes: &[u8], content_type: Option<&str>) -> Result<(), StorageError> {
        let content_type = content_type.unwrap_or("application/octet-stream");
        self.bucket
            .put_object_with_content_type(key, bytes, content_type)
            .await
            .map_err(s3_error)?;
        tracing::debug!("s3: put {} ({} bytes)", key, bytes.len());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        // DeleteObject succeeds for missing keys
        self.bucket.delete_object(key).await.map_err(s3_error)?;
        tracing::debug!("s3: deleted {}", key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        match self.bucket.head_object(key).await {
            Ok(_) => Ok(true),
            Err(S3Error::HttpFailWithBody(404, _)) => Ok(false),
            Err(e) => Err(s3_error(e)),
        }
    }

    async fn presign_get(&self, key: &str, expires_in_secs: u32) -> Result<Option<String>, StorageError> {
        let url = self
            .bucket
            .presign_get(key, expires_in_secs, None)
            .await
            .map_err(s3_error)?;
        Ok(Some(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minio_config() -> S3Config {
        S3Config {
            bucket: "shelf".into(),
            region: "us-east-1".into(),
            access_key_id: "minio".into(),
            secret_access_key: "minio-secret".into(),
            endpoint: "http://localhost:9000".into(),
        }
    }

    #[test]
    fn test_custom_endpoint_uses_path_style() {
        let backend = S3Backend::new(&minio_config()).unwrap();
        assert_eq!(backend.name(), "s3");
        assert_eq!(backend.flavor(), Flavor::ObjectStore);
        assert!(backend.bucket.is_path_style());
    }

    #[test]
    fn test_requires_bucket_name() {
        let config = S3Config {
            bucket: String::new(),
            ..minio_config()
        };
        assert!(matches!(S3Backend::new(&config), Err(StorageError::S3(_))));
    }
}
