//! Storage capability
//!
//! Every storage variant exposes the same flat key namespace: keys are strings,
//! `/` separates path segments, and a key ending in `/` is a directory marker.
//! The namespace layer only talks to [`Backend`], so the in-memory, local-disk
//! and S3 variants are interchangeable.

pub mod local;
pub mod memory;
pub mod s3;

use crate::config::{Config, StorageKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

pub use local::LocalBackend;
pub use memory::MemoryBackend;
pub use s3::S3Backend;

/// Path delimiter used to emulate directories in the flat namespace.
pub const DELIMITER: char = '/';

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Object not found: {0}")]
    NotFound(String),
    #[error("Invalid key: {0}")]
    InvalidKey(String),
    #[error("S3 error: {0}")]
    S3(String),
}

/// How a backend treats directories and missing keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    /// Directories are real and must exist before children are written.
    /// Creating an existing directory and deleting a missing key are errors.
    Filesystem,
    /// Directories are only prefixes; writes and deletes are idempotent.
    ObjectStore,
}

/// Metadata of a stored object as reported by a listing
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectMeta {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// One page of a listing.
///
/// With a delimiter, keys that continue past the next `/` are folded into
/// `common_prefixes` (each ending in `/`). Without one, every matching key is
/// returned in `objects`.
#[derive(Debug, Clone, Default)]
pub struct Listing {
    pub objects: Vec<ObjectMeta>,
    pub common_prefixes: Vec<String>,
    /// More results exist beyond this page
    pub truncated: bool,
}

/// Object body with its content type
#[derive(Debug, Clone)]
pub struct ObjectData {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

#[async_trait]
pub trait Backend: Send + Sync {
    fn flavor(&self) -> Flavor;

    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// List one page of keys starting with `prefix`.
    async fn list(&self, prefix: &str, delimiter: Option<char>) -> Result<Listing, StorageError>;

    async fn get(&self, key: &str) -> Result<ObjectData, StorageError>;

    /// Write `bytes` at `key`, replacing any existing object.
    async fn put(&self, key: &str, bytes: &[u8], content_type: Option<&str>) -> Result<(), StorageError>;

    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    async fn exists(&self, key: &str) -> Result<bool, StorageError>;

    /// Delete several keys. Backends with a native batch call override this.
    async fn delete_many(&self, keys: &[String]) -> Result<(), StorageError> {
        for key in keys {
            self.delete(key).await?;
        }
        Ok(())
    }

    /// Pre-signed GET URL valid for `expires_in_secs`, if the backend can mint one.
    async fn presign_get(&self, _key: &str, _expires_in_secs: u32) -> Result<Option<String>, StorageError> {
        Ok(None)
    }
}

/// Build the backend selected by configuration
pub async fn build_backend(config: &Config) -> anyhow::Result<Arc<dyn Backend>> {
    let backend: Arc<dyn Backend> = match config.storage_backend {
        StorageKind::Memory => Arc::new(MemoryBackend::new()),
        StorageKind::Mock => {
            let backend = MemoryBackend::new();
            backend.seed_demo();
            Arc::new(backend)
        }
        StorageKind::Local => Arc::new(LocalBackend::new(&config.storage_path)?),
        StorageKind::S3 => Arc::new(S3Backend::new(&config.s3)?),
    };
    tracing::info!("storage backend: {}", backend.name());
    Ok(backend)
}

/// Split a key into the part under `prefix`, folding deeper keys into their
/// next common prefix. Returns `None` for keys outside `prefix`.
pub(crate) fn classify<'a>(prefix: &str, key: &'a str, delimiter: Option<char>) -> Option<Classified<'a>> {
    let rest = key.strip_prefix(prefix)?;
    match delimiter.and_then(|d| rest.find(d).map(|idx| (d, idx))) {
        Some((d, idx)) => Some(Classified::CommonPrefix(format!("{}{}", prefix, &rest[..idx + d.len_utf8()]))),
        None => Some(Classified::Object(key)),
    }
}

#[derive(Debug, PartialEq)]
pub(crate) enum Classified<'a> {
    Object(&'a str),
    CommonPrefix(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_with_delimiter() {
        assert_eq!(
            classify("docs/", "docs/report.pdf", Some('/')),
            Some(Classified::Object("docs/report.pdf"))
        );
        assert_eq!(
            classify("docs/", "docs/img/logo.png", Some('/')),
            Some(Classified::CommonPrefix("docs/img/".to_string()))
        );
        assert_eq!(
            classify("docs/", "docs/img/", Some('/')),
            Some(Classified::CommonPrefix("docs/img/".to_string()))
        );
        // The marker for the listed level itself stays an object
        assert_eq!(classify("docs/", "docs/", Some('/')), Some(Classified::Object("docs/")));
        assert_eq!(classify("docs/", "readme.md", Some('/')), None);
    }

    #[test]
    fn test_classify_recursive() {
        assert_eq!(
            classify("docs/", "docs/img/logo.png", None),
            Some(Classified::Object("docs/img/logo.png"))
        );
        assert_eq!(classify("", "readme.md", Some('/')), Some(Classified::Object("readme.md")));
    }
}
