use super::{classify, Backend, Classified, Flavor, Listing, ObjectData, ObjectMeta, StorageError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{PoisonError, RwLock};

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Vec<u8>,
    content_type: Option<String>,
    last_modified: DateTime<Utc>,
}

/// In-memory object store with object-store semantics.
///
/// Keys are kept in a sorted map so listings come back in key order, the
/// same way S3 returns them. An optional page size makes listings report
/// truncation, which is how pagination gets exercised without a bucket.
pub struct MemoryBackend {
    objects: RwLock<BTreeMap<String, StoredObject>>,
    page_size: Option<usize>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
            page_size: None,
        }
    }

    /// Limit every listing to `page_size` entries
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size.max(1));
        self
    }

    /// Populate the store with a small demo tree (the "mock" variant)
    pub fn seed_demo(&self) {
        let demo: [(&str, usize); 16] = [
            ("Documents/", 0),
            ("Documents/Project Documentation/", 0),
            ("Documents/Meeting Notes.docx", 125 * 1024),
            ("Documents/Research Paper.pdf", 2_936_013),
            ("Images/", 0),
            ("Images/Vacation Photos/", 0),
            ("Images/Logo.png", 450 * 1024),
            ("Images/Banner.jpg", 1_572_864),
            ("Project Proposal.docx", 245 * 1024),
            ("Budget.xlsx", 180 * 1024),
            ("Presentation.pptx", 2_516_582),
            ("Profile Photo.jpg", 1_258_291),
            ("Project Demo.mp4", 25_690_112),
            ("Report.pdf", 3_355_443),
            ("Archive.zip", 16_462_643),
            ("index.html", 12 * 1024),
        ];

        let mut objects = self.objects.write().unwrap_or_else(PoisonError::into_inner);
        for (key, size) in demo {
            let content_type = if key.ends_with('/') {
                None
            } else {
                Some(mime_guess::from_path(key).first_or_octet_stream().to_string())
            };
            objects.insert(
                key.to_string(),
                StoredObject {
                    bytes: vec![0u8; size],
                    content_type,
                    last_modified: Utc::now(),
                },
            );
        }
        tracing::debug!("seeded {} demo objects", objects.len());
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    fn flavor(&self) -> Flavor {
        Flavor::ObjectStore
    }

    fn name(&self) -> &'static str {
        "memory"
    }

    async fn list(&self, prefix: &str, delimiter: Option<char>) -> Result<Listing, StorageError> {
        let objects = self.objects.read().unwrap_or_else(PoisonError::into_inner);
        let limit = self.page_size.unwrap_or(usize::MAX);

        let mut listing = Listing::default();
        let mut seen_prefixes = BTreeSet::new();

        for (key, object) in objects.range(prefix.to_string()..) {
            let Some(classified) = classify(prefix, key, delimiter) else {
                // Keys are sorted, so the first miss ends the prefix range
                break;
            };

            if listing.objects.len() + seen_prefixes.len() >= limit {
                let already_counted = matches!(&classified, Classified::CommonPrefix(p) if seen_prefixes.contains(p));
                if !already_counted {
                    listing.truncated = true;
                    break;
                }
                continue;
            }

            match classified {
                Classified::Object(key) => listing.objects.push(ObjectMeta {
                    key: key.to_string(),
                    size: object.bytes.len() as u64,
                    last_modified: Some(object.last_modified),
                }),
                Classified::CommonPrefix(common) => {
                    seen_prefixes.insert(common);
                }
            }
        }

        listing.common_prefixes = seen_prefixes.into_iter().collect();
        Ok(listing)
    }

    async fn get(&self, key: &str) -> Result<ObjectData, StorageError> {
        let objects = self.objects.read().unwrap_or_else(PoisonError::into_inner);
        let object = objects
            .get(key)
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;
        Ok(ObjectData {
            bytes: object.bytes.clone(),
            content_type: object.content_type.clone(),
        })
    }

    async fn put(&self, key: &str, bytes: &[u8], content_type: Option<&str>) -> Result<(), StorageError> {
        if key.is_empty() {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        let mut objects = self.objects.write().unwrap_or_else(PoisonError::into_inner);
        objects.insert(
            key.to_string(),
            StoredObject {
                bytes: bytes.to_vec(),
                content_type: content_type.map(str::to_string),
                last_modified: Utc::now(),
            },
        );
        tracing::debug!("memory: put {} ({} bytes)", key, bytes.len());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let mut objects = self.objects.write().unwrap_or_else(PoisonError::into_inner);
        objects.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let objects = self.objects.read().unwrap_or_else(PoisonError::into_inner);
        Ok(objects.contains_key(key))
    }

    async fn delete_many(&self, keys: &[String]) -> Result<(), StorageError> {
        let mut objects = self.objects.write().unwrap_or_else(PoisonError::into_inner);
        for key in keys {
            objects.remove(key);
        }
        tracing::debug!("memory: batch deleted {} keys", keys.len());
        Ok(())
    }
}
