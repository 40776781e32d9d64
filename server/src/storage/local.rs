use super::{Backend, Flavor, Listing, ObjectData, ObjectMeta, StorageError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

const TEMP_SUFFIX: &str = ".shelf-tmp";

/// Filesystem-backed storage rooted at a directory.
///
/// Directory marker keys (`a/b/`) are real directories, file keys are regular
/// files. Every directory on disk is therefore explicit.
pub struct LocalBackend {
    base_path: PathBuf,
}

impl LocalBackend {
    /// Create a local store at the given path
    pub fn new<P: AsRef<Path>>(base_path: P) -> Result<Self, StorageError> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path)?;
        Ok(Self { base_path })
    }

    /// Map a key to its location on disk, rejecting anything that could
    /// escape the base directory.
    fn object_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        resolve(&self.base_path, key)
    }
}

fn resolve(base: &Path, key: &str) -> Result<PathBuf, StorageError> {
    let trimmed = key.strip_suffix('/').unwrap_or(key);
    if trimmed.is_empty() {
        return Err(StorageError::InvalidKey(key.to_string()));
    }

    let mut path = base.to_path_buf();
    for segment in trimmed.split('/') {
        let invalid = segment.is_empty()
            || segment == "."
            || segment == ".."
            || segment.ends_with(TEMP_SUFFIX)
            || segment.contains('\\')
            || segment.chars().any(|c| c.is_control());
        if invalid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        path.push(segment);
    }
    Ok(path)
}

fn not_found_as(key: &str, err: std::io::Error) -> StorageError {
    if err.kind() == ErrorKind::NotFound {
        StorageError::NotFound(key.to_string())
    } else {
        StorageError::Io(err)
    }
}

fn modified(metadata: &fs::Metadata) -> Option<DateTime<Utc>> {
    metadata.modified().ok().map(DateTime::<Utc>::from)
}

/// Run blocking filesystem work off the async executor
async fn blocking<T, F>(work: F) -> Result<T, StorageError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, StorageError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| StorageError::Io(std::io::Error::new(ErrorKind::Other, e.to_string())))?
}

fn list_blocking(base: &Path, prefix: &str, delimiter: Option<char>) -> Result<Listing, StorageError> {
    let (dir_part, name_part) = match prefix.rfind('/') {
        Some(idx) => (&prefix[..=idx], &prefix[idx + 1..]),
        None => ("", prefix),
    };
    let dir = if dir_part.is_empty() {
        base.to_path_buf()
    } else {
        resolve(base, dir_part)?
    };

    let mut listing = Listing::default();
    if !dir.is_dir() {
        return Ok(listing);
    }

    match delimiter {
        Some(_) => {
            for entry in fs::read_dir(&dir)? {
                let entry = entry?;
                let Ok(name) = entry.file_name().into_string() else {
                    continue;
                };
                if name.ends_with(TEMP_SUFFIX) || !name.starts_with(name_part) {
                    continue;
                }
                let metadata = entry.metadata()?;
                if metadata.is_dir() {
                    listing.common_prefixes.push(format!("{}{}/", dir_part, name));
                } else {
                    listing.objects.push(ObjectMeta {
                        key: format!("{}{}", dir_part, name),
                        size: metadata.len(),
                        last_modified: modified(&metadata),
                    });
                }
            }
            listing.common_prefixes.sort();
        }
        None => {
            for entry in walkdir::WalkDir::new(&dir).into_iter().filter_map(|e| e.ok()) {
                let Ok(relative) = entry.path().strip_prefix(base) else {
                    continue;
                };
                let segments: Option<Vec<&str>> = relative.components().map(|c| c.as_os_str().to_str()).collect();
                let Some(segments) = segments else {
                    continue;
                };
                if segments.is_empty() || segments.iter().any(|s| s.ends_with(TEMP_SUFFIX)) {
                    continue;
                }

                let is_dir = entry.file_type().is_dir();
                let mut key = segments.join("/");
                if is_dir {
                    key.push('/');
                }
                if !key.starts_with(prefix) {
                    continue;
                }

                let metadata = entry.metadata().map_err(|e| StorageError::Io(e.into()))?;
                listing.objects.push(ObjectMeta {
                    key,
                    size: if is_dir { 0 } else { metadata.len() },
                    last_modified: modified(&metadata),
                });
            }
        }
    }

    listing.objects.sort_by(|a, b| a.key.cmp(&b.key));
    Ok(listing)
}

fn delete_blocking(base: &Path, key: &str) -> Result<(), StorageError> {
    let path = resolve(base, key)?;
    let result = if key.ends_with('/') {
        fs::remove_dir(&path)
    } else {
        fs::remove_file(&path)
    };
    result.map_err(|e| not_found_as(key, e))?;
    tracing::debug!("local: deleted {}", key);
    Ok(())
}

#[async_trait]
impl Backend for LocalBackend {
    fn flavor(&self) -> Flavor {
        Flavor::Filesystem
    }

    fn name(&self) -> &'static str {
        "local"
    }

    async fn list(&self, prefix: &str, delimiter: Option<char>) -> Result<Listing, StorageError> {
        let base = self.base_path.clone();
        let prefix = prefix.to_string();
        blocking(move || list_blocking(&base, &prefix, delimiter)).await
    }

    async fn get(&self, key: &str) -> Result<ObjectData, StorageError> {
        if key.ends_with('/') {
            return Err(StorageError::NotFound(key.to_string()));
        }
        let path = self.object_path(key)?;
        let owned_key = key.to_string();
        let bytes = blocking(move || fs::read(&path).map_err(|e| not_found_as(&owned_key, e))).await?;
        tracing::debug!("local: read {} ({} bytes)", key, bytes.len());
        Ok(ObjectData {
            bytes,
            content_type: Some(mime_guess::from_path(key).first_or_octet_stream().to_string()),
        })
    }

    async fn put(&self, key: &str, bytes: &[u8], _content_type: Option<&str>) -> Result<(), StorageError> {
        let path = self.object_path(key)?;

        if key.ends_with('/') {
            blocking(move || fs::create_dir_all(&path).map_err(StorageError::from)).await?;
            tracing::debug!("local: created directory {}", key);
            return Ok(());
        }

        let content = bytes.to_vec();
        blocking(move || {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }

            // Write through a temp file, then rename into place
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let temp_path = path.with_file_name(format!(".{}{}", file_name, TEMP_SUFFIX));
            {
                let mut file = File::create(&temp_path)?;
                file.write_all(&content)?;
                file.sync_all()?;
            }
            fs::rename(&temp_path, &path)?;
            Ok(())
        })
        .await?;

        tracing::debug!("local: wrote {} ({} bytes)", key, bytes.len());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let base = self.base_path.clone();
        let key = key.to_string();
        blocking(move || delete_blocking(&base, &key)).await
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let path = self.object_path(key)?;
        let want_dir = key.ends_with('/');
        blocking(move || {
            Ok(match fs::metadata(&path) {
                Ok(metadata) => metadata.is_dir() == want_dir,
                Err(_) => false,
            })
        })
        .await
    }

    async fn delete_many(&self, keys: &[String]) -> Result<(), StorageError> {
        let base = self.base_path.clone();
        let mut keys = keys.to_vec();
        blocking(move || {
            // Descending order puts every child before its parent directory
            keys.sort_by(|a, b| b.cmp(a));
            for key in &keys {
                match delete_blocking(&base, key) {
                    Ok(()) | Err(StorageError::NotFound(_)) => {}
                    Err(e) => return Err(e),
                }
            }
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_local_store_roundtrip() {
        let temp = tempdir().unwrap();
        let store = LocalBackend::new(temp.path()).unwrap();

        store.put("docs/", b"", None).await.unwrap();
        store.put("docs/report.pdf", b"%PDF-1.4", None).await.unwrap();

        assert!(store.exists("docs/").await.unwrap());
        assert!(store.exists("docs/report.pdf").await.unwrap());
        assert!(!store.exists("docs/report.pdf/").await.unwrap());

        let data = store.get("docs/report.pdf").await.unwrap();
        assert_eq!(data.bytes, b"%PDF-1.4");
        assert_eq!(data.content_type.as_deref(), Some("application/pdf"));

        store.delete("docs/report.pdf").await.unwrap();
        assert!(matches!(
            store.delete("docs/report.pdf").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_local_listing() {
        let temp = tempdir().unwrap();
        let store = LocalBackend::new(temp.path()).unwrap();
        for key in ["docs/", "docs/report.pdf", "docs/img/", "docs/img/logo.png", "readme.md"] {
            store.put(key, b"x", None).await.unwrap();
        }

        let root = store.list("", Some('/')).await.unwrap();
        assert_eq!(root.common_prefixes, vec!["docs/"]);
        assert_eq!(root.objects.len(), 1);
        assert_eq!(root.objects[0].key, "readme.md");

        let all: Vec<String> = store
            .list("docs/", None)
            .await
            .unwrap()
            .objects
            .into_iter()
            .map(|o| o.key)
            .collect();
        assert_eq!(all, vec!["docs/", "docs/img/", "docs/img/logo.png", "docs/report.pdf"]);

        // Listing a directory that does not exist is empty, not an error
        let missing = store.list("nope/", Some('/')).await.unwrap();
        assert!(missing.objects.is_empty() && missing.common_prefixes.is_empty());
    }

    #[tokio::test]
    async fn test_delete_many_removes_children_first() {
        let temp = tempdir().unwrap();
        let store = LocalBackend::new(temp.path()).unwrap();
        for key in ["a/", "a/b/", "a/b/c.txt", "a/d.txt"] {
            store.put(key, b"x", None).await.unwrap();
        }

        let keys: Vec<String> = store.list("a/", None).await.unwrap().objects.into_iter().map(|o| o.key).collect();
        store.delete_many(&keys).await.unwrap();
        assert!(!temp.path().join("a").exists());
    }

    #[test]
    fn test_rejects_escaping_keys() {
        let base = Path::new("/srv/shelf");
        assert!(resolve(base, "../etc/passwd").is_err());
        assert!(resolve(base, "a//b").is_err());
        assert!(resolve(base, "a\\b").is_err());
        assert!(resolve(base, "").is_err());
        assert!(resolve(base, "/").is_err());
        assert_eq!(resolve(base, "a/b/").unwrap(), base.join("a").join("b"));
    }
}
