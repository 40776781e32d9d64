//! Directory view over a flat key namespace
//!
//! Storage only knows keys. Directories are derived: a common prefix in a
//! delimited listing is a directory, and a key ending in `/` is a marker that
//! makes an otherwise implicit directory explicit. Stars and share links live
//! in SQLite next to the backend and are kept in step with it here.

pub mod entry;
pub mod path;

pub use entry::{Children, DirectoryOrigin, Entry, EntryKind};

use crate::db::{self, stars::NewStar, DbPool};
use crate::storage::{Backend, Flavor, ObjectData, StorageError, DELIMITER};
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use path::{name_of, parent_prefix, prefix_for, validate_existing_segment, validate_key, validate_segment};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Share links live for a week unless the caller asks otherwise
pub const DEFAULT_SHARE_EXPIRY_SECS: u64 = 7 * 24 * 60 * 60;
pub const MAX_SHARE_EXPIRY_SECS: u64 = 30 * 24 * 60 * 60;
pub const DOWNLOAD_LINK_EXPIRY_SECS: u64 = 60 * 60;

/// Upper bound on list+delete rounds for one recursive delete or move
const MAX_PAGE_ROUNDS: usize = 10_000;

#[derive(Error, Debug)]
pub enum NamespaceError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    AlreadyExists(String),
    #[error("{0}")]
    Validation(String),
    #[error("Storage error: {0}")]
    Upstream(StorageError),
    #[error("Metadata error: {0}")]
    Metadata(#[from] anyhow::Error),
    #[error("Deleting {key} stopped after {deleted} keys")]
    DeleteIncomplete { key: String, deleted: usize },
}

impl From<StorageError> for NamespaceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => NamespaceError::NotFound(format!("Item not found: {}", key)),
            StorageError::InvalidKey(key) => NamespaceError::Validation(format!("Invalid key: {}", key)),
            other => NamespaceError::Upstream(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, NamespaceError>;

/// Last known metadata supplied by the caller when starring an item
#[derive(Debug, Clone, Default)]
pub struct StarMeta {
    pub file_type: Option<String>,
    pub size_bytes: Option<u64>,
    pub last_modified: Option<DateTime<Utc>>,
}

/// A time-bounded link to a file
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    pub url: String,
    /// Share token, absent for pre-signed backend URLs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

pub struct Namespace {
    backend: Arc<dyn Backend>,
    db: DbPool,
    public_url: String,
}

impl Namespace {
    pub fn new(backend: Arc<dyn Backend>, db: DbPool, public_url: &str) -> Self {
        Self {
            backend,
            db,
            public_url: public_url.trim_end_matches('/').to_string(),
        }
    }

    // ========================================================================
    // LISTING
    // ========================================================================

    /// Immediate directories and files under `segments`, each sorted by name
    pub async fn list_children<S: AsRef<str>>(&self, segments: &[S]) -> Result<Children> {
        for segment in segments {
            validate_existing_segment(segment.as_ref())?;
        }
        let prefix = prefix_for(segments);
        self.require_parent(&prefix, "Directory not found").await?;

        let listing = self.backend.list(&prefix, Some(DELIMITER)).await?;
        let stars = db::stars::starred_keys_under(&self.db, &prefix).await?;

        // Every directory on a filesystem is real; object stores would need a
        // request per prefix to tell
        let listed_origin = match self.backend.flavor() {
            Flavor::Filesystem => Some(DirectoryOrigin::Explicit),
            Flavor::ObjectStore => None,
        };

        let mut directories: BTreeMap<String, Entry> = BTreeMap::new();
        let mut files = Vec::new();

        for common in &listing.common_prefixes {
            if *common == prefix {
                continue;
            }
            directories
                .entry(common.clone())
                .or_insert_with(|| Entry::directory(common, listed_origin, stars.contains(common)));
        }

        for object in &listing.objects {
            if object.key == prefix {
                continue;
            }
            if object.key.ends_with(DELIMITER) {
                // A child marker returned as an object
                directories.insert(
                    object.key.clone(),
                    Entry::directory(&object.key, Some(DirectoryOrigin::Explicit), stars.contains(&object.key)),
                );
                continue;
            }
            files.push(Entry::file(
                &object.key,
                object.size,
                object.last_modified,
                stars.contains(&object.key),
            ));
        }

        if listing.truncated {
            tracing::warn!("listing of {:?} truncated by backend", prefix);
        }

        let mut directories: Vec<Entry> = directories.into_values().collect();
        directories.sort_by(|a, b| a.name.cmp(&b.name));
        files.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(Children { directories, files })
    }

    /// Whether a directory key has a marker, only descendants, or nothing
    pub async fn directory_origin(&self, key: &str) -> Result<Option<DirectoryOrigin>> {
        if self.backend.exists(key).await? {
            return Ok(Some(DirectoryOrigin::Explicit));
        }
        let listing = self.backend.list(key, Some(DELIMITER)).await?;
        if listing.objects.is_empty() && listing.common_prefixes.is_empty() {
            Ok(None)
        } else {
            Ok(Some(DirectoryOrigin::Implicit))
        }
    }

    // ========================================================================
    // CREATE
    // ========================================================================

    /// Write a file under `segments`, replacing any object at the same key
    pub async fn create_file<S: AsRef<str>>(
        &self,
        segments: &[S],
        name: &str,
        content: &[u8],
        content_type: Option<&str>,
    ) -> Result<Entry> {
        for segment in segments {
            validate_existing_segment(segment.as_ref())?;
        }
        validate_segment(name)?;
        let prefix = prefix_for(segments);
        self.require_parent(&prefix, "Parent directory not found").await?;

        let key = format!("{}{}", prefix, name);
        if self.clashes_on_disk(&key).await? {
            return Err(NamespaceError::AlreadyExists(format!("A folder named '{}' already exists", name)));
        }
        let content_type = match content_type {
            Some(ct) if !ct.is_empty() => ct.to_string(),
            _ => mime_guess::from_path(name).first_or_octet_stream().to_string(),
        };

        self.backend.put(&key, content, Some(&content_type)).await?;
        tracing::info!("created file {} ({} bytes)", key, content.len());

        let starred = db::stars::is_starred(&self.db, &key).await?;
        Ok(Entry::file(&key, content.len() as u64, Some(Utc::now()), starred))
    }

    /// Write a directory marker under `segments`
    pub async fn create_directory<S: AsRef<str>>(&self, segments: &[S], name: &str) -> Result<Entry> {
        for segment in segments {
            validate_existing_segment(segment.as_ref())?;
        }
        let name = name.trim();
        if name.is_empty() {
            return Err(NamespaceError::Validation("Folder name is required".into()));
        }
        validate_segment(name)?;
        let prefix = prefix_for(segments);
        self.require_parent(&prefix, "Parent directory not found").await?;

        let key = format!("{}{}{}", prefix, name, DELIMITER);
        if self.backend.flavor() == Flavor::Filesystem && self.backend.exists(&key).await? {
            return Err(NamespaceError::AlreadyExists(format!("Folder '{}' already exists", name)));
        }
        if self.clashes_on_disk(&key).await? {
            return Err(NamespaceError::AlreadyExists(format!("A file named '{}' already exists", name)));
        }

        self.backend.put(&key, &[], None).await?;
        tracing::info!("created folder {}", key);

        let starred = db::stars::is_starred(&self.db, &key).await?;
        Ok(Entry::directory(&key, Some(DirectoryOrigin::Explicit), starred))
    }

    // ========================================================================
    // DELETE / RENAME
    // ========================================================================

    /// Delete a file, or a directory with everything beneath it, together
    /// with the stars and share links that point into it.
    pub async fn delete_item(&self, key: &str) -> Result<()> {
        validate_key(key)?;

        if EntryKind::of_key(key) == EntryKind::Directory {
            let deleted = self.delete_prefix(key).await?;
            if deleted == 0 && self.backend.flavor() == Flavor::Filesystem {
                return Err(NamespaceError::NotFound(format!("Folder not found: {}", key)));
            }
            let stars = db::stars::delete_stars_under(&self.db, key).await?;
            let shares = db::shares::delete_shares_under(&self.db, key).await?;
            tracing::info!(
                "deleted folder {} ({} keys, {} stars, {} shares)",
                key,
                deleted,
                stars,
                shares
            );
        } else {
            self.backend.delete(key).await?;
            db::stars::remove_star(&self.db, key).await?;
            db::shares::delete_shares_for_key(&self.db, key).await?;
            tracing::info!("deleted file {}", key);
        }

        Ok(())
    }

    /// Remove every key starting with `prefix`.
    ///
    /// Each round re-issues the same listing and deletes the whole page, so
    /// the loop relies on a page never coming back once deleted. Rounds are
    /// capped and a page that survives its own delete stops the loop.
    async fn delete_prefix(&self, prefix: &str) -> Result<usize> {
        let mut deleted = 0;
        let mut previous: Vec<String> = Vec::new();

        for round in 0..MAX_PAGE_ROUNDS {
            let page = self.backend.list(prefix, None).await?;
            let keys: Vec<String> = page.objects.into_iter().map(|o| o.key).collect();
            if keys.is_empty() {
                return Ok(deleted);
            }
            if keys == previous {
                tracing::warn!("delete of {} made no progress in round {}", prefix, round);
                return Err(NamespaceError::DeleteIncomplete {
                    key: prefix.to_string(),
                    deleted,
                });
            }

            self.backend.delete_many(&keys).await?;
            deleted += keys.len();
            tracing::debug!("delete {}: round {} removed {} keys", prefix, round, keys.len());

            if !page.truncated {
                return Ok(deleted);
            }
            previous = keys;
        }

        tracing::warn!("delete of {} hit the round limit", prefix);
        Err(NamespaceError::DeleteIncomplete {
            key: prefix.to_string(),
            deleted,
        })
    }

    /// Rename a file or directory in place, keeping its parent.
    pub async fn rename_item(&self, key: &str, new_name: &str) -> Result<Entry> {
        validate_key(key)?;
        let new_name = new_name.trim();
        validate_segment(new_name)?;

        let kind = EntryKind::of_key(key);
        let mut new_key = format!("{}{}", parent_prefix(key), new_name);
        if kind == EntryKind::Directory {
            new_key.push(DELIMITER);
        }
        if new_key == key {
            return Err(NamespaceError::Validation("New name matches the current name".into()));
        }

        match kind {
            EntryKind::File => {
                if !self.backend.exists(key).await? {
                    return Err(NamespaceError::NotFound(format!("File not found: {}", key)));
                }
                if self.clashes_on_disk(&new_key).await? || self.backend.exists(&new_key).await? {
                    return Err(NamespaceError::AlreadyExists(format!("'{}' already exists", new_name)));
                }

                let data = self.backend.get(key).await?;
                self.backend.put(&new_key, &data.bytes, data.content_type.as_deref()).await?;
                self.backend.delete(key).await?;

                db::stars::rekey_star(&self.db, key, &new_key).await?;
                db::shares::rekey_shares(&self.db, key, &new_key).await?;
                tracing::info!("renamed {} -> {}", key, new_key);

                let starred = db::stars::is_starred(&self.db, &new_key).await?;
                Ok(Entry::file(&new_key, data.bytes.len() as u64, Some(Utc::now()), starred))
            }
            EntryKind::Directory => {
                let Some(origin) = self.directory_origin(key).await? else {
                    return Err(NamespaceError::NotFound(format!("Folder not found: {}", key)));
                };
                if self.clashes_on_disk(&new_key).await? || self.directory_origin(&new_key).await?.is_some() {
                    return Err(NamespaceError::AlreadyExists(format!("'{}' already exists", new_name)));
                }

                let moved = self.move_prefix(key, &new_key).await?;
                db::stars::rekey_stars_under(&self.db, key, &new_key).await?;
                db::shares::rekey_shares_under(&self.db, key, &new_key).await?;
                tracing::info!("renamed {} -> {} ({} keys)", key, new_key, moved);

                let starred = db::stars::is_starred(&self.db, &new_key).await?;
                Ok(Entry::directory(&new_key, Some(origin), starred))
            }
        }
    }

    /// Copy every key under `old_prefix` to `new_prefix`, deleting each page
    /// once it is copied. Same re-query contract as [`Self::delete_prefix`].
    async fn move_prefix(&self, old_prefix: &str, new_prefix: &str) -> Result<usize> {
        let mut moved = 0;
        let mut previous: Vec<String> = Vec::new();

        for _ in 0..MAX_PAGE_ROUNDS {
            let page = self.backend.list(old_prefix, None).await?;
            let keys: Vec<String> = page.objects.into_iter().map(|o| o.key).collect();
            if keys.is_empty() {
                return Ok(moved);
            }
            if keys == previous {
                break;
            }

            // Ascending order creates parent directories before their children
            for key in &keys {
                let target = format!("{}{}", new_prefix, &key[old_prefix.len()..]);
                if key.ends_with(DELIMITER) {
                    self.backend.put(&target, &[], None).await?;
                } else {
                    let data = self.backend.get(key).await?;
                    self.backend.put(&target, &data.bytes, data.content_type.as_deref()).await?;
                }
            }
            self.backend.delete_many(&keys).await?;
            moved += keys.len();

            if !page.truncated {
                return Ok(moved);
            }
            previous = keys;
        }

        tracing::warn!("move of {} stopped after {} keys", old_prefix, moved);
        Err(NamespaceError::DeleteIncomplete {
            key: old_prefix.to_string(),
            deleted: moved,
        })
    }

    // ========================================================================
    // STARS
    // ========================================================================

    /// Set or clear the star on a key. Storage is not consulted.
    pub async fn toggle_star(&self, kind: EntryKind, key: &str, starred: bool, meta: StarMeta) -> Result<Entry> {
        validate_key(key)?;
        if EntryKind::of_key(key) != kind {
            return Err(NamespaceError::Validation("Item type does not match its key".into()));
        }

        if starred {
            let file_type = match (&meta.file_type, kind) {
                (Some(t), _) => t.clone(),
                (None, EntryKind::Directory) => "folder".to_string(),
                (None, EntryKind::File) => entry::file_type_for(name_of(key)).to_string(),
            };
            let record = db::stars::upsert_star(
                &self.db,
                &NewStar {
                    key,
                    kind,
                    file_type: &file_type,
                    size_bytes: meta.size_bytes.and_then(|s| i64::try_from(s).ok()),
                    last_modified: meta.last_modified,
                },
            )
            .await?;
            tracing::debug!("starred {}", key);
            return Ok(Entry::from_star(&record));
        }

        db::stars::remove_star(&self.db, key).await?;
        tracing::debug!("unstarred {}", key);
        let mut entry = Entry::described(kind, key, meta.size_bytes, meta.last_modified, false);
        if let Some(file_type) = meta.file_type {
            entry.file_type = file_type;
        }
        Ok(entry)
    }

    /// Every starred item as last recorded, without checking storage
    pub async fn starred(&self) -> Result<Children> {
        let mut children = Children::default();
        for record in db::stars::list_stars(&self.db).await? {
            let entry = Entry::from_star(&record);
            match record.kind {
                EntryKind::Directory => children.directories.push(entry),
                EntryKind::File => children.files.push(entry),
            }
        }
        children.directories.sort_by(|a, b| a.name.cmp(&b.name));
        children.files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(children)
    }

    // ========================================================================
    // SHARING / DOWNLOAD
    // ========================================================================

    /// Mint a share link for a file. A new token is issued on every call.
    pub async fn create_share_link(&self, key: &str, expires_in: Option<u64>, created_by: Option<Uuid>) -> Result<Link> {
        self.require_file(key, "Only files can be shared").await?;

        let expires_in = expires_in.unwrap_or(DEFAULT_SHARE_EXPIRY_SECS);
        if expires_in == 0 || expires_in > MAX_SHARE_EXPIRY_SECS {
            return Err(NamespaceError::Validation(format!(
                "expiresIn must be between 1 and {} seconds",
                MAX_SHARE_EXPIRY_SECS
            )));
        }

        let link = self.mint_share(key, expires_in, created_by).await?;
        tracing::info!("shared {} until {}", key, link.expires_at);
        Ok(link)
    }

    /// One-hour download link: pre-signed when the backend can, a share
    /// token otherwise.
    pub async fn download_link(&self, key: &str, created_by: Option<Uuid>) -> Result<Link> {
        self.require_file(key, "Folders cannot be downloaded").await?;

        let presigned = self
            .backend
            .presign_get(key, DOWNLOAD_LINK_EXPIRY_SECS as u32)
            .await?;
        match presigned {
            Some(url) => Ok(Link {
                url,
                token: None,
                expires_at: Utc::now() + Duration::seconds(DOWNLOAD_LINK_EXPIRY_SECS as i64),
            }),
            None => self.mint_share(key, DOWNLOAD_LINK_EXPIRY_SECS, created_by).await,
        }
    }

    /// Look up a live share token, purging expired ones first
    pub async fn resolve_share(&self, token: &str) -> Result<db::shares::ShareLink> {
        let purged = db::shares::purge_expired(&self.db).await?;
        if purged > 0 {
            tracing::debug!("purged {} expired share links", purged);
        }

        db::shares::get_active_share(&self.db, token)
            .await?
            .ok_or_else(|| NamespaceError::NotFound("Share link not found or expired".into()))
    }

    pub async fn read_file(&self, key: &str) -> Result<ObjectData> {
        validate_key(key)?;
        if EntryKind::of_key(key) == EntryKind::Directory {
            return Err(NamespaceError::Validation("Folders cannot be downloaded".into()));
        }

        let mut data = self.backend.get(key).await?;
        if data.content_type.is_none() {
            data.content_type = Some(mime_guess::from_path(key).first_or_octet_stream().to_string());
        }
        Ok(data)
    }

    // ========================================================================
    // HELPERS
    // ========================================================================

    async fn mint_share(&self, key: &str, expires_in: u64, created_by: Option<Uuid>) -> Result<Link> {
        let token = generate_share_token();
        let expires_at = Utc::now() + Duration::seconds(expires_in as i64);
        let share = db::shares::create_share(&self.db, &token, key, created_by, expires_at).await?;

        Ok(Link {
            url: format!("{}/api/shared/{}", self.public_url, share.token),
            token: Some(share.token),
            expires_at,
        })
    }

    /// A file and a folder cannot share a name on a filesystem. True when
    /// `key` names one and the other already exists.
    async fn clashes_on_disk(&self, key: &str) -> Result<bool> {
        if self.backend.flavor() != Flavor::Filesystem {
            return Ok(false);
        }
        let other = match key.strip_suffix(DELIMITER) {
            Some(file_key) => file_key.to_string(),
            None => format!("{}{}", key, DELIMITER),
        };
        Ok(self.backend.exists(&other).await?)
    }

    /// Filesystem directories must exist before anything is listed or
    /// written in them
    async fn require_parent(&self, prefix: &str, message: &str) -> Result<()> {
        if prefix.is_empty() || self.backend.flavor() != Flavor::Filesystem {
            return Ok(());
        }
        if !self.backend.exists(prefix).await? {
            return Err(NamespaceError::NotFound(message.to_string()));
        }
        Ok(())
    }

    async fn require_file(&self, key: &str, directory_message: &str) -> Result<()> {
        validate_key(key)?;
        if EntryKind::of_key(key) == EntryKind::Directory {
            return Err(NamespaceError::Validation(directory_message.to_string()));
        }
        if !self.backend.exists(key).await? {
            return Err(NamespaceError::NotFound(format!("File not found: {}", key)));
        }
        Ok(())
    }
}

/// Generate a random share token (URL-safe)
fn generate_share_token() -> String {
    let bytes: [u8; 24] = rand::random();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}
