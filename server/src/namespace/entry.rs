//! Entries of the derived directory view

use super::path::name_of;
use crate::db::stars::StarRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

impl EntryKind {
    /// Kind implied by a key: directory keys end with the delimiter
    pub fn of_key(key: &str) -> Self {
        if key.ends_with('/') {
            EntryKind::Directory
        } else {
            EntryKind::File
        }
    }
}

impl FromStr for EntryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(EntryKind::File),
            "directory" | "folder" => Ok(EntryKind::Directory),
            other => Err(format!("Invalid item type: {}", other)),
        }
    }
}

/// Whether a directory has its own marker object or only exists because
/// deeper keys share its prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectoryOrigin {
    Explicit,
    Implicit,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub id: String,
    pub key: String,
    pub name: String,
    pub kind: EntryKind,
    #[serde(rename = "type")]
    pub file_type: String,
    /// Human readable size, `-` for directories
    pub size: String,
    pub size_bytes: Option<u64>,
    pub last_modified: Option<DateTime<Utc>>,
    pub starred: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<DirectoryOrigin>,
}

impl Entry {
    pub fn file(key: &str, size: u64, last_modified: Option<DateTime<Utc>>, starred: bool) -> Self {
        let name = name_of(key).to_string();
        Self {
            id: key.to_string(),
            key: key.to_string(),
            file_type: file_type_for(&name).to_string(),
            name,
            kind: EntryKind::File,
            size: format_size(size),
            size_bytes: Some(size),
            last_modified,
            starred,
            origin: None,
        }
    }

    pub fn directory(key: &str, origin: Option<DirectoryOrigin>, starred: bool) -> Self {
        Self {
            id: key.to_string(),
            key: key.to_string(),
            name: name_of(key).to_string(),
            kind: EntryKind::Directory,
            file_type: "folder".to_string(),
            size: "-".to_string(),
            size_bytes: None,
            last_modified: None,
            starred,
            origin,
        }
    }

    /// Entry built from caller-supplied metadata; an unknown file size
    /// renders as `-`
    pub fn described(
        kind: EntryKind,
        key: &str,
        size_bytes: Option<u64>,
        last_modified: Option<DateTime<Utc>>,
        starred: bool,
    ) -> Self {
        match kind {
            EntryKind::Directory => Entry::directory(key, None, starred),
            EntryKind::File => {
                let mut entry = Entry::file(key, size_bytes.unwrap_or(0), last_modified, starred);
                if size_bytes.is_none() {
                    entry.size = "-".to_string();
                    entry.size_bytes = None;
                }
                entry
            }
        }
    }

    /// Rebuild an entry from the metadata recorded when it was starred
    pub fn from_star(record: &StarRecord) -> Self {
        let size_bytes = record.size_bytes.and_then(|s| u64::try_from(s).ok());
        let mut entry = Entry::described(record.kind, &record.key, size_bytes, record.last_modified, true);
        entry.file_type = record.file_type.clone();
        entry
    }
}

/// Immediate children of a directory
#[derive(Debug, Clone, Default, Serialize)]
pub struct Children {
    pub directories: Vec<Entry>,
    pub files: Vec<Entry>,
}

/// Category of a file, from its lowercased extension
pub fn file_type_for(name: &str) -> &'static str {
    let extension = match name.rsplit_once('.') {
        Some((_, ext)) => ext.to_ascii_lowercase(),
        None => return "file",
    };

    match extension.as_str() {
        "jpg" | "jpeg" | "png" | "gif" | "bmp" => "image",
        "mp4" | "mov" | "avi" | "wmv" => "video",
        "mp3" | "wav" | "ogg" => "audio",
        "pdf" => "pdf",
        "zip" | "rar" | "tar" | "gz" => "archive",
        "html" | "css" | "js" | "ts" | "jsx" | "tsx" | "json" => "code",
        "doc" | "docx" => "document",
        "xls" | "xlsx" => "spreadsheet",
        "ppt" | "pptx" => "presentation",
        _ => "file",
    }
}

const SIZE_UNITS: [&str; 5] = ["Bytes", "KB", "MB", "GB", "TB"];

/// Render a byte count on a 1024 scale: `0 Bytes`, `512 Bytes`, `1.5 KB`, `1.0 MB`
pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{} Bytes", bytes);
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    // 1023.96 KB would print as 1024.0 KB
    if (value * 10.0).round() / 10.0 >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    format!("{:.1} {}", value, SIZE_UNITS[unit])
}
