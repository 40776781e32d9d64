//! Shared types for REST API
//!
//! Common request/response structs used across multiple endpoint modules.

use crate::namespace::{Children, Entry};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// LISTINGS
// ============================================================================

#[derive(Serialize)]
pub struct ListResponse {
    pub directories: Vec<Entry>,
    pub files: Vec<Entry>,
}

impl From<Children> for ListResponse {
    fn from(children: Children) -> Self {
        Self {
            directories: children.directories,
            files: children.files,
        }
    }
}

/// Path segments from a query string carrying repeated `path` parameters
/// (`?path=docs&path=img`)
pub fn path_segments(query: Option<&str>) -> Vec<String> {
    let Some(query) = query else {
        return Vec::new();
    };
    url::form_urlencoded::parse(query.as_bytes())
        .filter(|(name, _)| name == "path")
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
        .collect()
}

// ============================================================================
// FILES
// ============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFolderRequest {
    pub folder_name: String,
    #[serde(default)]
    pub path: Vec<String>,
}

#[derive(Deserialize)]
pub struct RenameRequest {
    pub name: String,
}

#[derive(Serialize)]
pub struct EntryResponse {
    pub item: Entry,
    pub message: String,
}

#[derive(Serialize)]
pub struct UploadResponse {
    pub files: Vec<Entry>,
    pub message: String,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareQuery {
    pub expires_in: Option<u64>,
}

// ============================================================================
// STARS
// ============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StarRequest {
    pub starred: bool,
    #[serde(rename = "type")]
    pub file_type: Option<String>,
    /// Size in bytes
    pub size: Option<u64>,
    pub last_modified: Option<DateTime<Utc>>,
}
