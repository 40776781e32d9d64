//! File and folder routes
//!
//! Listing, upload, folder creation, delete, rename, download and share links.

use crate::api::AppState;
use crate::namespace::Link;
use crate::storage::ObjectData;
use axum::{
    body::Body,
    extract::{Multipart, Path, Query, RawQuery, State},
    http::{header, HeaderMap, StatusCode},
    response::Response,
    routing::{delete, get, post, MethodRouter},
    Json, Router,
};

use super::error::{attachment_filename, extract_user_id, AppError};
use super::types::{
    path_segments, CreateFolderRequest, EntryResponse, ListResponse, MessageResponse, RenameRequest, ShareQuery,
    UploadResponse,
};

// ============================================================================
// ROUTES
// ============================================================================

pub fn file_routes() -> Router<AppState> {
    Router::new()
        .route("/files", get(list_files))
        .route("/files/upload", post(upload_files).merge(item_methods("upload")))
        .route("/files/folder", post(create_folder).merge(item_methods("folder")))
        .route("/files/:key", delete(delete_item).patch(rename_item))
        .route("/files/content/:key", get(file_content))
        .route("/files/download/:key", get(download_link))
        .route("/files/share/:key", get(share_link))
}

/// Delete and rename for a root-level item whose name is taken by a static
/// route, so `/files/upload` still reaches a file called `upload`
fn item_methods(name: &'static str) -> MethodRouter<AppState> {
    delete(move |state: State<AppState>, headers: HeaderMap| {
        delete_item(state, headers, Path(name.to_string()))
    })
    .patch(
        move |state: State<AppState>, headers: HeaderMap, req: Json<RenameRequest>| {
            rename_item(state, headers, Path(name.to_string()), req)
        },
    )
}

// ============================================================================
// HANDLERS
// ============================================================================

async fn list_files(
    State(state): State<AppState>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Result<Json<ListResponse>, AppError> {
    let _user_id = extract_user_id(&state, &headers)?;

    let segments = path_segments(query.as_deref());
    let children = state.namespace.list_children(&segments).await?;
    Ok(Json(children.into()))
}

/// A file part held in memory until the whole form has been read
struct PendingFile {
    name: String,
    content_type: Option<String>,
    bytes: Vec<u8>,
}

/// Multipart upload: a `path` field holding a JSON array of segments and
/// one or more `file` parts. Files are written one at a time; a file that
/// fails is logged and skipped, earlier files stay written.
async fn upload_files(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), AppError> {
    let _user_id = extract_user_id(&state, &headers)?;

    let mut segments: Vec<String> = Vec::new();
    let mut pending: Vec<PendingFile> = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("path") => {
                let raw = field.text().await.map_err(multipart_error)?;
                if !raw.trim().is_empty() {
                    segments = serde_json::from_str(&raw)
                        .map_err(|_| AppError::BadRequest("path must be a JSON array of strings".into()))?;
                }
            }
            Some("file") | Some("files") => {
                let name = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| AppError::BadRequest("File part is missing a file name".into()))?;
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(multipart_error)?;
                pending.push(PendingFile {
                    name,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            }
            _ => {}
        }
    }

    if pending.is_empty() {
        return Err(AppError::BadRequest("No file provided".into()));
    }

    let total = pending.len();
    let mut written = Vec::with_capacity(total);
    for file in pending {
        match state
            .namespace
            .create_file(&segments, &file.name, &file.bytes, file.content_type.as_deref())
            .await
        {
            Ok(entry) => written.push(entry),
            Err(e) => tracing::warn!("upload of {:?} skipped: {}", file.name, e),
        }
    }

    if written.is_empty() {
        return Err(AppError::Internal(format!("none of {} uploaded files could be written", total)));
    }

    let message = if written.len() == total {
        "Files uploaded successfully".to_string()
    } else {
        format!("Uploaded {} of {} files", written.len(), total)
    };
    Ok((StatusCode::CREATED, Json(UploadResponse { files: written, message })))
}

async fn create_folder(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateFolderRequest>,
) -> Result<(StatusCode, Json<EntryResponse>), AppError> {
    let _user_id = extract_user_id(&state, &headers)?;

    let item = state.namespace.create_directory(&req.path, &req.folder_name).await?;
    Ok((
        StatusCode::CREATED,
        Json(EntryResponse {
            item,
            message: "Folder created successfully".into(),
        }),
    ))
}

async fn delete_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(key): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    let _user_id = extract_user_id(&state, &headers)?;

    state.namespace.delete_item(&key).await?;
    Ok(Json(MessageResponse {
        message: "Item deleted successfully".into(),
    }))
}

async fn rename_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(key): Path<String>,
    Json(req): Json<RenameRequest>,
) -> Result<Json<EntryResponse>, AppError> {
    let _user_id = extract_user_id(&state, &headers)?;

    let item = state.namespace.rename_item(&key, &req.name).await?;
    Ok(Json(EntryResponse {
        item,
        message: "Item renamed successfully".into(),
    }))
}

async fn file_content(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(key): Path<String>,
) -> Result<Response, AppError> {
    let _user_id = extract_user_id(&state, &headers)?;

    let data = state.namespace.read_file(&key).await?;
    attachment_response(&key, data)
}

async fn download_link(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(key): Path<String>,
) -> Result<Json<Link>, AppError> {
    let user_id = extract_user_id(&state, &headers)?;

    let link = state.namespace.download_link(&key, Some(user_id)).await?;
    Ok(Json(link))
}

async fn share_link(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(key): Path<String>,
    Query(query): Query<ShareQuery>,
) -> Result<Json<Link>, AppError> {
    let user_id = extract_user_id(&state, &headers)?;

    let link = state
        .namespace
        .create_share_link(&key, query.expires_in, Some(user_id))
        .await?;
    Ok(Json(link))
}

// ============================================================================
// HELPERS
// ============================================================================

/// Serve file bytes as a download
pub(super) fn attachment_response(key: &str, data: ObjectData) -> Result<Response, AppError> {
    let content_type = data
        .content_type
        .unwrap_or_else(|| "application/octet-stream".to_string());

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, data.bytes.len().to_string())
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", attachment_filename(key)),
        )
        .body(Body::from(data.bytes))
        .map_err(|e| AppError::Internal(format!("Failed to build response: {}", e)))
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge("Upload exceeds the size limit".into())
    } else {
        AppError::BadRequest(format!("Invalid multipart body: {}", err.body_text()))
    }
}

