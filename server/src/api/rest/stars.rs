//! Star routes

use crate::api::AppState;
use crate::namespace::{EntryKind, StarMeta};
use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::{get, patch},
    Json, Router,
};

use super::error::{extract_user_id, AppError};
use super::types::{EntryResponse, ListResponse, StarRequest};

pub fn star_routes() -> Router<AppState> {
    Router::new()
        .route("/star/:kind/:key", patch(toggle_star))
        .route("/starred", get(list_starred))
}

async fn toggle_star(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((kind, key)): Path<(String, String)>,
    Json(req): Json<StarRequest>,
) -> Result<Json<EntryResponse>, AppError> {
    let _user_id = extract_user_id(&state, &headers)?;

    let kind: EntryKind = kind.parse().map_err(AppError::BadRequest)?;
    let meta = StarMeta {
        file_type: req.file_type,
        size_bytes: req.size,
        last_modified: req.last_modified,
    };

    let item = state.namespace.toggle_star(kind, &key, req.starred, meta).await?;
    let message = if req.starred { "Item starred" } else { "Item unstarred" };
    Ok(Json(EntryResponse {
        item,
        message: message.into(),
    }))
}

async fn list_starred(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<ListResponse>, AppError> {
    let _user_id = extract_user_id(&state, &headers)?;

    let children = state.namespace.starred().await?;
    Ok(Json(children.into()))
}
