//! Public share access
//!
//! Share links are minted by the file routes; this resolves a token and
//! serves the file it points at without authentication.

use crate::api::AppState;
use axum::{
    extract::{Path, State},
    response::Response,
    routing::get,
    Router,
};

use super::error::AppError;
use super::files::attachment_response;

pub fn sharing_routes() -> Router<AppState> {
    Router::new().route("/shared/:token", get(access_share))
}

async fn access_share(State(state): State<AppState>, Path(token): Path<String>) -> Result<Response, AppError> {
    let share = state.namespace.resolve_share(&token).await?;
    let data = state.namespace.read_file(&share.key).await?;

    tracing::info!("share {}... served {}", token.chars().take(6).collect::<String>(), share.key);
    attachment_response(&share.key, data)
}
