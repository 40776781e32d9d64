//! Authentication routes
//!
//! Handles user registration, login and token refresh.

use crate::api::AppState;
use crate::auth;
use crate::db::users::{self, User};
use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::{Deserialize, Serialize};

use super::error::AppError;

// ============================================================================
// ROUTES
// ============================================================================

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh_token))
}

// ============================================================================
// TYPES
// ============================================================================

#[derive(Deserialize)]
struct RegisterRequest {
    name: String,
    email: String,
    password: String,
}

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest {
    #[serde(alias = "refresh_token")]
    refresh_token: String,
}

#[derive(Serialize)]
struct UserResponse {
    id: String,
    name: String,
    email: String,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.to_string(),
            name: user.name.clone(),
            email: user.email.clone(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthResponse {
    token: String,
    refresh_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<UserResponse>,
    /// Access token lifetime in seconds
    expires_in: i64,
}

fn issue_tokens(state: &AppState, user_id: uuid::Uuid, user: Option<UserResponse>) -> Result<AuthResponse, AppError> {
    let token = auth::create_access_token(&state.config.jwt_secret, user_id)?;
    let refresh_token = auth::create_refresh_token(&state.config.jwt_secret, user_id)?;
    Ok(AuthResponse {
        token,
        refresh_token,
        user,
        expires_in: auth::ACCESS_TOKEN_HOURS * 60 * 60,
    })
}

fn normalize_email(email: &str) -> Result<String, AppError> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(AppError::BadRequest("A valid email address is required".into())),
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("Name is required".into()));
    }
    let email = normalize_email(&req.email)?;

    if users::get_user_by_email(&state.db, &email).await?.is_some() {
        return Err(AppError::Conflict("Email is already registered".into()));
    }

    let password_hash = auth::hash_password(&req.password)?;
    let user = users::create_user(&state.db, name, &email, &password_hash).await?;
    tracing::info!("registered user {}", user.id);

    let response = issue_tokens(&state, user.id, Some(UserResponse::from(&user)))?;
    Ok((StatusCode::CREATED, Json(response)))
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let email = req.email.trim().to_lowercase();

    let Some(user) = users::get_user_by_email(&state.db, &email).await? else {
        tracing::warn!("login for unknown email");
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    };

    if !auth::verify_password(&req.password, &user.password_hash)? {
        tracing::warn!("invalid password for user {}", user.id);
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    }

    tracing::info!("login successful for user {}", user.id);
    let response = issue_tokens(&state, user.id, Some(UserResponse::from(&user)))?;
    Ok(Json(response))
}

/// Exchange a refresh token for a new token pair
async fn refresh_token(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let user_id = auth::verify_refresh_token(&state.config.jwt_secret, &req.refresh_token)
        .map_err(|_| AppError::Unauthorized("Invalid or expired refresh token".into()))?;

    if users::get_user_by_id(&state.db, user_id).await?.is_none() {
        return Err(AppError::Unauthorized("Invalid or expired refresh token".into()));
    }

    Ok(Json(issue_tokens(&state, user_id, None)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email(" Ada@Example.com ").unwrap(), "ada@example.com");
        assert!(normalize_email("ada").is_err());
        assert!(normalize_email("@example.com").is_err());
        assert!(normalize_email("ada@localhost").is_err());
    }
}
