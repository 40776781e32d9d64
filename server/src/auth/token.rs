use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Access token lifetime in hours
pub const ACCESS_TOKEN_HOURS: i64 = 24;

/// Refresh token lifetime in days
const REFRESH_TOKEN_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String, // User ID
    exp: i64,
    iat: i64,
    token_type: TokenKind,
}

fn issue(secret: &str, user_id: Uuid, kind: TokenKind) -> anyhow::Result<String> {
    let now = Utc::now();
    let exp = match kind {
        TokenKind::Access => now + Duration::hours(ACCESS_TOKEN_HOURS),
        TokenKind::Refresh => now + Duration::days(REFRESH_TOKEN_DAYS),
    };

    let claims = Claims {
        sub: user_id.to_string(),
        exp: exp.timestamp(),
        iat: now.timestamp(),
        token_type: kind,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

/// Verify signature, expiry and kind, then extract the user ID
fn verify(secret: &str, token: &str, kind: TokenKind) -> anyhow::Result<Uuid> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;

    if token_data.claims.token_type != kind {
        anyhow::bail!("expected a {:?} token", kind);
    }

    let user_id = Uuid::parse_str(&token_data.claims.sub)?;
    Ok(user_id)
}

/// Create an access token (short-lived, for API requests)
pub fn create_access_token(secret: &str, user_id: Uuid) -> anyhow::Result<String> {
    issue(secret, user_id, TokenKind::Access)
}

/// Create a refresh token (long-lived, for obtaining new access tokens)
pub fn create_refresh_token(secret: &str, user_id: Uuid) -> anyhow::Result<String> {
    issue(secret, user_id, TokenKind::Refresh)
}

/// Verify an access token. Refresh tokens are rejected.
pub fn verify_token(secret: &str, token: &str) -> anyhow::Result<Uuid> {
    verify(secret, token, TokenKind::Access)
}

/// Verify a refresh token. Access tokens are rejected.
pub fn verify_refresh_token(secret: &str, token: &str) -> anyhow::Result<Uuid> {
    verify(secret, token, TokenKind::Refresh)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_roundtrip() {
        let secret = "test_secret";
        let user_id = Uuid::new_v4();

        let token = create_access_token(secret, user_id).unwrap();
        assert_eq!(verify_token(secret, &token).unwrap(), user_id);

        let refresh = create_refresh_token(secret, user_id).unwrap();
        assert_eq!(verify_refresh_token(secret, &refresh).unwrap(), user_id);
    }

    #[test]
    fn test_kinds_are_not_interchangeable() {
        let secret = "test_secret";
        let user_id = Uuid::new_v4();

        let refresh = create_refresh_token(secret, user_id).unwrap();
        assert!(verify_token(secret, &refresh).is_err());

        let access = create_access_token(secret, user_id).unwrap();
        assert!(verify_refresh_token(secret, &access).is_err());
    }

    #[test]
    fn test_invalid_token() {
        assert!(verify_token("test_secret", "invalid_token").is_err());

        let token = create_access_token("test_secret", Uuid::new_v4()).unwrap();
        assert!(verify_token("other_secret", &token).is_err());
    }
}
