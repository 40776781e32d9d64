//! Share tokens
//!
//! A share row maps an opaque token to a storage key until `expires_at`.
//! There is no revocation: rows disappear when they expire or when the key
//! they point at is deleted.

use super::DbPool;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ShareLink {
    pub token: String,
    pub key: String,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    /// Unix timestamp (seconds)
    pub expires_at: i64,
}

pub async fn create_share(
    pool: &DbPool,
    token: &str,
    key: &str,
    created_by: Option<Uuid>,
    expires_at: DateTime<Utc>,
) -> anyhow::Result<ShareLink> {
    let share = sqlx::query_as::<_, ShareLink>(
        r#"
        INSERT INTO share_links (token, key, created_by, created_at, expires_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        RETURNING token, key, created_by, created_at, expires_at
        "#,
    )
    .bind(token)
    .bind(key)
    .bind(created_by)
    .bind(Utc::now())
    .bind(expires_at.timestamp())
    .fetch_one(pool)
    .await?;

    Ok(share)
}

/// Look up an unexpired share by token
pub async fn get_active_share(pool: &DbPool, token: &str) -> anyhow::Result<Option<ShareLink>> {
    let share = sqlx::query_as::<_, ShareLink>(
        r#"
        SELECT token, key, created_by, created_at, expires_at
        FROM share_links
        WHERE token = ?1 AND expires_at > ?2
        "#,
    )
    .bind(token)
    .bind(Utc::now().timestamp())
    .fetch_optional(pool)
    .await?;

    Ok(share)
}

/// Delete every expired share. Returns how many were removed.
pub async fn purge_expired(pool: &DbPool) -> anyhow::Result<u64> {
    let result = sqlx::query("DELETE FROM share_links WHERE expires_at <= ?1")
        .bind(Utc::now().timestamp())
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub async fn delete_shares_for_key(pool: &DbPool, key: &str) -> anyhow::Result<u64> {
    let result = sqlx::query("DELETE FROM share_links WHERE key = ?1")
        .bind(key)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Drop shares of a directory key and everything beneath it
pub async fn delete_shares_under(pool: &DbPool, prefix: &str) -> anyhow::Result<u64> {
    let result = sqlx::query("DELETE FROM share_links WHERE substr(key, 1, length(?1)) = ?1")
        .bind(prefix)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub async fn rekey_shares(pool: &DbPool, old_key: &str, new_key: &str) -> anyhow::Result<()> {
    sqlx::query("UPDATE share_links SET key = ?2 WHERE key = ?1")
        .bind(old_key)
        .bind(new_key)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn rekey_shares_under(pool: &DbPool, old_prefix: &str, new_prefix: &str) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        UPDATE share_links
        SET key = ?2 || substr(key, length(?1) + 1)
        WHERE substr(key, 1, length(?1)) = ?1
        "#,
    )
    .bind(old_prefix)
    .bind(new_prefix)
    .execute(pool)
    .await?;
    Ok(())
}
