//! Star flags
//!
//! Object stores have no boolean flag per object, so stars live in a side
//! table keyed by storage key. A row exists only while the key is starred.

use super::DbPool;
use crate::namespace::EntryKind;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StarRecord {
    pub key: String,
    pub kind: EntryKind,
    pub file_type: String,
    pub size_bytes: Option<i64>,
    pub last_modified: Option<DateTime<Utc>>,
    pub starred_at: DateTime<Utc>,
}

/// Metadata captured when an item is starred
#[derive(Debug, Clone)]
pub struct NewStar<'a> {
    pub key: &'a str,
    pub kind: EntryKind,
    pub file_type: &'a str,
    pub size_bytes: Option<i64>,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Star a key, refreshing its metadata if already starred
pub async fn upsert_star(pool: &DbPool, star: &NewStar<'_>) -> anyhow::Result<StarRecord> {
    let record = sqlx::query_as::<_, StarRecord>(
        r#"
        INSERT INTO stars (key, kind, file_type, size_bytes, last_modified, starred_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        ON CONFLICT (key)
        DO UPDATE SET
            kind = excluded.kind,
            file_type = excluded.file_type,
            size_bytes = excluded.size_bytes,
            last_modified = excluded.last_modified
        RETURNING key, kind, file_type, size_bytes, last_modified, starred_at
        "#,
    )
    .bind(star.key)
    .bind(star.kind)
    .bind(star.file_type)
    .bind(star.size_bytes)
    .bind(star.last_modified)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;

    Ok(record)
}

/// Remove the star on a key. Returns whether a star existed.
pub async fn remove_star(pool: &DbPool, key: &str) -> anyhow::Result<bool> {
    let result = sqlx::query("DELETE FROM stars WHERE key = ?1")
        .bind(key)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn is_starred(pool: &DbPool, key: &str) -> anyhow::Result<bool> {
    let found: Option<String> = sqlx::query_scalar("SELECT key FROM stars WHERE key = ?1")
        .bind(key)
        .fetch_optional(pool)
        .await?;
    Ok(found.is_some())
}

/// All starred items
pub async fn list_stars(pool: &DbPool) -> anyhow::Result<Vec<StarRecord>> {
    let records = sqlx::query_as::<_, StarRecord>(
        r#"
        SELECT key, kind, file_type, size_bytes, last_modified, starred_at
        FROM stars
        ORDER BY key
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(records)
}

/// Starred keys beginning with `prefix` (every key for the root prefix)
pub async fn starred_keys_under(pool: &DbPool, prefix: &str) -> anyhow::Result<HashSet<String>> {
    let keys: Vec<String> = sqlx::query_scalar("SELECT key FROM stars WHERE substr(key, 1, length(?1)) = ?1")
        .bind(prefix)
        .fetch_all(pool)
        .await?;
    Ok(keys.into_iter().collect())
}

/// Drop stars on a directory key and everything beneath it
pub async fn delete_stars_under(pool: &DbPool, prefix: &str) -> anyhow::Result<u64> {
    let result = sqlx::query("DELETE FROM stars WHERE substr(key, 1, length(?1)) = ?1")
        .bind(prefix)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Move the star of a renamed file
pub async fn rekey_star(pool: &DbPool, old_key: &str, new_key: &str) -> anyhow::Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM stars WHERE key = ?1")
        .bind(new_key)
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE stars SET key = ?2 WHERE key = ?1")
        .bind(old_key)
        .bind(new_key)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}

/// Rewrite the prefix of every star under a renamed directory
pub async fn rekey_stars_under(pool: &DbPool, old_prefix: &str, new_prefix: &str) -> anyhow::Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM stars WHERE substr(key, 1, length(?1)) = ?1")
        .bind(new_prefix)
        .execute(&mut *tx)
        .await?;
    sqlx::query(
        r#"
        UPDATE stars
        SET key = ?2 || substr(key, length(?1) + 1)
        WHERE substr(key, 1, length(?1)) = ?1
        "#,
    )
    .bind(old_prefix)
    .bind(new_prefix)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    fn file_star(key: &str) -> NewStar<'_> {
        NewStar {
            key,
            kind: EntryKind::File,
            file_type: "pdf",
            size_bytes: Some(1536),
            last_modified: None,
        }
    }

    #[tokio::test]
    async fn test_star_and_unstar() {
        let pool = test_pool().await;
        let record = upsert_star(&pool, &file_star("docs/report.pdf")).await.unwrap();
        assert_eq!(record.kind, EntryKind::File);
        assert_eq!(record.size_bytes, Some(1536));

        // Starring twice keeps a single row
        upsert_star(&pool, &file_star("docs/report.pdf")).await.unwrap();
        assert_eq!(list_stars(&pool).await.unwrap().len(), 1);
        assert!(is_starred(&pool, "docs/report.pdf").await.unwrap());

        assert!(remove_star(&pool, "docs/report.pdf").await.unwrap());
        assert!(!remove_star(&pool, "docs/report.pdf").await.unwrap());
        assert!(list_stars(&pool).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_prefix_queries() {
        let pool = test_pool().await;
        for key in ["docs/report.pdf", "docs/img/logo.png", "docsx/a.txt", "readme.md"] {
            upsert_star(&pool, &file_star(key)).await.unwrap();
        }

        let under_docs = starred_keys_under(&pool, "docs/").await.unwrap();
        assert_eq!(under_docs.len(), 2);
        assert!(!under_docs.contains("docsx/a.txt"));
        assert_eq!(starred_keys_under(&pool, "").await.unwrap().len(), 4);

        assert_eq!(delete_stars_under(&pool, "docs/").await.unwrap(), 2);
        let remaining: Vec<_> = list_stars(&pool).await.unwrap().into_iter().map(|s| s.key).collect();
        assert_eq!(remaining, vec!["docsx/a.txt", "readme.md"]);
    }

    #[tokio::test]
    async fn test_rekey_under_prefix() {
        let pool = test_pool().await;
        upsert_star(&pool, &file_star("old/a.txt")).await.unwrap();
        upsert_star(&pool, &file_star("old/sub/b.txt")).await.unwrap();

        rekey_stars_under(&pool, "old/", "new/").await.unwrap();
        let keys: Vec<_> = list_stars(&pool).await.unwrap().into_iter().map(|s| s.key).collect();
        assert_eq!(keys, vec!["new/a.txt", "new/sub/b.txt"]);

        rekey_star(&pool, "new/a.txt", "new/c.txt").await.unwrap();
        assert!(starred_keys_under(&pool, "new/c.txt").await.unwrap().contains("new/c.txt"));
    }
}
