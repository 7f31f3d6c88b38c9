// src/kv/postgres.rs

use std::time::Duration;

use sqlx::PgPool;

use super::KvStore;
use crate::common::error::AppError;

/// Store shared by every instance that points at the same database.
/// Rows past `expires_at` are treated as absent, overwritten on reuse and
/// deleted by [`KvStore::purge_expired`].
#[derive(Clone)]
pub struct PgKvStore {
    pool: PgPool,
}

impl PgKvStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl KvStore for PgKvStore {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO kv_entries (key, value, expires_at)
            VALUES ($1, $2, NOW() + make_interval(secs => $3))
            ON CONFLICT (key) DO UPDATE
            SET value = EXCLUDED.value, expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(ttl.as_secs_f64())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        let value = sqlx::query_scalar::<_, String>(
            "SELECT value FROM kv_entries WHERE key = $1 AND expires_at > NOW()",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(value)
    }

    async fn delete(&self, key: &str) -> Result<bool, AppError> {
        let removed = sqlx::query_scalar::<_, bool>(
            "DELETE FROM kv_entries WHERE key = $1 RETURNING expires_at > NOW()",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(removed.unwrap_or(false))
    }

    async fn exists(&self, key: &str) -> Result<bool, AppError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM kv_entries WHERE key = $1 AND expires_at > NOW())",
        )
        .bind(key)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn ttl(&self, key: &str) -> Result<Option<i64>, AppError> {
        let ttl = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT CEIL(EXTRACT(EPOCH FROM (expires_at - NOW())))::BIGINT
            FROM kv_entries
            WHERE key = $1 AND expires_at > NOW()
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(ttl)
    }

    async fn incr(&self, key: &str, ttl: Duration) -> Result<i64, AppError> {
        // The row lock taken by ON CONFLICT serialises concurrent increments.
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO kv_entries (key, value, expires_at)
            VALUES ($1, '1', NOW() + make_interval(secs => $2))
            ON CONFLICT (key) DO UPDATE
            SET value = CASE
                    WHEN kv_entries.expires_at <= NOW() THEN '1'
                    ELSE (kv_entries.value::BIGINT + 1)::TEXT
                END,
                expires_at = EXCLUDED.expires_at
            RETURNING value::BIGINT
            "#,
        )
        .bind(key)
        .bind(ttl.as_secs_f64())
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>, AppError> {
        let entries = sqlx::query_as::<_, (String, String)>(
            r#"
            SELECT key, value
            FROM kv_entries
            WHERE starts_with(key, $1) AND expires_at > NOW()
            ORDER BY key
            "#,
        )
        .bind(prefix)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    async fn purge_expired(&self) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM kv_entries WHERE expires_at <= NOW()")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
