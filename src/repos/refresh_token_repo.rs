use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::repos::error::RepoResult;

/// DB access for the refresh-token ledger.
///
/// A row exists exactly as long as the token is usable:
/// - refresh_tokens.jti (text, primary key)
/// - refresh_tokens.expires_at (timestamptz)
#[derive(Clone, Debug)]
pub struct RefreshTokenRepo {
    pool: PgPool,
}

impl RefreshTokenRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, jti: &str, expires_at: DateTime<Utc>) -> RepoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (jti, expires_at)
            VALUES ($1, $2)
            "#,
        )
        .bind(jti)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Delete the row only if it is still unexpired. `true` means this call
    /// observed the token alive and is the one that consumed it.
    pub async fn take_alive(&self, jti: &str, now: DateTime<Utc>) -> RepoResult<bool> {
        let done = sqlx::query(
            r#"
            DELETE FROM refresh_tokens
            WHERE jti = $1
                AND expires_at > $2
            "#,
        )
        .bind(jti)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(done.rows_affected() > 0)
    }

    pub async fn delete(&self, jti: &str) -> RepoResult<u64> {
        let done = sqlx::query("DELETE FROM refresh_tokens WHERE jti = $1")
            .bind(jti)
            .execute(&self.pool)
            .await?;

        Ok(done.rows_affected())
    }

    pub async fn delete_expired(&self, now: DateTime<Utc>) -> RepoResult<u64> {
        let done = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(done.rows_affected())
    }
}
