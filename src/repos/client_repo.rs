use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::repos::error::RepoResult;

/// A registered machine client. Its permissions are not stored here; they
/// travel inside the client secret.
#[derive(Debug, Clone, FromRow)]
pub struct ClientRow {
    pub id: Uuid,
    pub description: String,
    pub contact_name: String,
    pub contact_email: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct ClientRepo {
    pool: PgPool,
}

impl ClientRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<ClientRow>> {
        let row = sqlx::query_as::<_, ClientRow>(
            r#"
            SELECT id, description, contact_name, contact_email, created_at
            FROM clients
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn create(
        &self,
        description: &str,
        contact_name: &str,
        contact_email: &str,
    ) -> RepoResult<ClientRow> {
        let row = sqlx::query_as::<_, ClientRow>(
            r#"
            INSERT INTO clients (description, contact_name, contact_email)
            VALUES ($1, $2, $3)
            RETURNING id, description, contact_name, contact_email, created_at
            "#,
        )
        .bind(description)
        .bind(contact_name)
        .bind(contact_email)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }
}
