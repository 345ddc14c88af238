use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::repos::error::RepoResult;

#[derive(Debug, Clone, FromRow)]
pub struct ServiceRow {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub supported_scope_levels: Vec<String>,
}

/// Read access to the catalog of known services and their scope levels.
#[derive(Clone, Debug)]
pub struct ServiceRepo {
    pool: PgPool,
}

impl ServiceRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> RepoResult<Vec<ServiceRow>> {
        let rows = sqlx::query_as::<_, ServiceRow>(
            r#"
            SELECT id, name, description, supported_scope_levels
            FROM services
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
