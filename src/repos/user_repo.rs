use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::repos::error::{RepoError, RepoResult};

#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub external_identifier: String,
    pub name: String,
    pub username: String,
    pub email: String,
    pub disabled: bool,
    pub is_admin: bool,
}

/// One explicit `(service, level)` grant.
#[derive(Debug, Clone, FromRow)]
pub struct PermissionRow {
    pub service: String,
    pub scope_level: String,
}

/// Columns taken from the provider's user-info when a user is first seen.
#[derive(Debug, Clone)]
pub struct NewUser<'a> {
    pub external_identifier: &'a str,
    pub name: &'a str,
    pub username: &'a str,
    pub email: &'a str,
}

#[derive(Clone, Debug)]
pub struct UserRepo {
    pool: PgPool,
}

impl UserRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_external_id(&self, external_id: &str) -> RepoResult<Option<UserRow>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, external_identifier, name, username, email, disabled, is_admin
            FROM users
            WHERE external_identifier = $1
            "#,
        )
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<UserRow>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, external_identifier, name, username, email, disabled, is_admin
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Insert a new user. A concurrent insert for the same external identifier
    /// surfaces as `RepoError::Conflict`.
    pub async fn create(&self, user: NewUser<'_>) -> RepoResult<UserRow> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (external_identifier, name, username, email)
            VALUES ($1, $2, $3, $4)
            RETURNING id, external_identifier, name, username, email, disabled, is_admin
            "#,
        )
        .bind(user.external_identifier)
        .bind(user.name)
        .bind(user.username)
        .bind(user.email)
        .fetch_one(&self.pool)
        .await
        .map_err(RepoError::from_sqlx)?;

        Ok(row)
    }

    /// Add grants in one transaction. Existing grants are left untouched.
    pub async fn assign_permissions(
        &self,
        user_id: Uuid,
        grants: &[PermissionRow],
    ) -> RepoResult<()> {
        let mut tx = self.pool.begin().await?;
        for grant in grants {
            sqlx::query(
                r#"
                INSERT INTO permissions (user_id, service_id, scope_level)
                SELECT $1, s.id, $3
                FROM services s
                WHERE s.name = $2
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(user_id)
            .bind(&grant.service)
            .bind(&grant.scope_level)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(())
    }

    pub async fn permissions(&self, user_id: Uuid) -> RepoResult<Vec<PermissionRow>> {
        let rows = sqlx::query_as::<_, PermissionRow>(
            r#"
            SELECT s.name AS service, p.scope_level
            FROM permissions p
            JOIN services s ON s.id = p.service_id
            WHERE p.user_id = $1
            ORDER BY s.name, p.scope_level
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
