//! Durable lookups the token flows depend on, behind one seam so the flows
//! can be exercised without a database.
use async_trait::async_trait;
use uuid::Uuid;

use crate::repos::client_repo::{ClientRepo, ClientRow};
use crate::repos::error::RepoResult;
use crate::repos::service_repo::{ServiceRepo, ServiceRow};
use crate::repos::user_repo::{NewUser, PermissionRow, UserRepo, UserRow};

#[async_trait]
pub trait Directory: Send + Sync + 'static {
    async fn user_by_external_id(&self, external_id: &str) -> RepoResult<Option<UserRow>>;

    async fn user_by_id(&self, id: Uuid) -> RepoResult<Option<UserRow>>;

    async fn create_user(&self, user: NewUser<'_>) -> RepoResult<UserRow>;

    async fn user_permissions(&self, user_id: Uuid) -> RepoResult<Vec<PermissionRow>>;

    async fn assign_permissions(&self, user_id: Uuid, grants: &[PermissionRow]) -> RepoResult<()>;

    async fn services(&self) -> RepoResult<Vec<ServiceRow>>;

    async fn client_by_id(&self, id: Uuid) -> RepoResult<Option<ClientRow>>;

    async fn create_client(
        &self,
        description: &str,
        contact_name: &str,
        contact_email: &str,
    ) -> RepoResult<ClientRow>;

    async fn ping(&self) -> RepoResult<()>;
}

/// Postgres-backed directory.
#[derive(Clone, Debug)]
pub struct PgDirectory {
    pool: sqlx::PgPool,
    users: UserRepo,
    services: ServiceRepo,
    clients: ClientRepo,
}

impl PgDirectory {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self {
            users: UserRepo::new(pool.clone()),
            services: ServiceRepo::new(pool.clone()),
            clients: ClientRepo::new(pool.clone()),
            pool,
        }
    }
}

#[async_trait]
impl Directory for PgDirectory {
    async fn user_by_external_id(&self, external_id: &str) -> RepoResult<Option<UserRow>> {
        self.users.find_by_external_id(external_id).await
    }

    async fn user_by_id(&self, id: Uuid) -> RepoResult<Option<UserRow>> {
        self.users.find_by_id(id).await
    }

    async fn create_user(&self, user: NewUser<'_>) -> RepoResult<UserRow> {
        self.users.create(user).await
    }

    async fn user_permissions(&self, user_id: Uuid) -> RepoResult<Vec<PermissionRow>> {
        self.users.permissions(user_id).await
    }

    async fn assign_permissions(&self, user_id: Uuid, grants: &[PermissionRow]) -> RepoResult<()> {
        self.users.assign_permissions(user_id, grants).await
    }

    async fn services(&self) -> RepoResult<Vec<ServiceRow>> {
        self.services.list().await
    }

    async fn client_by_id(&self, id: Uuid) -> RepoResult<Option<ClientRow>> {
        self.clients.find_by_id(id).await
    }

    async fn create_client(
        &self,
        description: &str,
        contact_name: &str,
        contact_email: &str,
    ) -> RepoResult<ClientRow> {
        self.clients
            .create(description, contact_name, contact_email)
            .await
    }

    async fn ping(&self) -> RepoResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
