use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::repos::error::RepoError;
use crate::repos::user_repo::{NewUser, UserRow};
use crate::services::auth::directory::Directory;
use crate::services::auth::principal::Principal;
use crate::services::auth::scope::{self, Permissions};
use crate::services::oidc::UserInfo;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("unknown principal")]
    UnknownPrincipal,

    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// Maps external and internal identifiers onto principals with their permissions.
#[derive(Clone)]
pub struct PrincipalResolver {
    directory: Arc<dyn Directory>,
}

impl PrincipalResolver {
    pub fn new(directory: Arc<dyn Directory>) -> Self {
        Self { directory }
    }

    pub fn directory(&self) -> &Arc<dyn Directory> {
        &self.directory
    }

    /// User registered for the provider's subject identifier.
    pub async fn resolve(&self, external_id: &str) -> Result<UserRow, ResolveError> {
        self.directory
            .user_by_external_id(external_id)
            .await?
            .ok_or(ResolveError::UnknownPrincipal)
    }

    /// Principal for an internal id as found in a token's `sub`. Users first, then clients.
    pub async fn resolve_subject(&self, subject: &str) -> Result<Principal, ResolveError> {
        let id = Uuid::parse_str(subject).map_err(|_| ResolveError::UnknownPrincipal)?;

        if let Some(user) = self.directory.user_by_id(id).await? {
            return self.user_principal(user).await;
        }

        // Client permissions only exist inside the client secret; a refresh
        // re-issues the scopes from the refresh token itself.
        match self.directory.client_by_id(id).await? {
            Some(client) => Ok(Principal::Client {
                client_id: client.id.to_string(),
                permissions: Permissions::new(),
            }),
            None => Err(ResolveError::UnknownPrincipal),
        }
    }

    /// Persist a user seen for the first time at the provider.
    pub async fn provision(
        &self,
        external_id: &str,
        info: &UserInfo,
    ) -> Result<UserRow, ResolveError> {
        let new_user = NewUser {
            external_identifier: external_id,
            name: info.name.as_deref().unwrap_or_default(),
            username: info.preferred_username.as_deref().unwrap_or_default(),
            email: info.email.as_deref().unwrap_or_default(),
        };

        match self.directory.create_user(new_user).await {
            Ok(user) => {
                info!(user_id = %user.id, "provisioned new user");
                Ok(user)
            }
            // Lost a race with a concurrent first login of the same person.
            Err(RepoError::Conflict) => {
                debug!(external_id, "user provisioned concurrently, re-reading");
                self.resolve(external_id).await
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn resolve_or_provision(
        &self,
        external_id: &str,
        info: &UserInfo,
    ) -> Result<Principal, ResolveError> {
        let user = match self.resolve(external_id).await {
            Ok(user) => user,
            Err(ResolveError::UnknownPrincipal) => self.provision(external_id, info).await?,
            Err(e) => return Err(e),
        };
        self.user_principal(user).await
    }

    /// Administrators hold every level of every known service.
    pub async fn permissions(&self, user: &UserRow) -> Result<Permissions, ResolveError> {
        if user.is_admin {
            return Ok(scope::catalog_permissions(&self.directory.services().await?));
        }

        let mut permissions = Permissions::new();
        for row in self.directory.user_permissions(user.id).await? {
            permissions.entry(row.service).or_default().push(row.scope_level);
        }
        Ok(permissions)
    }

    /// Flat `service:level` strings for everything in the catalog.
    pub async fn catalog_scopes(&self) -> Result<Vec<String>, ResolveError> {
        let services = self.directory.services().await?;
        Ok(scope::flatten(&scope::catalog_permissions(&services), false))
    }

    async fn user_principal(&self, user: UserRow) -> Result<Principal, ResolveError> {
        let permissions = self.permissions(&user).await?;
        Ok(Principal::User { user, permissions })
    }
}
