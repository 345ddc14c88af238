use serde::Serialize;
use uuid::Uuid;

use crate::repos::user_repo::UserRow;
use crate::services::auth::scope::Permissions;

/// A user as shown to management callers, with its effective permissions.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: Uuid,
    pub external_identifier: String,
    pub name: String,
    pub username: String,
    pub email: String,
    pub disabled: bool,
    pub administrator: bool,
    pub permissions: Permissions,
}

impl UserResponse {
    pub fn new(user: UserRow, permissions: Permissions) -> Self {
        Self {
            id: user.id,
            external_identifier: user.external_identifier,
            name: user.name,
            username: user.username,
            email: user.email,
            disabled: user.disabled,
            administrator: user.is_admin,
            permissions,
        }
    }
}
