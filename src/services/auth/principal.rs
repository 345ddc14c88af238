use crate::repos::user_repo::UserRow;
use crate::services::auth::scope::{self, Permissions};

/// Anything a token can be issued to.
#[derive(Debug, Clone)]
pub enum Principal {
    User {
        user: UserRow,
        permissions: Permissions,
    },
    /// Machine client. Permissions come from its decoded secret, never from storage.
    Client {
        client_id: String,
        permissions: Permissions,
    },
}

impl Principal {
    pub fn id(&self) -> String {
        match self {
            Principal::User { user, .. } => user.id.to_string(),
            Principal::Client { client_id, .. } => client_id.clone(),
        }
    }

    pub fn permissions(&self) -> &Permissions {
        match self {
            Principal::User { permissions, .. } | Principal::Client { permissions, .. } => {
                permissions
            }
        }
    }

    pub fn is_administrator(&self) -> bool {
        match self {
            Principal::User { user, .. } => user.is_admin,
            Principal::Client { .. } => false,
        }
    }

    pub fn is_active(&self) -> bool {
        match self {
            Principal::User { user, .. } => !user.disabled,
            Principal::Client { .. } => true,
        }
    }

    /// Flattened scopes as they appear in the `scopes` claim.
    pub fn scopes(&self) -> Vec<String> {
        scope::flatten(self.permissions(), self.is_administrator())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::auth::scope::ADMIN_SCOPE;
    use uuid::Uuid;

    fn user(is_admin: bool, disabled: bool) -> UserRow {
        UserRow {
            id: Uuid::new_v4(),
            external_identifier: "ext-1".into(),
            name: "Jane".into(),
            username: "jane".into(),
            email: "jane@example.org".into(),
            disabled,
            is_admin,
        }
    }

    #[test]
    fn clients_are_never_administrators_and_always_active() {
        let p = Principal::Client {
            client_id: "c-1".into(),
            permissions: scope::group(&["alpha:read".into()]),
        };
        assert!(!p.is_administrator());
        assert!(p.is_active());
        assert_eq!(p.id(), "c-1");
        assert_eq!(p.scopes(), vec!["alpha:read"]);
    }

    #[test]
    fn disabled_users_are_inactive() {
        let p = Principal::User {
            user: user(false, true),
            permissions: Permissions::new(),
        };
        assert!(!p.is_active());
    }

    #[test]
    fn administrator_scopes_end_with_wildcard() {
        let p = Principal::User {
            user: user(true, false),
            permissions: scope::group(&["alpha:read".into(), "alpha:write".into()]),
        };
        assert_eq!(p.scopes(), vec!["alpha:read", "alpha:write", ADMIN_SCOPE]);
    }
}
