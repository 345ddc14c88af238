use crate::error::AppError;
use crate::services::auth::scope::ADMIN_SCOPE;
use crate::services::auth::token_issuer::TokenClaims;

/// Verified caller of a bearer-protected route.
///
/// - `subject` is the internal user id, or the client id for machine clients
/// - `scopes` are the flattened `service:level` strings of the access token
#[derive(Debug, Clone)]
pub struct AuthCtx {
    pub subject: String,
    pub scopes: Vec<String>,
}

impl AuthCtx {
    /// Holding `*:*` satisfies every scope.
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope || s == ADMIN_SCOPE)
    }

    pub fn require_scope(&self, scope: &str) -> Result<(), AppError> {
        if self.has_scope(scope) {
            Ok(())
        } else {
            Err(AppError::MissingScope(scope.to_string()))
        }
    }
}

impl From<TokenClaims> for AuthCtx {
    fn from(claims: TokenClaims) -> Self {
        Self {
            subject: claims.subject,
            scopes: claims.scopes,
        }
    }
}
