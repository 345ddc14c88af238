use serde::Deserialize;

use crate::error::AppError;
use crate::services::auth::TokenGrant;

/// Body (or query) of `/token`. Which fields are required depends on `grant_type`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenRequest {
    pub grant_type: Option<String>,

    // authorization_code
    pub code: Option<String>,
    pub state: Option<String>,

    // refresh_token
    pub refresh_token: Option<String>,

    // client_credentials
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Space separated subset of the client's granted scopes.
    pub scope: Option<String>,
}

impl TryFrom<TokenRequest> for TokenGrant {
    type Error = AppError;

    fn try_from(req: TokenRequest) -> Result<Self, Self::Error> {
        let grant_type = present(req.grant_type).ok_or_else(|| AppError::missing("grant_type"))?;

        match grant_type.as_str() {
            "authorization_code" => {
                let (code, state) = both("code", req.code, "state", req.state)?;
                Ok(TokenGrant::AuthorizationCode { code, state })
            }
            "refresh_token" => {
                let refresh_token =
                    present(req.refresh_token).ok_or_else(|| AppError::missing("refresh_token"))?;
                Ok(TokenGrant::RefreshToken { refresh_token })
            }
            "client_credentials" => {
                let (client_id, client_secret) = both(
                    "client_id",
                    req.client_id,
                    "client_secret",
                    req.client_secret,
                )?;
                Ok(TokenGrant::ClientCredentials {
                    client_id,
                    client_secret,
                    scope: present(req.scope),
                })
            }
            _ => Err(AppError::UnsupportedGrantType(grant_type)),
        }
    }
}

fn present(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn both(
    a_name: &str,
    a: Option<String>,
    b_name: &str,
    b: Option<String>,
) -> Result<(String, String), AppError> {
    match (present(a), present(b)) {
        (Some(a), Some(b)) => Ok((a, b)),
        (a, b) => {
            let mut errors = Vec::new();
            if a.is_none() {
                errors.push(format!("'{a_name}' is required"));
            }
            if b.is_none() {
                errors.push(format!("'{b_name}' is required"));
            }
            Err(AppError::MissingParameter(errors))
        }
    }
}
