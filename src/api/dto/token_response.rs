use serde::Serialize;

use crate::services::auth::token_service::IssuedTokens;

#[derive(Debug, Clone, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Always "Bearer"
    pub token_type: &'static str,
    /// Seconds until the access token expires.
    pub expires_in: u64,

    /// Absent when the refresh token could not be registered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl From<IssuedTokens> for TokenResponse {
    fn from(out: IssuedTokens) -> Self {
        Self {
            access_token: out.access_token,
            token_type: out.token_type,
            expires_in: out.expires_in,
            refresh_token: out.refresh_token,
        }
    }
}
