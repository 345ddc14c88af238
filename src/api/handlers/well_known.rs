//! Discovery documents.
//!
//! Endpoint URLs are absolute. Without `PUBLIC_BASE_URL` they are rebuilt from
//! the forwarding headers a reverse proxy sets, falling back to `Host`.
use axum::{Json, extract::State, http::HeaderMap};
use serde::Serialize;
use tracing::error;

use crate::error::AppError;
use crate::services::auth::scope::ADMIN_SCOPE;
use crate::services::auth::token_issuer::ISSUER;
use crate::services::keys::PublicKeySet;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct OpenIdConfiguration {
    pub issuer: &'static str,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub jwks_uri: String,
    pub revocation_endpoint: String,
    pub userinfo_endpoint: String,
    pub scopes_supported: Vec<String>,
    pub response_types_supported: Vec<&'static str>,
    pub grant_types_supported: Vec<&'static str>,
    pub id_token_signing_alg_values_supported: Vec<&'static str>,
    pub code_challenge_methods_supported: Vec<&'static str>,
}

pub async fn jwks(State(state): State<AppState>) -> Json<PublicKeySet> {
    Json(state.keys.public_set())
}

pub async fn openid_configuration(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<OpenIdConfiguration>, AppError> {
    let base = state
        .public_base_url
        .clone()
        .unwrap_or_else(|| base_url_from_headers(&headers));

    let mut scopes_supported = state.resolver.catalog_scopes().await.map_err(|e| {
        error!(error = ?e, "failed to read service catalog");
        AppError::Internal
    })?;
    scopes_supported.push(ADMIN_SCOPE.to_string());

    Ok(Json(OpenIdConfiguration {
        issuer: ISSUER,
        authorization_endpoint: format!("{base}/login"),
        token_endpoint: format!("{base}/token"),
        jwks_uri: format!("{base}/.well-known/jwks.json"),
        revocation_endpoint: format!("{base}/revoke"),
        userinfo_endpoint: format!("{base}/users/me"),
        scopes_supported,
        response_types_supported: vec!["token"],
        grant_types_supported: vec!["authorization_code", "refresh_token", "client_credentials"],
        // Access tokens are the product here; no ID tokens are issued.
        id_token_signing_alg_values_supported: vec!["none"],
        code_challenge_methods_supported: vec!["S256"],
    }))
}

fn base_url_from_headers(headers: &HeaderMap) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            // Proxies chain values; the first one is the client-facing hop.
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    let proto = header("x-forwarded-proto").unwrap_or("http");
    let host = header("x-forwarded-host")
        .or_else(|| header("host"))
        .unwrap_or("localhost");
    let prefix = header("x-forwarded-prefix")
        .map(|p| p.trim_end_matches('/'))
        .unwrap_or_default();

    if prefix.is_empty() || prefix.starts_with('/') {
        format!("{proto}://{host}{prefix}")
    } else {
        format!("{proto}://{host}/{prefix}")
    }
}
