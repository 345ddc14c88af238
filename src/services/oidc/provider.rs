//! Upstream OpenID Connect provider users authenticate with.
//!
//! # Flow
//!
//! 1. `discover` reads the provider metadata once at startup.
//! 2. `/login` redirects to `authorize_url` with a PKCE S256 challenge.
//! 3. `/token` trades the code with `exchange_code`, verifies the returned ID
//!    token against the provider JWKS and reads the user-info document.
//!
//! The JWKS is cached and refreshed once when an unknown `kid` shows up.
use std::time::Duration;

use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{DecodingKey, Validation};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};
use url::Url;

use crate::config::ProviderConfig;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);
const REQUESTED_SCOPES: &str = "openid profile email";

#[derive(Debug, Error)]
pub enum OidcError {
    #[error("provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider rejected the request with status {0}")]
    Rejected(reqwest::StatusCode),

    #[error("invalid provider url: {0}")]
    Url(#[from] url::ParseError),

    #[error("issuer mismatch: expected {expected}, got {actual}")]
    IssuerMismatch { expected: String, actual: String },

    #[error("token response carries no id_token")]
    MissingIdToken,

    #[error("id token verification failed: {0}")]
    IdToken(#[from] jsonwebtoken::errors::Error),

    #[error("id token has no 'kid' header")]
    MissingKeyId,

    #[error("unknown key id: {0}")]
    UnknownKeyId(String),
}

impl OidcError {
    /// Failures caused by what the caller presented, as opposed to provider outages.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            OidcError::Rejected(status) if status.is_client_error()
        ) || matches!(
            self,
            OidcError::IdToken(_) | OidcError::MissingKeyId | OidcError::UnknownKeyId(_)
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    #[serde(default)]
    pub userinfo_endpoint: Option<String>,
    pub jwks_uri: String,
}

#[derive(Debug, Deserialize)]
struct TokenEndpointResponse {
    access_token: String,
    #[serde(default)]
    id_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    sub: String,
}

/// Profile fields copied onto a newly provisioned user.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserInfo {
    #[serde(default)]
    pub preferred_username: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Outcome of a successful code exchange.
#[derive(Debug, Clone)]
pub struct ExternalIdentity {
    pub subject: String,
    pub info: UserInfo,
}

pub struct ExternalProvider {
    http: reqwest::Client,
    metadata: ProviderMetadata,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    jwks: RwLock<Option<JwkSet>>,
}

impl std::fmt::Debug for ExternalProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalProvider")
            .field("issuer", &self.metadata.issuer)
            .field("client_id", &self.client_id)
            .finish()
    }
}

impl ExternalProvider {
    pub async fn discover(config: &ProviderConfig) -> Result<Self, OidcError> {
        let http = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;

        let discovery = format!(
            "{}/.well-known/openid-configuration",
            config.issuer.trim_end_matches('/')
        );
        let response = http.get(&discovery).send().await?;
        if !response.status().is_success() {
            return Err(OidcError::Rejected(response.status()));
        }
        let metadata: ProviderMetadata = response.json().await?;

        if metadata.issuer.trim_end_matches('/') != config.issuer.trim_end_matches('/') {
            return Err(OidcError::IssuerMismatch {
                expected: config.issuer.clone(),
                actual: metadata.issuer,
            });
        }

        info!(issuer = %metadata.issuer, "external provider discovered");
        Ok(Self {
            http,
            metadata,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
            jwks: RwLock::new(None),
        })
    }

    pub fn issuer(&self) -> &str {
        &self.metadata.issuer
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// The redirect URI registered for this service at the provider.
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    pub fn authorize_url(
        &self,
        state: &str,
        code_challenge: &str,
        redirect_uri: &str,
    ) -> Result<Url, OidcError> {
        let mut url = Url::parse(&self.metadata.authorization_endpoint)?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", REQUESTED_SCOPES)
            .append_pair("state", state)
            .append_pair("code_challenge", code_challenge)
            .append_pair("code_challenge_method", "S256");
        Ok(url)
    }

    /// Trade an authorization code for the caller's verified identity.
    pub async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> Result<ExternalIdentity, OidcError> {
        let response = self
            .http
            .post(&self.metadata.token_endpoint)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("code_verifier", code_verifier),
                ("redirect_uri", redirect_uri),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(OidcError::Rejected(response.status()));
        }
        let tokens: TokenEndpointResponse = response.json().await?;

        let id_token = tokens.id_token.ok_or(OidcError::MissingIdToken)?;
        let subject = self.verify_id_token(&id_token).await?;
        let info = self.user_info(&tokens.access_token).await?;

        Ok(ExternalIdentity { subject, info })
    }

    /// Signature, issuer, audience and expiry. Returns the `sub` claim.
    pub async fn verify_id_token(&self, id_token: &str) -> Result<String, OidcError> {
        let header = jsonwebtoken::decode_header(id_token)?;
        let kid = header.kid.ok_or(OidcError::MissingKeyId)?;
        let key = self.decoding_key(&kid).await?;

        let mut validation = Validation::new(header.alg);
        validation.set_issuer(&[self.metadata.issuer.as_str()]);
        validation.set_audience(&[self.client_id.as_str()]);
        validation.leeway = 60;

        let data = jsonwebtoken::decode::<IdTokenClaims>(id_token, &key, &validation)?;
        Ok(data.claims.sub)
    }

    async fn user_info(&self, access_token: &str) -> Result<UserInfo, OidcError> {
        let Some(endpoint) = &self.metadata.userinfo_endpoint else {
            return Ok(UserInfo::default());
        };

        let response = self
            .http
            .get(endpoint)
            .bearer_auth(access_token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(OidcError::Rejected(response.status()));
        }
        Ok(response.json().await?)
    }

    async fn decoding_key(&self, kid: &str) -> Result<DecodingKey, OidcError> {
        if let Some(set) = self.jwks.read().await.as_ref()
            && let Some(key) = find_key(set, kid)
        {
            return Ok(key);
        }

        debug!(kid, "key not in cached provider JWKS, refreshing");
        let set: JwkSet = self
            .http
            .get(&self.metadata.jwks_uri)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let key = find_key(&set, kid);
        *self.jwks.write().await = Some(set);

        key.ok_or_else(|| OidcError::UnknownKeyId(kid.to_string()))
    }
}

fn find_key(set: &JwkSet, kid: &str) -> Option<DecodingKey> {
    set.find(kid).and_then(|jwk| DecodingKey::from_jwk(jwk).ok())
}
