//! Client secrets are the client's granted scopes, signed and encrypted.
//! Nothing about them is stored; possession of a secret that decodes for the
//! presented client id is the credential.
use std::sync::Arc;
use std::time::SystemTime;

use josekit::JoseError;
use josekit::jwt::JwtPayload;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::services::auth::jose;
use crate::services::auth::token_issuer::{ISSUER, SCOPES_CLAIM, scopes_of};
use crate::services::keys::KeyManager;

pub const CLIENT_AUDIENCE: &str = "user-management";

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("invalid client credentials")]
    InvalidClientCredentials,

    #[error("failed to build client secret: {0}")]
    Jose(#[from] JoseError),
}

#[derive(Clone)]
pub struct ClientCredentialCodec {
    keys: Arc<KeyManager>,
}

impl ClientCredentialCodec {
    pub fn new(keys: Arc<KeyManager>) -> Self {
        Self { keys }
    }

    pub fn encode(&self, client_id: &str, scopes: &[String]) -> Result<String, CredentialError> {
        let mut payload = JwtPayload::new();
        payload.set_issuer(ISSUER);
        payload.set_subject(client_id);
        payload.set_audience(vec![CLIENT_AUDIENCE]);
        payload.set_issued_at(&SystemTime::now());
        payload.set_claim(
            SCOPES_CLAIM,
            Some(Value::Array(
                scopes.iter().cloned().map(Value::String).collect(),
            )),
        )?;

        Ok(jose::seal(&self.keys, &payload)?)
    }

    /// Scopes granted to `client_id`, or `InvalidClientCredentials`.
    pub fn decode(&self, client_id: &str, secret: &str) -> Result<Vec<String>, CredentialError> {
        let payload = jose::open(&self.keys, secret).map_err(|e| {
            debug!(client_id, error = %e, "client secret did not decrypt or verify");
            CredentialError::InvalidClientCredentials
        })?;
        jose::validate(&payload, ISSUER, Some(CLIENT_AUDIENCE), SystemTime::now()).map_err(|e| {
            debug!(client_id, error = %e, "client secret claims rejected");
            CredentialError::InvalidClientCredentials
        })?;

        if payload.subject() != Some(client_id) {
            debug!(client_id, "client secret issued for another client");
            return Err(CredentialError::InvalidClientCredentials);
        }

        scopes_of(&payload).ok_or(CredentialError::InvalidClientCredentials)
    }
}
