//! PKCE state for the authorization-code flow.
//!
//! `begin` parks `{code_verifier, redirect_uri}` in the shared cache under a
//! fresh random `state`; `consume` takes it back exactly once.
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::services::cache::{CacheClient, CacheError};
use crate::services::random::random_token;

pub const STATE_TTL: Duration = Duration::from_secs(300);

const STATE_BYTES: usize = 32;
const VERIFIER_BYTES: usize = 64;
const KEY_PREFIX: &str = "authorization-state:";

#[derive(Debug, Error)]
pub enum StateError {
    #[error("state not found")]
    NotFound,

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("failed to generate random value: {0}")]
    Random(#[from] getrandom::Error),

    #[error("stored state is not valid json: {0}")]
    Corrupt(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationState {
    pub code_verifier: String,
    pub redirect_uri: String,
}

/// What `/login` needs to build the provider redirect.
#[derive(Debug, Clone)]
pub struct PendingAuthorization {
    pub state: String,
    pub code_challenge: String,
}

#[derive(Clone)]
pub struct AuthorizationStateStore {
    cache: Arc<dyn CacheClient>,
    ttl: Duration,
}

impl AuthorizationStateStore {
    pub fn new(cache: Arc<dyn CacheClient>) -> Self {
        Self {
            cache,
            ttl: STATE_TTL,
        }
    }

    pub async fn begin(&self, redirect_uri: &str) -> Result<PendingAuthorization, StateError> {
        let state = random_token(STATE_BYTES)?;
        let code_verifier = random_token(VERIFIER_BYTES)?;
        let code_challenge = code_challenge(&code_verifier);

        let stored = serde_json::to_string(&AuthorizationState {
            code_verifier,
            redirect_uri: redirect_uri.to_string(),
        })?;
        self.cache
            .set_with_ttl(&key(&state), &stored, self.ttl)
            .await?;

        Ok(PendingAuthorization {
            state,
            code_challenge,
        })
    }

    /// Single use: the entry is gone after the first successful call.
    pub async fn consume(&self, state: &str) -> Result<AuthorizationState, StateError> {
        let stored = self
            .cache
            .take_string(&key(state))
            .await?
            .ok_or(StateError::NotFound)?;
        Ok(serde_json::from_str(&stored)?)
    }
}

/// S256 PKCE challenge: BASE64URL(SHA256(verifier)).
pub fn code_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

fn key(state: &str) -> String {
    format!("{KEY_PREFIX}{state}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::cache::memory::MemoryCache;

    fn store() -> AuthorizationStateStore {
        AuthorizationStateStore::new(Arc::new(MemoryCache::new()))
    }

    #[tokio::test]
    async fn consume_returns_what_begin_stored() {
        let store = store();
        let pending = store.begin("https://app.example.org/done").await.unwrap();

        let state = store.consume(&pending.state).await.unwrap();

        assert_eq!(state.redirect_uri, "https://app.example.org/done");
        assert_eq!(code_challenge(&state.code_verifier), pending.code_challenge);
        assert!((43..=128).contains(&state.code_verifier.len()));
    }

    #[tokio::test]
    async fn state_is_single_use() {
        let store = store();
        let pending = store.begin("https://app.example.org/done").await.unwrap();

        store.consume(&pending.state).await.unwrap();
        assert!(matches!(
            store.consume(&pending.state).await,
            Err(StateError::NotFound)
        ));
    }

    #[tokio::test]
    async fn unknown_state_is_not_found() {
        assert!(matches!(
            store().consume("never-issued").await,
            Err(StateError::NotFound)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn state_expires_after_five_minutes() {
        let store = store();
        let pending = store.begin("https://app.example.org/done").await.unwrap();

        tokio::time::advance(STATE_TTL + Duration::from_secs(1)).await;

        assert!(matches!(
            store.consume(&pending.state).await,
            Err(StateError::NotFound)
        ));
    }

    #[test]
    fn challenge_matches_rfc7636_example() {
        assert_eq!(
            code_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }
}
