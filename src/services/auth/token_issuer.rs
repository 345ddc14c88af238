use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use josekit::JoseError;
use josekit::jwt::JwtPayload;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::services::auth::jose;
use crate::services::auth::principal::Principal;
use crate::services::keys::KeyManager;

pub const ISSUER: &str = "user-management";
pub const ACCESS_AUDIENCE: [&str; 2] = ["user-management", "wisdom"];
pub const REFRESH_AUDIENCE: [&str; 1] = ["wisdom"];

pub const SCOPES_CLAIM: &str = "scopes";

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("refresh token invalid")]
    RefreshTokenInvalid,

    #[error("access token invalid")]
    AccessTokenInvalid,

    #[error("failed to build token: {0}")]
    Jose(#[from] JoseError),
}

/// A freshly minted token together with the claims the ledger cares about.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub jti: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct IssuedPair {
    pub access: IssuedToken,
    pub refresh: IssuedToken,
}

/// Verified claims of one of our own tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    pub subject: String,
    pub scopes: Vec<String>,
    pub jti: String,
    pub expires_at: DateTime<Utc>,
}

pub struct TokenIssuer {
    keys: Arc<KeyManager>,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenIssuer {
    pub fn new(keys: Arc<KeyManager>, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            keys,
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn access_token_ttl_seconds(&self) -> u64 {
        self.access_ttl.as_secs()
    }

    /// Signed JWT for `principal` carrying `scopes` verbatim.
    pub fn issue_access_token(
        &self,
        principal: &Principal,
        scopes: &[String],
    ) -> Result<IssuedToken, TokenError> {
        self.mint_access(&principal.id(), scopes)
    }

    /// Signed-then-encrypted refresh token; `jti` is the ledger key.
    pub fn issue_refresh_token(
        &self,
        principal: &Principal,
        scopes: &[String],
    ) -> Result<IssuedToken, TokenError> {
        self.mint_refresh(&principal.id(), scopes)
    }

    pub fn issue_pair(
        &self,
        principal: &Principal,
        scopes: &[String],
    ) -> Result<IssuedPair, TokenError> {
        Ok(IssuedPair {
            access: self.issue_access_token(principal, scopes)?,
            refresh: self.issue_refresh_token(principal, scopes)?,
        })
    }

    /// Rotation: a new pair with exactly the scopes of the presented refresh token.
    pub fn issue_from_refresh_claims(&self, claims: &TokenClaims) -> Result<IssuedPair, TokenError> {
        Ok(IssuedPair {
            access: self.mint_access(&claims.subject, &claims.scopes)?,
            refresh: self.mint_refresh(&claims.subject, &claims.scopes)?,
        })
    }

    /// Every failure collapses into `RefreshTokenInvalid`.
    pub fn decode_refresh_token(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let payload = jose::open(&self.keys, token).map_err(|e| {
            debug!(error = %e, "refresh token did not decrypt or verify");
            TokenError::RefreshTokenInvalid
        })?;
        jose::validate(&payload, ISSUER, Some(REFRESH_AUDIENCE[0]), SystemTime::now()).map_err(
            |e| {
                debug!(error = %e, "refresh token claims rejected");
                TokenError::RefreshTokenInvalid
            },
        )?;
        claims_of(&payload).ok_or(TokenError::RefreshTokenInvalid)
    }

    pub fn verify_access_token(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let payload = jose::verify(&self.keys, token).map_err(|e| {
            debug!(error = %e, "access token did not verify");
            TokenError::AccessTokenInvalid
        })?;
        jose::validate(&payload, ISSUER, Some(ACCESS_AUDIENCE[0]), SystemTime::now()).map_err(
            |e| {
                debug!(error = %e, "access token claims rejected");
                TokenError::AccessTokenInvalid
            },
        )?;
        claims_of(&payload).ok_or(TokenError::AccessTokenInvalid)
    }

    fn mint_access(&self, subject: &str, scopes: &[String]) -> Result<IssuedToken, TokenError> {
        let (payload, jti, expires_at) =
            build_payload(subject, scopes, &ACCESS_AUDIENCE, self.access_ttl)?;
        Ok(IssuedToken {
            token: jose::sign(&self.keys, &payload)?,
            jti,
            expires_at,
        })
    }

    fn mint_refresh(&self, subject: &str, scopes: &[String]) -> Result<IssuedToken, TokenError> {
        let (payload, jti, expires_at) =
            build_payload(subject, scopes, &REFRESH_AUDIENCE, self.refresh_ttl)?;
        Ok(IssuedToken {
            token: jose::seal(&self.keys, &payload)?,
            jti,
            expires_at,
        })
    }
}

fn build_payload(
    subject: &str,
    scopes: &[String],
    audience: &[&str],
    ttl: Duration,
) -> Result<(JwtPayload, String, DateTime<Utc>), TokenError> {
    // JWT times have second resolution; keep the ledger in step.
    let now = Utc::now().trunc_subsecs(0);
    let expires_at = now + TimeDelta::seconds(ttl.as_secs() as i64);
    let jti = Uuid::new_v4().to_string();

    let mut payload = JwtPayload::new();
    payload.set_issuer(ISSUER);
    payload.set_subject(subject);
    payload.set_audience(audience.to_vec());
    payload.set_issued_at(&SystemTime::from(now));
    payload.set_not_before(&SystemTime::from(now));
    payload.set_expires_at(&SystemTime::from(expires_at));
    payload.set_jwt_id(&jti);
    payload.set_claim(
        SCOPES_CLAIM,
        Some(Value::Array(
            scopes.iter().cloned().map(Value::String).collect(),
        )),
    )?;

    Ok((payload, jti, expires_at))
}

/// `scopes` must be an array of strings; everything else is a malformed token.
pub fn scopes_of(payload: &JwtPayload) -> Option<Vec<String>> {
    payload
        .claim(SCOPES_CLAIM)?
        .as_array()?
        .iter()
        .map(|v| v.as_str().map(str::to_string))
        .collect()
}

fn claims_of(payload: &JwtPayload) -> Option<TokenClaims> {
    Some(TokenClaims {
        subject: payload.subject()?.to_string(),
        scopes: scopes_of(payload)?,
        jti: payload.jwt_id()?.to_string(),
        expires_at: DateTime::<Utc>::from(payload.expires_at()?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{test_keys, test_principal};

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(
            test_keys(),
            Duration::from_secs(900),
            Duration::from_secs(43_200),
        )
    }

    #[test]
    fn access_token_carries_the_expected_claims() {
        let issuer = issuer();
        let principal = test_principal(&["alpha:read", "beta:write"], false);
        let scopes = principal.scopes();

        let issued = issuer.issue_access_token(&principal, &scopes).unwrap();
        let payload = jose::verify(&issuer.keys, &issued.token).unwrap();

        assert_eq!(payload.issuer(), Some(ISSUER));
        assert_eq!(payload.subject(), Some(principal.id().as_str()));
        assert_eq!(payload.audience(), Some(ACCESS_AUDIENCE.to_vec()));
        assert_eq!(payload.jwt_id(), Some(issued.jti.as_str()));
        assert_eq!(scopes_of(&payload), Some(scopes));

        let exp = payload.expires_at().unwrap();
        let nbf = payload.not_before().unwrap();
        assert_eq!(exp.duration_since(nbf).unwrap(), Duration::from_secs(900));
    }

    #[test]
    fn refresh_token_is_opaque_and_decodes() {
        let issuer = issuer();
        let principal = test_principal(&["alpha:read"], false);
        let scopes = principal.scopes();

        let issued = issuer.issue_refresh_token(&principal, &scopes).unwrap();

        // JWE compact: five segments, not readable as a JWS
        assert_eq!(issued.token.split('.').count(), 5);
        assert!(jose::verify(&issuer.keys, &issued.token).is_err());

        let claims = issuer.decode_refresh_token(&issued.token).unwrap();
        assert_eq!(claims.subject, principal.id());
        assert_eq!(claims.scopes, scopes);
        assert_eq!(claims.jti, issued.jti);
        assert_eq!(claims.expires_at, issued.expires_at);
    }

    #[test]
    fn access_and_refresh_tokens_are_not_interchangeable() {
        let issuer = issuer();
        let principal = test_principal(&["alpha:read"], false);
        let pair = issuer.issue_pair(&principal, &principal.scopes()).unwrap();

        assert!(matches!(
            issuer.decode_refresh_token(&pair.access.token),
            Err(TokenError::RefreshTokenInvalid)
        ));
        assert!(matches!(
            issuer.verify_access_token(&pair.refresh.token),
            Err(TokenError::AccessTokenInvalid)
        ));
    }

    #[test]
    fn tampered_refresh_token_is_invalid() {
        let issuer = issuer();
        let principal = test_principal(&["alpha:read"], false);
        let issued = issuer
            .issue_refresh_token(&principal, &principal.scopes())
            .unwrap();

        let mut parts: Vec<String> = issued.token.split('.').map(str::to_string).collect();
        let ciphertext = &mut parts[3];
        let flipped = if ciphertext.starts_with('A') { "B" } else { "A" };
        ciphertext.replace_range(0..1, flipped);
        let tampered = parts.join(".");

        assert!(matches!(
            issuer.decode_refresh_token(&tampered),
            Err(TokenError::RefreshTokenInvalid)
        ));
        assert!(matches!(
            issuer.decode_refresh_token("garbage"),
            Err(TokenError::RefreshTokenInvalid)
        ));
    }

    #[test]
    fn refresh_tokens_from_another_key_set_are_invalid() {
        let ours = issuer();
        let theirs = TokenIssuer::new(
            test_keys(),
            Duration::from_secs(900),
            Duration::from_secs(43_200),
        );
        let principal = test_principal(&["alpha:read"], false);
        let foreign = theirs
            .issue_refresh_token(&principal, &principal.scopes())
            .unwrap();

        assert!(matches!(
            ours.decode_refresh_token(&foreign.token),
            Err(TokenError::RefreshTokenInvalid)
        ));
    }

    #[test]
    fn wrong_issuer_is_rejected() {
        let issuer = issuer();
        let (mut payload, _, _) = build_payload(
            "someone",
            &["alpha:read".to_string()],
            &REFRESH_AUDIENCE,
            Duration::from_secs(60),
        )
        .unwrap();
        payload.set_issuer("somebody-else");
        let token = jose::seal(&issuer.keys, &payload).unwrap();

        assert!(matches!(
            issuer.decode_refresh_token(&token),
            Err(TokenError::RefreshTokenInvalid)
        ));
    }

    #[test]
    fn expired_refresh_token_is_rejected() {
        let issuer = issuer();
        let (mut payload, _, _) = build_payload(
            "someone",
            &["alpha:read".to_string()],
            &REFRESH_AUDIENCE,
            Duration::from_secs(60),
        )
        .unwrap();
        let past = SystemTime::now() - Duration::from_secs(3600);
        payload.set_not_before(&(past - Duration::from_secs(60)));
        payload.set_expires_at(&past);
        let token = jose::seal(&issuer.keys, &payload).unwrap();

        assert!(matches!(
            issuer.decode_refresh_token(&token),
            Err(TokenError::RefreshTokenInvalid)
        ));
    }

    #[test]
    fn rotation_keeps_scopes_and_changes_jti() {
        let issuer = issuer();
        let principal = test_principal(&["alpha:read", "beta:write"], true);
        let original = issuer
            .issue_refresh_token(&principal, &principal.scopes())
            .unwrap();
        let claims = issuer.decode_refresh_token(&original.token).unwrap();

        let rotated = issuer.issue_from_refresh_claims(&claims).unwrap();
        let rotated_claims = issuer.decode_refresh_token(&rotated.refresh.token).unwrap();
        let access_claims = issuer.verify_access_token(&rotated.access.token).unwrap();

        assert_eq!(rotated_claims.scopes, claims.scopes);
        assert_eq!(access_claims.scopes, claims.scopes);
        assert_eq!(rotated_claims.subject, claims.subject);
        assert_ne!(rotated_claims.jti, claims.jti);
    }
}
