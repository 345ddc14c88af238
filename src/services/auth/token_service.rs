use std::sync::Arc;

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::services::auth::client_credentials::{ClientCredentialCodec, CredentialError};
use crate::services::auth::principal::Principal;
use crate::services::auth::principal_resolver::{PrincipalResolver, ResolveError};
use crate::services::auth::refresh_ledger::RefreshTokenLedger;
use crate::services::auth::scope;
use crate::services::auth::state_store::{AuthorizationStateStore, StateError};
use crate::services::auth::token_issuer::{IssuedPair, TokenError, TokenIssuer};
use crate::services::oidc::ExternalProvider;

/// A `/token` request after its `grant_type` has been validated.
#[derive(Debug, Clone)]
pub enum TokenGrant {
    AuthorizationCode {
        code: String,
        state: String,
    },
    RefreshToken {
        refresh_token: String,
    },
    ClientCredentials {
        client_id: String,
        client_secret: String,
        scope: Option<String>,
    },
}

/// Handler-facing result of a successful grant.
#[derive(Clone, Debug)]
pub struct IssuedTokens {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
    pub refresh_token: Option<String>,
}

/// Orchestrates every grant: resolve a principal, mint a pair, register the refresh `jti`.
#[derive(Clone)]
pub struct TokenService {
    states: AuthorizationStateStore,
    provider: Arc<ExternalProvider>,
    resolver: PrincipalResolver,
    issuer: Arc<TokenIssuer>,
    ledger: RefreshTokenLedger,
    codec: ClientCredentialCodec,
}

impl TokenService {
    pub fn new(
        states: AuthorizationStateStore,
        provider: Arc<ExternalProvider>,
        resolver: PrincipalResolver,
        issuer: Arc<TokenIssuer>,
        ledger: RefreshTokenLedger,
        codec: ClientCredentialCodec,
    ) -> Self {
        Self {
            states,
            provider,
            resolver,
            issuer,
            ledger,
            codec,
        }
    }

    pub async fn exchange(&self, grant: TokenGrant) -> Result<IssuedTokens, AppError> {
        let (principal, pair) = match grant {
            TokenGrant::AuthorizationCode { code, state } => {
                let principal = self.authorization_code(&code, &state).await?;
                let pair = self.issue_for(&principal)?;
                (principal, pair)
            }
            TokenGrant::RefreshToken { refresh_token } => self.rotate(&refresh_token).await?,
            TokenGrant::ClientCredentials {
                client_id,
                client_secret,
                scope,
            } => {
                let principal = self
                    .client_credentials(&client_id, &client_secret, scope.as_deref())
                    .await?;
                let pair = self.issue_for(&principal)?;
                (principal, pair)
            }
        };

        Ok(self.register(&principal, pair).await)
    }

    /// Revoke a refresh token if it is one of ours. Never fails towards the caller.
    pub async fn revoke(&self, token: &str) {
        let Ok(claims) = self.issuer.decode_refresh_token(token) else {
            return;
        };
        if let Err(e) = self.ledger.revoke(&claims.jti).await {
            error!(jti = %claims.jti, error = ?e, "failed to revoke refresh token");
        }
    }

    async fn authorization_code(&self, code: &str, state: &str) -> Result<Principal, AppError> {
        let stored = self.states.consume(state).await.map_err(|e| match e {
            StateError::NotFound => AppError::InvalidState,
            e => {
                error!(error = ?e, "failed to read authorization state");
                AppError::Internal
            }
        })?;

        let identity = self
            .provider
            .exchange_code(code, &stored.code_verifier, &stored.redirect_uri)
            .await
            .map_err(|e| {
                if e.is_rejection() {
                    warn!(error = %e, "provider rejected authorization code");
                    AppError::Unauthorized
                } else {
                    error!(error = ?e, "authorization code exchange failed");
                    AppError::Internal
                }
            })?;

        self.resolver
            .resolve_or_provision(&identity.subject, &identity.info)
            .await
            .map_err(|e| {
                error!(error = ?e, "failed to resolve external identity");
                AppError::Internal
            })
    }

    /// Consume the presented refresh token before anything is issued.
    async fn rotate(&self, refresh_token: &str) -> Result<(Principal, IssuedPair), AppError> {
        let claims = self
            .issuer
            .decode_refresh_token(refresh_token)
            .map_err(|_| AppError::RefreshTokenInvalid)?;

        if !self.ledger.check_alive_and_revoke(&claims.jti).await? {
            info!(jti = %claims.jti, "refresh token replayed or expired");
            return Err(AppError::RefreshTokenInvalid);
        }

        let principal = match self.resolver.resolve_subject(&claims.subject).await {
            Ok(principal) => principal,
            Err(ResolveError::UnknownPrincipal) => return Err(AppError::RefreshTokenInvalid),
            Err(ResolveError::Repo(e)) => return Err(e.into()),
        };
        if !principal.is_active() {
            return Err(AppError::UserDisabled);
        }

        let pair = self
            .issuer
            .issue_from_refresh_claims(&claims)
            .map_err(issuance_failed)?;
        Ok((principal, pair))
    }

    async fn client_credentials(
        &self,
        client_id: &str,
        client_secret: &str,
        requested: Option<&str>,
    ) -> Result<Principal, AppError> {
        let id = Uuid::parse_str(client_id).map_err(|_| AppError::InvalidClientCredentials)?;
        let client = self
            .resolver
            .directory()
            .client_by_id(id)
            .await?
            .ok_or(AppError::InvalidClientCredentials)?;

        let granted = self
            .codec
            .decode(&client.id.to_string(), client_secret)
            .map_err(|e| match e {
                CredentialError::InvalidClientCredentials => AppError::InvalidClientCredentials,
                e => {
                    error!(error = ?e, "failed to decode client secret");
                    AppError::Internal
                }
            })?;

        let scopes = match requested.map(str::trim).filter(|s| !s.is_empty()) {
            Some(requested) => {
                let requested: Vec<String> =
                    requested.split_whitespace().map(str::to_string).collect();
                if !requested.iter().all(|s| granted.contains(s)) {
                    return Err(AppError::InvalidClientScopeRequested);
                }
                requested
            }
            None => granted,
        };

        Ok(Principal::Client {
            client_id: client.id.to_string(),
            permissions: scope::group(&scopes),
        })
    }

    fn issue_for(&self, principal: &Principal) -> Result<IssuedPair, AppError> {
        if !principal.is_active() {
            return Err(AppError::UserDisabled);
        }
        self.issuer
            .issue_pair(principal, &principal.scopes())
            .map_err(issuance_failed)
    }

    /// A failed ledger write drops `refresh_token` from the response; the
    /// access token is still good.
    async fn register(&self, principal: &Principal, pair: IssuedPair) -> IssuedTokens {
        let refresh_token = match self
            .ledger
            .register(&pair.refresh.jti, pair.refresh.expires_at)
            .await
        {
            Ok(()) => Some(pair.refresh.token),
            Err(e) => {
                error!(
                    subject = %principal.id(),
                    jti = %pair.refresh.jti,
                    error = ?e,
                    "failed to register refresh token, omitting it"
                );
                None
            }
        };

        IssuedTokens {
            access_token: pair.access.token,
            token_type: "Bearer",
            expires_in: self.issuer.access_token_ttl_seconds(),
            refresh_token,
        }
    }
}

fn issuance_failed(e: TokenError) -> AppError {
    error!(error = ?e, "failed to issue tokens");
    AppError::Internal
}
