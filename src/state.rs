/*
 * Responsibility
 * - Router に紐づける共有コンテキスト (AppState)
 *   - keys / provider / token service などプロセス単位で一度だけ作るもの
 * - Clone 前提で持つ (内部は Arc/Clone cheap)
 */
use std::sync::Arc;
use std::time::Duration;

use crate::services::auth::refresh_ledger::RefreshTokenStore;
use crate::services::auth::{
    AuthorizationStateStore, ClientCredentialCodec, Directory, PrincipalResolver,
    RefreshTokenLedger, TokenIssuer, TokenService,
};
use crate::services::cache::CacheClient;
use crate::services::keys::KeyManager;
use crate::services::oidc::ExternalProvider;

/// Tunables that are not collaborators.
#[derive(Clone, Debug)]
pub struct StateSettings {
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub public_base_url: Option<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub keys: Arc<KeyManager>,
    pub provider: Arc<ExternalProvider>,
    pub cache: Arc<dyn CacheClient>,
    pub resolver: PrincipalResolver,
    pub states: AuthorizationStateStore,
    pub issuer: Arc<TokenIssuer>,
    pub codec: ClientCredentialCodec,
    pub ledger: RefreshTokenLedger,
    pub tokens: TokenService,
    pub public_base_url: Option<String>,
}

impl AppState {
    pub fn new(
        keys: Arc<KeyManager>,
        provider: Arc<ExternalProvider>,
        directory: Arc<dyn Directory>,
        cache: Arc<dyn CacheClient>,
        refresh_store: Arc<dyn RefreshTokenStore>,
        settings: StateSettings,
    ) -> Self {
        let resolver = PrincipalResolver::new(directory);
        let states = AuthorizationStateStore::new(cache.clone());
        let issuer = Arc::new(TokenIssuer::new(
            keys.clone(),
            settings.access_token_ttl,
            settings.refresh_token_ttl,
        ));
        let codec = ClientCredentialCodec::new(keys.clone());
        let ledger = RefreshTokenLedger::new(refresh_store);
        let tokens = TokenService::new(
            states.clone(),
            provider.clone(),
            resolver.clone(),
            issuer.clone(),
            ledger.clone(),
            codec.clone(),
        );

        Self {
            keys,
            provider,
            cache,
            resolver,
            states,
            issuer,
            codec,
            ledger,
            tokens,
            public_base_url: settings.public_base_url,
        }
    }
}
