pub mod client_credentials;
pub mod directory;
pub mod jose;
pub mod principal;
pub mod principal_resolver;
pub mod refresh_ledger;
pub mod scope;
pub mod state_store;
pub mod token_issuer;
pub mod token_service;

pub use client_credentials::ClientCredentialCodec;
pub use directory::{Directory, PgDirectory};
pub use principal::Principal;
pub use principal_resolver::PrincipalResolver;
pub use refresh_ledger::RefreshTokenLedger;
pub use state_store::AuthorizationStateStore;
pub use token_issuer::TokenIssuer;
pub use token_service::{TokenGrant, TokenService};
