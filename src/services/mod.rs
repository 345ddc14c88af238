pub mod auth;
pub mod cache;
pub mod keys;
pub mod oidc;
pub mod random;
