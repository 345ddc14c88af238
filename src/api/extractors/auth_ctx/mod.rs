//! Caller identity for bearer-protected handlers.
//!
//! `types` holds the plain context, `core` the axum extractor.

mod core;
mod types;

pub use self::core::AuthCtxExtractor;
pub use types::AuthCtx;
