pub mod auth_ctx;
pub mod form_or_json;

pub use auth_ctx::{AuthCtx, AuthCtxExtractor};
pub use form_or_json::FormOrJson;
