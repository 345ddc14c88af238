/*
 * Responsibility
 * - middleware の公開インターフェース
 * - http: request-id / trace / body limit / timeout
 * - auth: Bearer access token → AuthCtx
 */
pub mod auth;
pub mod cors;
pub mod http;
pub mod security_headers;
