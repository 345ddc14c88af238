//! Response headers for a service that hands out tokens.
//!
//! Handlers can still override any of these by setting the header themselves.

use axum::Router;
use axum::http::header::{self, HeaderName, HeaderValue};
use tower_http::set_header::SetResponseHeaderLayer;

const DEFAULT_HEADERS: [(HeaderName, &str); 5] = [
    (HeaderName::from_static("x-frame-options"), "DENY"),
    (HeaderName::from_static("x-content-type-options"), "nosniff"),
    // The authorize redirect carries `state` and the PKCE challenge.
    (HeaderName::from_static("referrer-policy"), "no-referrer"),
    // RFC 6749 §5.1: token responses must not be cached.
    (header::CACHE_CONTROL, "no-store"),
    (header::PRAGMA, "no-cache"),
];

pub fn apply(router: Router) -> Router {
    DEFAULT_HEADERS
        .into_iter()
        .fold(router, |router, (name, value)| {
            router.layer(SetResponseHeaderLayer::if_not_present(
                name,
                HeaderValue::from_static(value),
            ))
        })
}
