//! CORS for browser clients of the token and management endpoints.
//!
//! Development answers any origin. Production answers only the origins in
//! `CORS_ALLOWED_ORIGINS`, and an empty list answers none. Credentials are never
//! allowed: callers send bearer tokens, not cookies.

use std::time::Duration;

use axum::Router;
use axum::http::{HeaderName, HeaderValue, Method, header};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::config::Config;
use crate::middleware::http::REQUEST_ID_HEADER;

const PREFLIGHT_MAX_AGE: Duration = Duration::from_secs(10 * 60);

pub fn apply(router: Router, config: &Config) -> Router {
    router.layer(cors_layer(
        config.app_env.is_production(),
        &config.cors_allowed_origins,
    ))
}

fn cors_layer(production: bool, allowed_origins: &[String]) -> CorsLayer {
    let origins = if production {
        let allowed: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|s| HeaderValue::from_str(s).ok())
            .collect();
        AllowOrigin::predicate(move |origin: &HeaderValue, _| allowed.contains(origin))
    } else {
        AllowOrigin::from(Any)
    };

    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);
    CorsLayer::new()
        .allow_origin(origins)
        // PATCH is the permission assignment route.
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            request_id.clone(),
        ])
        .expose_headers([request_id, header::WWW_AUTHENTICATE])
        .max_age(PREFLIGHT_MAX_AGE)
}
