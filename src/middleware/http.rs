//! Transport layers shared by every route: request ids, access log spans,
//! body limit and the global timeout.

use std::time::Duration;

use axum::error_handling::HandleErrorLayer;
use axum::http::{Request, StatusCode, header::HeaderName};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use tower::timeout::TimeoutLayer;
use tower::{BoxError, ServiceBuilder};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{Span, error, info_span};

use crate::error::ErrorResponse;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

// Token, revoke and management bodies are a handful of short fields.
const BODY_LIMIT_BYTES: usize = 64 * 1024;

// Outlives the 10s provider timeout so a slow code exchange still answers.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub fn apply(router: Router) -> Router {
    let request_id_header = HeaderName::from_static(REQUEST_ID_HEADER);

    let layers = ServiceBuilder::new()
        .layer(HandleErrorLayer::new(|err: BoxError| async move {
            layer_failure(err)
        }))
        .layer(SetRequestIdLayer::new(
            request_id_header.clone(),
            MakeRequestUuid,
        ))
        .layer(PropagateRequestIdLayer::new(request_id_header))
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT_BYTES))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT));

    router.layer(layers)
}

/// Access log span keyed by the request id set one layer above.
fn request_span<B>(request: &Request<B>) -> Span {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    info_span!(
        "request",
        method = %request.method(),
        path = %request.uri().path(),
        request_id,
    )
}

fn layer_failure(err: BoxError) -> Response {
    let (status, kind, title, detail) = if err.is::<tower::timeout::error::Elapsed>() {
        (
            StatusCode::REQUEST_TIMEOUT,
            "https://www.rfc-editor.org/rfc/rfc9110#section-15.5.9",
            "Request Timeout",
            "The request was not answered in time",
        )
    } else {
        error!(error = %err, "middleware failure");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "https://www.rfc-editor.org/rfc/rfc9110#section-15.6.1",
            "Internal Server Error",
            "An internal error occurred while handling the request",
        )
    };

    let body = ErrorResponse {
        kind,
        status: status.as_u16(),
        title,
        detail: detail.to_string(),
        errors: Vec::new(),
    };
    (status, Json(body)).into_response()
}
