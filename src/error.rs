use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::repos::error::RepoError;
use crate::services::auth::principal_resolver::ResolveError;
use crate::services::cache::CacheError;

const TYPE_BAD_REQUEST: &str = "https://www.rfc-editor.org/rfc/rfc9110#section-15.5.1";
const TYPE_UNAUTHORIZED: &str = "https://www.rfc-editor.org/rfc/rfc9110#section-15.5.2";
const TYPE_FORBIDDEN: &str = "https://www.rfc-editor.org/rfc/rfc9110#section-15.5.4";
const TYPE_NOT_FOUND: &str = "https://www.rfc-editor.org/rfc/rfc9110#section-15.5.5";
const TYPE_INTERNAL: &str = "https://www.rfc-editor.org/rfc/rfc9110#section-15.6.1";

/// Problem body shared by every failure response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub status: u16,
    pub title: &'static str,
    pub detail: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("missing parameter")]
    MissingParameter(Vec<String>),

    #[error("invalid scope: {0}")]
    InvalidScope(String),

    #[error("unknown service: {0}")]
    UnknownService(String),

    #[error("unsupported grant type: {0}")]
    UnsupportedGrantType(String),

    #[error("unknown or expired state")]
    InvalidState,

    #[error("requested client scope is not available")]
    InvalidClientScopeRequested,

    #[error("invalid client credentials")]
    InvalidClientCredentials,

    #[error("unauthorized")]
    Unauthorized,

    #[error("invalid refresh token")]
    RefreshTokenInvalid,

    #[error("permission mismatch")]
    PermissionMismatch,

    #[error("missing scope: {0}")]
    MissingScope(String),

    #[error("user disabled")]
    UserDisabled,

    #[error("unknown user")]
    UnknownUser,

    #[error("internal server error")]
    Internal,
}

impl AppError {
    pub fn missing(parameter: &str) -> Self {
        Self::MissingParameter(vec![format!("'{parameter}' is required")])
    }

    fn describe(&self) -> (StatusCode, &'static str, &'static str, String) {
        match self {
            AppError::MissingParameter(_) => (
                StatusCode::BAD_REQUEST,
                TYPE_BAD_REQUEST,
                "Request Missing Parameter",
                "The request is missing a required parameter. Check the errors field for more information".into(),
            ),
            AppError::InvalidScope(scope) => (
                StatusCode::BAD_REQUEST,
                TYPE_BAD_REQUEST,
                "Invalid Scope Set",
                format!("The request contained an invalid scope: '{scope}'"),
            ),
            AppError::UnknownService(service) => (
                StatusCode::BAD_REQUEST,
                TYPE_BAD_REQUEST,
                "Unknown Service",
                format!("The service '{service}' is not registered"),
            ),
            AppError::UnsupportedGrantType(grant) => (
                StatusCode::BAD_REQUEST,
                TYPE_BAD_REQUEST,
                "Unsupported Grant Type",
                format!("The grant type '{grant}' is not supported"),
            ),
            AppError::InvalidState => (
                StatusCode::BAD_REQUEST,
                TYPE_BAD_REQUEST,
                "Invalid State",
                "The supplied state is unknown, already used or expired. Restart the login".into(),
            ),
            AppError::InvalidClientScopeRequested => (
                StatusCode::BAD_REQUEST,
                TYPE_BAD_REQUEST,
                "Invalid Client Scope Requested",
                "The requested scopes are not available for this client".into(),
            ),
            AppError::InvalidClientCredentials => (
                StatusCode::UNAUTHORIZED,
                TYPE_UNAUTHORIZED,
                "Invalid Client Credentials",
                "The supplied client id and client secret do not match".into(),
            ),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                TYPE_UNAUTHORIZED,
                "Unauthorized",
                "A valid bearer token is required to access this resource".into(),
            ),
            AppError::RefreshTokenInvalid => (
                StatusCode::FORBIDDEN,
                TYPE_FORBIDDEN,
                "Invalid Refresh Token",
                "The refresh token is either expired or has been revoked".into(),
            ),
            AppError::PermissionMismatch => (
                StatusCode::FORBIDDEN,
                TYPE_FORBIDDEN,
                "Permission Mismatch",
                "You can not grant permissions you do not hold yourself".into(),
            ),
            AppError::MissingScope(scope) => (
                StatusCode::FORBIDDEN,
                TYPE_FORBIDDEN,
                "Missing Scope",
                format!("The scope '{scope}' is required for this operation"),
            ),
            AppError::UserDisabled => (
                StatusCode::FORBIDDEN,
                TYPE_FORBIDDEN,
                "User Disabled",
                "The account has been disabled".into(),
            ),
            AppError::UnknownUser => (
                StatusCode::NOT_FOUND,
                TYPE_NOT_FOUND,
                "Unknown User",
                "The user selected for this operation is not known".into(),
            ),
            AppError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                TYPE_INTERNAL,
                "Internal Server Error",
                "An internal error occurred while handling the request".into(),
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, kind, title, detail) = self.describe();
        let errors = match self {
            AppError::MissingParameter(errors) => errors,
            _ => Vec::new(),
        };

        let body = ErrorResponse {
            kind,
            status: status.as_u16(),
            title,
            detail,
            errors,
        };

        let mut response = (status, Json(body)).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

impl From<RepoError> for AppError {
    fn from(e: RepoError) -> Self {
        error!(error = %e, "durable store failure");
        AppError::Internal
    }
}

impl From<CacheError> for AppError {
    fn from(e: CacheError) -> Self {
        error!(error = %e, "ephemeral cache failure");
        AppError::Internal
    }
}

/// Outside the grant flows an unresolvable subject is an unknown user.
impl From<ResolveError> for AppError {
    fn from(e: ResolveError) -> Self {
        match e {
            ResolveError::UnknownPrincipal => AppError::UnknownUser,
            ResolveError::Repo(e) => e.into(),
        }
    }
}
