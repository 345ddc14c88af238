//! OAuth endpoints take `application/x-www-form-urlencoded`; SPA clients tend
//! to send JSON. Accept both, and the query string on GET.

use axum::extract::{Form, FromRequest, Json, Request};
use axum::http::header;
use serde::de::DeserializeOwned;

use crate::error::AppError;

pub struct FormOrJson<T>(pub T);

impl<T, S> FromRequest<S> for FormOrJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.trim_start().starts_with("application/json"));

        if is_json {
            let Json(value) = Json::<T>::from_request(req, state)
                .await
                .map_err(|e| AppError::MissingParameter(vec![e.body_text()]))?;
            Ok(Self(value))
        } else {
            // Form reads the query string for GET/HEAD and the body otherwise.
            let Form(value) = Form::<T>::from_request(req, state)
                .await
                .map_err(|e| AppError::MissingParameter(vec![e.body_text()]))?;
            Ok(Self(value))
        }
    }
}
