use axum::extract::State;
use axum::http::StatusCode;

use crate::api::dto::revoke::RevokeRequest;
use crate::api::extractors::FormOrJson;
use crate::error::AppError;
use crate::state::AppState;

/// Always 200: the caller learns nothing about whether the token was valid.
pub async fn revoke(
    State(state): State<AppState>,
    req: Result<FormOrJson<RevokeRequest>, AppError>,
) -> StatusCode {
    if let Ok(FormOrJson(RevokeRequest { token: Some(token) })) = req {
        state.tokens.revoke(token.trim()).await;
    }
    StatusCode::OK
}
