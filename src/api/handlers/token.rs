use axum::Json;
use axum::extract::State;

use crate::api::dto::{token_request::TokenRequest, token_response::TokenResponse};
use crate::api::extractors::FormOrJson;
use crate::error::AppError;
use crate::services::auth::TokenGrant;
use crate::state::AppState;

pub async fn token(
    State(state): State<AppState>,
    FormOrJson(req): FormOrJson<TokenRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    let grant = TokenGrant::try_from(req)?;
    let out = state.tokens.exchange(grant).await?;
    Ok(Json(out.into()))
}
