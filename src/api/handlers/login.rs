/*
 * Responsibility
 * - GET /login: PKCE state を作って外部 provider の authorize URL へ 302
 * - GET /callback: provider からの code/state を /token へ橋渡し
 */
use axum::{
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Redirect, Response},
};
use tracing::error;

use crate::api::dto::login::{CallbackQuery, LoginQuery};
use crate::error::AppError;
use crate::state::AppState;

pub async fn login(
    State(state): State<AppState>,
    Query(query): Query<LoginQuery>,
) -> Result<Response, AppError> {
    let redirect_uri = query
        .redirect_uri
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::missing("redirect_uri"))?;

    let pending = state.states.begin(&redirect_uri).await.map_err(|e| {
        error!(error = ?e, "failed to store authorization state");
        AppError::Internal
    })?;

    let location = state
        .provider
        .authorize_url(&pending.state, &pending.code_challenge, &redirect_uri)
        .map_err(|e| {
            error!(error = ?e, "failed to build authorize url");
            AppError::Internal
        })?;

    Ok((StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response())
}

pub async fn callback(Query(query): Query<CallbackQuery>) -> Result<Redirect, AppError> {
    let mut errors = Vec::new();
    let code = query.code.filter(|v| !v.trim().is_empty());
    let state = query.state.filter(|v| !v.trim().is_empty());
    if code.is_none() {
        errors.push("'code' is required".to_string());
    }
    if state.is_none() {
        errors.push("'state' is required".to_string());
    }
    let (Some(code), Some(state)) = (code, state) else {
        return Err(AppError::MissingParameter(errors));
    };

    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("grant_type", "authorization_code")
        .append_pair("code", &code)
        .append_pair("state", &state)
        .finish();

    // Relative, so it resolves correctly behind a path prefix.
    Ok(Redirect::to(&format!("token?{query}")))
}
