/*
 * Responsibility
 * - POST /clients: machine client の登録と client secret の発行
 * - 付与できるのは呼び出し元自身が持つ scope のみ
 */
use axum::{Json, extract::State, http::StatusCode};
use tracing::{error, info};

use crate::api::dto::clients::{CreateClientRequest, CreateClientResponse};
use crate::api::extractors::AuthCtxExtractor;
use crate::error::AppError;
use crate::services::auth::Principal;
use crate::services::auth::scope::ADMIN_SCOPE;
use crate::state::AppState;

const REQUIRED_SCOPE: &str = "user-management:write";

pub async fn create_client(
    State(state): State<AppState>,
    AuthCtxExtractor(ctx): AuthCtxExtractor,
    Json(req): Json<CreateClientRequest>,
) -> Result<(StatusCode, Json<CreateClientResponse>), AppError> {
    ctx.require_scope(REQUIRED_SCOPE)?;
    let req = req.validate()?;

    if req.scopes.iter().any(|s| s == ADMIN_SCOPE) {
        return Err(AppError::InvalidClientScopeRequested);
    }

    let held = match state.resolver.resolve_subject(&ctx.subject).await {
        Ok(principal @ Principal::User { .. }) => principal.scopes(),
        // A client's permissions live only in its token.
        Ok(Principal::Client { .. }) => ctx.scopes.clone(),
        Err(e) => return Err(e.into()),
    };
    if let Some(scope) = req.scopes.iter().find(|s| !held.contains(s)) {
        info!(
            subject = %ctx.subject,
            scope = %scope,
            "refusing to grant a scope the caller does not hold"
        );
        return Err(AppError::PermissionMismatch);
    }

    let catalog = state.resolver.catalog_scopes().await.map_err(|e| {
        error!(error = ?e, "failed to read service catalog");
        AppError::Internal
    })?;
    if !req.scopes.iter().all(|s| catalog.contains(s)) {
        return Err(AppError::InvalidClientScopeRequested);
    }

    let client = state
        .resolver
        .directory()
        .create_client(&req.description, &req.contact_name, &req.contact_email)
        .await?;
    let client_id = client.id.to_string();

    let client_secret = state.codec.encode(&client_id, &req.scopes).map_err(|e| {
        error!(client_id = %client_id, error = ?e, "failed to build client secret");
        AppError::Internal
    })?;

    info!(client_id = %client_id, creator = %ctx.subject, "client registered");
    Ok((
        StatusCode::CREATED,
        Json(CreateClientResponse {
            client_id,
            client_secret,
        }),
    ))
}
