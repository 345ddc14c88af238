/*
 * Responsibility
 * - PATCH /permissions/assign: ユーザーへの service:level の付与
 * - service と level は catalog に存在するものに限る。既存の付与はそのまま
 */
use axum::{Json, extract::State};
use tracing::info;
use uuid::Uuid;

use crate::api::dto::permissions::AssignPermissionsRequest;
use crate::api::dto::users::UserResponse;
use crate::api::extractors::AuthCtxExtractor;
use crate::error::AppError;
use crate::repos::user_repo::PermissionRow;
use crate::services::auth::scope;
use crate::state::AppState;

const REQUIRED_SCOPE: &str = "user-management:write";

pub async fn assign_permissions(
    State(state): State<AppState>,
    AuthCtxExtractor(ctx): AuthCtxExtractor,
    Json(req): Json<AssignPermissionsRequest>,
) -> Result<Json<UserResponse>, AppError> {
    ctx.require_scope(REQUIRED_SCOPE)?;
    let req = req.validate()?;

    let directory = state.resolver.directory();
    let id = Uuid::parse_str(&req.user).map_err(|_| AppError::UnknownUser)?;
    let user = directory
        .user_by_id(id)
        .await?
        .ok_or(AppError::UnknownUser)?;

    let services = directory.services().await?;
    let mut grants = Vec::with_capacity(req.grants.len());
    for (service, level) in req.grants {
        let known = services
            .iter()
            .find(|s| s.name == service)
            .ok_or_else(|| AppError::UnknownService(service.clone()))?;
        if !known.supported_scope_levels.contains(&level) {
            return Err(AppError::InvalidScope(scope::format_scope(&service, &level)));
        }
        grants.push(PermissionRow {
            service,
            scope_level: level,
        });
    }

    directory.assign_permissions(user.id, &grants).await?;
    info!(
        user_id = %user.id,
        granted_by = %ctx.subject,
        count = grants.len(),
        "permissions assigned"
    );

    let permissions = state.resolver.permissions(&user).await?;
    Ok(Json(UserResponse::new(user, permissions)))
}
