/*
 * Responsibility
 * - GET /users/{user_id}: ユーザー情報と実効 permission の参照
 * - "me" は token の subject 自身。他人の参照には user-management:read が必要
 */
use axum::{
    Json,
    extract::{Path, State},
};
use uuid::Uuid;

use crate::api::dto::users::UserResponse;
use crate::api::extractors::AuthCtxExtractor;
use crate::error::AppError;
use crate::state::AppState;

const REQUIRED_SCOPE: &str = "user-management:read";
const SELF: &str = "me";

pub async fn user_information(
    State(state): State<AppState>,
    AuthCtxExtractor(ctx): AuthCtxExtractor,
    Path(user_id): Path<String>,
) -> Result<Json<UserResponse>, AppError> {
    let target = if user_id == SELF {
        ctx.subject.as_str()
    } else {
        ctx.require_scope(REQUIRED_SCOPE)?;
        user_id.as_str()
    };

    // Machine clients and malformed ids have no user record.
    let id = Uuid::parse_str(target).map_err(|_| AppError::UnknownUser)?;
    let user = state
        .resolver
        .directory()
        .user_by_id(id)
        .await?
        .ok_or(AppError::UnknownUser)?;
    let permissions = state.resolver.permissions(&user).await?;

    Ok(Json(UserResponse::new(user, permissions)))
}
