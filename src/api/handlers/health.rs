/*
 * Responsibility
 * - GET /health: cache と durable store の疎通確認
 */
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde_json::json;
use tracing::warn;

use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let cache = state.cache.ping().await;
    let store = state.resolver.directory().ping().await;

    match (cache, store) {
        (Ok(()), Ok(())) => (StatusCode::OK, Json(json!({"status": "ok"}))),
        (cache, store) => {
            warn!(cache = ?cache.err(), store = ?store.err(), "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"status": "unavailable"})),
            )
        }
    }
}
