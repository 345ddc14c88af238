/*
 * Responsibility
 * - URL 構造を定義
 * - 公開: /login, /callback, /token, /revoke, /.well-known/{jwks.json,openid-configuration}, /config, /health
 * - Bearer 必須: /clients, /users/{user_id}, /permissions/assign (route_layer で access middleware を適用)
 */
use axum::{
    Router,
    routing::{get, patch, post},
};

use crate::api::handlers::{
    clients::create_client,
    config::configuration,
    health::health,
    login::{callback, login},
    permissions::assign_permissions,
    revoke::revoke,
    token::token,
    users::user_information,
    well_known::{jwks, openid_configuration},
};
use crate::middleware;
use crate::state::AppState;

pub fn routes(state: AppState) -> Router<AppState> {
    let protected = middleware::auth::access::apply(
        Router::new()
            .route("/clients", post(create_client))
            .route("/users/{user_id}", get(user_information))
            .route("/permissions/assign", patch(assign_permissions)),
        state,
    );

    Router::new()
        .route("/login", get(login))
        .route("/callback", get(callback))
        // GET serves the redirect issued by /callback.
        .route("/token", get(token).post(token))
        .route("/revoke", post(revoke))
        .route("/.well-known/jwks.json", get(jwks))
        .route("/.well-known/openid-configuration", get(openid_configuration))
        .route("/config", get(configuration))
        .route("/health", get(health))
        .merge(protected)
}
