use axum::{Json, extract::State};
use serde::Serialize;

use crate::state::AppState;

/// What a frontend needs to talk to the upstream provider itself.
#[derive(Debug, Serialize)]
pub struct ProviderConfiguration {
    pub client_id: String,
    pub issuer: String,
    pub redirect_uri: String,
}

pub async fn configuration(State(state): State<AppState>) -> Json<ProviderConfiguration> {
    Json(ProviderConfiguration {
        client_id: state.provider.client_id().to_string(),
        issuer: state.provider.issuer().to_string(),
        redirect_uri: state.provider.redirect_uri().to_string(),
    })
}
