use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct RevokeRequest {
    pub token: Option<String>,
}
