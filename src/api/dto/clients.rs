use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateClientRequest {
    pub description: Option<String>,
    pub contact_name: Option<String>,
    #[serde(rename = "contactEMail", alias = "contactEmail")]
    pub contact_email: Option<String>,
    pub scopes: Option<Vec<String>>,
}

/// Validated form of [`CreateClientRequest`].
#[derive(Debug, Clone)]
pub struct NewClient {
    pub description: String,
    pub contact_name: String,
    pub contact_email: String,
    pub scopes: Vec<String>,
}

impl CreateClientRequest {
    pub fn validate(self) -> Result<NewClient, AppError> {
        let mut errors = Vec::new();
        let mut field = |name: &str, value: Option<String>| {
            let value = value.map(|v| v.trim().to_string()).unwrap_or_default();
            if value.is_empty() {
                errors.push(format!("'{name}' is required"));
            }
            value
        };

        let description = field("description", self.description);
        let contact_name = field("contactName", self.contact_name);
        let contact_email = field("contactEMail", self.contact_email);

        let scopes = self.scopes.unwrap_or_default();
        if scopes.is_empty() {
            errors.push("'scopes' is required".to_string());
        }

        if !errors.is_empty() {
            return Err(AppError::MissingParameter(errors));
        }
        Ok(NewClient {
            description,
            contact_name,
            contact_email,
            scopes,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateClientResponse {
    #[serde(rename = "clientID")]
    pub client_id: String,
    #[serde(rename = "clientSecret")]
    pub client_secret: String,
}
