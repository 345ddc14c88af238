use serde::Deserialize;

use crate::error::AppError;

#[derive(Debug, Clone, Deserialize)]
pub struct AssignPermissionsRequest {
    pub user: Option<String>,
    pub assignments: Option<Vec<Assignment>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Assignment {
    pub service: Option<String>,
    pub scope: Option<String>,
}

/// Validated form of [`AssignPermissionsRequest`]. Grants are `(service, level)`.
#[derive(Debug, Clone)]
pub struct PermissionAssignment {
    pub user: String,
    pub grants: Vec<(String, String)>,
}

impl AssignPermissionsRequest {
    pub fn validate(self) -> Result<PermissionAssignment, AppError> {
        let mut errors = Vec::new();

        let user = self.user.map(|u| u.trim().to_string()).unwrap_or_default();
        if user.is_empty() {
            errors.push("'user' is required".to_string());
        }

        let assignments = self.assignments.unwrap_or_default();
        if assignments.is_empty() {
            errors.push("'assignments' is required".to_string());
        }

        let mut grants = Vec::with_capacity(assignments.len());
        for (i, assignment) in assignments.into_iter().enumerate() {
            let service = assignment.service.unwrap_or_default();
            let scope = assignment.scope.unwrap_or_default();
            if service.trim().is_empty() {
                errors.push(format!("'assignments[{i}].service' is required"));
            }
            if scope.trim().is_empty() {
                errors.push(format!("'assignments[{i}].scope' is required"));
            }
            grants.push((service.trim().to_string(), scope.trim().to_string()));
        }

        if !errors.is_empty() {
            return Err(AppError::MissingParameter(errors));
        }
        Ok(PermissionAssignment { user, grants })
    }
}
