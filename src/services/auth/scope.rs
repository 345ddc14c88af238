//! `service:level` scope strings and the permission maps they flatten from.
use std::collections::BTreeMap;

use crate::repos::service_repo::ServiceRow;

/// Carried in addition to the flattened grants of an administrator.
pub const ADMIN_SCOPE: &str = "*:*";

/// service name -> ordered scope levels
pub type Permissions = BTreeMap<String, Vec<String>>;

pub fn format_scope(service: &str, level: &str) -> String {
    format!("{service}:{level}")
}

/// Split `service:level`. Both halves must be non-empty.
pub fn parse_scope(scope: &str) -> Option<(&str, &str)> {
    let (service, level) = scope.split_once(':')?;
    if service.is_empty() || level.is_empty() {
        return None;
    }
    Some((service, level))
}

pub fn flatten(permissions: &Permissions, administrator: bool) -> Vec<String> {
    let mut scopes: Vec<String> = permissions
        .iter()
        .flat_map(|(service, levels)| levels.iter().map(move |l| format_scope(service, l)))
        .collect();
    if administrator {
        scopes.push(ADMIN_SCOPE.to_string());
    }
    scopes
}

/// Group flat scope strings back into a permission map. The wildcard and
/// malformed entries are skipped.
pub fn group(scopes: &[String]) -> Permissions {
    let mut permissions = Permissions::new();
    for (service, level) in scopes
        .iter()
        .filter(|s| s.as_str() != ADMIN_SCOPE)
        .filter_map(|s| parse_scope(s))
    {
        let levels = permissions.entry(service.to_string()).or_default();
        if !levels.iter().any(|l| l == level) {
            levels.push(level.to_string());
        }
    }
    permissions
}

/// Every level of every known service.
pub fn catalog_permissions(services: &[ServiceRow]) -> Permissions {
    services
        .iter()
        .map(|s| (s.name.clone(), s.supported_scope_levels.clone()))
        .collect()
}
