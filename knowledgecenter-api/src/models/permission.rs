use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Role that passes every permission check.
pub const FULL_ACCESS_ROLE: &str = "full_access";

/// Wildcard method matching any HTTP verb for a pattern.
pub const ANY_METHOD: &str = "*";

/// One row of `api_permissions`: callers need at least one of `required_roles`
/// to reach `method path_pattern`.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct PermissionRule {
    pub method: String,
    /// Route template with `{param}` placeholders, relative to the API prefix.
    pub path_pattern: String,
    pub required_roles: Vec<String>,
}

impl PermissionRule {
    pub fn new(method: &str, path_pattern: &str, required_roles: &[&str]) -> Self {
        Self {
            method: method.to_string(),
            path_pattern: path_pattern.to_string(),
            required_roles: required_roles.iter().map(|r| r.to_string()).collect(),
        }
    }
}
