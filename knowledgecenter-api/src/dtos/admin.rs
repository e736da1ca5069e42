use serde::Serialize;

use crate::models::PermissionRule;

#[derive(Debug, Serialize)]
pub struct ReloadPermissionsResponse {
    pub message: String,
    pub rules_loaded: usize,
}

#[derive(Debug, Serialize)]
pub struct PermissionListResponse {
    pub rules: Vec<PermissionRule>,
}
