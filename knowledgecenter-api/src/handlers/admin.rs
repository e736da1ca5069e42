use axum::{extract::State, Json};
use service_core::error::AppError;

use crate::{
    dtos::admin::{PermissionListResponse, ReloadPermissionsResponse},
    middleware::AuthUser,
    AppState,
};

/// Reload the permission table from the store.
pub async fn refresh_permissions(
    State(state): State<AppState>,
    AuthUser(auth): AuthUser,
) -> Result<Json<ReloadPermissionsResponse>, AppError> {
    let rules_loaded = state
        .permissions
        .reload(state.store.as_ref())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::Error::new(e)))?;

    tracing::info!(
        user_id = %auth.user_id,
        rules_loaded,
        "Permission table reloaded"
    );

    Ok(Json(ReloadPermissionsResponse {
        message: "Permissions reloaded".to_string(),
        rules_loaded,
    }))
}

pub async fn list_permissions(State(state): State<AppState>) -> Json<PermissionListResponse> {
    Json(PermissionListResponse {
        rules: state.permissions.rules(),
    })
}
