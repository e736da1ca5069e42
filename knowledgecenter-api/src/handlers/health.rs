use axum::{extract::State, Json};
use serde_json::{json, Value};
use service_core::error::AppError;

use crate::AppState;

/// Service health check; 503 when the identity store is unreachable.
pub async fn health_check(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    state.store.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Identity store health check failed");
        AppError::ServiceUnavailable
    })?;

    Ok(Json(json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
    })))
}
