use axum::{extract::State, Json};
use axum_extra::extract::CookieJar;
use service_core::error::AppError;

use crate::{
    dtos::auth::{MeResponse, MessageResponse},
    middleware::AuthUser,
    AppState,
};

/// Current user and effective roles, read from the store rather than the token.
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(auth): AuthUser,
) -> Result<Json<MeResponse>, AppError> {
    let profile = state.sessions.me(&auth.user_id).await?;
    Ok(Json(MeResponse {
        user: profile.user,
        roles: profile.roles,
    }))
}

/// Revoke every refresh token of the caller.
pub async fn logout_all(
    State(state): State<AppState>,
    AuthUser(auth): AuthUser,
    jar: CookieJar,
) -> Result<(CookieJar, Json<MessageResponse>), AppError> {
    state.sessions.logout_all(&auth.user_id).await?;
    Ok((
        state.refresh_cookie.clear(jar),
        Json(MessageResponse::new("Logged out from all sessions")),
    ))
}
