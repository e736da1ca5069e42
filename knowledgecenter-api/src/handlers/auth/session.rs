use axum::{
    extract::State,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::CookieJar;
use service_core::error::AppError;

use crate::{
    dtos::auth::{LoginRequest, LoginResponse, MessageResponse, TokenResponse},
    services::ServiceError,
    utils::{ClientInfo, RefreshCookie, ValidatedJson},
    AppState,
};

/// Login with a login handle (or email) and password
pub async fn login(
    State(state): State<AppState>,
    client: ClientInfo,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), AppError> {
    let session = state.sessions.login(req, &client).await?;

    let tokens = TokenResponse::from(&session.tokens);
    let jar = state
        .refresh_cookie
        .issue(jar, session.tokens.refresh_secret);

    Ok((
        jar,
        Json(LoginResponse {
            user: session.user,
            tokens,
        }),
    ))
}

/// Rotate the refresh cookie and return a new access token.
///
/// A rejected refresh token also clears the cookie.
pub async fn refresh(
    State(state): State<AppState>,
    client: ClientInfo,
    jar: CookieJar,
) -> Response {
    let Some(secret) = RefreshCookie::read(&jar) else {
        return (
            state.refresh_cookie.clear(jar),
            AppError::from(ServiceError::InvalidToken),
        )
            .into_response();
    };

    match state.sessions.refresh(&secret, &client).await {
        Ok(session) => {
            let body = TokenResponse::from(&session.tokens);
            let jar = state
                .refresh_cookie
                .issue(jar, session.tokens.refresh_secret);
            (jar, Json(body)).into_response()
        }
        Err(e) if e.is_token_error() => {
            (state.refresh_cookie.clear(jar), AppError::from(e)).into_response()
        }
        Err(e) => AppError::from(e).into_response(),
    }
}

/// Revoke the presented refresh token, if any, and clear the cookie.
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    if let Some(secret) = RefreshCookie::read(&jar) {
        if let Err(e) = state.sessions.logout(&secret).await {
            tracing::error!(error = %e, "Failed to revoke refresh token on logout");
        }
    }

    (
        state.refresh_cookie.clear(jar),
        Json(MessageResponse::new("Logged out successfully")),
    )
}
