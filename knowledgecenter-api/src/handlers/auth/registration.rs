use axum::{extract::State, http::StatusCode, Json};
use axum_extra::extract::CookieJar;
use service_core::error::AppError;

use crate::{
    dtos::auth::{RegisterRequest, RegisterResponse, TokenResponse},
    utils::{ClientInfo, ValidatedJson},
    AppState,
};

/// Create an account, join the `public` group and start a session.
pub async fn register(
    State(state): State<AppState>,
    client: ClientInfo,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<RegisterRequest>,
) -> Result<(StatusCode, CookieJar, Json<RegisterResponse>), AppError> {
    let session = state.sessions.register(req, &client).await?;

    let tokens = TokenResponse::from(&session.tokens);
    let jar = state
        .refresh_cookie
        .issue(jar, session.tokens.refresh_secret);

    Ok((
        StatusCode::CREATED,
        jar,
        Json(RegisterResponse {
            user: session.user,
            tokens,
            message: "Registration successful".to_string(),
        }),
    ))
}
