use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;

use crate::{services::AccessTokenClaims, AppState};

const UNAUTHENTICATED: &str = "Missing or invalid access token";

/// Identity bound to a request by [`authenticate`].
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Public user id (the token subject)
    pub user_id: String,
    pub roles: Vec<String>,
    pub claims: AccessTokenClaims,
}

impl AuthContext {
    fn from_claims(claims: AccessTokenClaims) -> Self {
        Self {
            user_id: claims.sub.clone(),
            roles: claims.roles.clone(),
            claims,
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

fn bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn resolve(state: &AppState, req: &Request) -> Option<AuthContext> {
    let token = bearer_token(req)?;
    match state.jwt.validate_access_token(token) {
        Ok(claims) => Some(AuthContext::from_claims(claims)),
        Err(e) => {
            tracing::debug!(error = %e, "Access token rejected");
            None
        }
    }
}

/// Middleware to require a valid bearer access token.
///
/// Every failure answers 401 with the same message.
pub async fn authenticate(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let context = resolve(&state, &req)
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!(UNAUTHENTICATED)))?;

    req.extensions_mut().insert(context);
    Ok(next.run(req).await)
}

/// Like [`authenticate`] but anonymous requests pass through untouched.
pub async fn optional_authenticate(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    if let Some(context) = resolve(&state, &req) {
        req.extensions_mut().insert(context);
    }
    next.run(req).await
}

/// Extractor for handlers behind [`authenticate`]
pub struct AuthUser(pub AuthContext);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .map(AuthUser)
            .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!(UNAUTHENTICATED)))
    }
}
