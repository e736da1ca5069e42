//! Role checks: the dynamic permission table and static role filters.

use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;

use super::auth::AuthContext;
use crate::services::Decision;
use crate::AppState;

/// Middleware consulting the permission table for the matched route.
///
/// Runs after [`super::authenticate`] or [`super::optional_authenticate`];
/// an anonymous request is checked with no roles.
pub async fn authorize(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let pattern = route_pattern(&req, &state.config.api_prefix);
    let method = req.method().as_str().to_string();
    let context = req.extensions().get::<AuthContext>();
    let roles = context.map(|c| c.roles.as_slice()).unwrap_or_default();

    let decision = state.permissions.authorize(&method, &pattern, roles);
    if decision == Decision::Admit {
        return Ok(next.run(req).await);
    }

    tracing::warn!(
        user_id = context.map(|c| c.user_id.as_str()).unwrap_or("-"),
        roles = ?roles,
        method = %method,
        route = %pattern,
        decision = ?decision,
        "Access denied"
    );

    let message = match decision {
        Decision::NoRoles => "authentication required",
        Decision::Unlisted => "Access to this route is not configured",
        Decision::MissingRole | Decision::Admit => "Insufficient role",
    };
    Err(AppError::Forbidden(anyhow::anyhow!(message)))
}

/// Route template the permission rules are keyed on: the matched route
/// relative to the API prefix, with `{param}` placeholders.
pub fn route_pattern(req: &Request, api_prefix: &str) -> String {
    match req.extensions().get::<MatchedPath>() {
        Some(matched) => relative_template(matched.as_str(), api_prefix),
        None => relative_template(req.uri().path(), api_prefix),
    }
}

fn relative_template(path: &str, api_prefix: &str) -> String {
    let relative = match path.strip_prefix(api_prefix) {
        Some(rest) if !api_prefix.is_empty() && (rest.is_empty() || rest.starts_with('/')) => {
            rest
        }
        _ => path,
    };
    if relative.is_empty() {
        return "/".to_string();
    }

    relative
        .split('/')
        .map(|segment| match segment.strip_prefix(':') {
            Some(name) => format!("{{{}}}", name),
            None => segment.to_string(),
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Match {
    Any,
    All,
}

/// Static role filter for [`require_roles`].
#[derive(Debug, Clone)]
pub struct RoleRequirement {
    roles: Vec<String>,
    mode: Match,
}

impl RoleRequirement {
    /// Caller must hold at least one of `roles`.
    pub fn any<I, R>(roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        Self {
            roles: roles.into_iter().map(Into::into).collect(),
            mode: Match::Any,
        }
    }

    /// Caller must hold every one of `roles`.
    pub fn all<I, R>(roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        Self {
            roles: roles.into_iter().map(Into::into).collect(),
            mode: Match::All,
        }
    }

    pub fn is_satisfied_by(&self, held: &[String]) -> bool {
        let holds = |role: &String| held.contains(role);
        match self.mode {
            Match::Any => self.roles.iter().any(holds),
            Match::All => self.roles.iter().all(holds),
        }
    }
}

/// Middleware for `from_fn_with_state(RoleRequirement::any([...]), require_roles)`.
pub async fn require_roles(
    State(requirement): State<RoleRequirement>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let context = req.extensions().get::<AuthContext>().ok_or_else(|| {
        AppError::Unauthorized(anyhow::anyhow!("Missing or invalid access token"))
    })?;

    if !requirement.is_satisfied_by(&context.roles) {
        tracing::warn!(
            user_id = %context.user_id,
            granted_roles = ?context.roles,
            required_roles = ?requirement.roles,
            "Insufficient roles"
        );
        return Err(AppError::Forbidden(anyhow::anyhow!("Insufficient role")));
    }

    Ok(next.run(req).await)
}
