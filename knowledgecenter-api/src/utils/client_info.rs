use axum::{extract::FromRequestParts, http::header, http::request::Parts};
use service_core::middleware::client_ip::client_ip_from_parts;
use std::convert::Infallible;

/// Caller address and user agent, stored on refresh tokens for audit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for ClientInfo
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_agent = parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(|v| v.to_string());

        Ok(ClientInfo {
            ip: client_ip_from_parts(parts),
            user_agent,
        })
    }
}
