use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::UserInfo;
use crate::services::tokens::IssuedTokens;

/// Registration body. Email, name and password rules are enforced by the
/// session service so each failure maps to its own error kind.
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    pub email: String,

    pub password: String,

    /// Locale tag to display name, e.g. `{"en-US": "Alice"}`.
    #[serde(default)]
    pub name: Option<serde_json::Value>,

    /// Defaults to the email address.
    #[validate(length(min = 1, max = 254, message = "Login ID must be 1-254 characters"))]
    #[serde(default)]
    pub login_id: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    /// Login handle, or the email address.
    #[validate(length(min = 1, message = "Login ID is required"))]
    pub login_id: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    #[serde(rename = "access")]
    pub access_token: String,
    #[serde(rename = "type")]
    pub token_type: String,
    pub expires_in: i64,
}

impl From<&IssuedTokens> for TokenResponse {
    fn from(tokens: &IssuedTokens) -> Self {
        Self {
            access_token: tokens.access.token.clone(),
            token_type: "Bearer".to_string(),
            expires_in: tokens.access.expires_in,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user: UserInfo,
    pub tokens: TokenResponse,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user: UserInfo,
    pub tokens: TokenResponse,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: UserInfo,
    pub roles: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
