use service_core::error::AppError;
use thiserror::Error;

use super::store::StoreError;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Invalid email")]
    InvalidEmail,

    #[error("Invalid name")]
    InvalidName,

    #[error("Invalid password")]
    InvalidPassword,

    #[error("Email already exists")]
    EmailExists,

    #[error("Login ID already exists")]
    LoginIdExists,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token revoked")]
    TokenRevoked,

    #[error("Token expired")]
    TokenExpired,

    #[error("User not found")]
    UserNotFound,

    #[error("Public group not found")]
    PublicGroupNotFound,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    /// Refresh-token failures; the handler clears the cookie on these.
    pub fn is_token_error(&self) -> bool {
        matches!(
            self,
            ServiceError::InvalidToken | ServiceError::TokenRevoked | ServiceError::TokenExpired
        )
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let message = err.to_string();
        match err {
            ServiceError::InvalidEmail
            | ServiceError::InvalidName
            | ServiceError::InvalidPassword => AppError::BadRequest(anyhow::anyhow!(message)),
            ServiceError::EmailExists | ServiceError::LoginIdExists => {
                AppError::Conflict(anyhow::anyhow!(message))
            }
            ServiceError::InvalidCredentials
            | ServiceError::InvalidToken
            | ServiceError::TokenRevoked
            | ServiceError::TokenExpired => AppError::Unauthorized(anyhow::anyhow!(message)),
            ServiceError::UserNotFound => AppError::NotFound(anyhow::anyhow!(message)),
            ServiceError::PublicGroupNotFound => AppError::InternalError(anyhow::anyhow!(
                "The \"public\" group is missing; check the seed data"
            )),
            ServiceError::Store(e) => AppError::DatabaseError(anyhow::Error::new(e)),
            ServiceError::Internal(e) => AppError::InternalError(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, response::IntoResponse};

    fn status(err: ServiceError) -> StatusCode {
        AppError::from(err).into_response().status()
    }

    #[test]
    fn error_kinds_map_to_http_status() {
        assert_eq!(status(ServiceError::InvalidEmail), StatusCode::BAD_REQUEST);
        assert_eq!(status(ServiceError::InvalidName), StatusCode::BAD_REQUEST);
        assert_eq!(status(ServiceError::InvalidPassword), StatusCode::BAD_REQUEST);
        assert_eq!(status(ServiceError::EmailExists), StatusCode::CONFLICT);
        assert_eq!(status(ServiceError::LoginIdExists), StatusCode::CONFLICT);
        assert_eq!(status(ServiceError::InvalidCredentials), StatusCode::UNAUTHORIZED);
        assert_eq!(status(ServiceError::InvalidToken), StatusCode::UNAUTHORIZED);
        assert_eq!(status(ServiceError::TokenRevoked), StatusCode::UNAUTHORIZED);
        assert_eq!(status(ServiceError::TokenExpired), StatusCode::UNAUTHORIZED);
        assert_eq!(status(ServiceError::UserNotFound), StatusCode::NOT_FOUND);
        assert_eq!(
            status(ServiceError::PublicGroupNotFound),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status(ServiceError::Store(StoreError::NotFound("x".into()))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn token_errors() {
        assert!(ServiceError::TokenRevoked.is_token_error());
        assert!(!ServiceError::InvalidCredentials.is_token_error());
    }
}
