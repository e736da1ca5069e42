use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::error::ServiceError;
use crate::models::User;
use crate::utils::random::generate_token_id;

pub const TOKEN_ISSUER: &str = "knowledgecenter-api";
pub const ACCESS_TOKEN_TTL_MINUTES: i64 = 15;

/// JWT service for access-token issuance and validation (HS256)
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_token_ttl: Duration,
}

/// Claims carried by access tokens
///
/// Missing claims decode to their zero value instead of failing validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessTokenClaims {
    /// Subject (public user id)
    pub sub: String,
    /// Public user id, kept alongside `sub` for existing clients
    pub user_id: String,
    pub login_id: String,
    pub email: String,
    /// Effective roles at issuance time
    pub roles: Vec<String>,
    /// JWT ID (128-bit, hex)
    pub jti: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    pub iss: String,
}

/// Signed access token plus its lifetime in seconds
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_in: i64,
}

impl JwtService {
    pub fn new(secret: &SecretString) -> Result<Self, anyhow::Error> {
        let bytes = secret.expose_secret().as_bytes();
        if bytes.is_empty() {
            return Err(anyhow::anyhow!("JWT secret must not be empty"));
        }

        Ok(Self {
            encoding_key: EncodingKey::from_secret(bytes),
            decoding_key: DecodingKey::from_secret(bytes),
            access_token_ttl: Duration::minutes(ACCESS_TOKEN_TTL_MINUTES),
        })
    }

    /// Access token lifetime in seconds (for client info)
    pub fn access_token_ttl_seconds(&self) -> i64 {
        self.access_token_ttl.num_seconds()
    }

    pub fn issue_access_token(
        &self,
        user: &User,
        roles: &[String],
    ) -> Result<AccessToken, ServiceError> {
        self.issue_access_token_at(user, roles, Utc::now())
    }

    /// Issue with an explicit clock reading.
    pub fn issue_access_token_at(
        &self,
        user: &User,
        roles: &[String],
        now: DateTime<Utc>,
    ) -> Result<AccessToken, ServiceError> {
        let public_id = user.public_id.to_string();
        let claims = AccessTokenClaims {
            sub: public_id.clone(),
            user_id: public_id,
            login_id: user.login_id.clone(),
            email: user.email.clone(),
            roles: roles.to_vec(),
            jti: generate_token_id()?,
            iat: now.timestamp(),
            exp: (now + self.access_token_ttl).timestamp(),
            iss: TOKEN_ISSUER.to_string(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("Failed to encode access token: {}", e))?;

        Ok(AccessToken {
            token,
            expires_in: self.access_token_ttl_seconds(),
        })
    }

    /// Validate and decode an access token
    ///
    /// Every failure (malformed, bad signature, wrong algorithm, expired) is
    /// reported as [`ServiceError::InvalidToken`].
    pub fn validate_access_token(&self, token: &str) -> Result<AccessTokenClaims, ServiceError> {
        self.validate_access_token_at(token, Utc::now())
    }

    pub fn validate_access_token_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<AccessTokenClaims, ServiceError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        // Expiry is checked below against `now`; no claim is mandatory for decoding.
        validation.validate_exp = false;
        validation.required_spec_claims = HashSet::new();

        let claims = decode::<AccessTokenClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| {
                tracing::debug!(error = %e, "Access token rejected");
                ServiceError::InvalidToken
            })?
            .claims;

        if claims.exp <= now.timestamp() {
            return Err(ServiceError::InvalidToken);
        }

        Ok(claims)
    }
}
