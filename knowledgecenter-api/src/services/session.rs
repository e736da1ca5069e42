//! Register, login, refresh, logout and profile lookups.

use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use uuid::Uuid;

use super::error::ServiceError;
use super::store::{IdentityStore, StoreError};
use super::tokens::{IssuedTokens, TokenAuthority};
use super::vault::CredentialVault;
use crate::dtos::auth::{LoginRequest, RegisterRequest};
use crate::models::{LocalizedText, NewUser, User, UserInfo, PUBLIC_GROUP_ID};
use crate::utils::{ClientInfo, Password, PasswordHashString};

const EMAIL_PATTERN: &str = r"^.+@.+\..+$";
const MIN_PASSWORD_BYTES: usize = 8;

static EMAIL_REGEX: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(EMAIL_PATTERN).ok());

/// A signed-in session: who, with which roles, and the tokens to hand out.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: UserInfo,
    pub roles: Vec<String>,
    pub tokens: IssuedTokens,
}

#[derive(Debug, Clone)]
pub struct Profile {
    pub user: UserInfo,
    pub roles: Vec<String>,
}

#[derive(Clone)]
pub struct SessionService {
    store: Arc<dyn IdentityStore>,
    vault: CredentialVault,
    tokens: TokenAuthority,
}

impl SessionService {
    pub fn new(store: Arc<dyn IdentityStore>, vault: CredentialVault, tokens: TokenAuthority) -> Self {
        Self {
            store,
            vault,
            tokens,
        }
    }

    pub fn tokens(&self) -> &TokenAuthority {
        &self.tokens
    }

    pub async fn register(
        &self,
        req: RegisterRequest,
        client: &ClientInfo,
    ) -> Result<Session, ServiceError> {
        let email = req.email.trim().to_string();
        validate_email(&email)?;
        let name = parse_name(req.name)?;
        if req.password.len() < MIN_PASSWORD_BYTES {
            return Err(ServiceError::InvalidPassword);
        }

        if self.store.lookup_user_by_email(&email).await?.is_some() {
            return Err(ServiceError::EmailExists);
        }

        let login_id = req
            .login_id
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| email.clone());
        if self.store.lookup_user_by_login(&login_id).await?.is_some() {
            return Err(ServiceError::LoginIdExists);
        }

        let password_hash = self.vault.hash(Password::new(req.password)).await?;

        let user = self
            .store
            .create_user(NewUser {
                login_id,
                email,
                name,
                password_hash: password_hash.into_string(),
            })
            .await
            .map_err(|e| match e {
                // Lost a race with a concurrent registration.
                StoreError::Conflict(constraint) if constraint.contains("email") => {
                    ServiceError::EmailExists
                }
                StoreError::Conflict(_) => ServiceError::LoginIdExists,
                other => ServiceError::Store(other),
            })?;

        let public_group = self
            .store
            .get_group_by_public_id(PUBLIC_GROUP_ID)
            .await?
            .ok_or(ServiceError::PublicGroupNotFound)?;
        self.store
            .add_user_to_group(user.id, public_group.id, None)
            .await?;

        tracing::info!(user_id = user.id, "User registered");

        self.start_session(user, client).await
    }

    pub async fn login(
        &self,
        req: LoginRequest,
        client: &ClientInfo,
    ) -> Result<Session, ServiceError> {
        let user = match self.store.lookup_user_by_login(&req.login_id).await? {
            Some(user) => Some(user),
            None => self.store.lookup_user_by_email(&req.login_id).await?,
        };

        let Some(user) = user.filter(User::has_password) else {
            tracing::warn!(
                client_ip = client.ip.as_deref().unwrap_or("-"),
                "Login failed: unknown user or no password set"
            );
            return Err(ServiceError::InvalidCredentials);
        };

        let matches = self
            .vault
            .verify(
                Password::new(req.password),
                PasswordHashString::new(user.password_hash.clone()),
            )
            .await?;
        if !matches {
            tracing::warn!(
                user_id = user.id,
                client_ip = client.ip.as_deref().unwrap_or("-"),
                "Login failed: wrong password"
            );
            return Err(ServiceError::InvalidCredentials);
        }

        self.start_session(user, client).await
    }

    pub async fn refresh(&self, secret: &str, client: &ClientInfo) -> Result<Session, ServiceError> {
        let rotation = self.tokens.rotate(secret, client).await?;
        Ok(Session {
            user: rotation.user.info(),
            roles: rotation.roles,
            tokens: rotation.tokens,
        })
    }

    /// Best effort: an unknown secret is not an error.
    pub async fn logout(&self, secret: &str) -> Result<(), ServiceError> {
        self.tokens.revoke(secret).await
    }

    pub async fn logout_all(&self, user_public_id: &str) -> Result<u64, ServiceError> {
        let user = self.resolve_user(user_public_id).await?;
        let revoked = self.tokens.revoke_all(user.id).await?;
        tracing::info!(user_id = user.id, revoked, "Signed out of all sessions");
        Ok(revoked)
    }

    pub async fn me(&self, user_public_id: &str) -> Result<Profile, ServiceError> {
        let user = self.resolve_user(user_public_id).await?;
        let roles = self.store.get_effective_roles(user.id).await?;
        Ok(Profile {
            user: user.info(),
            roles,
        })
    }

    async fn resolve_user(&self, user_public_id: &str) -> Result<User, ServiceError> {
        let public_id = Uuid::parse_str(user_public_id).map_err(|_| ServiceError::UserNotFound)?;
        self.store
            .lookup_user_by_public_id(public_id)
            .await?
            .ok_or(ServiceError::UserNotFound)
    }

    async fn start_session(&self, user: User, client: &ClientInfo) -> Result<Session, ServiceError> {
        let roles = self.store.get_effective_roles(user.id).await?;
        let tokens = self.tokens.issue(&user, &roles, None, client).await?;
        Ok(Session {
            user: user.info(),
            roles,
            tokens,
        })
    }
}

fn validate_email(email: &str) -> Result<(), ServiceError> {
    let well_formed = (3..=254).contains(&email.len())
        && EMAIL_REGEX.as_ref().is_some_and(|re| re.is_match(email));
    if well_formed {
        Ok(())
    } else {
        Err(ServiceError::InvalidEmail)
    }
}

/// A JSON object of at least one locale tag to string.
fn parse_name(name: Option<serde_json::Value>) -> Result<LocalizedText, ServiceError> {
    let Some(serde_json::Value::Object(entries)) = name else {
        return Err(ServiceError::InvalidName);
    };
    if entries.is_empty() {
        return Err(ServiceError::InvalidName);
    }

    entries
        .into_iter()
        .map(|(locale, value)| match value {
            serde_json::Value::String(text) if !locale.is_empty() => Ok((locale, text)),
            _ => Err(ServiceError::InvalidName),
        })
        .collect()
}
