//! Refresh-token issuance, rotation with reuse detection, and revocation.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use super::error::ServiceError;
use super::jwt::{AccessToken, JwtService};
use super::store::IdentityStore;
use crate::models::{NewRefreshToken, RefreshTokenRecord, User};
use crate::utils::random::{generate_refresh_secret, hash_token};
use crate::utils::ClientInfo;

pub const REFRESH_TOKEN_TTL_DAYS: i64 = 7;

/// Access token plus the refresh secret that goes into the cookie.
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub access: AccessToken,
    pub refresh_secret: String,
    pub refresh_record_id: i64,
    pub refresh_expires_at: DateTime<Utc>,
}

/// Result of a successful rotation.
#[derive(Debug, Clone)]
pub struct Rotation {
    pub user: User,
    pub roles: Vec<String>,
    pub tokens: IssuedTokens,
}

#[derive(Clone)]
pub struct TokenAuthority {
    store: Arc<dyn IdentityStore>,
    jwt: JwtService,
    refresh_ttl: Duration,
}

impl TokenAuthority {
    pub fn new(store: Arc<dyn IdentityStore>, jwt: JwtService) -> Self {
        Self {
            store,
            jwt,
            refresh_ttl: Duration::days(REFRESH_TOKEN_TTL_DAYS),
        }
    }

    pub fn jwt(&self) -> &JwtService {
        &self.jwt
    }

    pub fn refresh_ttl_seconds(&self) -> i64 {
        self.refresh_ttl.num_seconds()
    }

    /// Sign an access token and persist a new refresh record.
    ///
    /// `parent` is the record being rotated from, `None` for a fresh lineage.
    pub async fn issue(
        &self,
        user: &User,
        roles: &[String],
        parent: Option<&RefreshTokenRecord>,
        client: &ClientInfo,
    ) -> Result<IssuedTokens, ServiceError> {
        let access = self.jwt.issue_access_token(user, roles)?;
        let refresh_secret = generate_refresh_secret()?;
        let expires_at = Utc::now() + self.refresh_ttl;

        let record = self
            .store
            .create_token(NewRefreshToken {
                user_id: user.id,
                token_hash: hash_token(&refresh_secret),
                expires_at,
                parent_token_id: parent.map(|p| p.id),
                client_ip: client.ip.clone(),
                user_agent: client.user_agent.clone(),
            })
            .await?;

        Ok(IssuedTokens {
            access,
            refresh_secret,
            refresh_record_id: record.id,
            refresh_expires_at: record.expires_at,
        })
    }

    /// Exchange a refresh secret for a new token pair.
    ///
    /// A secret whose record is already revoked means an earlier token of the
    /// lineage leaked: every token of the user is revoked.
    pub async fn rotate(&self, secret: &str, client: &ClientInfo) -> Result<Rotation, ServiceError> {
        let current = self
            .store
            .lookup_token_by_hash(&hash_token(secret))
            .await?
            .ok_or(ServiceError::InvalidToken)?;

        if current.is_revoked {
            tracing::warn!(
                user_id = current.user_id,
                token_id = current.id,
                client_ip = client.ip.as_deref().unwrap_or("-"),
                "Refresh token reuse detected; revoking all sessions"
            );
            match self.store.revoke_all_user_tokens(current.user_id).await {
                Ok(count) => tracing::warn!(user_id = current.user_id, revoked = count, "Sessions revoked"),
                Err(e) => tracing::warn!(
                    user_id = current.user_id,
                    error = %e,
                    "Failed to revoke sessions after refresh token reuse"
                ),
            }
            return Err(ServiceError::TokenRevoked);
        }

        if current.expires_at <= Utc::now() {
            return Err(ServiceError::TokenExpired);
        }

        let user = self
            .store
            .lookup_user_by_internal_id(current.user_id)
            .await?
            .ok_or(ServiceError::InvalidToken)?;
        let roles = self.store.get_effective_roles(user.id).await?;

        // The successor must exist before the current record points at it.
        let tokens = self.issue(&user, &roles, Some(&current), client).await?;
        self.store
            .mark_token_replaced(current.id, tokens.refresh_record_id)
            .await?;

        tracing::debug!(
            user_id = user.id,
            old_token_id = current.id,
            new_token_id = tokens.refresh_record_id,
            "Refresh token rotated"
        );

        Ok(Rotation {
            user,
            roles,
            tokens,
        })
    }

    /// Revoke the record behind `secret`; unknown secrets are ignored.
    pub async fn revoke(&self, secret: &str) -> Result<(), ServiceError> {
        if let Some(record) = self.store.lookup_token_by_hash(&hash_token(secret)).await? {
            self.store.revoke_token(record.id).await?;
        }
        Ok(())
    }

    pub async fn revoke_all(&self, user_id: i64) -> Result<u64, ServiceError> {
        Ok(self.store.revoke_all_user_tokens(user_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LocalizedText, NewUser, TokenState};
    use crate::services::store::MemoryIdentityStore;
    use secrecy::SecretString;

    struct Fixture {
        store: Arc<MemoryIdentityStore>,
        authority: TokenAuthority,
        user: User,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryIdentityStore::new());
        let jwt = JwtService::new(&SecretString::new("unit-test-secret-unit-test-secret".into()))
            .unwrap();
        let authority = TokenAuthority::new(store.clone(), jwt);
        let user = store
            .create_user(NewUser {
                login_id: "a".into(),
                email: "a@x.io".into(),
                name: LocalizedText::from([("en-US".into(), "A".into())]),
                password_hash: String::new(),
            })
            .await
            .unwrap();
        Fixture {
            store,
            authority,
            user,
        }
    }

    fn client() -> ClientInfo {
        ClientInfo {
            ip: Some("198.51.100.7".into()),
            user_agent: Some("tests".into()),
        }
    }

    #[tokio::test]
    async fn issue_persists_only_the_digest() {
        let f = fixture().await;
        let issued = f.authority.issue(&f.user, &[], None, &client()).await.unwrap();

        let record = f
            .store
            .lookup_token_by_hash(&hash_token(&issued.refresh_secret))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.id, issued.refresh_record_id);
        assert_ne!(record.token_hash, issued.refresh_secret);
        assert_eq!(record.parent_token_id, None);
        assert_eq!(record.client_ip.as_deref(), Some("198.51.100.7"));
        assert_eq!(record.user_agent.as_deref(), Some("tests"));
        let ttl = record.expires_at - record.created_at;
        assert!(ttl > Duration::days(7) - Duration::minutes(1) && ttl <= Duration::days(7));
    }

    #[tokio::test]
    async fn rotation_replaces_the_presented_record() {
        let f = fixture().await;
        let first = f.authority.issue(&f.user, &[], None, &client()).await.unwrap();

        let rotation = f
            .authority
            .rotate(&first.refresh_secret, &client())
            .await
            .unwrap();
        assert_eq!(rotation.user.id, f.user.id);

        let old = f.store.token_by_id(first.refresh_record_id).unwrap().unwrap();
        let new = f
            .store
            .token_by_id(rotation.tokens.refresh_record_id)
            .unwrap()
            .unwrap();
        assert!(old.is_revoked);
        assert_eq!(old.replaced_by, Some(new.id));
        assert!(!new.is_revoked);
        assert_eq!(new.parent_token_id, Some(old.id));
        assert_eq!(new.state_at(Utc::now()), TokenState::Active);
    }

    #[tokio::test]
    async fn reuse_revokes_the_whole_lineage() {
        let f = fixture().await;
        let c0 = f.authority.issue(&f.user, &[], None, &client()).await.unwrap();
        let other_session = f.authority.issue(&f.user, &[], None, &client()).await.unwrap();
        let c1 = f
            .authority
            .rotate(&c0.refresh_secret, &client())
            .await
            .unwrap()
            .tokens;

        let err = f
            .authority
            .rotate(&c0.refresh_secret, &client())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::TokenRevoked));

        assert!(f
            .store
            .tokens_for_user(f.user.id)
            .unwrap()
            .iter()
            .all(|t| t.is_revoked));

        for secret in [&c1.refresh_secret, &other_session.refresh_secret] {
            let err = f.authority.rotate(secret, &client()).await.unwrap_err();
            assert!(matches!(err, ServiceError::TokenRevoked));
        }
    }

    #[tokio::test]
    async fn expired_secret_leaves_siblings_alone() {
        let f = fixture().await;
        let sibling = f.authority.issue(&f.user, &[], None, &client()).await.unwrap();

        let expired_secret = generate_refresh_secret().unwrap();
        f.store
            .create_token(NewRefreshToken {
                user_id: f.user.id,
                token_hash: hash_token(&expired_secret),
                expires_at: Utc::now() - Duration::seconds(1),
                parent_token_id: None,
                client_ip: None,
                user_agent: None,
            })
            .await
            .unwrap();

        let err = f
            .authority
            .rotate(&expired_secret, &client())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::TokenExpired));

        let sibling = f
            .store
            .token_by_id(sibling.refresh_record_id)
            .unwrap()
            .unwrap();
        assert!(!sibling.is_revoked);
        assert_eq!(sibling.replaced_by, None);
    }

    #[tokio::test]
    async fn unknown_secret_is_invalid() {
        let f = fixture().await;
        let err = f.authority.rotate("nope", &client()).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidToken));
    }

    #[tokio::test]
    async fn revoke_is_best_effort() {
        let f = fixture().await;
        f.authority.revoke("never-issued").await.unwrap();

        let issued = f.authority.issue(&f.user, &[], None, &client()).await.unwrap();
        f.authority.revoke(&issued.refresh_secret).await.unwrap();
        let record = f
            .store
            .token_by_id(issued.refresh_record_id)
            .unwrap()
            .unwrap();
        assert_eq!(record.state_at(Utc::now()), TokenState::Revoked);

        let err = f
            .authority
            .rotate(&issued.refresh_secret, &client())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::TokenRevoked));
    }
}
