use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Persisted refresh token. Only the SHA-256 digest of the secret is kept.
#[derive(Debug, Clone, FromRow)]
pub struct RefreshTokenRecord {
    pub id: i64,
    pub user_id: i64,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub is_revoked: bool,
    /// Successor issued when this token was rotated.
    pub replaced_by: Option<i64>,
    /// Predecessor this token was rotated from; `None` at the root of a lineage.
    pub parent_token_id: Option<i64>,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lifecycle of a refresh token within its lineage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    Active,
    Expired,
    Replaced,
    Revoked,
}

impl RefreshTokenRecord {
    pub fn state_at(&self, now: DateTime<Utc>) -> TokenState {
        match (self.is_revoked, self.replaced_by) {
            (true, Some(_)) => TokenState::Replaced,
            (true, None) => TokenState::Revoked,
            (false, _) if self.expires_at <= now => TokenState::Expired,
            (false, _) => TokenState::Active,
        }
    }
}

/// Insert payload; the store assigns the id and timestamps.
#[derive(Debug, Clone)]
pub struct NewRefreshToken {
    pub user_id: i64,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub parent_token_id: Option<i64>,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(expires_at: DateTime<Utc>) -> RefreshTokenRecord {
        let now = Utc::now();
        RefreshTokenRecord {
            id: 1,
            user_id: 1,
            token_hash: "h".to_string(),
            expires_at,
            is_revoked: false,
            replaced_by: None,
            parent_token_id: None,
            client_ip: None,
            user_agent: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn lineage_states() {
        let now = Utc::now();
        let mut token = record(now + Duration::days(7));
        assert_eq!(token.state_at(now), TokenState::Active);

        assert_eq!(token.state_at(now + Duration::days(7)), TokenState::Expired);

        token.is_revoked = true;
        assert_eq!(token.state_at(now), TokenState::Revoked);

        token.replaced_by = Some(2);
        assert_eq!(token.state_at(now), TokenState::Replaced);
        // Revocation outranks expiry.
        assert_eq!(token.state_at(now + Duration::days(30)), TokenState::Replaced);
    }
}
