//! User model - login accounts with a locale-keyed display name.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{types::Json, FromRow};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Locale tag (`en-US`, `ko-KR`, ...) to free text.
pub type LocalizedText = BTreeMap<String, String>;

/// User entity as persisted.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub public_id: Uuid,
    pub login_id: String,
    pub email: String,
    pub name: Json<LocalizedText>,
    /// PHC string; empty for accounts that cannot log in with a password.
    pub password_hash: String,
    pub is_visible: bool,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn has_password(&self) -> bool {
        !self.password_hash.is_empty()
    }

    /// Convert to the client-facing view (no credential material).
    pub fn info(&self) -> UserInfo {
        UserInfo::from(self)
    }
}

/// Insert payload; the store assigns identifiers and flags.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub login_id: String,
    pub email: String,
    pub name: LocalizedText,
    pub password_hash: String,
}

/// User as returned to clients.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UserInfo {
    pub user_id: Uuid,
    pub login_id: String,
    pub email: String,
    pub name: LocalizedText,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserInfo {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.public_id,
            login_id: user.login_id.clone(),
            email: user.email.clone(),
            name: user.name.0.clone(),
            created_at: user.created_at,
        }
    }
}
