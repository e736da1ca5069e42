//! Persistence boundary for users, refresh tokens, groups, roles and permission rules.
//!
//! The session and token layers only see [`IdentityStore`]; the Postgres and
//! in-memory implementations are interchangeable behind it.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Group, NewRefreshToken, NewUser, PermissionRule, RefreshTokenRecord, User};

pub use memory::MemoryIdentityStore;
pub use postgres::PgIdentityStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write; carries the constraint name.
    #[error("Unique constraint violated: {0}")]
    Conflict(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store error: {0}")]
    Backend(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Intent-level identity operations.
///
/// Lookups return `Ok(None)` for "not found"; soft-deleted users are never returned.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn health_check(&self) -> StoreResult<()>;

    // ==================== Users ====================

    async fn lookup_user_by_login(&self, login_id: &str) -> StoreResult<Option<User>>;
    async fn lookup_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn lookup_user_by_internal_id(&self, id: i64) -> StoreResult<Option<User>>;
    async fn lookup_user_by_public_id(&self, public_id: Uuid) -> StoreResult<Option<User>>;

    /// Assigns internal and public identifiers; the user starts visible and not deleted.
    async fn create_user(&self, user: NewUser) -> StoreResult<User>;

    // ==================== Refresh tokens ====================

    /// Persists the record and returns it with its id and timestamps.
    async fn create_token(&self, token: NewRefreshToken) -> StoreResult<RefreshTokenRecord>;
    async fn lookup_token_by_hash(&self, token_hash: &str)
        -> StoreResult<Option<RefreshTokenRecord>>;
    /// No-op when the id is unknown or already revoked.
    async fn revoke_token(&self, id: i64) -> StoreResult<()>;
    /// Revokes every live token of the user and returns how many changed.
    async fn revoke_all_user_tokens(&self, user_id: i64) -> StoreResult<u64>;
    /// Sets `replaced_by = new_id` and `is_revoked = true` in one write.
    async fn mark_token_replaced(&self, old_id: i64, new_id: i64) -> StoreResult<()>;

    // ==================== Groups and roles ====================

    async fn get_group_by_public_id(&self, public_id: &str) -> StoreResult<Option<Group>>;
    /// Idempotent: an existing membership is left as is.
    async fn add_user_to_group(
        &self,
        user_id: i64,
        group_id: i64,
        assigned_by: Option<i64>,
    ) -> StoreResult<()>;
    /// Direct and group-inherited role names, deduplicated and sorted.
    async fn get_effective_roles(&self, user_id: i64) -> StoreResult<Vec<String>>;

    // ==================== Permissions ====================

    async fn list_permission_rules(&self) -> StoreResult<Vec<PermissionRule>>;
}
