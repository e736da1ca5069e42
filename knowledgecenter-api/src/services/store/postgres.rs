//! PostgreSQL implementation of [`IdentityStore`].

use async_trait::async_trait;
use sqlx::{postgres::PgPool, types::Json};
use uuid::Uuid;

use super::{IdentityStore, StoreError, StoreResult};
use crate::models::{Group, NewRefreshToken, NewUser, PermissionRule, RefreshTokenRecord, User};

#[derive(Clone)]
pub struct PgIdentityStore {
    pool: PgPool,
}

impl PgIdentityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Unique violations become [`StoreError::Conflict`] carrying the constraint name.
fn map_write_error(e: sqlx::Error) -> StoreError {
    if let Some(db_err) = e.as_database_error() {
        if db_err.is_unique_violation() {
            return StoreError::Conflict(db_err.constraint().unwrap_or("unique").to_string());
        }
    }
    StoreError::Database(e)
}

const USER_COLUMNS: &str = "id, public_id, login_id, email, name, password_hash, \
                            is_visible, is_deleted, created_at, updated_at";

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    // ==================== Users ====================

    async fn lookup_user_by_login(&self, login_id: &str) -> StoreResult<Option<User>> {
        let query = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE login_id = $1 AND is_deleted = FALSE"
        );
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(login_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn lookup_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let query =
            format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1 AND is_deleted = FALSE");
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn lookup_user_by_internal_id(&self, id: i64) -> StoreResult<Option<User>> {
        let query =
            format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND is_deleted = FALSE");
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn lookup_user_by_public_id(&self, public_id: Uuid) -> StoreResult<Option<User>> {
        let query = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE public_id = $1 AND is_deleted = FALSE"
        );
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(public_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let query = format!(
            r#"
            INSERT INTO users (public_id, login_id, email, name, password_hash, is_visible, is_deleted)
            VALUES ($1, $2, $3, $4, $5, TRUE, FALSE)
            RETURNING {USER_COLUMNS}
            "#
        );
        sqlx::query_as::<_, User>(&query)
            .bind(Uuid::new_v4())
            .bind(&user.login_id)
            .bind(&user.email)
            .bind(Json(&user.name))
            .bind(&user.password_hash)
            .fetch_one(&self.pool)
            .await
            .map_err(map_write_error)
    }

    // ==================== Refresh tokens ====================

    async fn create_token(&self, token: NewRefreshToken) -> StoreResult<RefreshTokenRecord> {
        sqlx::query_as::<_, RefreshTokenRecord>(
            r#"
            INSERT INTO user_tokens (user_id, token_hash, expires_at, parent_token_id, client_ip, user_agent)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(token.user_id)
        .bind(&token.token_hash)
        .bind(token.expires_at)
        .bind(token.parent_token_id)
        .bind(&token.client_ip)
        .bind(&token.user_agent)
        .fetch_one(&self.pool)
        .await
        .map_err(map_write_error)
    }

    async fn lookup_token_by_hash(
        &self,
        token_hash: &str,
    ) -> StoreResult<Option<RefreshTokenRecord>> {
        Ok(
            sqlx::query_as::<_, RefreshTokenRecord>(
                "SELECT * FROM user_tokens WHERE token_hash = $1",
            )
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await?,
        )
    }

    async fn revoke_token(&self, id: i64) -> StoreResult<()> {
        sqlx::query(
            "UPDATE user_tokens SET is_revoked = TRUE, updated_at = NOW() \
             WHERE id = $1 AND is_revoked = FALSE",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn revoke_all_user_tokens(&self, user_id: i64) -> StoreResult<u64> {
        let result = sqlx::query(
            "UPDATE user_tokens SET is_revoked = TRUE, updated_at = NOW() \
             WHERE user_id = $1 AND is_revoked = FALSE",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn mark_token_replaced(&self, old_id: i64, new_id: i64) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE user_tokens SET replaced_by = $2, is_revoked = TRUE, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(old_id)
        .bind(new_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("refresh token {}", old_id)));
        }
        Ok(())
    }

    // ==================== Groups and roles ====================

    async fn get_group_by_public_id(&self, public_id: &str) -> StoreResult<Option<Group>> {
        Ok(sqlx::query_as::<_, Group>(
            "SELECT id, public_id, name, description, created_at FROM groups WHERE public_id = $1",
        )
        .bind(public_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn add_user_to_group(
        &self,
        user_id: i64,
        group_id: i64,
        assigned_by: Option<i64>,
    ) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO group_users (group_id, user_id, assigned_by) VALUES ($1, $2, $3) \
             ON CONFLICT (group_id, user_id) DO NOTHING",
        )
        .bind(group_id)
        .bind(user_id)
        .bind(assigned_by)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_effective_roles(&self, user_id: i64) -> StoreResult<Vec<String>> {
        let roles: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT DISTINCT r.name
            FROM roles r
            WHERE r.id IN (
                SELECT ur.role_id FROM user_roles ur WHERE ur.user_id = $1
                UNION
                SELECT gr.role_id
                FROM group_roles gr
                JOIN group_users gu ON gu.group_id = gr.group_id
                WHERE gu.user_id = $1
            )
            ORDER BY r.name
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(roles.into_iter().map(|(name,)| name).collect())
    }

    // ==================== Permissions ====================

    async fn list_permission_rules(&self) -> StoreResult<Vec<PermissionRule>> {
        Ok(sqlx::query_as::<_, PermissionRule>(
            "SELECT method, path_pattern, required_roles FROM api_permissions \
             ORDER BY path_pattern, method",
        )
        .fetch_all(&self.pool)
        .await?)
    }
}
