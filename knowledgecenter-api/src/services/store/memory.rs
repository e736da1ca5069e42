//! In-process [`IdentityStore`] for tests and local runs without a database.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::types::Json;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::{IdentityStore, StoreError, StoreResult};
use crate::models::{
    Group, LocalizedText, NewRefreshToken, NewUser, PermissionRule, RefreshTokenRecord, User,
    PUBLIC_GROUP_ID,
};

#[derive(Default)]
struct MemoryState {
    users: BTreeMap<i64, User>,
    tokens: BTreeMap<i64, RefreshTokenRecord>,
    groups: BTreeMap<i64, Group>,
    group_users: HashSet<(i64, i64)>,
    user_roles: HashSet<(i64, String)>,
    group_roles: HashSet<(i64, String)>,
    rules: Vec<PermissionRule>,
    next_user_id: i64,
    next_token_id: i64,
    next_group_id: i64,
}

impl MemoryState {
    fn live_user(&self, pred: impl Fn(&User) -> bool) -> Option<User> {
        self.users
            .values()
            .find(|u| !u.is_deleted && pred(u))
            .cloned()
    }
}

pub struct MemoryIdentityStore {
    state: Mutex<MemoryState>,
}

impl Default for MemoryIdentityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryIdentityStore {
    /// Store seeded like a freshly migrated database: the `public` group exists.
    pub fn new() -> Self {
        let store = Self::empty();
        if let Ok(mut state) = store.state.lock() {
            insert_group(&mut state, PUBLIC_GROUP_ID, "Public");
        }
        store
    }

    /// Store with no seed data at all.
    pub fn empty() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
        }
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|e| StoreError::Backend(anyhow::anyhow!("Memory store mutex poisoned: {}", e)))
    }

    // ==================== Administration ====================
    //
    // Role, group and rule management lives outside the session core; these
    // helpers stand in for it.

    pub fn create_group(&self, public_id: &str, name: &str) -> StoreResult<Group> {
        let mut state = self.lock()?;
        if state.groups.values().any(|g| g.public_id == public_id) {
            return Err(StoreError::Conflict("groups_public_id_key".to_string()));
        }
        Ok(insert_group(&mut state, public_id, name))
    }

    pub fn grant_user_role(&self, user_id: i64, role: &str) -> StoreResult<()> {
        self.lock()?.user_roles.insert((user_id, role.to_string()));
        Ok(())
    }

    pub fn grant_group_role(&self, group_id: i64, role: &str) -> StoreResult<()> {
        self.lock()?.group_roles.insert((group_id, role.to_string()));
        Ok(())
    }

    /// Insert or replace the rule for `(method, path_pattern)`.
    pub fn put_permission_rule(&self, rule: PermissionRule) -> StoreResult<()> {
        let mut state = self.lock()?;
        state
            .rules
            .retain(|r| !(r.method == rule.method && r.path_pattern == rule.path_pattern));
        state.rules.push(rule);
        Ok(())
    }

    pub fn soft_delete_user(&self, user_id: i64) -> StoreResult<()> {
        let mut state = self.lock()?;
        let user = state
            .users
            .get_mut(&user_id)
            .ok_or_else(|| StoreError::NotFound(format!("user {}", user_id)))?;
        user.is_deleted = true;
        user.updated_at = Utc::now();
        Ok(())
    }

    pub fn tokens_for_user(&self, user_id: i64) -> StoreResult<Vec<RefreshTokenRecord>> {
        Ok(self
            .lock()?
            .tokens
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect())
    }

    pub fn token_by_id(&self, id: i64) -> StoreResult<Option<RefreshTokenRecord>> {
        Ok(self.lock()?.tokens.get(&id).cloned())
    }

    pub fn group_members(&self, group_id: i64) -> StoreResult<Vec<i64>> {
        let mut members: Vec<i64> = self
            .lock()?
            .group_users
            .iter()
            .filter(|(g, _)| *g == group_id)
            .map(|(_, u)| *u)
            .collect();
        members.sort_unstable();
        Ok(members)
    }
}

fn insert_group(state: &mut MemoryState, public_id: &str, name: &str) -> Group {
    state.next_group_id += 1;
    let group = Group {
        id: state.next_group_id,
        public_id: public_id.to_string(),
        name: Json(LocalizedText::from([("en-US".to_string(), name.to_string())])),
        description: Json(LocalizedText::new()),
        created_at: Utc::now(),
    };
    state.groups.insert(group.id, group.clone());
    group
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn health_check(&self) -> StoreResult<()> {
        self.lock().map(|_| ())
    }

    // ==================== Users ====================

    async fn lookup_user_by_login(&self, login_id: &str) -> StoreResult<Option<User>> {
        Ok(self.lock()?.live_user(|u| u.login_id == login_id))
    }

    async fn lookup_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self.lock()?.live_user(|u| u.email == email))
    }

    async fn lookup_user_by_internal_id(&self, id: i64) -> StoreResult<Option<User>> {
        Ok(self.lock()?.live_user(|u| u.id == id))
    }

    async fn lookup_user_by_public_id(&self, public_id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.lock()?.live_user(|u| u.public_id == public_id))
    }

    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let mut state = self.lock()?;

        // Uniqueness spans soft-deleted rows, as the table constraints do.
        if state.users.values().any(|u| u.login_id == user.login_id) {
            return Err(StoreError::Conflict("users_login_id_key".to_string()));
        }
        if state.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict("users_email_key".to_string()));
        }

        state.next_user_id += 1;
        let now = Utc::now();
        let created = User {
            id: state.next_user_id,
            public_id: Uuid::new_v4(),
            login_id: user.login_id,
            email: user.email,
            name: Json(user.name),
            password_hash: user.password_hash,
            is_visible: true,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        };
        state.users.insert(created.id, created.clone());
        Ok(created)
    }

    // ==================== Refresh tokens ====================

    async fn create_token(&self, token: NewRefreshToken) -> StoreResult<RefreshTokenRecord> {
        let mut state = self.lock()?;

        if state
            .tokens
            .values()
            .any(|t| t.user_id == token.user_id && t.token_hash == token.token_hash)
        {
            return Err(StoreError::Conflict("user_tokens_user_hash_key".to_string()));
        }

        state.next_token_id += 1;
        let now = Utc::now();
        let record = RefreshTokenRecord {
            id: state.next_token_id,
            user_id: token.user_id,
            token_hash: token.token_hash,
            expires_at: token.expires_at,
            is_revoked: false,
            replaced_by: None,
            parent_token_id: token.parent_token_id,
            client_ip: token.client_ip,
            user_agent: token.user_agent,
            created_at: now,
            updated_at: now,
        };
        state.tokens.insert(record.id, record.clone());
        Ok(record)
    }

    async fn lookup_token_by_hash(
        &self,
        token_hash: &str,
    ) -> StoreResult<Option<RefreshTokenRecord>> {
        Ok(self
            .lock()?
            .tokens
            .values()
            .find(|t| t.token_hash == token_hash)
            .cloned())
    }

    async fn revoke_token(&self, id: i64) -> StoreResult<()> {
        let mut state = self.lock()?;
        if let Some(token) = state.tokens.get_mut(&id).filter(|t| !t.is_revoked) {
            token.is_revoked = true;
            token.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn revoke_all_user_tokens(&self, user_id: i64) -> StoreResult<u64> {
        let mut state = self.lock()?;
        let now = Utc::now();
        let mut revoked = 0;
        for token in state
            .tokens
            .values_mut()
            .filter(|t| t.user_id == user_id && !t.is_revoked)
        {
            token.is_revoked = true;
            token.updated_at = now;
            revoked += 1;
        }
        Ok(revoked)
    }

    async fn mark_token_replaced(&self, old_id: i64, new_id: i64) -> StoreResult<()> {
        let mut state = self.lock()?;
        let token = state
            .tokens
            .get_mut(&old_id)
            .ok_or_else(|| StoreError::NotFound(format!("refresh token {}", old_id)))?;
        token.replaced_by = Some(new_id);
        token.is_revoked = true;
        token.updated_at = Utc::now();
        Ok(())
    }

    // ==================== Groups and roles ====================

    async fn get_group_by_public_id(&self, public_id: &str) -> StoreResult<Option<Group>> {
        Ok(self
            .lock()?
            .groups
            .values()
            .find(|g| g.public_id == public_id)
            .cloned())
    }

    async fn add_user_to_group(
        &self,
        user_id: i64,
        group_id: i64,
        _assigned_by: Option<i64>,
    ) -> StoreResult<()> {
        let mut state = self.lock()?;
        if !state.groups.contains_key(&group_id) {
            return Err(StoreError::NotFound(format!("group {}", group_id)));
        }
        state.group_users.insert((group_id, user_id));
        Ok(())
    }

    async fn get_effective_roles(&self, user_id: i64) -> StoreResult<Vec<String>> {
        let state = self.lock()?;

        let direct = state
            .user_roles
            .iter()
            .filter(|(u, _)| *u == user_id)
            .map(|(_, role)| role.clone());

        let inherited = state
            .group_users
            .iter()
            .filter(|(_, u)| *u == user_id)
            .flat_map(|(group_id, _)| {
                state
                    .group_roles
                    .iter()
                    .filter(move |(g, _)| g == group_id)
                    .map(|(_, role)| role.clone())
            });

        let roles: BTreeSet<String> = direct.chain(inherited).collect();
        Ok(roles.into_iter().collect())
    }

    // ==================== Permissions ====================

    async fn list_permission_rules(&self) -> StoreResult<Vec<PermissionRule>> {
        let mut rules = self.lock()?.rules.clone();
        rules.sort_by(|a, b| {
            (a.path_pattern.as_str(), a.method.as_str())
                .cmp(&(b.path_pattern.as_str(), b.method.as_str()))
        });
        Ok(rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn new_user(login: &str, email: &str) -> NewUser {
        NewUser {
            login_id: login.to_string(),
            email: email.to_string(),
            name: LocalizedText::from([("en-US".to_string(), "A".to_string())]),
            password_hash: String::new(),
        }
    }

    fn new_token(user_id: i64, hash: &str, parent: Option<i64>) -> NewRefreshToken {
        NewRefreshToken {
            user_id,
            token_hash: hash.to_string(),
            expires_at: Utc::now() + Duration::days(7),
            parent_token_id: parent,
            client_ip: Some("192.0.2.1".to_string()),
            user_agent: None,
        }
    }

    #[tokio::test]
    async fn create_user_assigns_identity_and_enforces_uniqueness() {
        let store = MemoryIdentityStore::new();
        let user = store.create_user(new_user("a", "a@x.io")).await.unwrap();
        assert!(user.id > 0);
        assert!(user.is_visible);
        assert!(!user.is_deleted);

        let err = store.create_user(new_user("a", "b@x.io")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(c) if c.contains("login_id")));

        let err = store.create_user(new_user("b", "a@x.io")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(c) if c.contains("email")));

        let found = store.lookup_user_by_public_id(user.public_id).await.unwrap();
        assert_eq!(found.map(|u| u.id), Some(user.id));
    }

    #[tokio::test]
    async fn soft_deleted_users_are_invisible() {
        let store = MemoryIdentityStore::new();
        let user = store.create_user(new_user("a", "a@x.io")).await.unwrap();
        store.soft_delete_user(user.id).unwrap();

        assert!(store.lookup_user_by_login("a").await.unwrap().is_none());
        assert!(store.lookup_user_by_email("a@x.io").await.unwrap().is_none());
        assert!(store.lookup_user_by_internal_id(user.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn created_token_is_found_by_hash() {
        let store = MemoryIdentityStore::new();
        let created = store.create_token(new_token(1, "h1", None)).await.unwrap();

        let found = store.lookup_token_by_hash("h1").await.unwrap().unwrap();
        assert_eq!(found.id, created.id);
        assert!(!found.is_revoked);
        assert!(found.created_at <= found.updated_at);
        assert!(found.updated_at <= found.expires_at);

        let dup = store.create_token(new_token(1, "h1", None)).await.unwrap_err();
        assert!(matches!(dup, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn mark_replaced_also_revokes() {
        let store = MemoryIdentityStore::new();
        let old = store.create_token(new_token(1, "old", None)).await.unwrap();
        let new = store.create_token(new_token(1, "new", Some(old.id))).await.unwrap();

        store.mark_token_replaced(old.id, new.id).await.unwrap();

        let old = store.token_by_id(old.id).unwrap().unwrap();
        assert!(old.is_revoked);
        assert_eq!(old.replaced_by, Some(new.id));
        assert_eq!(new.parent_token_id, Some(old.id));
    }

    #[tokio::test]
    async fn revoke_all_only_touches_one_user() {
        let store = MemoryIdentityStore::new();
        store.create_token(new_token(1, "a", None)).await.unwrap();
        store.create_token(new_token(1, "b", None)).await.unwrap();
        store.create_token(new_token(2, "c", None)).await.unwrap();

        assert_eq!(store.revoke_all_user_tokens(1).await.unwrap(), 2);
        assert_eq!(store.revoke_all_user_tokens(1).await.unwrap(), 0);
        assert!(store.tokens_for_user(1).unwrap().iter().all(|t| t.is_revoked));
        assert!(store.tokens_for_user(2).unwrap().iter().all(|t| !t.is_revoked));
    }

    #[tokio::test]
    async fn revoke_unknown_token_is_noop() {
        let store = MemoryIdentityStore::new();
        store.revoke_token(42).await.unwrap();
    }

    #[tokio::test]
    async fn effective_roles_union_direct_and_group_roles() {
        let store = MemoryIdentityStore::new();
        let user = store.create_user(new_user("a", "a@x.io")).await.unwrap();
        let public = store.get_group_by_public_id("public").await.unwrap().unwrap();
        let editors = store.create_group("editors", "Editors").unwrap();

        store.grant_group_role(public.id, "reader").unwrap();
        store.grant_group_role(editors.id, "editor").unwrap();
        store.grant_group_role(editors.id, "reader").unwrap();
        store.grant_user_role(user.id, "auditor").unwrap();

        store.add_user_to_group(user.id, public.id, None).await.unwrap();
        store.add_user_to_group(user.id, editors.id, None).await.unwrap();
        // Duplicate membership is a no-op.
        store.add_user_to_group(user.id, editors.id, Some(user.id)).await.unwrap();
        assert_eq!(store.group_members(editors.id).unwrap(), vec![user.id]);

        assert_eq!(
            store.get_effective_roles(user.id).await.unwrap(),
            vec!["auditor", "editor", "reader"]
        );
    }

    #[tokio::test]
    async fn empty_store_has_no_public_group() {
        let store = MemoryIdentityStore::empty();
        assert!(store.get_group_by_public_id("public").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn permission_rules_are_ordered_and_replaced() {
        let store = MemoryIdentityStore::new();
        store
            .put_permission_rule(PermissionRule::new("POST", "/users", &["admin"]))
            .unwrap();
        store
            .put_permission_rule(PermissionRule::new("GET", "/users", &["admin"]))
            .unwrap();
        store
            .put_permission_rule(PermissionRule::new("GET", "/departments", &["user"]))
            .unwrap();
        store
            .put_permission_rule(PermissionRule::new("GET", "/users", &["admin", "user"]))
            .unwrap();

        let rules = store.list_permission_rules().await.unwrap();
        let keys: Vec<(&str, &str)> = rules
            .iter()
            .map(|r| (r.method.as_str(), r.path_pattern.as_str()))
            .collect();
        assert_eq!(
            keys,
            vec![("GET", "/departments"), ("GET", "/users"), ("POST", "/users")]
        );
        assert_eq!(rules[1].required_roles, vec!["admin", "user"]);
    }
}
