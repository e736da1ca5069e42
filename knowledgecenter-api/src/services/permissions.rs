//! In-memory permission table: (method, route pattern) -> roles allowed.
//!
//! Readers clone an `Arc` snapshot under the read lock; a reload builds the
//! replacement map without holding the lock and swaps it in one assignment.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use super::store::{IdentityStore, StoreResult};
use crate::models::{PermissionRule, ANY_METHOD, FULL_ACCESS_ROLE};

/// method -> route pattern -> required roles
pub type PermissionMap = HashMap<String, HashMap<String, BTreeSet<String>>>;

/// What happens to routes no rule mentions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnlistedRoutePolicy {
    #[default]
    Open,
    Closed,
}

impl std::str::FromStr for UnlistedRoutePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "open" => Ok(UnlistedRoutePolicy::Open),
            "closed" => Ok(UnlistedRoutePolicy::Closed),
            _ => Err(format!("Invalid unlisted route policy: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Admit,
    /// Rule exists and the caller holds none of its roles.
    MissingRole,
    /// Rule exists and the caller holds no roles at all.
    NoRoles,
    /// No rule and the table is closed by default.
    Unlisted,
}

pub struct PermissionTable {
    rules: RwLock<Arc<PermissionMap>>,
    unlisted: UnlistedRoutePolicy,
}

impl PermissionTable {
    pub fn new(unlisted: UnlistedRoutePolicy) -> Self {
        Self {
            rules: RwLock::new(Arc::new(PermissionMap::new())),
            unlisted,
        }
    }

    /// Current table; later reloads do not affect a snapshot already taken.
    pub fn snapshot(&self) -> Arc<PermissionMap> {
        match self.rules.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Replace the table with `rules`. Rules for the same method and pattern
    /// are merged. Returns the number of distinct entries.
    pub fn load(&self, rules: Vec<PermissionRule>) -> usize {
        let mut map = PermissionMap::new();
        for rule in rules {
            map.entry(rule.method.to_uppercase())
                .or_default()
                .entry(rule.path_pattern)
                .or_default()
                .extend(rule.required_roles);
        }
        let entries = map.values().map(HashMap::len).sum();

        let map = Arc::new(map);
        match self.rules.write() {
            Ok(mut guard) => *guard = map,
            Err(poisoned) => *poisoned.into_inner() = map,
        }
        entries
    }

    /// Fetch every rule from the store and swap it in.
    pub async fn reload(&self, store: &dyn IdentityStore) -> StoreResult<usize> {
        let rules = store.list_permission_rules().await?;
        let entries = self.load(rules);
        tracing::info!(entries, "Permission table loaded");
        Ok(entries)
    }

    pub fn authorize(&self, method: &str, pattern: &str, roles: &[String]) -> Decision {
        if roles.iter().any(|r| r == FULL_ACCESS_ROLE) {
            return Decision::Admit;
        }

        let table = self.snapshot();
        let required = table
            .get(&method.to_uppercase())
            .and_then(|patterns| patterns.get(pattern))
            .or_else(|| table.get(ANY_METHOD).and_then(|patterns| patterns.get(pattern)));

        let Some(required) = required else {
            return match self.unlisted {
                UnlistedRoutePolicy::Open => Decision::Admit,
                UnlistedRoutePolicy::Closed => Decision::Unlisted,
            };
        };

        if roles.is_empty() {
            return Decision::NoRoles;
        }
        if roles.iter().any(|r| required.contains(r)) {
            Decision::Admit
        } else {
            Decision::MissingRole
        }
    }

    /// Loaded rules, sorted by pattern then method.
    pub fn rules(&self) -> Vec<PermissionRule> {
        let table = self.snapshot();
        let mut rules: Vec<PermissionRule> = table
            .iter()
            .flat_map(|(method, patterns)| {
                patterns.iter().map(move |(pattern, roles)| PermissionRule {
                    method: method.clone(),
                    path_pattern: pattern.clone(),
                    required_roles: roles.iter().cloned().collect(),
                })
            })
            .collect();
        rules.sort_by(|a, b| {
            (a.path_pattern.as_str(), a.method.as_str())
                .cmp(&(b.path_pattern.as_str(), b.method.as_str()))
        });
        rules
    }
}
