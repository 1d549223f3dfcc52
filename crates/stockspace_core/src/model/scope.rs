//! Scope identity for bounded data contexts.
//!
//! # Responsibility
//! - Define the two ownership contexts a record can live in.
//! - Compute stable string keys used by listener bookkeeping.
//!
//! # Invariants
//! - A scope key is either the inventory sentinel or `project:<id>`, never both.
//! - Project ids used in keys are non-blank and trimmed.
//! - Record-level scope is stored as a nullable project id (`None` = inventory).
//!
//! # See also
//! - `crate::lifecycle::manager`

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Literal key of the shared business inventory scope.
pub const INVENTORY_SCOPE_KEY: &str = "inventory";
/// Key prefix of per-client project scopes.
pub const PROJECT_SCOPE_PREFIX: &str = "project:";
/// Key prefix of account-wide scopes.
pub const ACCOUNT_SCOPE_PREFIX: &str = "account:";
/// Key prefix of user-wide scopes.
pub const USER_SCOPE_PREFIX: &str = "user:";

static PROJECT_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^project:([A-Za-z0-9_-]+)$").expect("valid project key regex"));

/// Stable identifier of a client project.
pub type ProjectId = String;

/// Owning context of a movable record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "project_id")]
pub enum Scope {
    /// Shared business inventory pool.
    #[default]
    Inventory,
    /// One client project.
    Project(ProjectId),
}

impl Scope {
    /// Maps a nullable project reference into a scope.
    ///
    /// Blank references are treated as inventory, matching how records
    /// without an owning project are stored.
    pub fn from_project_ref(project_id: Option<&str>) -> Self {
        match project_id.map(str::trim) {
            Some(id) if !id.is_empty() => Self::Project(id.to_string()),
            _ => Self::Inventory,
        }
    }

    /// Returns the owning project id, or `None` for inventory.
    pub fn project_id(&self) -> Option<&str> {
        match self {
            Self::Inventory => None,
            Self::Project(id) => Some(id.as_str()),
        }
    }

    pub fn is_inventory(&self) -> bool {
        matches!(self, Self::Inventory)
    }

    /// Listener bookkeeping key for this scope.
    pub fn key(&self) -> ScopeKey {
        match self {
            Self::Inventory => inventory_scope_key(),
            Self::Project(id) => project_scope_key(id),
        }
    }
}

impl Display for Scope {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Opaque listener-scope key.
///
/// Besides inventory and project keys, the lifecycle manager accepts any
/// string so cross-cutting scopes (`account:<id>`, `user:<id>`) can be
/// registered next to them.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeKey(String);

impl ScopeKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn starts_with(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }
}

impl Display for ScopeKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl From<&str> for ScopeKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ScopeKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Data context a view declares it needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeContext {
    Inventory,
    /// Project view; the id may be missing while the view is still loading.
    Project(Option<ProjectId>),
}

/// Key of the shared inventory scope.
pub fn inventory_scope_key() -> ScopeKey {
    ScopeKey::new(INVENTORY_SCOPE_KEY)
}

/// Key of one project scope (`project:<id>`).
pub fn project_scope_key(project_id: &str) -> ScopeKey {
    ScopeKey::new(format!("{PROJECT_SCOPE_PREFIX}{}", project_id.trim()))
}

/// Resolves a view context into a key.
///
/// Returns `None` for a project context without a concrete id.
pub fn resolve_scope_key(context: &ScopeContext) -> Option<ScopeKey> {
    match context {
        ScopeContext::Inventory => Some(inventory_scope_key()),
        ScopeContext::Project(Some(id)) if !id.trim().is_empty() => Some(project_scope_key(id)),
        ScopeContext::Project(_) => None,
    }
}

/// Parses an inventory or project key back into a scope.
///
/// Cross-cutting keys (account/user) and malformed project keys yield `None`.
pub fn parse_scope_key(key: &str) -> Option<Scope> {
    if key == INVENTORY_SCOPE_KEY {
        return Some(Scope::Inventory);
    }
    PROJECT_KEY_RE
        .captures(key)
        .and_then(|caps| caps.get(1))
        .map(|id| Scope::Project(id.as_str().to_string()))
}

#[cfg(test)]
mod tests {
    use super::{
        inventory_scope_key, parse_scope_key, project_scope_key, resolve_scope_key, Scope,
        ScopeContext,
    };

    #[test]
    fn keys_distinguish_inventory_and_projects() {
        assert_eq!(inventory_scope_key().as_str(), "inventory");
        assert_eq!(project_scope_key("42").as_str(), "project:42");
        assert_eq!(Scope::Project("42".to_string()).key(), project_scope_key("42"));
        assert_ne!(Scope::Inventory.key(), project_scope_key("inventory"));
    }

    #[test]
    fn blank_project_ref_maps_to_inventory() {
        assert_eq!(Scope::from_project_ref(None), Scope::Inventory);
        assert_eq!(Scope::from_project_ref(Some("  ")), Scope::Inventory);
        assert_eq!(
            Scope::from_project_ref(Some(" p-1 ")),
            Scope::Project("p-1".to_string())
        );
    }

    #[test]
    fn project_context_without_id_is_unresolvable() {
        assert_eq!(resolve_scope_key(&ScopeContext::Project(None)), None);
        assert_eq!(
            resolve_scope_key(&ScopeContext::Project(Some(" ".to_string()))),
            None
        );
        assert_eq!(
            resolve_scope_key(&ScopeContext::Project(Some("a".to_string()))),
            Some(project_scope_key("a"))
        );
        assert_eq!(
            resolve_scope_key(&ScopeContext::Inventory),
            Some(inventory_scope_key())
        );
    }

    #[test]
    fn parse_scope_key_inverts_key() {
        assert_eq!(parse_scope_key("inventory"), Some(Scope::Inventory));
        assert_eq!(
            parse_scope_key("project:abc_1"),
            Some(Scope::Project("abc_1".to_string()))
        );
        assert_eq!(parse_scope_key("project:"), None);
        assert_eq!(parse_scope_key("account:7"), None);
        assert_eq!(parse_scope_key("project:a b"), None);
    }
}
