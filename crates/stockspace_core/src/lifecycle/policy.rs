//! Active-view scope policy.
//!
//! # Responsibility
//! - Keep only the active bounded context's listeners running.
//! - Leave cross-cutting scopes (account-wide, user-wide) untouched.
//!
//! # Invariants
//! - An inactive view or an unresolvable scope never touches any scope.
//! - Protected scopes are never detached by the policy.

use crate::lifecycle::manager::ListenerLifecycleManager;
use crate::model::scope::{ScopeKey, ACCOUNT_SCOPE_PREFIX, USER_SCOPE_PREFIX};
use log::info;

/// Result of applying the policy once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationOutcome {
    /// Scopes detached to make room for the new one.
    pub detached: Vec<ScopeKey>,
    /// Scope activated, `None` when the policy was a no-op.
    pub activated: Option<ScopeKey>,
}

impl ActivationOutcome {
    pub fn is_noop(&self) -> bool {
        self.activated.is_none()
    }
}

/// Detach-others-then-activate policy with a protected-prefix allow-list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeActivationPolicy {
    protected_prefixes: Vec<String>,
}

impl ScopeActivationPolicy {
    pub fn new(protected_prefixes: Vec<String>) -> Self {
        Self { protected_prefixes }
    }

    pub fn is_protected(&self, scope: &ScopeKey) -> bool {
        self.protected_prefixes
            .iter()
            .any(|prefix| !prefix.is_empty() && scope.starts_with(prefix))
    }

    /// Makes `scope` the only running non-protected scope.
    ///
    /// No-op when `is_active` is false or `scope` is `None`.
    pub fn apply(
        &self,
        manager: &ListenerLifecycleManager,
        scope: Option<&ScopeKey>,
        is_active: bool,
    ) -> ActivationOutcome {
        if !is_active {
            return ActivationOutcome::default();
        }
        let Some(scope) = scope else {
            info!("event=scope_policy module=lifecycle status=skip reason=unresolved_scope");
            return ActivationOutcome::default();
        };

        let detached = manager
            .active_scope_ids()
            .into_iter()
            .filter(|known| known != scope && !self.is_protected(known))
            .collect::<Vec<_>>();
        for known in &detached {
            manager.detach(known);
        }
        manager.activate_scope(scope);

        info!(
            "event=scope_policy module=lifecycle status=ok scope={} detached={}",
            scope,
            detached.len()
        );
        ActivationOutcome {
            detached,
            activated: Some(scope.clone()),
        }
    }
}

impl Default for ScopeActivationPolicy {
    fn default() -> Self {
        Self::new(vec![
            ACCOUNT_SCOPE_PREFIX.to_string(),
            USER_SCOPE_PREFIX.to_string(),
        ])
    }
}
