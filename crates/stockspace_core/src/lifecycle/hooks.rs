//! View-scoped listener adapters.
//!
//! # Responsibility
//! - Tie listener registrations and scope activation to a view's lifetime.
//! - Defer all bookkeeping to `ListenerLifecycleManager`.
//!
//! # Invariants
//! - Dropping a guard (view unmount) removes every registration it made.
//! - Dropping an activation guard detaches the scope it activated, even when
//!   another view has already taken over.

use crate::lifecycle::manager::{ListenerLifecycleManager, ListenerRegistration, SubscriptionFactory};
use crate::lifecycle::policy::{ActivationOutcome, ScopeActivationPolicy};
use crate::model::scope::{resolve_scope_key, ScopeContext, ScopeKey};
use std::sync::Arc;

/// Listener registrations owned by one view.
pub struct ScopedListeners {
    registrations: Vec<ListenerRegistration>,
}

impl ScopedListeners {
    /// Registers every factory under `scope` in order.
    pub fn register(
        manager: &ListenerLifecycleManager,
        scope: ScopeKey,
        factories: Vec<SubscriptionFactory>,
    ) -> Self {
        let registrations = factories
            .into_iter()
            .map(|factory| manager.attach(scope.clone(), factory))
            .collect();
        Self { registrations }
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Removes every registration now instead of at drop.
    pub fn release(&mut self) {
        for registration in self.registrations.drain(..) {
            registration.remove();
        }
    }
}

impl Drop for ScopedListeners {
    fn drop(&mut self) {
        self.release();
    }
}

/// Scope activation held for as long as a view is mounted.
pub struct ScopeActivationGuard {
    manager: Arc<ListenerLifecycleManager>,
    outcome: ActivationOutcome,
}

impl ScopeActivationGuard {
    /// Applies `policy` for the view's scope on mount.
    pub fn enter(
        manager: Arc<ListenerLifecycleManager>,
        policy: &ScopeActivationPolicy,
        scope: Option<&ScopeKey>,
        is_active: bool,
    ) -> Self {
        let outcome = policy.apply(&manager, scope, is_active);
        Self { manager, outcome }
    }

    pub fn outcome(&self) -> &ActivationOutcome {
        &self.outcome
    }
}

impl Drop for ScopeActivationGuard {
    fn drop(&mut self) {
        if let Some(scope) = self.outcome.activated.as_ref() {
            self.manager.detach(scope);
        }
    }
}

/// Activation plus listener registrations of one mounted view.
///
/// Field order matters: listeners are removed before the activation guard
/// detaches the scope.
pub struct ScopeView {
    listeners: Option<ScopedListeners>,
    activation: ScopeActivationGuard,
}

impl ScopeView {
    pub fn activation(&self) -> &ActivationOutcome {
        self.activation.outcome()
    }

    /// `None` when the view's scope could not be resolved.
    pub fn listeners(&self) -> Option<&ScopedListeners> {
        self.listeners.as_ref()
    }
}

/// Mounts a view over `context`.
///
/// Activation runs before registration, so factories of an active view run
/// exactly once. An unresolvable context registers nothing and touches no
/// scope.
pub fn mount_scope_view(
    manager: &Arc<ListenerLifecycleManager>,
    policy: &ScopeActivationPolicy,
    context: &ScopeContext,
    is_active: bool,
    factories: Vec<SubscriptionFactory>,
) -> ScopeView {
    let scope = resolve_scope_key(context);
    let activation =
        ScopeActivationGuard::enter(Arc::clone(manager), policy, scope.as_ref(), is_active);
    let listeners = scope.map(|scope| ScopedListeners::register(manager, scope, factories));
    ScopeView {
        listeners,
        activation,
    }
}

#[cfg(test)]
mod tests {
    use super::{mount_scope_view, ScopedListeners};
    use crate::lifecycle::manager::{ListenerLifecycleManager, SubscriptionFactory, Teardown};
    use crate::lifecycle::policy::ScopeActivationPolicy;
    use crate::lifecycle::source::ManualLifecycleSource;
    use crate::model::scope::{project_scope_key, ScopeContext};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_factory(opened: &Arc<AtomicUsize>, closed: &Arc<AtomicUsize>) -> SubscriptionFactory {
        let opened = Arc::clone(opened);
        let closed = Arc::clone(closed);
        Box::new(move || {
            opened.fetch_add(1, Ordering::SeqCst);
            let closed = Arc::clone(&closed);
            let teardown: Teardown = Box::new(move || {
                closed.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
            Ok(teardown)
        })
    }

    #[test]
    fn dropping_scoped_listeners_removes_registrations() {
        let source = ManualLifecycleSource::default();
        let manager = ListenerLifecycleManager::new(&source);
        let scope = project_scope_key("a");
        let opened = Arc::new(AtomicUsize::new(0));
        let closed = Arc::new(AtomicUsize::new(0));
        manager.activate_scope(&scope);

        let listeners = ScopedListeners::register(
            &manager,
            scope.clone(),
            vec![
                counting_factory(&opened, &closed),
                counting_factory(&opened, &closed),
            ],
        );
        assert_eq!(listeners.len(), 2);
        assert_eq!(opened.load(Ordering::SeqCst), 2);

        drop(listeners);
        assert_eq!(closed.load(Ordering::SeqCst), 2);
        assert!(manager.active_scope_ids().is_empty());
    }

    #[test]
    fn mounted_view_runs_factories_once_and_detaches_on_unmount() {
        let source = ManualLifecycleSource::default();
        let manager = Arc::new(ListenerLifecycleManager::new(&source));
        let policy = ScopeActivationPolicy::default();
        let opened = Arc::new(AtomicUsize::new(0));
        let closed = Arc::new(AtomicUsize::new(0));

        let view = mount_scope_view(
            &manager,
            &policy,
            &ScopeContext::Project(Some("a".to_string())),
            true,
            vec![counting_factory(&opened, &closed)],
        );
        assert_eq!(opened.load(Ordering::SeqCst), 1);
        assert!(manager.is_scope_attached(&project_scope_key("a")));

        drop(view);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert!(!manager.is_scope_attached(&project_scope_key("a")));
    }

    #[test]
    fn switching_views_detaches_previous_project() {
        let source = ManualLifecycleSource::default();
        let manager = Arc::new(ListenerLifecycleManager::new(&source));
        let policy = ScopeActivationPolicy::default();
        let opened = Arc::new(AtomicUsize::new(0));
        let closed = Arc::new(AtomicUsize::new(0));

        let _view_a = mount_scope_view(
            &manager,
            &policy,
            &ScopeContext::Project(Some("a".to_string())),
            true,
            vec![counting_factory(&opened, &closed)],
        );
        let _view_b = mount_scope_view(
            &manager,
            &policy,
            &ScopeContext::Project(Some("b".to_string())),
            true,
            vec![counting_factory(&opened, &closed)],
        );

        assert!(!manager.is_scope_attached(&project_scope_key("a")));
        assert!(manager.is_scope_attached(&project_scope_key("b")));
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert_eq!(manager.listener_count(&project_scope_key("a")), 1);
    }

    #[test]
    fn unresolved_project_view_touches_nothing() {
        let source = ManualLifecycleSource::default();
        let manager = Arc::new(ListenerLifecycleManager::new(&source));
        let policy = ScopeActivationPolicy::default();
        let opened = Arc::new(AtomicUsize::new(0));
        let closed = Arc::new(AtomicUsize::new(0));
        let _view_a = mount_scope_view(
            &manager,
            &policy,
            &ScopeContext::Project(Some("a".to_string())),
            true,
            vec![counting_factory(&opened, &closed)],
        );

        let loading = mount_scope_view(
            &manager,
            &policy,
            &ScopeContext::Project(None),
            true,
            vec![counting_factory(&opened, &closed)],
        );

        assert!(loading.activation().is_noop());
        assert!(loading.listeners().is_none());
        assert!(manager.is_scope_attached(&project_scope_key("a")));
        assert_eq!(opened.load(Ordering::SeqCst), 1);
    }
}
