//! Per-scope realtime listener bookkeeping.
//!
//! # Responsibility
//! - Own subscription factories and their live teardowns, grouped by scope.
//! - Attach/detach them on explicit scope activation and on process
//!   foreground/background transitions.
//!
//! # Invariants
//! - A scope holds at most one live teardown per registered entry.
//! - Live subscriptions exist only while the process is foregrounded and the
//!   scope is attached.
//! - Factory and teardown failures are isolated per entry and never escape.
//! - A background/foreground round trip resumes exactly the scopes that were
//!   attached when the process went to background.
//! - Factories and teardowns run under the manager lock and must not call
//!   back into the manager.
//!
//! # See also
//! - `crate::lifecycle::hooks`

use crate::lifecycle::source::{AppLifecycleState, LifecycleSource, LifecycleSubscription};
use crate::model::scope::ScopeKey;
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// Closes one realtime subscription.
pub type Teardown = Box<dyn FnOnce() -> Result<(), SubscriptionError> + Send>;

/// Opens one realtime subscription and returns its teardown.
pub type SubscriptionFactory = Box<dyn FnMut() -> Result<Teardown, SubscriptionError> + Send>;

/// Failure raised by a subscription factory or teardown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionError {
    message: String,
}

impl SubscriptionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        self.message.as_str()
    }
}

impl Display for SubscriptionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "subscription failed: {}", self.message)
    }
}

impl Error for SubscriptionError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeState {
    Detached,
    Attached,
    /// Was attached when the process went to background.
    Suspended,
}

struct ListenerEntry {
    id: u64,
    factory: SubscriptionFactory,
    teardown: Option<Teardown>,
}

impl ListenerEntry {
    fn is_live(&self) -> bool {
        self.teardown.is_some()
    }

    fn start(&mut self, scope: &ScopeKey) -> bool {
        if self.is_live() {
            return false;
        }
        match (self.factory)() {
            Ok(teardown) => {
                self.teardown = Some(teardown);
                true
            }
            Err(err) => {
                warn!(
                    "event=listener_attach module=lifecycle status=error scope={} entry={} error={}",
                    scope, self.id, err
                );
                false
            }
        }
    }

    fn stop(&mut self, scope: &ScopeKey) -> bool {
        let Some(teardown) = self.teardown.take() else {
            return false;
        };
        if let Err(err) = teardown() {
            warn!(
                "event=listener_teardown module=lifecycle status=error scope={} entry={} error={}",
                scope, self.id, err
            );
        }
        true
    }
}

struct ScopeListenerSet {
    entries: Vec<ListenerEntry>,
    state: ScopeState,
}

impl ScopeListenerSet {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
            state: ScopeState::Detached,
        }
    }

    fn live_count(&self) -> usize {
        self.entries.iter().filter(|entry| entry.is_live()).count()
    }

    fn start_all(&mut self, scope: &ScopeKey) -> usize {
        self.entries
            .iter_mut()
            .map(|entry| entry.start(scope))
            .filter(|started| *started)
            .count()
    }

    fn stop_all(&mut self, scope: &ScopeKey) -> usize {
        self.entries
            .iter_mut()
            .map(|entry| entry.stop(scope))
            .filter(|stopped| *stopped)
            .count()
    }
}

struct ManagerState {
    scopes: BTreeMap<ScopeKey, ScopeListenerSet>,
    foreground: bool,
    next_entry_id: u64,
}

impl ManagerState {
    fn activate(&mut self, scope: &ScopeKey) {
        let foreground = self.foreground;
        let set = self
            .scopes
            .entry(scope.clone())
            .or_insert_with(ScopeListenerSet::new);

        if !foreground {
            set.state = ScopeState::Suspended;
            debug!(
                "event=scope_attach module=lifecycle status=deferred scope={} reason=background",
                scope
            );
            return;
        }

        let started = set.start_all(scope);
        set.state = ScopeState::Attached;
        info!(
            "event=scope_attach module=lifecycle status=ok scope={} listeners={} started={}",
            scope,
            set.entries.len(),
            started
        );
    }

    fn detach(&mut self, scope: &ScopeKey) {
        let Some(set) = self.scopes.get_mut(scope) else {
            return;
        };
        if set.state == ScopeState::Detached && set.live_count() == 0 {
            if set.entries.is_empty() {
                self.scopes.remove(scope);
            }
            return;
        }

        let stopped = set.stop_all(scope);
        set.state = ScopeState::Detached;
        info!(
            "event=scope_detach module=lifecycle status=ok scope={} stopped={}",
            scope, stopped
        );
        if set.entries.is_empty() {
            self.scopes.remove(scope);
        }
    }

    fn transition(&mut self, next: AppLifecycleState) {
        let foreground = next.is_foreground();
        if self.foreground == foreground {
            return;
        }
        self.foreground = foreground;

        let mut touched = 0usize;
        for (scope, set) in self.scopes.iter_mut() {
            match (next, set.state) {
                (AppLifecycleState::Background, ScopeState::Attached) => {
                    set.stop_all(scope);
                    set.state = ScopeState::Suspended;
                    touched += 1;
                }
                (AppLifecycleState::Foreground, ScopeState::Suspended) => {
                    set.start_all(scope);
                    set.state = ScopeState::Attached;
                    touched += 1;
                }
                _ => {}
            }
        }
        info!(
            "event=app_lifecycle module=lifecycle status=ok state={} scopes={}",
            next.as_str(),
            touched
        );
    }

    fn detach_all(&mut self) {
        let scopes = self.scopes.keys().cloned().collect::<Vec<_>>();
        for scope in scopes {
            self.detach(&scope);
        }
    }
}

/// Process-wide authority over realtime listeners.
///
/// Construct one at process start and share it by reference (or `Arc`);
/// tests build isolated instances.
pub struct ListenerLifecycleManager {
    state: Arc<Mutex<ManagerState>>,
    lifecycle_subscription: Mutex<Option<LifecycleSubscription>>,
}

impl ListenerLifecycleManager {
    /// Creates a manager subscribed to `source` for its whole lifetime.
    pub fn new(source: &dyn LifecycleSource) -> Self {
        let state = Arc::new(Mutex::new(ManagerState {
            scopes: BTreeMap::new(),
            foreground: source.current_state().is_foreground(),
            next_entry_id: 0,
        }));

        let weak: Weak<Mutex<ManagerState>> = Arc::downgrade(&state);
        let subscription = source.subscribe(Arc::new(move |next| {
            if let Some(state) = weak.upgrade() {
                lock_state(&state).transition(next);
            }
        }));

        Self {
            state,
            lifecycle_subscription: Mutex::new(Some(subscription)),
        }
    }

    /// Registers a listener under `scope`.
    ///
    /// The factory runs immediately only when the scope is attached (which
    /// implies the process is foregrounded); otherwise the entry stays dormant
    /// until the next activation.
    pub fn attach(
        &self,
        scope: impl Into<ScopeKey>,
        factory: SubscriptionFactory,
    ) -> ListenerRegistration {
        let scope = scope.into();
        let mut guard = lock_state(&self.state);
        let entry_id = guard.next_entry_id;
        guard.next_entry_id += 1;

        let set = guard
            .scopes
            .entry(scope.clone())
            .or_insert_with(ScopeListenerSet::new);
        let mut entry = ListenerEntry {
            id: entry_id,
            factory,
            teardown: None,
        };
        let live = set.state == ScopeState::Attached && entry.start(&scope);
        set.entries.push(entry);
        debug!(
            "event=listener_register module=lifecycle status=ok scope={} entry={} live={}",
            scope, entry_id, live
        );
        drop(guard);

        ListenerRegistration {
            state: Arc::downgrade(&self.state),
            scope,
            entry_id,
            removed: AtomicBool::new(false),
        }
    }

    /// Tears down every live subscription under `scope`, keeping factories.
    pub fn detach(&self, scope: &ScopeKey) {
        lock_state(&self.state).detach(scope);
    }

    /// Starts every non-live entry under `scope` and marks it attached.
    ///
    /// While backgrounded no factory runs; the scope resumes on the next
    /// foreground transition instead.
    pub fn activate_scope(&self, scope: &ScopeKey) {
        lock_state(&self.state).activate(scope);
    }

    /// Applies a lifecycle transition directly.
    ///
    /// Normally driven by the injected source; exposed for hosts that forward
    /// transitions themselves.
    pub fn handle_lifecycle(&self, next: AppLifecycleState) {
        lock_state(&self.state).transition(next);
    }

    pub fn listener_count(&self, scope: &ScopeKey) -> usize {
        lock_state(&self.state)
            .scopes
            .get(scope)
            .map_or(0, |set| set.entries.len())
    }

    pub fn live_listener_count(&self, scope: &ScopeKey) -> usize {
        lock_state(&self.state)
            .scopes
            .get(scope)
            .map_or(0, ScopeListenerSet::live_count)
    }

    pub fn is_scope_attached(&self, scope: &ScopeKey) -> bool {
        lock_state(&self.state)
            .scopes
            .get(scope)
            .is_some_and(|set| set.state == ScopeState::Attached)
    }

    /// Returns every known scope key in sorted order.
    pub fn active_scope_ids(&self) -> Vec<ScopeKey> {
        lock_state(&self.state).scopes.keys().cloned().collect()
    }

    pub fn is_foreground(&self) -> bool {
        lock_state(&self.state).foreground
    }

    /// Releases the lifecycle subscription and tears down all scopes.
    ///
    /// Entries stay registered; calling this twice is a no-op.
    pub fn shutdown(&self) {
        let subscription = self
            .lifecycle_subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(mut subscription) = subscription else {
            return;
        };
        subscription.cancel();
        lock_state(&self.state).detach_all();
        info!("event=listener_manager_shutdown module=lifecycle status=ok");
    }
}

impl Drop for ListenerLifecycleManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Removal handle returned by `ListenerLifecycleManager::attach`.
///
/// Dropping the handle does not remove the listener; call `remove`.
pub struct ListenerRegistration {
    state: Weak<Mutex<ManagerState>>,
    scope: ScopeKey,
    entry_id: u64,
    removed: AtomicBool,
}

impl ListenerRegistration {
    pub fn is_removed(&self) -> bool {
        self.removed.load(Ordering::SeqCst)
    }

    /// Tears down this entry's live subscription and forgets the entry.
    ///
    /// Idempotent. Discards the scope record once its last entry is gone.
    pub fn remove(&self) {
        if self.removed.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(state) = self.state.upgrade() else {
            return;
        };

        let mut guard = lock_state(&state);
        let Some(set) = guard.scopes.get_mut(&self.scope) else {
            return;
        };
        if let Some(index) = set
            .entries
            .iter()
            .position(|entry| entry.id == self.entry_id)
        {
            let mut entry = set.entries.remove(index);
            entry.stop(&self.scope);
        }
        let now_empty = set.entries.is_empty();
        if now_empty {
            guard.scopes.remove(&self.scope);
        }
        debug!(
            "event=listener_remove module=lifecycle status=ok scope={} entry={} scope_discarded={}",
            self.scope, self.entry_id, now_empty
        );
    }
}

fn lock_state(state: &Mutex<ManagerState>) -> MutexGuard<'_, ManagerState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::{ListenerLifecycleManager, SubscriptionError, SubscriptionFactory, Teardown};
    use crate::lifecycle::source::{AppLifecycleState, ManualLifecycleSource};
    use crate::model::scope::{project_scope_key, ScopeKey};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct Counters {
        opened: AtomicUsize,
        closed: AtomicUsize,
    }

    impl Counters {
        fn live(&self) -> usize {
            self.opened.load(Ordering::SeqCst) - self.closed.load(Ordering::SeqCst)
        }
    }

    fn counting_factory(counters: &Arc<Counters>) -> SubscriptionFactory {
        let counters = Arc::clone(counters);
        Box::new(move || {
            counters.opened.fetch_add(1, Ordering::SeqCst);
            let counters = Arc::clone(&counters);
            let teardown: Teardown = Box::new(move || {
                counters.closed.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
            Ok(teardown)
        })
    }

    fn manager() -> (ManualLifecycleSource, ListenerLifecycleManager) {
        let source = ManualLifecycleSource::default();
        let manager = ListenerLifecycleManager::new(&source);
        (source, manager)
    }

    #[test]
    fn attach_on_attached_scope_invokes_factory_once() {
        let (_source, manager) = manager();
        let scope = project_scope_key("a");
        let counters = Arc::new(Counters::default());

        manager.activate_scope(&scope);
        let _registration = manager.attach(scope.clone(), counting_factory(&counters));

        assert_eq!(counters.opened.load(Ordering::SeqCst), 1);
        assert_eq!(manager.live_listener_count(&scope), 1);
    }

    #[test]
    fn attach_on_dormant_scope_defers_until_activation() {
        let (_source, manager) = manager();
        let scope = project_scope_key("a");
        let counters = Arc::new(Counters::default());

        let _registration = manager.attach(scope.clone(), counting_factory(&counters));
        assert_eq!(counters.opened.load(Ordering::SeqCst), 0);
        assert!(!manager.is_scope_attached(&scope));

        manager.activate_scope(&scope);
        assert_eq!(counters.opened.load(Ordering::SeqCst), 1);
        manager.activate_scope(&scope);
        assert_eq!(counters.opened.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn detach_is_idempotent_and_keeps_entries() {
        let (_source, manager) = manager();
        let scope = project_scope_key("a");
        let counters = Arc::new(Counters::default());
        manager.activate_scope(&scope);
        let _first = manager.attach(scope.clone(), counting_factory(&counters));
        let _second = manager.attach(scope.clone(), counting_factory(&counters));

        manager.detach(&scope);
        manager.detach(&scope);

        assert_eq!(counters.closed.load(Ordering::SeqCst), 2);
        assert_eq!(manager.live_listener_count(&scope), 0);
        assert_eq!(manager.listener_count(&scope), 2);
        assert!(!manager.is_scope_attached(&scope));
    }

    #[test]
    fn remove_is_idempotent_and_discards_empty_scope() {
        let (_source, manager) = manager();
        let scope = project_scope_key("a");
        let counters = Arc::new(Counters::default());
        manager.activate_scope(&scope);
        let registration = manager.attach(scope.clone(), counting_factory(&counters));

        registration.remove();
        registration.remove();

        assert!(registration.is_removed());
        assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
        assert!(!manager.active_scope_ids().contains(&scope));
    }

    #[test]
    fn failing_factory_leaves_entry_dormant_without_blocking_siblings() {
        let (_source, manager) = manager();
        let scope = ScopeKey::from("project:a");
        let counters = Arc::new(Counters::default());
        let _broken = manager.attach(
            scope.clone(),
            Box::new(|| Err(SubscriptionError::new("offline"))),
        );
        let _healthy = manager.attach(scope.clone(), counting_factory(&counters));

        manager.activate_scope(&scope);

        assert!(manager.is_scope_attached(&scope));
        assert_eq!(manager.listener_count(&scope), 2);
        assert_eq!(manager.live_listener_count(&scope), 1);
    }

    #[test]
    fn failing_teardown_does_not_block_sibling_teardowns() {
        let (_source, manager) = manager();
        let scope = project_scope_key("a");
        let counters = Arc::new(Counters::default());
        manager.activate_scope(&scope);
        let _broken = manager.attach(
            scope.clone(),
            Box::new(|| {
                let teardown: Teardown = Box::new(|| Err(SubscriptionError::new("closed twice")));
                Ok(teardown)
            }),
        );
        let _healthy = manager.attach(scope.clone(), counting_factory(&counters));

        manager.detach(&scope);

        assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
        assert_eq!(manager.live_listener_count(&scope), 0);
    }

    #[test]
    fn background_round_trip_restores_only_attached_scopes() {
        let (source, manager) = manager();
        let attached = project_scope_key("a");
        let dormant = project_scope_key("b");
        let attached_counters = Arc::new(Counters::default());
        let dormant_counters = Arc::new(Counters::default());
        manager.activate_scope(&attached);
        let _a = manager.attach(attached.clone(), counting_factory(&attached_counters));
        let _b = manager.attach(dormant.clone(), counting_factory(&dormant_counters));

        source.set_state(AppLifecycleState::Background);
        assert_eq!(attached_counters.live(), 0);
        assert!(!manager.is_scope_attached(&attached));
        assert!(!manager.is_foreground());

        source.set_state(AppLifecycleState::Foreground);
        assert_eq!(attached_counters.live(), 1);
        assert_eq!(attached_counters.opened.load(Ordering::SeqCst), 2);
        assert!(manager.is_scope_attached(&attached));
        assert_eq!(dormant_counters.opened.load(Ordering::SeqCst), 0);
        assert!(!manager.is_scope_attached(&dormant));
    }

    #[test]
    fn detached_scope_is_not_resurrected_by_foreground() {
        let (source, manager) = manager();
        let scope = project_scope_key("a");
        let counters = Arc::new(Counters::default());
        manager.activate_scope(&scope);
        let _registration = manager.attach(scope.clone(), counting_factory(&counters));
        manager.detach(&scope);

        source.set_state(AppLifecycleState::Background);
        source.set_state(AppLifecycleState::Foreground);

        assert_eq!(counters.opened.load(Ordering::SeqCst), 1);
        assert!(!manager.is_scope_attached(&scope));
    }

    #[test]
    fn activation_while_backgrounded_waits_for_foreground() {
        let source = ManualLifecycleSource::new(AppLifecycleState::Background);
        let manager = ListenerLifecycleManager::new(&source);
        let scope = project_scope_key("a");
        let counters = Arc::new(Counters::default());
        let _registration = manager.attach(scope.clone(), counting_factory(&counters));

        manager.activate_scope(&scope);
        assert_eq!(counters.opened.load(Ordering::SeqCst), 0);

        source.set_state(AppLifecycleState::Foreground);
        assert_eq!(counters.opened.load(Ordering::SeqCst), 1);
        assert!(manager.is_scope_attached(&scope));
    }

    #[test]
    fn live_count_never_exceeds_entries_across_cycles() {
        let (source, manager) = manager();
        let scope = project_scope_key("a");
        let counters = Arc::new(Counters::default());
        let _first = manager.attach(scope.clone(), counting_factory(&counters));
        let _second = manager.attach(scope.clone(), counting_factory(&counters));

        for _ in 0..3 {
            manager.activate_scope(&scope);
            manager.activate_scope(&scope);
            assert!(manager.live_listener_count(&scope) <= manager.listener_count(&scope));
            source.set_state(AppLifecycleState::Background);
            source.set_state(AppLifecycleState::Foreground);
            assert_eq!(counters.live(), 2);
            manager.detach(&scope);
            assert_eq!(counters.live(), 0);
        }
    }

    #[test]
    fn shutdown_releases_lifecycle_subscription_and_subscriptions() {
        let (source, manager) = manager();
        let scope = project_scope_key("a");
        let counters = Arc::new(Counters::default());
        manager.activate_scope(&scope);
        let _registration = manager.attach(scope.clone(), counting_factory(&counters));
        assert_eq!(source.listener_count(), 1);

        manager.shutdown();
        manager.shutdown();

        assert_eq!(source.listener_count(), 0);
        assert_eq!(counters.live(), 0);
        assert_eq!(manager.listener_count(&scope), 1);
    }
}
