//! Process foreground/background signal.
//!
//! # Responsibility
//! - Abstract the OS-level app lifecycle stream behind an injectable trait.
//! - Provide a deterministic implementation driven by the host (Flutter) or tests.
//!
//! # Invariants
//! - Listeners are notified only on actual state changes.
//! - Listeners run outside the source lock, so they may query the source.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// Process lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppLifecycleState {
    Foreground,
    Background,
}

impl AppLifecycleState {
    pub fn from_foreground(foreground: bool) -> Self {
        if foreground {
            Self::Foreground
        } else {
            Self::Background
        }
    }

    pub fn is_foreground(self) -> bool {
        matches!(self, Self::Foreground)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Foreground => "foreground",
            Self::Background => "background",
        }
    }
}

/// Callback invoked on each lifecycle transition.
pub type LifecycleListener = Arc<dyn Fn(AppLifecycleState) + Send + Sync>;

/// Source of foreground/background transitions.
pub trait LifecycleSource: Send + Sync {
    /// State at the moment of the call.
    fn current_state(&self) -> AppLifecycleState;
    /// Registers a listener until the returned handle is cancelled or dropped.
    fn subscribe(&self, listener: LifecycleListener) -> LifecycleSubscription;
}

/// Handle releasing one lifecycle listener.
pub struct LifecycleSubscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl LifecycleSubscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Unsubscribes; further calls are no-ops.
    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for LifecycleSubscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

struct SourceState {
    state: AppLifecycleState,
    listeners: BTreeMap<u64, LifecycleListener>,
    next_listener_id: u64,
}

/// Host-driven lifecycle source.
///
/// The Flutter shell forwards `AppLifecycleState` changes through
/// `set_state`; tests call it directly.
#[derive(Clone)]
pub struct ManualLifecycleSource {
    inner: Arc<Mutex<SourceState>>,
}

impl ManualLifecycleSource {
    pub fn new(initial: AppLifecycleState) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SourceState {
                state: initial,
                listeners: BTreeMap::new(),
                next_listener_id: 0,
            })),
        }
    }

    /// Updates the state and notifies listeners.
    ///
    /// Returns `false` when the state did not change.
    pub fn set_state(&self, next: AppLifecycleState) -> bool {
        let listeners = {
            let mut guard = lock_state(&self.inner);
            if guard.state == next {
                return false;
            }
            guard.state = next;
            guard.listeners.values().cloned().collect::<Vec<_>>()
        };

        for listener in listeners {
            listener(next);
        }
        true
    }

    pub fn listener_count(&self) -> usize {
        lock_state(&self.inner).listeners.len()
    }
}

impl Default for ManualLifecycleSource {
    fn default() -> Self {
        Self::new(AppLifecycleState::Foreground)
    }
}

impl LifecycleSource for ManualLifecycleSource {
    fn current_state(&self) -> AppLifecycleState {
        lock_state(&self.inner).state
    }

    fn subscribe(&self, listener: LifecycleListener) -> LifecycleSubscription {
        let listener_id = {
            let mut guard = lock_state(&self.inner);
            let id = guard.next_listener_id;
            guard.next_listener_id += 1;
            guard.listeners.insert(id, listener);
            id
        };

        let weak: Weak<Mutex<SourceState>> = Arc::downgrade(&self.inner);
        LifecycleSubscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                lock_state(&inner).listeners.remove(&listener_id);
            }
        })
    }
}

fn lock_state(inner: &Mutex<SourceState>) -> MutexGuard<'_, SourceState> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::{AppLifecycleState, LifecycleSource, ManualLifecycleSource};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn notifies_only_on_change() {
        let source = ManualLifecycleSource::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let _subscription = source.subscribe(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        assert!(!source.set_state(AppLifecycleState::Foreground));
        assert!(source.set_state(AppLifecycleState::Background));
        assert!(!source.set_state(AppLifecycleState::Background));
        assert!(source.set_state(AppLifecycleState::Foreground));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(source.current_state(), AppLifecycleState::Foreground);
    }

    #[test]
    fn dropping_subscription_unregisters_listener() {
        let source = ManualLifecycleSource::default();
        let subscription = source.subscribe(Arc::new(|_| {}));
        assert_eq!(source.listener_count(), 1);

        drop(subscription);
        assert_eq!(source.listener_count(), 0);
    }

    #[test]
    fn cancel_is_idempotent() {
        let source = ManualLifecycleSource::default();
        let mut subscription = source.subscribe(Arc::new(|_| {}));
        subscription.cancel();
        subscription.cancel();
        assert_eq!(source.listener_count(), 0);
    }
}
