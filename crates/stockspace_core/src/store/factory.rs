//! Subscription factories over the item store.
//!
//! These are the factories views register with the listener manager: each
//! invocation opens exactly one store subscription and hands back its teardown.

use super::{ItemCallback, ItemStore, ScopeItemsCallback};
use crate::lifecycle::manager::{SubscriptionError, SubscriptionFactory};
use crate::model::item::ItemId;
use crate::model::scope::Scope;
use std::sync::Arc;

/// Factory subscribing `sink` to every item owned by `scope`.
pub fn store_listener_factory(
    store: Arc<dyn ItemStore>,
    scope: Scope,
    sink: ScopeItemsCallback,
) -> SubscriptionFactory {
    Box::new(move || {
        let subscription = store
            .subscribe_scope(&scope, Arc::clone(&sink))
            .map_err(SubscriptionError::from)?;
        Ok(subscription.into_teardown())
    })
}

/// Factory subscribing `sink` to a single item.
pub fn item_listener_factory(
    store: Arc<dyn ItemStore>,
    item_id: ItemId,
    sink: ItemCallback,
) -> SubscriptionFactory {
    Box::new(move || {
        let subscription = store
            .subscribe_item(&item_id, Arc::clone(&sink))
            .map_err(SubscriptionError::from)?;
        Ok(subscription.into_teardown())
    })
}
