//! Document store seam for items and transfer requests.
//!
//! # Responsibility
//! - Define the read/subscribe/write contract the core depends on.
//! - Provide the SQLite-backed offline cache and a local transfer processor.
//!
//! # Invariants
//! - Every subscription delivers the current snapshot first, then each change.
//! - Subscriptions are released exactly once, on `cancel` or drop.
//! - Transfer requests are never rewritten by the client side.

pub mod factory;
pub mod processor;
pub mod sqlite;

use crate::db::DbError;
use crate::lifecycle::manager::{SubscriptionError, Teardown};
use crate::model::item::{ItemId, MovableItem, PlacementUpdate};
use crate::model::scope::Scope;
use crate::model::transfer::{TransferRequest, TransferRequestId};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

pub use factory::{item_listener_factory, store_listener_factory};
pub use processor::TransferProcessor;
pub use sqlite::SqliteItemStore;

pub type StoreResult<T> = Result<T, StoreError>;

/// Receives the latest snapshot of one item (`None` when it does not exist).
pub type ItemCallback = Arc<dyn Fn(Option<&MovableItem>) + Send + Sync>;

/// Receives the full item list of one scope.
pub type ScopeItemsCallback = Arc<dyn Fn(&[MovableItem]) + Send + Sync>;

/// Store read/write failure.
#[derive(Debug)]
pub enum StoreError {
    Db(DbError),
    NotFound(ItemId),
    InvalidData(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "item not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid cached data: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::NotFound(_) | Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::InvalidData(value.to_string())
    }
}

impl From<StoreError> for SubscriptionError {
    fn from(value: StoreError) -> Self {
        SubscriptionError::new(value.to_string())
    }
}

/// Live store subscription; released on `cancel` or drop.
pub struct StoreSubscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl StoreSubscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }

    /// Hands ownership to a listener-manager teardown.
    pub fn into_teardown(mut self) -> Teardown {
        let cancel = self.cancel.take();
        Box::new(move || {
            if let Some(cancel) = cancel {
                cancel();
            }
            Ok(())
        })
    }
}

impl Drop for StoreSubscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Remote document store as seen by the core.
pub trait ItemStore: Send + Sync {
    fn get_item(&self, id: &str) -> StoreResult<Option<MovableItem>>;

    fn upsert_item(&self, item: &MovableItem) -> StoreResult<()>;

    /// Direct same-scope placement write. Fails with `NotFound` for unknown ids.
    fn update_placement(&self, id: &str, update: &PlacementUpdate) -> StoreResult<()>;

    /// Appends a transfer request for the backend processor.
    fn enqueue_transfer(&self, request: &TransferRequest) -> StoreResult<TransferRequestId>;

    /// Realtime subscription to one item.
    fn subscribe_item(&self, id: &str, callback: ItemCallback) -> StoreResult<StoreSubscription>;

    /// Realtime equality-filtered subscription to every item owned by `scope`.
    fn subscribe_scope(
        &self,
        scope: &Scope,
        callback: ScopeItemsCallback,
    ) -> StoreResult<StoreSubscription>;
}
