//! Core domain logic for StockSpace.
//! This crate owns scope identity, realtime listener lifecycle, and
//! cross-scope item transfers.

pub mod config;
pub mod db;
pub mod lifecycle;
pub mod logging;
pub mod model;
pub mod store;
pub mod transfer;

pub use config::{ConfigError, CoreConfig};
pub use lifecycle::hooks::{mount_scope_view, ScopeActivationGuard, ScopeView, ScopedListeners};
pub use lifecycle::manager::{
    ListenerLifecycleManager, ListenerRegistration, SubscriptionError, SubscriptionFactory,
    Teardown,
};
pub use lifecycle::policy::{ActivationOutcome, ScopeActivationPolicy};
pub use lifecycle::source::{
    AppLifecycleState, LifecycleSource, LifecycleSubscription, ManualLifecycleSource,
};
pub use logging::{
    default_log_level, init_logging, init_logging_with_config, logging_status, LoggingError,
};
pub use model::item::{ItemId, MovableItem, PlacementUpdate};
pub use model::scope::{
    inventory_scope_key, parse_scope_key, project_scope_key, resolve_scope_key, ProjectId, Scope,
    ScopeContext, ScopeKey,
};
pub use model::transfer::{TransferRequest, TransferRequestId, TransferRequestStatus};
pub use store::{
    item_listener_factory, store_listener_factory, ItemStore, SqliteItemStore, StoreError,
    StoreResult, StoreSubscription, TransferProcessor,
};
pub use transfer::{
    CrossScopeItemTransferResolver, ItemMoveRequest, MoveError, MoveKind, MoveLeg, MoveOutcome,
};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
