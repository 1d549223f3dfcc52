//! FFI use-case API for Flutter-facing calls.
//!
//! # Responsibility
//! - Expose lifecycle, view-scope and item-move use cases to Dart via FRB.
//! - Own the process-wide listener manager, local store and async runtime.
//!
//! # Invariants
//! - Exported functions must not panic across FFI boundary.
//! - Failures are reported through response envelopes or error strings.
//! - At most one view scope is mounted through this API at a time.
//!
//! # See also
//! - `stockspace_core::lifecycle::hooks`

use log::{info, warn};
use once_cell::sync::OnceCell;
use std::sync::{Arc, Mutex, PoisonError};
use stockspace_core::{
    core_version as core_version_inner, init_logging as init_logging_inner, mount_scope_view,
    ping as ping_inner, store_listener_factory, AppLifecycleState, CoreConfig,
    CrossScopeItemTransferResolver, ItemMoveRequest, ItemStore, ListenerLifecycleManager,
    ManualLifecycleSource, MoveOutcome, Scope, ScopeActivationPolicy, ScopeContext, ScopeView,
    SqliteItemStore, TransferProcessor,
};
use stockspace_core::resolve_scope_key;
use tokio::runtime::Runtime;

const STORE_FILE_NAME: &str = "stockspace_cache.sqlite3";

static RUNTIME: OnceCell<Runtime> = OnceCell::new();
static CORE: OnceCell<CoreState> = OnceCell::new();

struct CoreState {
    lifecycle: ManualLifecycleSource,
    manager: Arc<ListenerLifecycleManager>,
    policy: ScopeActivationPolicy,
    store: Arc<SqliteItemStore>,
    resolver: CrossScopeItemTransferResolver,
    mounted_view: Mutex<Option<ScopeView>>,
}

/// Minimal health-check API for FRB smoke integration.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Expose core crate version through FFI.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// Input semantics:
/// - `level`: one of `trace|debug|info|warn|error` (case-insensitive).
/// - `log_dir`: absolute directory path where rolling logs are written.
///
/// # FFI contract
/// - Sync call; may create the log directory.
/// - Idempotent for the same `level + log_dir`; conflicting calls fail.
/// - Returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err.to_string(),
    }
}

/// Forwards the host's foreground/background transitions.
///
/// # FFI contract
/// - Sync call; runs subscription factories or teardowns inline.
/// - Returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn app_lifecycle_changed(foreground: bool) -> String {
    match core_state() {
        Ok(core) => {
            let next = AppLifecycleState::from_foreground(foreground);
            if core.lifecycle.set_state(next) {
                info!(
                    "event=app_lifecycle module=ffi status=ok state={}",
                    next.as_str()
                );
            }
            String::new()
        }
        Err(err) => err,
    }
}

/// Lists every scope key the listener manager knows, sorted.
#[flutter_rust_bridge::frb(sync)]
pub fn listener_scope_ids() -> Vec<String> {
    match core_state() {
        Ok(core) => core
            .manager
            .active_scope_ids()
            .into_iter()
            .map(|key| key.as_str().to_string())
            .collect(),
        Err(_) => Vec::new(),
    }
}

/// Result of mounting a view scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewScopeResponse {
    pub ok: bool,
    /// Scope key the view activated (`None` for an unresolved project view).
    pub activated: Option<String>,
    /// Scope keys detached to make room for the view.
    pub detached: Vec<String>,
    pub message: String,
}

/// Mounts the inventory view (`project_id = None`) or one project view.
///
/// The previously mounted view is unmounted first, so its scope is detached
/// before the new one activates. A blank project id resolves to no scope and
/// leaves the mounted view untouched.
///
/// # FFI contract
/// - Sync call; may open store subscriptions.
/// - Never panics; failures are reported through `ok=false`.
#[flutter_rust_bridge::frb(sync)]
pub fn activate_view_scope(project_id: Option<String>) -> ViewScopeResponse {
    let core = match core_state() {
        Ok(core) => core,
        Err(err) => {
            return ViewScopeResponse {
                ok: false,
                activated: None,
                detached: Vec::new(),
                message: err,
            }
        }
    };

    let context = match project_id {
        Some(id) => ScopeContext::Project(Some(id)),
        None => ScopeContext::Inventory,
    };
    if resolve_scope_key(&context).is_none() {
        info!("event=view_scope module=ffi status=skip reason=unresolved_project");
        return ViewScopeResponse {
            ok: true,
            activated: None,
            detached: Vec::new(),
            message: "No scope to activate; current view kept.".to_string(),
        };
    }
    let scope = match &context {
        ScopeContext::Project(Some(id)) => Scope::Project(id.trim().to_string()),
        _ => Scope::Inventory,
    };
    let factories = vec![scope_snapshot_factory(core, scope)];

    let mut mounted = core
        .mounted_view
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    mounted.take();
    let view = mount_scope_view(&core.manager, &core.policy, &context, true, factories);
    let outcome = view.activation().clone();
    *mounted = Some(view);

    let message = match &outcome.activated {
        Some(scope) => format!("Activated {scope}."),
        None => "No scope to activate.".to_string(),
    };
    ViewScopeResponse {
        ok: true,
        activated: outcome.activated.map(|key| key.as_str().to_string()),
        detached: outcome
            .detached
            .into_iter()
            .map(|key| key.as_str().to_string())
            .collect(),
        message,
    }
}

/// Move input from the UI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MoveItemRequest {
    pub item_id: String,
    /// Current owning project; `None` for inventory.
    pub current_project_id: Option<String>,
    pub current_transaction_id: Option<String>,
    pub inherited_budget_category_id: Option<String>,
    /// Destination project; `None` for inventory.
    pub destination_project_id: Option<String>,
    pub target_space_id: Option<String>,
    pub target_transaction_id: Option<String>,
    pub target_budget_category_id: Option<String>,
    pub budget_category_override: Option<String>,
    /// Category for the leg leaving the current project.
    pub source_category_override: Option<String>,
    /// Category for the leg entering the destination project.
    pub destination_category_override: Option<String>,
    pub default_category_id: Option<String>,
}

/// Result envelope of `move_item`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveItemResponse {
    pub ok: bool,
    pub message: String,
    /// Queued transfer request id for cross-scope moves.
    pub transfer_request_id: Option<String>,
}

impl MoveItemResponse {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
            transfer_request_id: None,
        }
    }
}

/// Moves one item between inventory and projects.
///
/// # FFI contract
/// - Async call; cross-scope moves wait up to the configured confirmation
///   timeout for the item to report its new scope.
/// - An unconfirmed transfer is still `ok=true`; the message says so.
/// - Never panics.
pub async fn move_item(request: MoveItemRequest) -> MoveItemResponse {
    let core = match core_state() {
        Ok(core) => core,
        Err(err) => return MoveItemResponse::failure(err),
    };
    let runtime = match runtime() {
        Ok(runtime) => runtime,
        Err(err) => return MoveItemResponse::failure(err),
    };

    let request = to_core_request(request);
    let handle = runtime.spawn(async move { core.resolver.resolve_item_move(&request).await });
    match handle.await {
        Ok(Ok(outcome)) => to_move_response(outcome),
        Ok(Err(err)) => MoveItemResponse::failure(format!("move_item failed: {err}")),
        Err(err) => {
            warn!("event=move_item module=ffi status=error error={}", err);
            MoveItemResponse::failure(format!("move_item failed: {err}"))
        }
    }
}

/// Result envelope of `process_pending_transfers`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferDrainResponse {
    pub ok: bool,
    /// Number of requests applied before returning.
    pub applied: u32,
    pub message: String,
}

/// Applies queued transfer requests against the local cache.
///
/// Used while the backend processor is unreachable.
///
/// # FFI contract
/// - Sync call, DB-backed execution.
/// - Never panics; stops at the first failing request.
#[flutter_rust_bridge::frb(sync)]
pub fn process_pending_transfers() -> TransferDrainResponse {
    let drained = core_state().and_then(|core| {
        TransferProcessor::new(Arc::clone(&core.store))
            .process_pending()
            .map_err(|err| format!("process_pending_transfers failed: {err}"))
    });
    match drained {
        Ok(applied) => TransferDrainResponse {
            ok: true,
            applied: u32::try_from(applied).unwrap_or(u32::MAX),
            message: format!("Applied {applied} transfer request(s)."),
        },
        Err(message) => TransferDrainResponse {
            ok: false,
            applied: 0,
            message,
        },
    }
}

fn core_state() -> Result<&'static CoreState, String> {
    CORE.get_or_try_init(|| {
        let config = CoreConfig::from_env().map_err(|err| err.to_string())?;
        let db_path = config
            .db_path
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(STORE_FILE_NAME));
        let store = Arc::new(
            SqliteItemStore::open(&db_path)
                .map_err(|err| format!("store open failed at `{}`: {err}", db_path.display()))?,
        );
        let lifecycle = ManualLifecycleSource::default();
        let manager = Arc::new(ListenerLifecycleManager::new(&lifecycle));
        let resolver_store: Arc<dyn ItemStore> = store.clone();
        info!(
            "event=core_state module=ffi status=ok db={}",
            db_path.display()
        );
        Ok(CoreState {
            lifecycle,
            manager,
            policy: ScopeActivationPolicy::new(config.protected_scope_prefixes.clone()),
            resolver: CrossScopeItemTransferResolver::from_config(resolver_store, &config),
            store,
            mounted_view: Mutex::new(None),
        })
    })
}

fn runtime() -> Result<&'static Runtime, String> {
    RUNTIME.get_or_try_init(|| {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("stockspace-core")
            .enable_time()
            .build()
            .map_err(|err| format!("runtime start failed: {err}"))
    })
}

fn scope_snapshot_factory(
    core: &CoreState,
    scope: Scope,
) -> stockspace_core::SubscriptionFactory {
    let store: Arc<dyn ItemStore> = core.store.clone();
    let label = scope.to_string();
    store_listener_factory(
        store,
        scope,
        Arc::new(move |items| {
            info!(
                "event=scope_snapshot module=ffi status=ok scope={} items={}",
                label,
                items.len()
            );
        }),
    )
}

fn to_core_request(request: MoveItemRequest) -> ItemMoveRequest {
    let mut core_request = ItemMoveRequest::new(
        request.item_id.trim(),
        Scope::from_project_ref(request.current_project_id.as_deref()),
        Scope::from_project_ref(request.destination_project_id.as_deref()),
    );
    core_request.current_transaction_id = request.current_transaction_id;
    core_request.inherited_budget_category_id = request.inherited_budget_category_id;
    core_request.target_space_id = request.target_space_id;
    core_request.target_transaction_id = request.target_transaction_id;
    core_request.target_budget_category_id = request.target_budget_category_id;
    core_request.budget_category_override = request.budget_category_override;
    core_request.source_category_override = request.source_category_override;
    core_request.destination_category_override = request.destination_category_override;
    core_request.default_category_id = request.default_category_id;
    core_request
}

fn to_move_response(outcome: MoveOutcome) -> MoveItemResponse {
    match outcome {
        MoveOutcome::Updated { placement_applied } => MoveItemResponse {
            ok: true,
            message: if placement_applied {
                "Item updated.".to_string()
            } else {
                "Nothing to update.".to_string()
            },
            transfer_request_id: None,
        },
        MoveOutcome::Transferred {
            request_id,
            confirmed,
            ..
        } => MoveItemResponse {
            ok: true,
            message: if confirmed {
                "Item moved.".to_string()
            } else {
                "Transfer queued; placement will not be applied until the item arrives."
                    .to_string()
            },
            transfer_request_id: Some(request_id.to_string()),
        },
    }
}
