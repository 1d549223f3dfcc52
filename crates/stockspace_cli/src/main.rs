//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `stockspace_core` linkage and run one local end-to-end move.
//! - Keep output deterministic for quick local sanity checks.

use std::sync::Arc;
use std::time::Duration;
use stockspace_core::{
    init_logging_with_config, mount_scope_view, store_listener_factory, AppLifecycleState,
    CoreConfig, CrossScopeItemTransferResolver, ItemMoveRequest, ItemStore,
    ListenerLifecycleManager, ManualLifecycleSource, MovableItem, Scope, ScopeActivationPolicy,
    ScopeContext, SqliteItemStore, TransferProcessor,
};

const DEMO_ITEM_ID: &str = "demo-item";
const DEMO_PROJECT_ID: &str = "demo-project";
const LOG_DIR_NAME: &str = "stockspace-cli-logs";

#[tokio::main(flavor = "current_thread")]
async fn main() {
    println!("stockspace_core ping={}", stockspace_core::ping());
    println!("stockspace_core version={}", stockspace_core::core_version());

    if let Err(err) = run_demo().await {
        eprintln!("demo failed: {err}");
        std::process::exit(1);
    }
}

async fn run_demo() -> Result<(), Box<dyn std::error::Error>> {
    let config = CoreConfig::from_env()?;
    let log_dir = std::env::temp_dir().join(LOG_DIR_NAME);
    if let Some(log_dir) = log_dir.to_str() {
        init_logging_with_config(&config, log_dir)?;
        println!("logs={log_dir}");
    }
    let store = Arc::new(match &config.db_path {
        Some(path) => SqliteItemStore::open(path)?,
        None => SqliteItemStore::open_in_memory()?,
    });
    store.upsert_item(&MovableItem::new(DEMO_ITEM_ID))?;

    let lifecycle = ManualLifecycleSource::default();
    let manager = Arc::new(ListenerLifecycleManager::new(&lifecycle));
    let policy = ScopeActivationPolicy::new(config.protected_scope_prefixes.clone());
    let dyn_store: Arc<dyn ItemStore> = store.clone();

    let destination = Scope::Project(DEMO_PROJECT_ID.to_string());
    let view = mount_scope_view(
        &manager,
        &policy,
        &ScopeContext::Project(Some(DEMO_PROJECT_ID.to_string())),
        true,
        vec![store_listener_factory(
            Arc::clone(&dyn_store),
            destination.clone(),
            Arc::new(|items| println!("project view items={}", items.len())),
        )],
    );
    println!("scopes={:?}", scope_ids(&manager));

    let processor = TransferProcessor::new(Arc::clone(&store));
    let backend = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        processor.process_pending()
    });

    let resolver = CrossScopeItemTransferResolver::from_config(dyn_store, &config);
    let mut request = ItemMoveRequest::new(DEMO_ITEM_ID, Scope::Inventory, destination);
    request.budget_category_override = Some("furniture".to_string());
    request.target_space_id = Some("living-room".to_string());
    let outcome = resolver.resolve_item_move(&request).await?;
    let applied = backend.await??;
    println!("transfer outcome={outcome:?} processed={applied}");

    lifecycle.set_state(AppLifecycleState::Background);
    println!(
        "background live_listeners={}",
        manager.live_listener_count(&stockspace_core::project_scope_key(DEMO_PROJECT_ID))
    );
    lifecycle.set_state(AppLifecycleState::Foreground);

    drop(view);
    println!("after unmount scopes={:?}", scope_ids(&manager));
    Ok(())
}

fn scope_ids(manager: &ListenerLifecycleManager) -> Vec<String> {
    manager
        .active_scope_ids()
        .into_iter()
        .map(|key| key.as_str().to_string())
        .collect()
}
