use std::sync::{Arc, Mutex};
use std::time::Duration;
use stockspace_core::{
    CrossScopeItemTransferResolver, ItemMoveRequest, ItemStore, MovableItem, MoveError,
    MoveOutcome, Scope, SqliteItemStore, TransferProcessor,
};

fn project(id: &str) -> Scope {
    Scope::Project(id.to_string())
}

fn spawn_backend(store: &Arc<SqliteItemStore>, delay: Duration) -> tokio::task::JoinHandle<usize> {
    let processor = TransferProcessor::new(Arc::clone(store));
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        processor.process_pending().expect("drain pending transfers")
    })
}

#[tokio::test(start_paused = true)]
async fn project_to_project_move_carries_both_categories() {
    let store = Arc::new(SqliteItemStore::open_in_memory().expect("open store"));
    let mut sofa = MovableItem::new("sofa");
    sofa.project_id = Some("old-client".to_string());
    sofa.transaction_id = Some("tx-1".to_string());
    sofa.inherited_budget_category_id = Some("living".to_string());
    store.upsert_item(&sofa).expect("seed sofa");

    let arrivals = Arc::new(Mutex::new(Vec::<usize>::new()));
    let sink = Arc::clone(&arrivals);
    let _watch = store
        .subscribe_scope(
            &project("new-client"),
            Arc::new(move |items| sink.lock().expect("arrivals lock").push(items.len())),
        )
        .expect("watch destination");

    let resolver = CrossScopeItemTransferResolver::new(store.clone());
    let backend = spawn_backend(&store, Duration::from_secs(3));
    let mut request = ItemMoveRequest::from_item(&sofa, project("new-client"));
    request.destination_category_override = Some("lounge".to_string());
    request.target_space_id = Some("studio".to_string());

    let outcome = resolver
        .resolve_item_move(&request)
        .await
        .expect("move succeeds");
    assert_eq!(backend.await.expect("backend task"), 1);

    let MoveOutcome::Transferred {
        request_id,
        confirmed: true,
        placement_applied: true,
    } = outcome
    else {
        panic!("unexpected outcome: {outcome:?}");
    };
    let queued = store
        .get_transfer(request_id)
        .expect("read request")
        .expect("request kept");
    assert_eq!(queued.source, project("old-client"));
    assert_eq!(queued.source_category_id.as_deref(), Some("living"));
    assert_eq!(queued.destination_category_id.as_deref(), Some("lounge"));
    assert_eq!(queued.transaction_id.as_deref(), Some("tx-1"));

    let stored = store.get_item("sofa").expect("read").expect("exists");
    assert_eq!(stored.scope(), project("new-client"));
    assert_eq!(stored.space_id.as_deref(), Some("studio"));
    assert_eq!(*arrivals.lock().expect("arrivals lock"), vec![0, 1, 1]);
}

#[tokio::test(start_paused = true)]
async fn project_to_inventory_uses_inherited_category() {
    let store = Arc::new(SqliteItemStore::open_in_memory().expect("open store"));
    let mut lamp = MovableItem::new("lamp");
    lamp.project_id = Some("p-1".to_string());
    lamp.inherited_budget_category_id = Some("lighting".to_string());
    store.upsert_item(&lamp).expect("seed lamp");

    let resolver = CrossScopeItemTransferResolver::new(store.clone());
    let backend = spawn_backend(&store, Duration::from_millis(200));
    let outcome = resolver
        .resolve_item_move(&ItemMoveRequest::from_item(&lamp, Scope::Inventory))
        .await
        .expect("move succeeds");
    backend.await.expect("backend task");

    assert!(matches!(
        outcome,
        MoveOutcome::Transferred {
            confirmed: true,
            placement_applied: false,
            ..
        }
    ));
    let stored = store.get_item("lamp").expect("read").expect("exists");
    assert!(stored.scope().is_inventory());
}

#[tokio::test(start_paused = true)]
async fn bulk_move_reports_each_record() {
    let store = Arc::new(SqliteItemStore::open_in_memory().expect("open store"));
    for id in ["a", "b", "c"] {
        store.upsert_item(&MovableItem::new(id)).expect("seed");
    }
    let resolver = CrossScopeItemTransferResolver::new(store.clone())
        .with_timeout(Duration::from_secs(2));

    let mut to_project = ItemMoveRequest::new("a", Scope::Inventory, project("p"));
    to_project.default_category_id = Some("general".to_string());
    let no_category = ItemMoveRequest::new("b", Scope::Inventory, project("p"));
    let mut missing_item = ItemMoveRequest::new("ghost", Scope::Inventory, Scope::Inventory);
    missing_item.target_space_id = Some("shelf".to_string());

    let results = resolver
        .resolve_bulk_move(&[to_project, no_category, missing_item])
        .await;

    assert_eq!(results.len(), 3);
    assert!(matches!(
        results[0].1,
        Ok(MoveOutcome::Transferred {
            confirmed: false,
            ..
        })
    ));
    assert!(matches!(
        results[1].1,
        Err(MoveError::MissingBudgetCategory { .. })
    ));
    assert!(matches!(results[2].1, Err(MoveError::Store(_))));
    assert_eq!(store.pending_transfer_count().expect("count"), 1);
}
