//! SQLite-backed offline item cache with in-process change fan-out.
//!
//! # Responsibility
//! - Persist items and queued transfer requests locally.
//! - Push snapshots to item and scope watchers after every write.
//!
//! # Invariants
//! - Watcher callbacks run after the write commits and outside every store lock.
//! - A watcher is registered before its first snapshot is read, and every
//!   delivery reads fresh state, so the last callback a watcher sees always
//!   reflects the latest committed write.
//! - Scope filters compare `project_id` with `IS`, so `NULL` matches inventory.

use super::{
    ItemCallback, ItemStore, ScopeItemsCallback, StoreError, StoreResult, StoreSubscription,
};
use crate::db::{open_db, open_db_in_memory};
use crate::model::item::{ItemId, MovableItem, PlacementUpdate};
use crate::model::scope::Scope;
use crate::model::transfer::{
    now_epoch_ms, TransferRequest, TransferRequestId, TransferRequestStatus,
};
use log::{debug, warn};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use uuid::Uuid;

const ITEM_SELECT_SQL: &str = "SELECT
    id,
    project_id,
    transaction_id,
    space_id,
    inherited_budget_category_id
FROM items";

const TRANSFER_SELECT_SQL: &str = "SELECT
    id,
    item_ids,
    source_project_id,
    destination_project_id,
    source_category_id,
    destination_category_id,
    transaction_id,
    requested_at
FROM transfer_requests";

#[derive(Default)]
struct Watchers {
    next_id: u64,
    items: BTreeMap<u64, Arc<ItemWatcher>>,
    scopes: BTreeMap<u64, Arc<ScopeWatcher>>,
}

struct ItemWatcher {
    id: ItemId,
    callback: ItemCallback,
    gate: DeliveryGate,
}

struct ScopeWatcher {
    scope: Scope,
    callback: ScopeItemsCallback,
    gate: DeliveryGate,
}

/// Serializes deliveries to one watcher.
///
/// A request that arrives while a delivery runs marks the gate dirty and
/// returns; the running delivery then makes one more pass. Callbacks that
/// write back into the store therefore never block on their own gate.
#[derive(Default)]
struct DeliveryGate(Mutex<GateState>);

#[derive(Default)]
struct GateState {
    running: bool,
    dirty: bool,
}

impl DeliveryGate {
    fn run(&self, mut pass: impl FnMut() -> StoreResult<()>) -> StoreResult<()> {
        {
            let mut state = self.lock();
            if state.running {
                state.dirty = true;
                return Ok(());
            }
            state.running = true;
        }

        let mut first_error = None;
        loop {
            self.lock().dirty = false;
            if let Err(err) = pass() {
                first_error = first_error.or(Some(err));
            }
            let mut state = self.lock();
            if !state.dirty {
                state.running = false;
                break;
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Local cache implementation of `ItemStore`.
pub struct SqliteItemStore {
    conn: Mutex<Connection>,
    watchers: Arc<Mutex<Watchers>>,
}

impl SqliteItemStore {
    /// Wraps an already-migrated connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            watchers: Arc::new(Mutex::new(Watchers::default())),
        }
    }

    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Ok(Self::new(open_db(path)?))
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Ok(Self::new(open_db_in_memory()?))
    }

    /// Lists items owned by `scope`, ordered by id.
    pub fn list_items_in_scope(&self, scope: &Scope) -> StoreResult<Vec<MovableItem>> {
        let conn = self.lock_conn();
        let mut stmt = conn.prepare(&format!(
            "{ITEM_SELECT_SQL} WHERE project_id IS ?1 ORDER BY id ASC;"
        ))?;
        let mut rows = stmt.query(params![scope.project_id()])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_item_row(row)?);
        }
        Ok(items)
    }

    /// Returns pending transfer requests in write order.
    pub fn pending_transfers(&self) -> StoreResult<Vec<TransferRequest>> {
        let conn = self.lock_conn();
        let mut stmt = conn.prepare(&format!(
            "{TRANSFER_SELECT_SQL} WHERE status = 'pending' ORDER BY seq ASC;"
        ))?;
        let mut rows = stmt.query([])?;
        let mut requests = Vec::new();
        while let Some(row) = rows.next()? {
            requests.push(parse_transfer_row(row)?);
        }
        Ok(requests)
    }

    /// Returns one transfer request by id regardless of status.
    pub fn get_transfer(&self, id: TransferRequestId) -> StoreResult<Option<TransferRequest>> {
        let conn = self.lock_conn();
        let mut stmt = conn.prepare(&format!("{TRANSFER_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query(params![id.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_transfer_row(row)?)),
            None => Ok(None),
        }
    }

    /// Processing status of one request, `None` when it was never written.
    pub fn transfer_status(
        &self,
        id: TransferRequestId,
    ) -> StoreResult<Option<TransferRequestStatus>> {
        let status: Option<String> = self
            .lock_conn()
            .query_row(
                "SELECT status FROM transfer_requests WHERE id = ?1;",
                [id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        status
            .map(|status| match status.as_str() {
                "pending" => Ok(TransferRequestStatus::Pending),
                "processed" => Ok(TransferRequestStatus::Processed),
                other => Err(StoreError::InvalidData(format!(
                    "unknown transfer status `{other}` for request {id}"
                ))),
            })
            .transpose()
    }

    pub fn pending_transfer_count(&self) -> StoreResult<usize> {
        let conn = self.lock_conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM transfer_requests WHERE status = 'pending';",
            [],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Applies one pending request: flips every named item's scope and marks
    /// the request processed. Returns the number of items moved.
    ///
    /// This is the backend side of the protocol; clients only enqueue.
    pub fn apply_transfer(&self, request: &TransferRequest) -> StoreResult<usize> {
        let mut affected_scopes = vec![request.source.clone(), request.destination.clone()];
        let moved = {
            let mut conn = self.lock_conn();
            let tx = conn.transaction()?;
            let mut moved = 0usize;
            for item_id in &request.item_ids {
                let previous: Option<Option<String>> = tx
                    .query_row(
                        "SELECT project_id FROM items WHERE id = ?1;",
                        [item_id.as_str()],
                        |row| row.get(0),
                    )
                    .optional()?;
                let Some(previous) = previous else {
                    warn!(
                        "event=transfer_apply module=store status=skip request={} item={} reason=missing_item",
                        request.id, item_id
                    );
                    continue;
                };
                let previous = Scope::from_project_ref(previous.as_deref());
                if !affected_scopes.contains(&previous) {
                    affected_scopes.push(previous);
                }
                tx.execute(
                    "UPDATE items
                     SET
                        project_id = ?1,
                        inherited_budget_category_id = COALESCE(?2, inherited_budget_category_id),
                        updated_at = (strftime('%s', 'now') * 1000)
                     WHERE id = ?3;",
                    params![
                        request.destination.project_id(),
                        request.destination_category_id.as_deref(),
                        item_id.as_str(),
                    ],
                )?;
                moved += 1;
            }
            tx.execute(
                "UPDATE transfer_requests
                 SET status = 'processed', processed_at = ?1
                 WHERE id = ?2 AND status = 'pending';",
                params![now_epoch_ms(), request.id.to_string()],
            )?;
            tx.commit()?;
            moved
        };

        self.notify(&request.item_ids, &affected_scopes);
        Ok(moved)
    }

    fn lock_conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(&self, insert: impl FnOnce(&mut Watchers, u64)) -> StoreSubscription {
        let watcher_id = {
            let mut watchers = lock_watchers(&self.watchers);
            let watcher_id = watchers.next_id;
            watchers.next_id += 1;
            insert(&mut watchers, watcher_id);
            watcher_id
        };
        let weak = Arc::downgrade(&self.watchers);
        StoreSubscription::new(move || release_watcher(&weak, watcher_id))
    }

    fn deliver_item(&self, watcher: &ItemWatcher) -> StoreResult<()> {
        watcher.gate.run(|| {
            let snapshot = self.get_item(&watcher.id)?;
            (watcher.callback)(snapshot.as_ref());
            Ok(())
        })
    }

    fn deliver_scope(&self, watcher: &ScopeWatcher) -> StoreResult<()> {
        watcher.gate.run(|| {
            let items = self.list_items_in_scope(&watcher.scope)?;
            (watcher.callback)(&items);
            Ok(())
        })
    }

    fn notify(&self, item_ids: &[ItemId], scopes: &[Scope]) {
        let (item_watchers, scope_watchers) = {
            let watchers = lock_watchers(&self.watchers);
            let items = watchers
                .items
                .values()
                .filter(|watcher| item_ids.contains(&watcher.id))
                .cloned()
                .collect::<Vec<_>>();
            let scoped = watchers
                .scopes
                .values()
                .filter(|watcher| scopes.contains(&watcher.scope))
                .cloned()
                .collect::<Vec<_>>();
            (items, scoped)
        };

        for watcher in item_watchers {
            if let Err(err) = self.deliver_item(&watcher) {
                warn!(
                    "event=store_notify module=store status=error item={} error={}",
                    watcher.id, err
                );
            }
        }
        for watcher in scope_watchers {
            if let Err(err) = self.deliver_scope(&watcher) {
                warn!(
                    "event=store_notify module=store status=error scope={} error={}",
                    watcher.scope, err
                );
            }
        }
    }
}

impl ItemStore for SqliteItemStore {
    fn get_item(&self, id: &str) -> StoreResult<Option<MovableItem>> {
        let conn = self.lock_conn();
        let mut stmt = conn.prepare(&format!("{ITEM_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_item_row(row)?)),
            None => Ok(None),
        }
    }

    fn upsert_item(&self, item: &MovableItem) -> StoreResult<()> {
        let previous_scope = self.get_item(&item.id)?.map(|existing| existing.scope());
        self.lock_conn().execute(
            "INSERT INTO items (
                id,
                project_id,
                transaction_id,
                space_id,
                inherited_budget_category_id
            ) VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                project_id = excluded.project_id,
                transaction_id = excluded.transaction_id,
                space_id = excluded.space_id,
                inherited_budget_category_id = excluded.inherited_budget_category_id,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![
                item.id.as_str(),
                item.project_id.as_deref(),
                item.transaction_id.as_deref(),
                item.space_id.as_deref(),
                item.inherited_budget_category_id.as_deref(),
            ],
        )?;

        let mut scopes = vec![item.scope()];
        if let Some(previous) = previous_scope {
            if previous != item.scope() {
                scopes.push(previous);
            }
        }
        self.notify(std::slice::from_ref(&item.id), &scopes);
        Ok(())
    }

    fn update_placement(&self, id: &str, update: &PlacementUpdate) -> StoreResult<()> {
        let changed = self.lock_conn().execute(
            "UPDATE items
             SET
                space_id = COALESCE(?1, space_id),
                transaction_id = COALESCE(?2, transaction_id),
                inherited_budget_category_id = COALESCE(?3, inherited_budget_category_id),
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?4;",
            params![
                update.space_id.as_deref(),
                update.transaction_id.as_deref(),
                update.budget_category_id.as_deref(),
                id,
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }

        let scope = self.get_item(id)?.map(|item| item.scope());
        self.notify(&[id.to_string()], scope.as_slice());
        Ok(())
    }

    fn enqueue_transfer(&self, request: &TransferRequest) -> StoreResult<TransferRequestId> {
        let item_ids = serde_json::to_string(&request.item_ids)?;
        self.lock_conn().execute(
            "INSERT INTO transfer_requests (
                id,
                item_ids,
                source_project_id,
                destination_project_id,
                source_category_id,
                destination_category_id,
                transaction_id,
                requested_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
            params![
                request.id.to_string(),
                item_ids,
                request.source.project_id(),
                request.destination.project_id(),
                request.source_category_id.as_deref(),
                request.destination_category_id.as_deref(),
                request.transaction_id.as_deref(),
                request.requested_at_ms,
            ],
        )?;
        debug!(
            "event=transfer_enqueue module=store status=ok request={} items={}",
            request.id,
            request.item_ids.len()
        );
        Ok(request.id)
    }

    fn subscribe_item(&self, id: &str, callback: ItemCallback) -> StoreResult<StoreSubscription> {
        let watcher = Arc::new(ItemWatcher {
            id: id.to_string(),
            callback,
            gate: DeliveryGate::default(),
        });
        let registered = Arc::clone(&watcher);
        let subscription = self.register(move |watchers, watcher_id| {
            watchers.items.insert(watcher_id, registered);
        });
        self.deliver_item(&watcher)?;
        Ok(subscription)
    }

    fn subscribe_scope(
        &self,
        scope: &Scope,
        callback: ScopeItemsCallback,
    ) -> StoreResult<StoreSubscription> {
        let watcher = Arc::new(ScopeWatcher {
            scope: scope.clone(),
            callback,
            gate: DeliveryGate::default(),
        });
        let registered = Arc::clone(&watcher);
        let subscription = self.register(move |watchers, watcher_id| {
            watchers.scopes.insert(watcher_id, registered);
        });
        self.deliver_scope(&watcher)?;
        Ok(subscription)
    }
}

fn lock_watchers(watchers: &Mutex<Watchers>) -> MutexGuard<'_, Watchers> {
    watchers.lock().unwrap_or_else(PoisonError::into_inner)
}

fn release_watcher(watchers: &Weak<Mutex<Watchers>>, watcher_id: u64) {
    if let Some(watchers) = watchers.upgrade() {
        let mut guard = lock_watchers(&watchers);
        guard.items.remove(&watcher_id);
        guard.scopes.remove(&watcher_id);
    }
}

fn parse_item_row(row: &Row<'_>) -> StoreResult<MovableItem> {
    Ok(MovableItem {
        id: row.get("id")?,
        project_id: row.get("project_id")?,
        transaction_id: row.get("transaction_id")?,
        space_id: row.get("space_id")?,
        inherited_budget_category_id: row.get("inherited_budget_category_id")?,
    })
}

fn parse_transfer_row(row: &Row<'_>) -> StoreResult<TransferRequest> {
    let id_text: String = row.get("id")?;
    let id = Uuid::parse_str(&id_text).map_err(|_| {
        StoreError::InvalidData(format!(
            "invalid uuid value `{id_text}` in transfer_requests.id"
        ))
    })?;
    let item_ids_text: String = row.get("item_ids")?;
    let item_ids: Vec<ItemId> = serde_json::from_str(&item_ids_text)?;
    let source: Option<String> = row.get("source_project_id")?;
    let destination: Option<String> = row.get("destination_project_id")?;

    Ok(TransferRequest {
        id,
        item_ids,
        source: Scope::from_project_ref(source.as_deref()),
        destination: Scope::from_project_ref(destination.as_deref()),
        source_category_id: row.get("source_category_id")?,
        destination_category_id: row.get("destination_category_id")?,
        transaction_id: row.get("transaction_id")?,
        requested_at_ms: row.get("requested_at")?,
    })
}
