//! Move execution against an `ItemStore`.
//!
//! # Responsibility
//! - Run same-scope moves as one direct placement write.
//! - Queue cross-scope moves, wait for the item to report the destination
//!   scope, then write the placement fields.
//!
//! # Invariants
//! - Category failures are detected before anything is written.
//! - The confirmation subscription is released exactly once on every path.
//! - Placement fields of a cross-scope move are written only after confirmation.

use super::plan::{plan_move, MoveKind, TransferPlan};
use super::{ItemMoveRequest, MoveError, MoveOutcome};
use crate::config::CoreConfig;
use crate::model::item::{ItemId, MovableItem};
use crate::model::scope::Scope;
use crate::store::ItemStore;
use log::{debug, info, warn};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::timeout;

/// Confirmation wait used when no config is supplied.
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(20);

/// Relocates items between inventory and projects.
pub struct CrossScopeItemTransferResolver {
    store: Arc<dyn ItemStore>,
    confirmation_timeout: Duration,
    in_flight: Arc<Mutex<HashSet<ItemId>>>,
}

impl CrossScopeItemTransferResolver {
    pub fn new(store: Arc<dyn ItemStore>) -> Self {
        Self {
            store,
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn from_config(store: Arc<dyn ItemStore>, config: &CoreConfig) -> Self {
        Self::new(store).with_timeout(config.confirmation_timeout())
    }

    pub fn with_timeout(mut self, confirmation_timeout: Duration) -> Self {
        self.confirmation_timeout = confirmation_timeout;
        self
    }

    pub fn confirmation_timeout(&self) -> Duration {
        self.confirmation_timeout
    }

    /// Moves one item to `request.destination`.
    ///
    /// A confirmation timeout is not an error: the request stays queued and
    /// the outcome reports `confirmed: false` with no placement written.
    ///
    /// # Errors
    /// - `MoveError::MoveInFlight` while another move of the same item runs.
    /// - `MoveError::MissingBudgetCategory` when a required leg has no category.
    /// - `MoveError::Store` when a store read or write fails.
    pub async fn resolve_item_move(
        &self,
        request: &ItemMoveRequest,
    ) -> Result<MoveOutcome, MoveError> {
        let _guard = InFlightGuard::acquire(&self.in_flight, &request.item_id)
            .ok_or_else(|| MoveError::MoveInFlight(request.item_id.clone()))?;
        let kind = MoveKind::classify(&request.current_scope, &request.destination);

        let plan = plan_move(request).inspect_err(|err| {
            warn!(
                "event=item_move module=transfer status=rejected item={} kind={} error={}",
                request.item_id,
                kind.as_str(),
                err
            );
        })?;

        match plan {
            TransferPlan::DirectUpdate(update) => {
                if update.is_empty() {
                    debug!(
                        "event=item_move module=transfer status=noop item={} kind={}",
                        request.item_id,
                        kind.as_str()
                    );
                    return Ok(MoveOutcome::Updated {
                        placement_applied: false,
                    });
                }
                self.store.update_placement(&request.item_id, &update)?;
                info!(
                    "event=item_move module=transfer status=ok item={} kind={}",
                    request.item_id,
                    kind.as_str()
                );
                Ok(MoveOutcome::Updated {
                    placement_applied: true,
                })
            }
            TransferPlan::Transfer {
                request: transfer,
                placement,
            } => {
                let request_id = self.store.enqueue_transfer(&transfer)?;
                info!(
                    "event=item_move module=transfer status=queued item={} kind={} request={} source={} destination={}",
                    request.item_id,
                    kind.as_str(),
                    request_id,
                    transfer.source,
                    transfer.destination
                );

                let confirmed = self
                    .wait_for_scope(&request.item_id, &request.destination)
                    .await?;
                if !confirmed {
                    warn!(
                        "event=item_move module=transfer status=timeout item={} request={} timeout_ms={}",
                        request.item_id,
                        request_id,
                        self.confirmation_timeout.as_millis()
                    );
                    return Ok(MoveOutcome::Transferred {
                        request_id,
                        confirmed: false,
                        placement_applied: false,
                    });
                }

                let placement_applied = !placement.is_empty();
                if placement_applied {
                    self.store.update_placement(&request.item_id, &placement)?;
                }
                info!(
                    "event=item_move module=transfer status=ok item={} kind={} request={} placement_applied={}",
                    request.item_id,
                    kind.as_str(),
                    request_id,
                    placement_applied
                );
                Ok(MoveOutcome::Transferred {
                    request_id,
                    confirmed: true,
                    placement_applied,
                })
            }
        }
    }

    /// Moves several items one after another.
    ///
    /// A failing record is logged and skipped; the rest still run.
    pub async fn resolve_bulk_move(
        &self,
        requests: &[ItemMoveRequest],
    ) -> Vec<(ItemId, Result<MoveOutcome, MoveError>)> {
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            let result = self.resolve_item_move(request).await;
            if let Err(err) = &result {
                warn!(
                    "event=bulk_move module=transfer status=item_failed item={} error={}",
                    request.item_id, err
                );
            }
            results.push((request.item_id.clone(), result));
        }
        let failed = results.iter().filter(|(_, result)| result.is_err()).count();
        info!(
            "event=bulk_move module=transfer status=done total={} failed={}",
            results.len(),
            failed
        );
        results
    }

    /// Waits until the item reports `destination` or the timeout elapses.
    async fn wait_for_scope(&self, item_id: &str, destination: &Scope) -> Result<bool, MoveError> {
        let (tx, mut rx) = watch::channel(false);
        let target = destination.clone();
        let subscription = self.store.subscribe_item(
            item_id,
            Arc::new(move |snapshot: Option<&MovableItem>| {
                if snapshot.is_some_and(|item| item.is_in(&target)) {
                    tx.send_replace(true);
                }
            }),
        )?;

        let confirmed = timeout(self.confirmation_timeout, rx.wait_for(|reached| *reached))
            .await
            .is_ok_and(|waited| waited.is_ok());
        drop(subscription);
        Ok(confirmed)
    }
}

/// Marks one item as being moved until dropped.
struct InFlightGuard {
    set: Arc<Mutex<HashSet<ItemId>>>,
    item_id: ItemId,
}

impl InFlightGuard {
    fn acquire(set: &Arc<Mutex<HashSet<ItemId>>>, item_id: &str) -> Option<Self> {
        let inserted = set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(item_id.to_string());
        inserted.then(|| Self {
            set: Arc::clone(set),
            item_id: item_id.to_string(),
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.item_id);
    }
}
