//! Local transfer processor.
//!
//! # Responsibility
//! - Stand in for the backend trigger that consumes queued transfer requests
//!   while offline, in tests, and in the CLI.
//!
//! # Invariants
//! - Requests are applied in write order, each exactly once.
//! - A failing request stops the drain; later requests stay pending.

use super::{SqliteItemStore, StoreResult};
use log::{error, info};
use std::sync::Arc;

/// Drains pending transfer requests against the local cache.
#[derive(Clone)]
pub struct TransferProcessor {
    store: Arc<SqliteItemStore>,
}

impl TransferProcessor {
    pub fn new(store: Arc<SqliteItemStore>) -> Self {
        Self { store }
    }

    /// Applies every pending request. Returns the number of requests applied.
    pub fn process_pending(&self) -> StoreResult<usize> {
        let pending = self.store.pending_transfers()?;
        let mut applied = 0usize;
        for request in pending {
            match self.store.apply_transfer(&request) {
                Ok(moved) => {
                    applied += 1;
                    info!(
                        "event=transfer_process module=store status=ok request={} source={} destination={} moved={}",
                        request.id, request.source, request.destination, moved
                    );
                }
                Err(err) => {
                    error!(
                        "event=transfer_process module=store status=error request={} error={}",
                        request.id, err
                    );
                    return Err(err);
                }
            }
        }
        Ok(applied)
    }
}
