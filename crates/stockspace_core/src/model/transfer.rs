//! Transfer request domain model.
//!
//! # Responsibility
//! - Describe one queued cross-scope ownership transfer.
//!
//! # Invariants
//! - A request is immutable once written; only its processing status changes,
//!   and only on the backend side.
//! - Requests crossing into or out of a project carry the budget category
//!   that classifies the financial effect of that leg.

use crate::model::item::ItemId;
use crate::model::scope::Scope;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Stable identifier of a transfer request.
pub type TransferRequestId = Uuid;

/// Backend processing state of a transfer request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferRequestStatus {
    Pending,
    Processed,
}

/// Append-only cross-scope transfer request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub id: TransferRequestId,
    pub item_ids: Vec<ItemId>,
    pub source: Scope,
    pub destination: Scope,
    /// Category classifying the leg leaving a project.
    pub source_category_id: Option<String>,
    /// Category classifying the leg entering a project.
    pub destination_category_id: Option<String>,
    /// Linked transaction of the moved item at request time.
    pub transaction_id: Option<String>,
    /// Unix epoch milliseconds.
    pub requested_at_ms: i64,
}

impl TransferRequest {
    /// Creates a request for a single item with a generated id.
    pub fn for_item(item_id: impl Into<ItemId>, source: Scope, destination: Scope) -> Self {
        Self {
            id: Uuid::new_v4(),
            item_ids: vec![item_id.into()],
            source,
            destination,
            source_category_id: None,
            destination_category_id: None,
            transaction_id: None,
            requested_at_ms: now_epoch_ms(),
        }
    }
}

/// Current Unix epoch milliseconds.
pub(crate) fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or(0)
}
