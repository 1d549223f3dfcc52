//! Cross-scope item relocation.
//!
//! # Responsibility
//! - Classify a move as a same-scope update or a cross-scope transfer.
//! - Queue transfer requests and confirm them before writing placement fields.
//!
//! # Invariants
//! - Classification failures are returned, never raised, and write nothing.
//! - At most one move per record is in flight per resolver.
//!
//! # See also
//! - `crate::store::processor`

pub mod plan;
pub mod resolver;

use crate::model::item::{ItemId, MovableItem};
use crate::model::scope::Scope;
use crate::model::transfer::TransferRequestId;
use crate::store::StoreError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub use plan::{plan_move, MoveKind, TransferPlan};
pub use resolver::{CrossScopeItemTransferResolver, DEFAULT_CONFIRMATION_TIMEOUT};

/// Side of a move that needs a budget category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveLeg {
    /// Leaving a project: project to inventory, or the source side of project to project.
    OutOfProject,
    /// Entering a project: inventory to project, or the destination side of project to project.
    IntoProject,
}

/// Caller input for relocating one item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemMoveRequest {
    pub item_id: ItemId,
    pub current_scope: Scope,
    pub current_transaction_id: Option<String>,
    /// Category the item inherited from its last transfer.
    pub inherited_budget_category_id: Option<String>,
    pub destination: Scope,
    pub target_space_id: Option<String>,
    pub target_transaction_id: Option<String>,
    pub target_budget_category_id: Option<String>,
    /// Explicit override applied to whichever leg needs a category.
    pub budget_category_override: Option<String>,
    /// Explicit override for the leg leaving a project.
    pub source_category_override: Option<String>,
    /// Explicit override for the leg entering a project.
    pub destination_category_override: Option<String>,
    /// Caller-supplied fallback category.
    pub default_category_id: Option<String>,
}

impl ItemMoveRequest {
    pub fn new(item_id: impl Into<ItemId>, current_scope: Scope, destination: Scope) -> Self {
        Self {
            item_id: item_id.into(),
            current_scope,
            destination,
            ..Self::default()
        }
    }

    /// Seeds scope, linked transaction and inherited category from a snapshot.
    pub fn from_item(item: &MovableItem, destination: Scope) -> Self {
        Self {
            item_id: item.id.clone(),
            current_scope: item.scope(),
            current_transaction_id: item.transaction_id.clone(),
            inherited_budget_category_id: item.inherited_budget_category_id.clone(),
            destination,
            ..Self::default()
        }
    }
}

/// Successful move result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Same-scope move handled by a direct field update.
    Updated { placement_applied: bool },
    /// Cross-scope move queued as a transfer request.
    Transferred {
        request_id: TransferRequestId,
        /// The item reported the destination scope before the timeout.
        confirmed: bool,
        placement_applied: bool,
    },
}

/// Move failure returned to the caller.
#[derive(Debug)]
pub enum MoveError {
    /// No budget category resolved for a leg that requires one.
    MissingBudgetCategory { item_id: ItemId, leg: MoveLeg },
    /// Another move for the same item has not finished yet.
    MoveInFlight(ItemId),
    Store(StoreError),
}

impl Display for MoveError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingBudgetCategory { item_id, leg } => match leg {
                MoveLeg::IntoProject => write!(
                    f,
                    "a budget category is required to move item {item_id} into a project"
                ),
                MoveLeg::OutOfProject => write!(
                    f,
                    "a budget category is required to move item {item_id} out of its project"
                ),
            },
            Self::MoveInFlight(item_id) => {
                write!(f, "item {item_id} is already being moved")
            }
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for MoveError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::MissingBudgetCategory { .. } | Self::MoveInFlight(_) => None,
        }
    }
}

impl From<StoreError> for MoveError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}
