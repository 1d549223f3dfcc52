//! Movable item domain model.
//!
//! # Responsibility
//! - Define the record that can be relocated between scopes.
//! - Define the placement-field patch applied by direct updates.
//!
//! # Invariants
//! - `project_id = None` means the item lives in the shared inventory.
//! - The core never destroys items; deletion belongs to callers.

use crate::model::scope::Scope;
use serde::{Deserialize, Serialize};

/// Stable identifier of a movable item.
pub type ItemId = String;

/// Purchasable item that can move between inventory and projects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovableItem {
    pub id: ItemId,
    /// Owning project; `None` for inventory.
    pub project_id: Option<String>,
    /// Linked financial transaction.
    pub transaction_id: Option<String>,
    /// Physical storage location.
    pub space_id: Option<String>,
    /// Budget category inherited from the last transfer into a project.
    pub inherited_budget_category_id: Option<String>,
}

impl MovableItem {
    /// Creates an unplaced inventory item.
    pub fn new(id: impl Into<ItemId>) -> Self {
        Self {
            id: id.into(),
            project_id: None,
            transaction_id: None,
            space_id: None,
            inherited_budget_category_id: None,
        }
    }

    /// Returns the owning scope derived from `project_id`.
    pub fn scope(&self) -> Scope {
        Scope::from_project_ref(self.project_id.as_deref())
    }

    /// Returns whether the item currently belongs to `scope`.
    pub fn is_in(&self, scope: &Scope) -> bool {
        self.scope() == *scope
    }
}

/// Placement fields written by a direct update.
///
/// `Some` sets the field; `None` leaves it untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementUpdate {
    pub space_id: Option<String>,
    pub transaction_id: Option<String>,
    pub budget_category_id: Option<String>,
}

impl PlacementUpdate {
    pub fn is_empty(&self) -> bool {
        self.space_id.is_none() && self.transaction_id.is_none() && self.budget_category_id.is_none()
    }
}
