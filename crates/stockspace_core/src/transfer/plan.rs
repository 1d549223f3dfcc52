//! Move classification and transfer planning.
//!
//! Pure functions: the scope transition is classified once, categories are
//! resolved per leg, and the result says exactly what to write.

use super::{ItemMoveRequest, MoveError, MoveLeg};
use crate::model::item::PlacementUpdate;
use crate::model::scope::{ProjectId, Scope};
use crate::model::transfer::TransferRequest;

/// Scope transition of one move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveKind {
    SameScope,
    InventoryToProject { to: ProjectId },
    ProjectToInventory { from: ProjectId },
    ProjectToProject { from: ProjectId, to: ProjectId },
}

impl MoveKind {
    pub fn classify(current: &Scope, destination: &Scope) -> Self {
        match (current, destination) {
            (current, destination) if current == destination => Self::SameScope,
            (Scope::Inventory, Scope::Project(to)) => Self::InventoryToProject { to: to.clone() },
            (Scope::Project(from), Scope::Inventory) => {
                Self::ProjectToInventory { from: from.clone() }
            }
            (Scope::Project(from), Scope::Project(to)) => Self::ProjectToProject {
                from: from.clone(),
                to: to.clone(),
            },
            (Scope::Inventory, Scope::Inventory) => Self::SameScope,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SameScope => "same_scope",
            Self::InventoryToProject { .. } => "inventory_to_project",
            Self::ProjectToInventory { .. } => "project_to_inventory",
            Self::ProjectToProject { .. } => "project_to_project",
        }
    }
}

/// What a move writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferPlan {
    /// Same-scope move: one direct placement write.
    DirectUpdate(PlacementUpdate),
    /// Cross-scope move: queue `request`, then write `placement` once the
    /// item reports the destination scope.
    Transfer {
        request: TransferRequest,
        placement: PlacementUpdate,
    },
}

/// Classifies `request` and resolves the categories its legs need.
///
/// # Errors
/// - `MoveError::MissingBudgetCategory` when a required leg has no category.
pub fn plan_move(request: &ItemMoveRequest) -> Result<TransferPlan, MoveError> {
    let placement = PlacementUpdate {
        space_id: present(&request.target_space_id),
        transaction_id: present(&request.target_transaction_id),
        budget_category_id: present(&request.target_budget_category_id),
    };

    let (source_category_id, destination_category_id) =
        match MoveKind::classify(&request.current_scope, &request.destination) {
            MoveKind::SameScope => return Ok(TransferPlan::DirectUpdate(placement)),
            MoveKind::InventoryToProject { .. } => {
                (None, Some(require(request, MoveLeg::IntoProject)?))
            }
            MoveKind::ProjectToInventory { .. } => {
                (Some(require(request, MoveLeg::OutOfProject)?), None)
            }
            MoveKind::ProjectToProject { .. } => (
                Some(require(request, MoveLeg::OutOfProject)?),
                Some(require(request, MoveLeg::IntoProject)?),
            ),
        };

    let mut transfer = TransferRequest::for_item(
        request.item_id.clone(),
        request.current_scope.clone(),
        request.destination.clone(),
    );
    transfer.source_category_id = source_category_id;
    transfer.destination_category_id = destination_category_id;
    transfer.transaction_id = present(&request.current_transaction_id);

    Ok(TransferPlan::Transfer {
        request: transfer,
        placement,
    })
}

/// Resolves the category for one leg in priority order.
///
/// - Entering a project: leg override, general override, caller default.
/// - Leaving a project: leg override, general override, inherited, caller default.
pub fn resolve_category(request: &ItemMoveRequest, leg: MoveLeg) -> Option<String> {
    let candidates: &[&Option<String>] = match leg {
        MoveLeg::IntoProject => &[
            &request.destination_category_override,
            &request.budget_category_override,
            &request.default_category_id,
        ],
        MoveLeg::OutOfProject => &[
            &request.source_category_override,
            &request.budget_category_override,
            &request.inherited_budget_category_id,
            &request.default_category_id,
        ],
    };
    candidates.iter().find_map(|candidate| present(candidate))
}

fn require(request: &ItemMoveRequest, leg: MoveLeg) -> Result<String, MoveError> {
    resolve_category(request, leg).ok_or_else(|| MoveError::MissingBudgetCategory {
        item_id: request.item_id.clone(),
        leg,
    })
}

fn present(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::{plan_move, resolve_category, MoveKind, TransferPlan};
    use crate::model::scope::Scope;
    use crate::transfer::{ItemMoveRequest, MoveError, MoveLeg};

    fn project(id: &str) -> Scope {
        Scope::Project(id.to_string())
    }

    #[test]
    fn classifies_all_four_transitions() {
        assert_eq!(
            MoveKind::classify(&project("a"), &project("a")),
            MoveKind::SameScope
        );
        assert_eq!(
            MoveKind::classify(&Scope::Inventory, &Scope::Inventory),
            MoveKind::SameScope
        );
        assert_eq!(
            MoveKind::classify(&Scope::Inventory, &project("a")),
            MoveKind::InventoryToProject {
                to: "a".to_string()
            }
        );
        assert_eq!(
            MoveKind::classify(&project("a"), &Scope::Inventory),
            MoveKind::ProjectToInventory {
                from: "a".to_string()
            }
        );
        assert_eq!(
            MoveKind::classify(&project("a"), &project("b")).as_str(),
            "project_to_project"
        );
    }

    #[test]
    fn same_scope_plans_direct_update_only() {
        let mut request = ItemMoveRequest::new("item-1", project("a"), project("a"));
        request.target_space_id = Some("space-1".to_string());

        let plan = plan_move(&request).expect("same scope never needs a category");

        match plan {
            TransferPlan::DirectUpdate(update) => {
                assert_eq!(update.space_id.as_deref(), Some("space-1"));
                assert!(update.transaction_id.is_none());
            }
            other => panic!("unexpected plan: {other:?}"),
        }
    }

    #[test]
    fn inventory_to_project_requires_category() {
        let request = ItemMoveRequest::new("item-1", Scope::Inventory, project("42"));

        let err = plan_move(&request).expect_err("missing category must fail");

        assert!(matches!(
            err,
            MoveError::MissingBudgetCategory {
                leg: MoveLeg::IntoProject,
                ..
            }
        ));
        assert!(err.to_string().contains("budget category"));
    }

    #[test]
    fn inventory_to_project_ignores_inherited_category() {
        let mut request = ItemMoveRequest::new("item-1", Scope::Inventory, project("42"));
        request.inherited_budget_category_id = Some("old".to_string());

        assert!(plan_move(&request).is_err());
    }

    #[test]
    fn project_to_inventory_falls_back_to_inherited_then_default() {
        let mut request = ItemMoveRequest::new("item-1", project("a"), Scope::Inventory);
        request.inherited_budget_category_id = Some("inherited".to_string());
        request.default_category_id = Some("default".to_string());
        assert_eq!(
            resolve_category(&request, MoveLeg::OutOfProject).as_deref(),
            Some("inherited")
        );

        request.inherited_budget_category_id = Some("  ".to_string());
        assert_eq!(
            resolve_category(&request, MoveLeg::OutOfProject).as_deref(),
            Some("default")
        );

        request.budget_category_override = Some("override".to_string());
        assert_eq!(
            resolve_category(&request, MoveLeg::OutOfProject).as_deref(),
            Some("override")
        );
    }

    #[test]
    fn project_to_project_needs_both_legs() {
        let mut request = ItemMoveRequest::new("item-1", project("a"), project("b"));
        request.inherited_budget_category_id = Some("inherited".to_string());

        let err = plan_move(&request).expect_err("destination leg is missing");
        assert!(matches!(
            err,
            MoveError::MissingBudgetCategory {
                leg: MoveLeg::IntoProject,
                ..
            }
        ));

        request.destination_category_override = Some("fixtures".to_string());
        match plan_move(&request).expect("both legs resolve") {
            TransferPlan::Transfer { request, .. } => {
                assert_eq!(request.source_category_id.as_deref(), Some("inherited"));
                assert_eq!(request.destination_category_id.as_deref(), Some("fixtures"));
            }
            other => panic!("unexpected plan: {other:?}"),
        }
    }

    #[test]
    fn transfer_request_names_item_scopes_and_category() {
        let mut request = ItemMoveRequest::new("item-1", Scope::Inventory, project("42"));
        request.budget_category_override = Some("furniture".to_string());
        request.current_transaction_id = Some("tx-7".to_string());
        request.target_space_id = Some("space-9".to_string());

        match plan_move(&request).expect("plan") {
            TransferPlan::Transfer { request, placement } => {
                assert_eq!(request.item_ids, vec!["item-1".to_string()]);
                assert_eq!(request.source, Scope::Inventory);
                assert_eq!(request.destination, project("42"));
                assert_eq!(request.destination_category_id.as_deref(), Some("furniture"));
                assert!(request.source_category_id.is_none());
                assert_eq!(request.transaction_id.as_deref(), Some("tx-7"));
                assert_eq!(placement.space_id.as_deref(), Some("space-9"));
            }
            other => panic!("unexpected plan: {other:?}"),
        }
    }
}
