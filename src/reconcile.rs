//! Pure reconciliation routines for membership sets and child collections.
//!
//! The update orchestration never rewrites associations wholesale; it computes
//! the minimal attach/detach sets from current vs desired state and the
//! per-record action for each child input. Everything here is side-effect
//! free; the repositories apply the results inside the caller's transaction.

use serde_json::Value;
use std::collections::HashSet;
use uuid::Uuid;

/// Ids to attach and detach to move an association set from `existing` to
/// `desired`. The two sets are always disjoint.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AssociationDiff {
    pub to_attach: HashSet<Uuid>,
    pub to_detach: HashSet<Uuid>,
}

impl AssociationDiff {
    pub fn is_empty(&self) -> bool {
        self.to_attach.is_empty() && self.to_detach.is_empty()
    }
}

/// Compute the attach/detach sets for a many-to-many association.
///
/// `to_attach = desired - existing`, `to_detach = existing - desired`.
/// Applied identically to roles and departments.
pub fn reconcile_ids(existing: &HashSet<Uuid>, desired: &HashSet<Uuid>) -> AssociationDiff {
    AssociationDiff {
        to_attach: desired.difference(existing).copied().collect(),
        to_detach: existing.difference(desired).copied().collect(),
    }
}

/// Action to take for one child record input during an upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChildAction {
    /// No id, present value: insert a new record
    Create,
    /// Id plus present value: update the existing record
    Update(Uuid),
    /// Id plus absent value: delete the existing record
    Delete(Uuid),
    /// No id, absent value: nothing to do
    Noop,
}

/// Whether a child value counts as "present" for reconciliation purposes.
///
/// Booleans always count as present (false is a legitimate stored flag);
/// an empty string or explicit null counts as absent and, combined with an
/// id, requests deletion of the existing record.
pub fn value_is_present(value: &Value) -> bool {
    match value {
        Value::Bool(_) => true,
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Number(_) | Value::Array(_) | Value::Object(_) => true,
    }
}

/// Classify one child input into the action the upsert should take.
pub fn classify_child(id: Option<Uuid>, value: &Value) -> ChildAction {
    match (id, value_is_present(value)) {
        (None, true) => ChildAction::Create,
        (Some(id), true) => ChildAction::Update(id),
        (Some(id), false) => ChildAction::Delete(id),
        (None, false) => ChildAction::Noop,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ids(values: &[u128]) -> HashSet<Uuid> {
        values.iter().map(|v| Uuid::from_u128(*v)).collect()
    }

    #[test]
    fn test_reconcile_disjoint_and_exact() {
        let existing = ids(&[1, 2, 3]);
        let desired = ids(&[2, 3, 4, 5]);

        let diff = reconcile_ids(&existing, &desired);

        assert_eq!(diff.to_attach, ids(&[4, 5]));
        assert_eq!(diff.to_detach, ids(&[1]));
        assert!(diff.to_attach.is_disjoint(&diff.to_detach));

        // Applying the diff to existing yields exactly desired
        let mut applied = existing.clone();
        for id in &diff.to_detach {
            applied.remove(id);
        }
        applied.extend(diff.to_attach.iter().copied());
        assert_eq!(applied, desired);
    }

    #[test]
    fn test_reconcile_identical_sets_is_noop() {
        let existing = ids(&[7, 8]);
        let diff = reconcile_ids(&existing, &existing);
        assert!(diff.is_empty());
    }

    #[test]
    fn test_reconcile_empty_desired_detaches_all() {
        let existing = ids(&[1, 2]);
        let diff = reconcile_ids(&existing, &HashSet::new());
        assert_eq!(diff.to_detach, existing);
        assert!(diff.to_attach.is_empty());
    }

    #[test]
    fn test_classify_delete_then_create() {
        // [{id:5, value:""}, {value:"x"}] -> [Delete(5), Create]
        let five = Uuid::from_u128(5);
        assert_eq!(classify_child(Some(five), &json!("")), ChildAction::Delete(five));
        assert_eq!(classify_child(None, &json!("x")), ChildAction::Create);
    }

    #[test]
    fn test_classify_boolean_values_always_present() {
        let id = Uuid::from_u128(9);
        assert_eq!(classify_child(Some(id), &json!(false)), ChildAction::Update(id));
        assert_eq!(classify_child(None, &json!(true)), ChildAction::Create);
    }

    #[test]
    fn test_classify_absent_without_id_is_noop() {
        assert_eq!(classify_child(None, &json!("")), ChildAction::Noop);
        assert_eq!(classify_child(None, &Value::Null), ChildAction::Noop);
    }

    #[test]
    fn test_classify_structured_values_present() {
        let id = Uuid::from_u128(3);
        assert_eq!(classify_child(Some(id), &json!(42)), ChildAction::Update(id));
        assert_eq!(classify_child(None, &json!({"street": "Main"})), ChildAction::Create);
    }
}
