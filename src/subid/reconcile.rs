//! Merge of desired users against a persisted allocation
//!
//! The merge runs as explicit set operations over two keyed mappings:
//!
//! ```text
//! existing ──release(owners ∖ desired)──→ carried ─┐
//!                                                   ├─→ merged ──assign(new users → free ids ↑)──→ result
//! candidate (all free) ─────────────────────────────┘
//! ```
//!
//! Free ids are walked in ascending order, so the lowest free slot always
//! goes to the next new user, whatever the hash order of the sets involved.

use super::layout::SlotLayout;
use super::slot::{Allocation, Slot};
use std::collections::HashSet;
use tracing::{debug, error};

/// Outcome counters of one reconciliation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Distinct desired users
    pub total: usize,
    /// Users bound to a slot during this pass
    pub added: usize,
    /// Bindings released during this pass
    pub removed: usize,
    /// New users left without a slot
    pub unassigned: Vec<String>,
}

impl ReconcileReport {
    /// New users outnumbered free slots
    pub fn capacity_exhausted(&self) -> bool {
        !self.unassigned.is_empty()
    }
}

/// Desired users with later duplicates dropped, order kept
fn distinct(desired: &[String]) -> Vec<&str> {
    let mut seen = HashSet::new();
    desired
        .iter()
        .map(String::as_str)
        .filter(|user| seen.insert(*user))
        .collect()
}

/// Compute the next allocation into `candidate`
///
/// `existing` is the persisted state, `candidate` the freshly generated
/// space. Bindings of users still desired keep their slot id; bindings of
/// users no longer desired are released; every other desired user gets the
/// lowest free id still unused. When free ids run out the remaining users
/// are reported in `unassigned` and left out.
pub fn reconcile(
    desired: &[String],
    mut existing: Allocation,
    candidate: &mut Allocation,
) -> ReconcileReport {
    let desired = distinct(desired);
    let wanted: HashSet<&str> = desired.iter().copied().collect();
    let mut report = ReconcileReport {
        total: desired.len(),
        ..Default::default()
    };

    // Release owners that are no longer desired, and any second binding
    // of the same owner (lowest id wins)
    let mut kept: HashSet<String> = HashSet::new();
    for slot in existing.iter_mut().filter(|s| !s.is_free()) {
        if !wanted.contains(slot.owner.as_str()) {
            debug!(owner = %slot.owner, id = slot.id, "Remove owner from subids");
            slot.release();
            report.removed += 1;
        } else if !kept.insert(slot.owner.clone()) {
            debug!(owner = %slot.owner, id = slot.id, "Release duplicate binding");
            slot.release();
            report.removed += 1;
        }
    }

    // Carry forward: existing ids win over generated ones
    for slot in existing {
        debug!(owner = %slot.owner, id = slot.id, "Adding existing subid");
        candidate.insert(slot);
    }

    let new_users: Vec<&str> = desired
        .into_iter()
        .filter(|user| !kept.contains(*user))
        .collect();
    let free_ids = candidate.free_ids();
    debug!(
        new_users = new_users.len(),
        unassigned_ids = free_ids.len(),
        "Assigning new users"
    );

    let mut free = free_ids.into_iter();
    for user in new_users {
        let Some(id) = free.next() else {
            error!(owner = user, "Insufficient subids available");
            report.unassigned.push(user.to_string());
            continue;
        };
        if let Some(slot) = candidate.get_mut(id) {
            debug!(owner = user, id, "Adding user subid");
            slot.assign(user);
            report.added += 1;
        }
    }

    debug!(
        added = report.added,
        removed = report.removed,
        "Subids processed"
    );
    report
}

/// Allocate `desired` from scratch, in order, along `layout`
///
/// Used when the target file is not ours: nothing is carried over.
pub fn allocate_fresh(desired: &[String], layout: &SlotLayout) -> (Allocation, ReconcileReport) {
    let desired = distinct(desired);
    let mut report = ReconcileReport {
        total: desired.len(),
        ..Default::default()
    };
    let mut allocation = Allocation::new();
    let mut ids = layout.ids();

    for user in desired {
        match ids.next() {
            Some(id) => {
                allocation.insert(Slot::bound(user, id, layout.range));
                report.added += 1;
            }
            None => {
                error!(owner = user, "Insufficient subids available");
                report.unassigned.push(user.to_string());
            }
        }
    }

    (allocation, report)
}

#[cfg(test)]
mod tests {
    use super::super::layout::MAX_ID;
    use super::*;

    fn users(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn layout() -> SlotLayout {
        SlotLayout::new(65537, 65536)
    }

    fn existing_fixture() -> Allocation {
        vec![
            Slot::bound("1000", 65537, 65536),
            Slot::bound("1001", 131074, 65536),
            Slot::bound("1003", 196611, 65536),
            Slot::bound("1002", 262148, 65536),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_fresh_allocation() {
        let (allocation, report) =
            allocate_fresh(&users(&["1000", "1001", "1002", "1003"]), &layout());

        let rows: Vec<String> = allocation.occupied().map(Slot::to_string).collect();
        assert_eq!(
            rows,
            vec![
                "1000:65537:65536",
                "1001:131074:65536",
                "1002:196611:65536",
                "1003:262148:65536",
            ]
        );
        assert_eq!(report.added, 4);
        assert_eq!(report.removed, 0);
        assert!(!report.capacity_exhausted());
    }

    #[test]
    fn test_fresh_allocation_runs_out() {
        let small = SlotLayout::new(MAX_ID - 10, 4);
        let (allocation, report) = allocate_fresh(&users(&["a", "b", "c"]), &small);

        assert_eq!(allocation.len(), 2);
        assert_eq!(report.unassigned, vec!["c".to_string()]);
    }

    #[test]
    fn test_release_removed_user() {
        let mut candidate = layout().generate();
        let report = reconcile(
            &users(&["1000", "1001", "1002"]),
            existing_fixture(),
            &mut candidate,
        );

        assert_eq!(report.added, 0);
        assert_eq!(report.removed, 1);
        assert_eq!(candidate.occupied().count(), 3);
        assert_eq!(candidate.owner_at(196611), None);
        assert_eq!(candidate.owner_at(262148), Some("1002"));
    }

    #[test]
    fn test_new_user_takes_lowest_free_slot() {
        let mut candidate = layout().generate();
        let report = reconcile(
            &users(&["1000", "1001", "1002", "1004"]),
            existing_fixture(),
            &mut candidate,
        );

        // 1003 released, its slot is now the lowest free id
        assert_eq!(report.added, 1);
        assert_eq!(report.removed, 1);
        assert_eq!(candidate.owner_at(196611), Some("1004"));
    }

    #[test]
    fn test_deterministic_assignment_order() {
        let existing: Allocation = vec![Slot::bound("1000", 131074, 65536)]
            .into_iter()
            .collect();
        let mut candidate = layout().generate();
        let report = reconcile(&users(&["u2", "1000", "u1"]), existing, &mut candidate);

        assert_eq!(report.added, 2);
        assert_eq!(candidate.owner_at(65537), Some("u2"));
        assert_eq!(candidate.owner_at(131074), Some("1000"));
        assert_eq!(candidate.owner_at(196611), Some("u1"));
    }

    #[test]
    fn test_idempotent_second_pass() {
        let desired = users(&["1005", "1000", "1002", "1007"]);

        let mut first = layout().generate();
        reconcile(&desired, existing_fixture(), &mut first);
        let persisted: Allocation = first.occupied().cloned().collect();

        let mut second = layout().generate();
        let report = reconcile(&desired, persisted, &mut second);

        assert_eq!(report.added, 0);
        assert_eq!(report.removed, 0);
        assert_eq!(first, second);
    }

    #[test]
    fn test_stable_bindings() {
        let desired = users(&["1002", "1000", "2000", "1001"]);
        let mut candidate = layout().generate();
        reconcile(&desired, existing_fixture(), &mut candidate);

        assert_eq!(candidate.find_owner("1000"), Some(65537));
        assert_eq!(candidate.find_owner("1001"), Some(131074));
        assert_eq!(candidate.find_owner("1002"), Some(262148));
        assert_eq!(candidate.find_owner("2000"), Some(196611));
    }

    #[test]
    fn test_duplicates_collapsed() {
        let mut candidate = layout().generate();
        let report = reconcile(&users(&["a", "b", "a"]), Allocation::new(), &mut candidate);

        assert_eq!(report.total, 2);
        assert_eq!(report.added, 2);
        assert_eq!(candidate.occupied().count(), 2);
    }

    #[test]
    fn test_duplicate_binding_in_file_released() {
        let existing: Allocation = vec![
            Slot::bound("1000", 65537, 65536),
            Slot::bound("1000", 131074, 65536),
        ]
        .into_iter()
        .collect();
        let mut candidate = layout().generate();
        let report = reconcile(&users(&["1000"]), existing, &mut candidate);

        assert_eq!(report.removed, 1);
        assert_eq!(candidate.find_owner("1000"), Some(65537));
        assert_eq!(candidate.occupied().count(), 1);
    }

    #[test]
    fn test_insufficient_capacity() {
        // Three slots, two already bound
        let mut candidate: Allocation = (0..3).map(|i| Slot::free(i * 11, 10)).collect();
        let existing: Allocation = vec![Slot::bound("a", 0, 10), Slot::bound("b", 22, 10)]
            .into_iter()
            .collect();

        let report = reconcile(&users(&["a", "b", "c", "d", "e"]), existing, &mut candidate);

        assert_eq!(report.added, 1);
        assert_eq!(candidate.owner_at(11), Some("c"));
        assert!(report.capacity_exhausted());
        assert_eq!(report.unassigned, users(&["d", "e"]));
        assert_eq!(candidate.occupied().count(), 3);
    }

    #[test]
    fn test_empty_candidate_space() {
        let mut candidate = Allocation::new();
        let report = reconcile(&users(&["a"]), Allocation::new(), &mut candidate);

        assert!(candidate.is_empty());
        assert_eq!(report.unassigned, users(&["a"]));
    }
}
