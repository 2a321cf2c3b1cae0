//! Slots and allocations

use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// One reserved sub-range of the id space
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    /// Bound user, empty when the slot is free
    pub owner: String,
    /// First id of the range
    pub id: u64,
    /// Width of the range
    pub count: u64,
}

impl Slot {
    /// Create a new free slot
    pub fn free(id: u64, count: u64) -> Self {
        Self {
            owner: String::new(),
            id,
            count,
        }
    }

    /// Create a slot already bound to `owner`
    pub fn bound(owner: impl Into<String>, id: u64, count: u64) -> Self {
        Self {
            owner: owner.into(),
            id,
            count,
        }
    }

    pub fn is_free(&self) -> bool {
        self.owner.is_empty()
    }

    /// Bind this slot to a user
    pub fn assign(&mut self, owner: impl Into<String>) {
        self.owner = owner.into();
    }

    /// Release this slot
    pub fn release(&mut self) {
        self.owner.clear();
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.owner, self.id, self.count)
    }
}

/// Slots keyed by their starting id
///
/// Iteration is always in ascending id order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Allocation {
    slots: BTreeMap<u64, Slot>,
}

impl Allocation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, id: u64) -> Option<&Slot> {
        self.slots.get(&id)
    }

    pub fn get_mut(&mut self, id: u64) -> Option<&mut Slot> {
        self.slots.get_mut(&id)
    }

    /// Owner bound at `id`, if the slot exists and is occupied
    pub fn owner_at(&self, id: u64) -> Option<&str> {
        self.slots
            .get(&id)
            .filter(|s| !s.is_free())
            .map(|s| s.owner.as_str())
    }

    /// Insert a slot under its own id, replacing any slot already there
    pub fn insert(&mut self, slot: Slot) -> Option<Slot> {
        self.slots.insert(slot.id, slot)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Slot> {
        self.slots.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Slot> {
        self.slots.values_mut()
    }

    /// Occupied slots in ascending id order
    pub fn occupied(&self) -> impl Iterator<Item = &Slot> {
        self.slots.values().filter(|s| !s.is_free())
    }

    /// Ids of free slots, ascending
    pub fn free_ids(&self) -> Vec<u64> {
        self.slots
            .values()
            .filter(|s| s.is_free())
            .map(|s| s.id)
            .collect()
    }

    /// Set of all non-empty owners
    pub fn owners(&self) -> HashSet<&str> {
        self.occupied().map(|s| s.owner.as_str()).collect()
    }

    /// Slot id currently bound to `owner`
    pub fn find_owner(&self, owner: &str) -> Option<u64> {
        self.occupied().find(|s| s.owner == owner).map(|s| s.id)
    }
}

impl IntoIterator for Allocation {
    type Item = Slot;
    type IntoIter = std::collections::btree_map::IntoValues<u64, Slot>;

    fn into_iter(self) -> Self::IntoIter {
        self.slots.into_values()
    }
}

impl FromIterator<Slot> for Allocation {
    fn from_iter<I: IntoIterator<Item = Slot>>(iter: I) -> Self {
        let mut allocation = Allocation::new();
        for slot in iter {
            allocation.insert(slot);
        }
        allocation
    }
}
