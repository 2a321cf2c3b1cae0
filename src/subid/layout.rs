//! Slot layout of the id space

use super::slot::{Allocation, Slot};
use tracing::debug;

/// Exclusive upper bound of generated slot ids (2^32 - 1)
pub const MAX_ID: u64 = u32::MAX as u64;

/// Fixed-width partitioning of the id space
///
/// Slots start at `start` and are `range + 1` apart, leaving one id
/// between neighbouring ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotLayout {
    pub start: u64,
    pub range: u64,
}

impl SlotLayout {
    pub fn new(start: u64, range: u64) -> Self {
        Self { start, range }
    }

    /// Distance between consecutive slot ids
    ///
    /// Saturates for ranges that span the whole id space, which leaves
    /// room for the first slot only.
    pub fn step(&self) -> u64 {
        self.range.saturating_add(1)
    }

    /// Slot ids in ascending order, stopping before `MAX_ID`
    pub fn ids(&self) -> impl Iterator<Item = u64> {
        let step = self.step();
        std::iter::successors(Some(self.start), move |id| id.checked_add(step))
            .take_while(|id| *id < MAX_ID)
    }

    /// Number of slots the layout provides
    pub fn capacity(&self) -> u64 {
        if self.start >= MAX_ID {
            return 0;
        }
        (MAX_ID - self.start).div_ceil(self.step())
    }

    /// Generate the full candidate space, every slot free
    ///
    /// Empty when `start >= MAX_ID`; callers treat that as no capacity.
    pub fn generate(&self) -> Allocation {
        debug!(
            start = self.start,
            range = self.range,
            max = MAX_ID,
            length = self.capacity(),
            "Generate slots"
        );
        self.ids().map(|id| Slot::free(id, self.range)).collect()
    }
}
