//! Subordinate ID allocation
//!
//! Partitions the 32-bit id space into fixed-width slots and keeps a
//! user → slot binding file stable across runs.
//!
//! # Architecture
//!
//! ```text
//! SlotLayout(start, range)
//!   └─→ Allocation: 65537 → "", 131074 → "", 196611 → "", ...
//!
//! codec::load(/etc/subuid)
//!   └─→ Allocation: 65537 → "1000", 131074 → "1001"
//!
//! reconcile(desired, existing, &mut candidate)
//!   ├─→ release owners no longer desired
//!   ├─→ carry existing slots into the candidate space
//!   └─→ bind new owners to the lowest free ids
//!
//! codec::save(/etc/subuid) ──copy──→ /etc/subgid
//! ```
//!
//! Files carrying the management header are merged; anything else is
//! replaced wholesale on the first run.

pub mod codec;
pub mod layout;
pub mod managed;
pub mod reconcile;
pub mod slot;
pub mod sync;

pub use codec::{Loaded, SkipReason, SkippedLine};
pub use layout::{SlotLayout, MAX_ID};
pub use managed::Management;
pub use reconcile::{allocate_fresh, reconcile, ReconcileReport};
pub use slot::{Allocation, Slot};
pub use sync::{sync, SyncOutcome};
