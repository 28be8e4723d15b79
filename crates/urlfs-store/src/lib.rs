#![warn(missing_docs)]

//! urlfs storage subsystem: fixed-capacity slot store.
//!
//! This crate provides the indexed object store underneath the urlfs path
//! registry. Objects live in a dense, fixed-size slot table; each carries a
//! header recording its own slot index and payload size, which the store
//! keeps in sync across compaction and swaps.

pub mod error;
pub mod slot;
pub mod slot_store;

pub use error::{SlotError, SlotResult};
pub use slot::{Slot, SlotBox, SlotHeader};
pub use slot_store::{CompactionPolicy, Rejected, SlotStore};
