//! Header-carrying object allocation.
//!
//! Every object that lives in a [`SlotStore`](crate::SlotStore) is wrapped in
//! a [`Slot`], which pairs the value with a [`SlotHeader`] recording the slot
//! index it currently occupies and its payload size. The store keeps the
//! header in sync whenever it moves the object, so "where am I" is answered
//! from the object itself without a reverse scan.
//!
//! [`SlotBox::allocate`] creates such an object without placing it in any
//! store. Callers that manage the payload lifetime themselves hand the box
//! to [`SlotStore::link_external`](crate::SlotStore::link_external) and get
//! it back from [`SlotStore::unlink_at`](crate::SlotStore::unlink_at).

use std::fmt;
use std::ops::Deref;

use crate::error::{SlotError, SlotResult};

/// Position and size metadata embedded in every stored object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotHeader {
    position: usize,
    size: usize,
}

impl SlotHeader {
    /// Slot index the object occupies (0 while unlinked).
    pub fn position(&self) -> usize {
        self.position
    }

    /// Payload size in bytes, as recorded at allocation.
    ///
    /// For [`SlotBox::allocate`] this is the inline size of the value; payloads
    /// that own heap data record their full footprint via
    /// [`SlotBox::allocate_sized`].
    pub fn size(&self) -> usize {
        self.size
    }
}

/// A value paired with its slot header.
pub struct Slot<T> {
    header: SlotHeader,
    value: T,
}

impl<T> Slot<T> {
    /// The embedded header.
    pub fn header(&self) -> SlotHeader {
        self.header
    }

    /// Current slot index.
    pub fn position(&self) -> usize {
        self.header.position
    }

    /// Payload size in bytes.
    pub fn size(&self) -> usize {
        self.header.size
    }

    /// Shared access to the payload.
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Exclusive access to the payload. The header stays store-owned.
    pub fn value_mut(&mut self) -> &mut T {
        &mut self.value
    }

    pub(crate) fn set_position(&mut self, position: usize) {
        self.header.position = position;
    }
}

impl<T: fmt::Debug> fmt::Debug for Slot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("position", &self.header.position)
            .field("size", &self.header.size)
            .field("value", &self.value)
            .finish()
    }
}

/// Heap allocation of a [`Slot`] with a stable address.
///
/// The address is what [`SlotStore::find_position`](crate::SlotStore::find_position)
/// compares against, so a slot never moves in memory while linked; only the
/// pointer in the slot table does.
pub struct SlotBox<T>(Box<Slot<T>>);

impl<T> SlotBox<T> {
    /// Allocate a header-embedded object that is not linked into any store.
    ///
    /// Zero-sized payloads are rejected: they have no identity to track.
    pub fn allocate(value: T) -> SlotResult<Self> {
        let size = std::mem::size_of_val(&value);
        Self::allocate_sized(value, size)
    }

    /// Allocate with an explicit payload size, for values whose bytes live
    /// mostly behind a pointer.
    pub fn allocate_sized(value: T, size: usize) -> SlotResult<Self> {
        if size == 0 {
            return Err(SlotError::invalid("cannot allocate a zero-sized payload"));
        }
        Ok(SlotBox(Box::new(Slot {
            header: SlotHeader { position: 0, size },
            value,
        })))
    }

    /// Release the allocation, returning the payload.
    pub fn release(self) -> T {
        self.0.value
    }

    /// Exclusive access to the payload.
    pub fn value_mut(&mut self) -> &mut T {
        &mut self.0.value
    }

    pub(crate) fn slot_mut(&mut self) -> &mut Slot<T> {
        &mut self.0
    }
}

impl<T> Deref for SlotBox<T> {
    type Target = Slot<T>;

    fn deref(&self) -> &Slot<T> {
        &self.0
    }
}

impl<T: fmt::Debug> fmt::Debug for SlotBox<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_records_payload_size() {
        let boxed = SlotBox::allocate(7u64).unwrap();
        assert_eq!(boxed.size(), 8);
        assert_eq!(boxed.position(), 0);
        assert_eq!(*boxed.value(), 7);
    }

    #[test]
    fn test_allocate_zero_sized_fails() {
        let result = SlotBox::allocate(());
        assert!(matches!(result, Err(SlotError::InvalidArgument { .. })));
    }

    #[test]
    fn test_allocate_sized_records_given_size() {
        let boxed = SlotBox::allocate_sized(Box::new([0u8; 64]), 64).unwrap();
        assert_eq!(boxed.size(), 64);
        assert!(matches!(
            SlotBox::allocate_sized(1u8, 0),
            Err(SlotError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_release_returns_value() {
        let boxed = SlotBox::allocate(String::from("payload")).unwrap();
        assert_eq!(boxed.release(), "payload");
    }

    #[test]
    fn test_value_mut_leaves_header_alone() {
        let mut boxed = SlotBox::allocate(1u32).unwrap();
        *boxed.value_mut() = 99;
        assert_eq!(*boxed.value(), 99);
        assert_eq!(boxed.size(), 4);
    }

    #[test]
    fn test_set_position_updates_header() {
        let mut boxed = SlotBox::allocate(1u32).unwrap();
        boxed.slot_mut().set_position(5);
        assert_eq!(boxed.header().position(), 5);
    }
}
