//! Fixed-capacity slot store with dense occupancy.
//!
//! Objects occupy slots `[0, next_free)` with no gaps. Removing an object
//! from the middle compacts the table, either by shifting every later object
//! down one slot (order preserving) or by moving the last object into the
//! hole. Every move rewrites the moved object's [`SlotHeader`] so that
//! `store[header.position]` always points back at the object.
//!
//! [`SlotHeader`]: crate::SlotHeader

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{SlotError, SlotResult};
use crate::slot::{Slot, SlotBox};

/// How the table is re-densified after a removal below the high-water mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompactionPolicy {
    /// Shift every later object down by one slot. Keeps relative order.
    #[default]
    Shift,
    /// Move only the highest object into the freed slot. O(1), reorders.
    MoveLast,
}

/// An object handed to [`SlotStore::link_external`] that could not be placed.
///
/// Ownership goes back to the caller together with the reason.
pub struct Rejected<T> {
    /// Why the object was not linked.
    pub error: SlotError,
    object: SlotBox<T>,
}

impl<T> Rejected<T> {
    /// Take back the object that was not linked.
    pub fn into_inner(self) -> SlotBox<T> {
        self.object
    }
}

impl<T> fmt::Debug for Rejected<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rejected").field("error", &self.error).finish()
    }
}

/// Fixed-capacity table of owned, header-tracked objects.
pub struct SlotStore<T> {
    slots: Vec<Option<SlotBox<T>>>,
    next_free: usize,
    policy: CompactionPolicy,
}

impl<T> SlotStore<T> {
    /// Create a store with `capacity` empty slots and the default policy.
    pub fn new(capacity: usize) -> SlotResult<Self> {
        Self::with_policy(capacity, CompactionPolicy::default())
    }

    /// Create a store with `capacity` empty slots and the given policy.
    pub fn with_policy(capacity: usize, policy: CompactionPolicy) -> SlotResult<Self> {
        if capacity == 0 {
            return Err(SlotError::invalid("slot store capacity must be > 0"));
        }

        let mut slots = Vec::new();
        slots
            .try_reserve_exact(capacity)
            .map_err(|_| SlotError::OutOfMemory {
                requested: capacity,
            })?;
        slots.resize_with(capacity, || None);

        debug!("Created slot store: capacity={} policy={:?}", capacity, policy);

        Ok(Self {
            slots,
            next_free: 0,
            policy,
        })
    }

    /// Total number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.next_free
    }

    /// Whether no slot is occupied.
    pub fn is_empty(&self) -> bool {
        self.next_free == 0
    }

    /// Whether every slot is occupied.
    pub fn is_full(&self) -> bool {
        self.next_free == self.capacity()
    }

    /// The compaction policy in effect.
    pub fn policy(&self) -> CompactionPolicy {
        self.policy
    }

    /// Allocate a new object for `value` in the first free slot.
    ///
    /// Returns the slot index the object landed in.
    pub fn insert_new(&mut self, value: T) -> SlotResult<usize> {
        if self.is_full() {
            return Err(SlotError::Full {
                capacity: self.capacity(),
            });
        }
        let object = SlotBox::allocate(value)?;
        Ok(self.place(object))
    }

    /// Release the object at `position` and compact the table.
    pub fn remove_at(&mut self, position: usize) -> SlotResult<()> {
        self.unlink_at(position).map(drop)
    }

    /// Place an object allocated with [`SlotBox::allocate`] in the first free
    /// slot. On failure the object is handed back inside [`Rejected`].
    pub fn link_external(&mut self, object: SlotBox<T>) -> Result<usize, Rejected<T>> {
        if self.is_full() {
            return Err(Rejected {
                error: SlotError::Full {
                    capacity: self.capacity(),
                },
                object,
            });
        }
        Ok(self.place(object))
    }

    /// Detach the object at `position` without releasing it, then compact.
    pub fn unlink_at(&mut self, position: usize) -> SlotResult<SlotBox<T>> {
        let mut object = self
            .slots
            .get_mut(position)
            .and_then(Option::take)
            .ok_or_else(|| SlotError::invalid(format!("slot {} is empty", position)))?;

        let last = self.next_free - 1;
        if position != last {
            self.compact(position);
        }
        self.next_free -= 1;

        object.slot_mut().set_position(0);
        trace!("Unlinked slot {} (next_free={})", position, self.next_free);
        Ok(object)
    }

    /// Exchange two occupied slots, fixing up both headers.
    pub fn swap(&mut self, a: usize, b: usize) -> SlotResult<()> {
        if !self.is_occupied(a) || !self.is_occupied(b) {
            return Err(SlotError::invalid(format!(
                "cannot swap slots {} and {}: both must be occupied",
                a, b
            )));
        }

        self.slots.swap(a, b);
        self.fix_position(a);
        self.fix_position(b);
        Ok(())
    }

    /// Linear scan for the slot holding `object`, compared by address.
    pub fn find_position(&self, object: &Slot<T>) -> Option<usize> {
        self.slots[..self.next_free].iter().position(|slot| {
            slot.as_ref()
                .is_some_and(|held| std::ptr::eq::<Slot<T>>(&**held, object))
        })
    }

    /// Index of the first object whose payload satisfies `pred`.
    pub fn position_where<F>(&self, mut pred: F) -> Option<usize>
    where
        F: FnMut(&T) -> bool,
    {
        self.iter().position(|slot| pred(slot.value()))
    }

    /// Largest occupied index below `next_free`, if any.
    pub fn highest_occupied_index(&self) -> Option<usize> {
        (0..self.next_free).rev().find(|&i| self.is_occupied(i))
    }

    /// The object at `position`, if occupied.
    pub fn get(&self, position: usize) -> Option<&Slot<T>> {
        self.slots.get(position).and_then(|s| s.as_deref())
    }

    /// Mutable payload at `position`, if occupied.
    pub fn get_mut(&mut self, position: usize) -> Option<&mut T> {
        self.slots
            .get_mut(position)
            .and_then(|s| s.as_mut())
            .map(SlotBox::value_mut)
    }

    /// Occupied slots in index order.
    pub fn iter(&self) -> impl Iterator<Item = &Slot<T>> + '_ {
        self.slots[..self.next_free].iter().filter_map(|s| s.as_deref())
    }

    /// Whether `[0, next_free)` is fully occupied and nothing lives above it.
    pub fn is_dense(&self) -> bool {
        self.slots
            .iter()
            .enumerate()
            .all(|(i, s)| s.is_some() == (i < self.next_free))
    }

    /// Release every object.
    pub fn clear(&mut self) {
        for slot in &mut self.slots[..self.next_free] {
            *slot = None;
        }
        self.next_free = 0;
    }

    fn is_occupied(&self, position: usize) -> bool {
        matches!(self.slots.get(position), Some(Some(_)))
    }

    fn place(&mut self, mut object: SlotBox<T>) -> usize {
        let position = self.next_free;
        object.slot_mut().set_position(position);
        self.slots[position] = Some(object);
        self.next_free += 1;
        trace!("Placed object in slot {}", position);
        position
    }

    fn move_object(&mut self, src: usize, dest: usize) {
        debug_assert!(self.slots[dest].is_none());
        self.slots[dest] = self.slots[src].take();
        self.fix_position(dest);
    }

    fn fix_position(&mut self, position: usize) {
        if let Some(object) = self.slots[position].as_mut() {
            object.slot_mut().set_position(position);
        }
    }

    // No allocation happens here: objects are only moved between slots.
    fn compact(&mut self, hole: usize) {
        match self.policy {
            CompactionPolicy::Shift => {
                let mut backward = 0;
                for i in hole..self.next_free {
                    if self.slots[i].is_some() {
                        if backward > 0 {
                            self.move_object(i, i - backward);
                        }
                    } else {
                        backward += 1;
                    }
                }
            }
            CompactionPolicy::MoveLast => {
                self.move_object(self.next_free - 1, hole);
            }
        }
    }
}

impl<T> fmt::Debug for SlotStore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotStore")
            .field("capacity", &self.capacity())
            .field("next_free", &self.next_free)
            .field("policy", &self.policy)
            .finish()
    }
}
