//! Error types for the slot store.

use thiserror::Error;

/// Result type alias for slot store operations.
pub type SlotResult<T> = Result<T, SlotError>;

/// Error variants for slot store operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SlotError {
    /// Malformed request: zero capacity, zero-sized payload, or an empty
    /// or out-of-range slot.
    #[error("Invalid argument: {msg}")]
    InvalidArgument {
        /// Description of what was wrong with the request.
        msg: String,
    },

    /// Every slot below capacity is occupied.
    #[error("Slot store full: all {capacity} slots occupied")]
    Full {
        /// Capacity of the saturated store.
        capacity: usize,
    },

    /// The backing slot table could not be allocated.
    #[error("Out of memory: cannot reserve {requested} slots")]
    OutOfMemory {
        /// Number of slots that were requested.
        requested: usize,
    },
}

impl SlotError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        SlotError::InvalidArgument { msg: msg.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_display_mentions_capacity() {
        let err = SlotError::Full { capacity: 64 };
        assert_eq!(err.to_string(), "Slot store full: all 64 slots occupied");
    }

    #[test]
    fn test_invalid_helper_builds_variant() {
        let err = SlotError::invalid("slot 3 is empty");
        assert!(matches!(err, SlotError::InvalidArgument { ref msg } if msg == "slot 3 is empty"));
    }

    #[test]
    fn test_out_of_memory_display() {
        let err = SlotError::OutOfMemory { requested: 10 };
        assert!(err.to_string().contains("10"));
    }
}
