#![forbid(unsafe_code)]

//! Global ordering for navigation entries.
//!
//! Every entry pushed anywhere beneath a root router draws its order index
//! from the root's [`TransactionIndexer`]. Back handling compares these
//! indices across sibling child stacks: the highest index is the most
//! recently touched entry and gets the first chance to consume back.
//!
//! # Invariants
//!
//! - `next_index()` is strictly increasing for the lifetime of an indexer,
//!   including across a save/restore cycle.

use serde::{Deserialize, Serialize};

/// Monotonic counter shared by a root router and all of its descendants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionIndexer {
    current: u64,
}

impl TransactionIndexer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next index.
    pub fn next_index(&mut self) -> u64 {
        self.current += 1;
        self.current
    }

    /// The last index handed out (0 if none).
    #[must_use]
    pub fn current(&self) -> u64 {
        self.current
    }

    /// Rebuild an indexer from a saved counter value.
    #[must_use]
    pub fn restored(current: u64) -> Self {
        Self { current }
    }
}
