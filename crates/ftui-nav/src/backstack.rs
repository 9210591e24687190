#![forbid(unsafe_code)]

//! Last-in-first-out stack of navigation entries.
//!
//! ```text
//! push(C)
//! ┌──────────────────────────────┐
//! │ top ▶ C                      │
//! │       B                      │
//! │ root▶ A                      │
//! └──────────────────────────────┘
//! pop_to(A) returns [C, B]; A becomes top.
//! ```
//!
//! # Invariants
//!
//! 1. A controller appears at most once.
//! 2. `peek()` is the most recently pushed entry not yet popped.
//! 3. Entries removed from the stack are handed back to the caller; the
//!    router destroys their controllers before the operation returns, so
//!    the stack never references a destroyed controller.
//!
//! # Persistence
//!
//! [`iter`](Backstack::iter) yields entries top to bottom, the order used
//! when saving. [`restore`](Backstack::restore) takes that order and
//! rebuilds the stack in reverse so LIFO order survives the round trip.

use crate::controller::ControllerId;
use crate::entry::NavigationEntry;
use crate::error::{NavError, Result};

#[derive(Debug, Default)]
pub struct Backstack {
    /// Bottom at index 0, top at the end.
    entries: Vec<NavigationEntry>,
}

impl Backstack {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn push(&mut self, entry: NavigationEntry) {
        self.entries.push(entry);
    }

    /// Remove the top entry.
    pub fn pop(&mut self) -> Option<NavigationEntry> {
        self.entries.pop()
    }

    #[must_use]
    pub fn peek(&self) -> Option<&NavigationEntry> {
        self.entries.last()
    }

    pub fn peek_mut(&mut self) -> Option<&mut NavigationEntry> {
        self.entries.last_mut()
    }

    #[must_use]
    pub fn root(&self) -> Option<&NavigationEntry> {
        self.entries.first()
    }

    /// Pop every entry above `controller`, returning them top first.
    pub fn pop_to(&mut self, controller: &ControllerId) -> Result<Vec<NavigationEntry>> {
        let position = self
            .position(controller)
            .ok_or_else(|| NavError::NotOnStack {
                controller: controller.clone(),
            })?;
        let mut popped = self.entries.split_off(position + 1);
        popped.reverse();
        Ok(popped)
    }

    /// Remove everything, returning entries top first.
    pub fn pop_all(&mut self) -> Vec<NavigationEntry> {
        let mut popped = std::mem::take(&mut self.entries);
        popped.reverse();
        popped
    }

    /// Replace the whole stack. `entries` are ordered bottom to top.
    pub fn set_all(&mut self, entries: Vec<NavigationEntry>) {
        self.entries = entries;
    }

    /// Rebuild from entries saved top to bottom.
    pub fn restore(&mut self, saved_top_down: Vec<NavigationEntry>) {
        self.entries = saved_top_down;
        self.entries.reverse();
    }

    #[must_use]
    pub fn contains(&self, controller: &ControllerId) -> bool {
        self.position(controller).is_some()
    }

    #[must_use]
    pub fn get(&self, controller: &ControllerId) -> Option<&NavigationEntry> {
        self.entries.iter().find(|e| e.controller() == controller)
    }

    pub fn get_mut(&mut self, controller: &ControllerId) -> Option<&mut NavigationEntry> {
        self.entries.iter_mut().find(|e| e.controller() == controller)
    }

    /// Remove one entry wherever it sits.
    pub fn remove(&mut self, controller: &ControllerId) -> Option<NavigationEntry> {
        let position = self.position(controller)?;
        Some(self.entries.remove(position))
    }

    /// Entries top to bottom.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &NavigationEntry> + ExactSizeIterator {
        self.entries.iter().rev()
    }

    /// Entries bottom to top.
    pub fn iter_bottom_up(
        &self,
    ) -> impl DoubleEndedIterator<Item = &NavigationEntry> + ExactSizeIterator {
        self.entries.iter()
    }

    pub(crate) fn iter_mut_bottom_up(&mut self) -> impl Iterator<Item = &mut NavigationEntry> {
        self.entries.iter_mut()
    }

    /// Controller ids bottom to top.
    #[must_use]
    pub fn controllers(&self) -> Vec<ControllerId> {
        self.entries.iter().map(|e| e.controller().clone()).collect()
    }

    fn position(&self, controller: &ControllerId) -> Option<usize> {
        self.entries.iter().position(|e| e.controller() == controller)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str) -> NavigationEntry {
        NavigationEntry::with(ControllerId::from(id))
    }

    fn ids(entries: &[NavigationEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.controller().as_str()).collect()
    }

    #[test]
    fn push_pop_peek() {
        let mut stack = Backstack::new();
        assert!(stack.peek().is_none());
        stack.push(entry("a"));
        stack.push(entry("b"));
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.peek().unwrap().controller().as_str(), "b");
        assert_eq!(stack.root().unwrap().controller().as_str(), "a");
        assert_eq!(stack.pop().unwrap().controller().as_str(), "b");
        assert_eq!(stack.peek().unwrap().controller().as_str(), "a");
    }

    #[test]
    fn pop_to_removes_strictly_above() {
        let mut stack = Backstack::new();
        for id in ["a", "b", "c", "d"] {
            stack.push(entry(id));
        }
        let popped = stack.pop_to(&ControllerId::from("b")).unwrap();
        assert_eq!(ids(&popped), vec!["d", "c"]);
        assert_eq!(stack.peek().unwrap().controller().as_str(), "b");
        assert_eq!(stack.len(), 2);
    }

    #[test]
    fn pop_to_missing_entry_fails() {
        let mut stack = Backstack::new();
        stack.push(entry("a"));
        let err = stack.pop_to(&ControllerId::from("zzz")).unwrap_err();
        assert!(matches!(err, NavError::NotOnStack { .. }));
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn restore_reverses_saved_order() {
        let mut stack = Backstack::new();
        for id in ["a", "b", "c"] {
            stack.push(entry(id));
        }
        let saved: Vec<NavigationEntry> = stack
            .iter()
            .map(|e| NavigationEntry::with(e.controller().clone()))
            .collect();
        assert_eq!(ids(&saved), vec!["c", "b", "a"]);

        let mut restored = Backstack::new();
        restored.restore(saved);
        assert_eq!(restored.controllers(), stack.controllers());
    }

    #[test]
    fn remove_from_middle() {
        let mut stack = Backstack::new();
        for id in ["a", "b", "c"] {
            stack.push(entry(id));
        }
        assert!(stack.remove(&ControllerId::from("b")).is_some());
        assert!(!stack.contains(&ControllerId::from("b")));
        assert_eq!(ids(&stack.pop_all()), vec!["c", "a"]);
        assert!(stack.is_empty());
    }
}
