#![forbid(unsafe_code)]

//! One backstack slot: a controller plus how it enters and leaves.

use std::fmt;

use crate::change::ChangeHandler;
use crate::controller::ControllerId;
use crate::indexer::TransactionIndexer;

/// A controller paired with its push/pop handlers, tag, and order index.
///
/// Handlers stored here are templates: every transition runs a fresh
/// [`copy`](ChangeHandler::copy), so one entry can be pushed, popped, and
/// saved without sharing transient animation state.
pub struct NavigationEntry {
    controller: ControllerId,
    push_handler: Option<Box<dyn ChangeHandler>>,
    pop_handler: Option<Box<dyn ChangeHandler>>,
    tag: Option<String>,
    order_index: Option<u64>,
}

impl fmt::Debug for NavigationEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NavigationEntry")
            .field("controller", &self.controller)
            .field("push_handler", &self.push_handler.as_ref().map(|h| h.type_tag().to_owned()))
            .field("pop_handler", &self.pop_handler.as_ref().map(|h| h.type_tag().to_owned()))
            .field("tag", &self.tag)
            .field("order_index", &self.order_index)
            .finish()
    }
}

impl NavigationEntry {
    #[must_use]
    pub fn with(controller: ControllerId) -> Self {
        Self {
            controller,
            push_handler: None,
            pop_handler: None,
            tag: None,
            order_index: None,
        }
    }

    #[must_use]
    pub fn with_push_handler(mut self, handler: impl ChangeHandler + 'static) -> Self {
        self.push_handler = Some(Box::new(handler));
        self
    }

    #[must_use]
    pub fn with_pop_handler(mut self, handler: impl ChangeHandler + 'static) -> Self {
        self.pop_handler = Some(Box::new(handler));
        self
    }

    /// Use one handler configuration for both directions.
    #[must_use]
    pub fn with_handlers(mut self, handler: impl ChangeHandler + 'static) -> Self {
        self.pop_handler = Some(handler.copy());
        self.push_handler = Some(Box::new(handler));
        self
    }

    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    #[must_use]
    pub fn controller(&self) -> &ControllerId {
        &self.controller
    }

    #[must_use]
    pub fn push_handler(&self) -> Option<&dyn ChangeHandler> {
        self.push_handler.as_deref()
    }

    #[must_use]
    pub fn pop_handler(&self) -> Option<&dyn ChangeHandler> {
        self.pop_handler.as_deref()
    }

    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    #[must_use]
    pub fn order_index(&self) -> Option<u64> {
        self.order_index
    }

    pub(crate) fn set_push_handler(&mut self, handler: Option<Box<dyn ChangeHandler>>) {
        self.push_handler = handler;
    }

    pub(crate) fn set_pop_handler(&mut self, handler: Option<Box<dyn ChangeHandler>>) {
        self.pop_handler = handler;
    }

    pub(crate) fn set_tag(&mut self, tag: Option<String>) {
        self.tag = tag;
    }

    pub(crate) fn set_order_index(&mut self, index: Option<u64>) {
        self.order_index = index;
    }

    /// Same controller, tag, and index with fresh copies of the handler
    /// templates.
    pub(crate) fn duplicate(&self) -> Self {
        Self {
            controller: self.controller.clone(),
            push_handler: self.push_handler.as_ref().map(|h| h.copy()),
            pop_handler: self.pop_handler.as_ref().map(|h| h.copy()),
            tag: self.tag.clone(),
            order_index: self.order_index,
        }
    }

    /// Draw an order index unless one was already assigned.
    pub(crate) fn ensure_valid_index(&mut self, indexer: &mut TransactionIndexer) -> u64 {
        *self.order_index.get_or_insert_with(|| indexer.next_index())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::SimpleSwapChangeHandler;

    #[test]
    fn index_is_assigned_once() {
        let mut indexer = TransactionIndexer::new();
        let mut entry = NavigationEntry::with(ControllerId::from("a"));
        assert_eq!(entry.order_index(), None);
        assert_eq!(entry.ensure_valid_index(&mut indexer), 1);
        assert_eq!(entry.ensure_valid_index(&mut indexer), 1);
        assert_eq!(indexer.current(), 1);
    }

    #[test]
    fn with_handlers_sets_both_directions() {
        let entry = NavigationEntry::with(ControllerId::from("a"))
            .with_handlers(SimpleSwapChangeHandler::new(false))
            .with_tag("home");
        assert!(!entry.push_handler().unwrap().removes_from_view_on_push());
        assert!(!entry.pop_handler().unwrap().removes_from_view_on_push());
        assert_eq!(entry.tag(), Some("home"));
    }
}
