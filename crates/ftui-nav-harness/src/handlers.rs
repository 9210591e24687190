#![forbid(unsafe_code)]

//! Change handlers and listeners that record what the router asked of them.

use std::cell::RefCell;
use std::rc::Rc;

use ftui_nav::{
    ChangeContext, ChangeEvent, ChangeHandler, ChangeListener, CommandQueue, ControllerId,
    NodeId, RestorableHandler,
};
use serde_json::{Value, json};

// ============================================================================
// History
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerCallKind {
    Perform,
    AbortPush,
    CompleteImmediately,
}

/// One call a handler received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerCall {
    pub kind: HandlerCallKind,
    pub from: Option<NodeId>,
    pub to: Option<NodeId>,
    pub is_push: bool,
    pub tag: Option<String>,
}

/// Shared, append-only log of handler calls.
#[derive(Debug, Clone, Default)]
pub struct ChangeHandlerHistory(Rc<RefCell<Vec<HandlerCall>>>);

impl ChangeHandlerHistory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, kind: HandlerCallKind, cx: &ChangeContext<'_>, tag: Option<&str>) {
        self.0.borrow_mut().push(HandlerCall {
            kind,
            from: cx.from(),
            to: cx.to(),
            is_push: cx.is_push(),
            tag: tag.map(str::to_owned),
        });
    }

    #[must_use]
    pub fn calls(&self) -> Vec<HandlerCall> {
        self.0.borrow().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    #[must_use]
    pub fn count(&self, kind: HandlerCallKind) -> usize {
        self.0.borrow().iter().filter(|call| call.kind == kind).count()
    }

    #[must_use]
    pub fn latest(&self) -> Option<HandlerCall> {
        self.0.borrow().last().cloned()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

// ============================================================================
// MockChangeHandler
// ============================================================================

/// Instant swap that logs every call into a shared history.
#[derive(Debug, Clone)]
pub struct MockChangeHandler {
    removes_from_view_on_push: bool,
    tag: Option<String>,
    history: ChangeHandlerHistory,
}

impl Default for MockChangeHandler {
    fn default() -> Self {
        Self::new(ChangeHandlerHistory::new())
    }
}

impl MockChangeHandler {
    #[must_use]
    pub fn new(history: ChangeHandlerHistory) -> Self {
        Self {
            removes_from_view_on_push: true,
            tag: None,
            history,
        }
    }

    /// Leave the "from" view in place on push.
    #[must_use]
    pub fn keeping_from_view(mut self) -> Self {
        self.removes_from_view_on_push = false;
        self
    }

    #[must_use]
    pub fn tagged(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    #[must_use]
    pub fn history(&self) -> &ChangeHandlerHistory {
        &self.history
    }
}

impl ChangeHandler for MockChangeHandler {
    fn type_tag(&self) -> &str {
        Self::TYPE_TAG
    }

    fn perform_change(&mut self, cx: &mut ChangeContext<'_>) {
        self.history
            .record(HandlerCallKind::Perform, cx, self.tag.as_deref());
        if !cx.is_push() || self.removes_from_view_on_push {
            cx.remove_from_view();
        }
        cx.add_to_view();
        cx.complete();
    }

    fn on_abort_push(
        &mut self,
        _new_handler: &dyn ChangeHandler,
        _new_top: Option<&ControllerId>,
        cx: &mut ChangeContext<'_>,
    ) {
        self.history
            .record(HandlerCallKind::AbortPush, cx, self.tag.as_deref());
    }

    fn complete_immediately(&mut self, cx: &mut ChangeContext<'_>) {
        self.history
            .record(HandlerCallKind::CompleteImmediately, cx, self.tag.as_deref());
    }

    fn removes_from_view_on_push(&self) -> bool {
        self.removes_from_view_on_push
    }

    fn copy(&self) -> Box<dyn ChangeHandler> {
        Box::new(self.clone())
    }

    fn save_config(&self) -> Value {
        json!({
            "removes_from_view_on_push": self.removes_from_view_on_push,
            "tag": self.tag,
        })
    }
}

impl RestorableHandler for MockChangeHandler {
    const TYPE_TAG: &'static str = "MockChangeHandler";

    /// Restored instances start with a fresh history.
    fn from_config(config: &Value) -> ftui_nav::Result<Self> {
        let mut handler = Self::default();
        handler.removes_from_view_on_push = config
            .get("removes_from_view_on_push")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        handler.tag = config
            .get("tag")
            .and_then(Value::as_str)
            .map(str::to_owned);
        Ok(handler)
    }
}

// ============================================================================
// Misbehaving handlers
// ============================================================================

/// Removes the "from" view and completes without ever adding the "to" view.
#[derive(Debug, Clone, Default)]
pub struct NeverAddChangeHandler;

impl ChangeHandler for NeverAddChangeHandler {
    fn type_tag(&self) -> &str {
        "NeverAddChangeHandler"
    }

    fn perform_change(&mut self, cx: &mut ChangeContext<'_>) {
        cx.remove_from_view();
        cx.complete();
    }

    fn copy(&self) -> Box<dyn ChangeHandler> {
        Box::new(Self)
    }
}

/// Adds the "to" view but only completes when interrupted. Interruption
/// snaps to the end state: the "from" view leaves the container.
#[derive(Debug, Clone, Default)]
pub struct NeverCompleteChangeHandler {
    history: ChangeHandlerHistory,
}

impl NeverCompleteChangeHandler {
    #[must_use]
    pub fn new(history: ChangeHandlerHistory) -> Self {
        Self { history }
    }

    fn snap_to_end(cx: &mut ChangeContext<'_>) {
        cx.remove_from_view();
        cx.add_to_view();
        cx.complete();
    }
}

impl ChangeHandler for NeverCompleteChangeHandler {
    fn type_tag(&self) -> &str {
        "NeverCompleteChangeHandler"
    }

    fn perform_change(&mut self, cx: &mut ChangeContext<'_>) {
        self.history.record(HandlerCallKind::Perform, cx, None);
        cx.add_to_view();
    }

    fn on_abort_push(
        &mut self,
        _new_handler: &dyn ChangeHandler,
        _new_top: Option<&ControllerId>,
        cx: &mut ChangeContext<'_>,
    ) {
        self.history.record(HandlerCallKind::AbortPush, cx, None);
        Self::snap_to_end(cx);
    }

    fn complete_immediately(&mut self, cx: &mut ChangeContext<'_>) {
        self.history
            .record(HandlerCallKind::CompleteImmediately, cx, None);
        Self::snap_to_end(cx);
    }

    fn copy(&self) -> Box<dyn ChangeHandler> {
        Box::new(self.clone())
    }
}

// ============================================================================
// Listener
// ============================================================================

/// Router change listener that keeps every event it sees, in order.
///
/// Entries are `(started, event)`; `started` is false for completions.
#[derive(Debug, Clone, Default)]
pub struct RecordingChangeListener {
    events: Rc<RefCell<Vec<(bool, ChangeEvent)>>>,
}

impl RecordingChangeListener {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<(bool, ChangeEvent)> {
        self.events.borrow().clone()
    }

    #[must_use]
    pub fn completed(&self) -> Vec<ChangeEvent> {
        self.events
            .borrow()
            .iter()
            .filter(|(started, _)| !started)
            .map(|(_, event)| event.clone())
            .collect()
    }
}

impl ChangeListener for RecordingChangeListener {
    fn on_change_started(&self, _commands: &mut CommandQueue, event: &ChangeEvent) {
        self.events.borrow_mut().push((true, event.clone()));
    }

    fn on_change_completed(&self, _commands: &mut CommandQueue, event: &ChangeEvent) {
        self.events.borrow_mut().push((false, event.clone()));
    }
}
