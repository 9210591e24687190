#![forbid(unsafe_code)]

//! Instant swap; the default handler when none is configured.

use serde_json::{Value, json};
use web_time::Duration;

use super::{ChangeContext, ChangeHandler, RestorableHandler};
use crate::controller::ControllerId;
use crate::error::Result;

/// Removes the "from" view and adds the "to" view in one step.
///
/// Completion is reported once the container is part of a window; until then
/// the handler stays live and completes on the next frame that finds the
/// container attached, or when interrupted.
#[derive(Debug, Clone)]
pub struct SimpleSwapChangeHandler {
    removes_from_view_on_push: bool,
    canceled: bool,
    awaiting_window: bool,
}

impl Default for SimpleSwapChangeHandler {
    fn default() -> Self {
        Self::new(true)
    }
}

impl SimpleSwapChangeHandler {
    #[must_use]
    pub fn new(removes_from_view_on_push: bool) -> Self {
        Self {
            removes_from_view_on_push,
            canceled: false,
            awaiting_window: false,
        }
    }

    fn finish_waiting(&mut self, cx: &mut ChangeContext<'_>) {
        if self.awaiting_window {
            self.awaiting_window = false;
            cx.complete();
        }
    }
}

impl ChangeHandler for SimpleSwapChangeHandler {
    fn type_tag(&self) -> &str {
        Self::TYPE_TAG
    }

    fn perform_change(&mut self, cx: &mut ChangeContext<'_>) {
        if !self.canceled {
            if !cx.is_push() || self.removes_from_view_on_push {
                cx.remove_from_view();
            }
            cx.add_to_view();
        }

        let container = cx.container();
        if cx.host_ref().is_in_window(container) {
            cx.complete();
        } else {
            self.awaiting_window = true;
        }
    }

    fn on_frame(&mut self, _dt: Duration, cx: &mut ChangeContext<'_>) {
        let container = cx.container();
        if cx.host_ref().is_in_window(container) {
            self.finish_waiting(cx);
        }
    }

    fn on_abort_push(
        &mut self,
        _new_handler: &dyn ChangeHandler,
        _new_top: Option<&ControllerId>,
        cx: &mut ChangeContext<'_>,
    ) {
        self.canceled = true;
        self.finish_waiting(cx);
    }

    fn complete_immediately(&mut self, cx: &mut ChangeContext<'_>) {
        self.finish_waiting(cx);
    }

    fn removes_from_view_on_push(&self) -> bool {
        self.removes_from_view_on_push
    }

    fn is_reusable(&self) -> bool {
        true
    }

    fn copy(&self) -> Box<dyn ChangeHandler> {
        Box::new(Self::new(self.removes_from_view_on_push))
    }

    fn save_config(&self) -> Value {
        json!({ "removes_from_view_on_push": self.removes_from_view_on_push })
    }
}

impl RestorableHandler for SimpleSwapChangeHandler {
    const TYPE_TAG: &'static str = "SimpleSwapChangeHandler";

    fn from_config(config: &Value) -> Result<Self> {
        let removes = config
            .get("removes_from_view_on_push")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        Ok(Self::new(removes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::ChangeInfo;
    use crate::view::{MemoryViewTree, NodeId, ViewHost};

    fn setup(in_window: bool) -> (MemoryViewTree, NodeId, NodeId, NodeId) {
        let mut tree = MemoryViewTree::new();
        let container = tree.create_node(Some("container"));
        let from = tree.create_node(None);
        let to = tree.create_node(None);
        tree.add_child(container, from, None);
        if in_window {
            tree.attach_to_window(container);
        }
        (tree, container, from, to)
    }

    fn info(container: NodeId, from: NodeId, to: NodeId, is_push: bool) -> ChangeInfo {
        ChangeInfo {
            container,
            from: Some(from),
            to: Some(to),
            from_controller: None,
            to_controller: None,
            is_push,
            default_duration: Duration::ZERO,
        }
    }

    #[test]
    fn swaps_and_completes_in_window() {
        let (mut tree, container, from, to) = setup(true);
        let info = info(container, from, to, true);
        let mut handler = SimpleSwapChangeHandler::default();
        let mut cx = ChangeContext::new(&mut tree, &info);
        handler.perform_change(&mut cx);
        assert!(cx.is_completed());
        assert_eq!(tree.children(container), &[to]);
    }

    #[test]
    fn keeps_from_view_when_configured() {
        let (mut tree, container, from, to) = setup(true);
        let info = info(container, from, to, true);
        let mut handler = SimpleSwapChangeHandler::new(false);
        let mut cx = ChangeContext::new(&mut tree, &info);
        handler.perform_change(&mut cx);
        assert_eq!(tree.children(container), &[from, to]);
    }

    #[test]
    fn waits_for_window_then_completes() {
        let (mut tree, container, from, to) = setup(false);
        let info = info(container, from, to, true);
        let mut handler = SimpleSwapChangeHandler::default();
        {
            let mut cx = ChangeContext::new(&mut tree, &info);
            handler.perform_change(&mut cx);
            assert!(!cx.is_completed());
        }
        tree.attach_to_window(container);
        let mut cx = ChangeContext::new(&mut tree, &info);
        handler.on_frame(Duration::ZERO, &mut cx);
        assert!(cx.is_completed());
    }

    #[test]
    fn config_survives_restore() {
        let handler = SimpleSwapChangeHandler::new(false);
        let restored = SimpleSwapChangeHandler::from_config(&handler.save_config()).unwrap();
        assert!(!restored.removes_from_view_on_push());
    }
}
