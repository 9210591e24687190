#![forbid(unsafe_code)]

use std::cell::RefCell;
use std::rc::Rc;

use ftui_nav::{
    ChangeHandler, ChangeType, Controller, ControllerContext, NavError, NodeId,
    RestorableController,
};
use serde_json::{Value, json};

/// Key of the child container every [`TestController`] view carries.
pub const CHILD_CONTAINER: &str = "child_container";

/// Hook call counts recorded by a [`TestController`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallState {
    pub context_available: u32,
    pub context_unavailable: u32,
    pub create_view: u32,
    pub attach: u32,
    pub detach: u32,
    pub destroy_view: u32,
    pub destroy: u32,
    pub change_start: u32,
    pub change_end: u32,
    pub host_started: u32,
    pub host_stopped: u32,
    pub configuration_changed: u32,
    pub save_instance_state: u32,
    pub restore_instance_state: u32,
    pub save_view_state: u32,
    pub restore_view_state: u32,
    pub activity_results: u32,
    pub permission_results: u32,
}

/// Controller whose view is a plain node holding one keyed child container.
#[derive(Debug, Clone)]
pub struct TestController {
    label: String,
    calls: Rc<RefCell<CallState>>,
    consume_back: bool,
}

impl TestController {
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            calls: Rc::new(RefCell::new(CallState::default())),
            consume_back: false,
        }
    }

    /// Consume every back press that reaches this controller.
    #[must_use]
    pub fn consuming_back(mut self) -> Self {
        self.consume_back = true;
        self
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Shared counters; clone before handing the controller to a navigator.
    #[must_use]
    pub fn calls(&self) -> Rc<RefCell<CallState>> {
        Rc::clone(&self.calls)
    }

    fn record(&self, f: impl FnOnce(&mut CallState)) {
        f(&mut self.calls.borrow_mut());
    }
}

impl Controller for TestController {
    fn type_tag(&self) -> &str {
        Self::TYPE_TAG
    }

    fn args(&self) -> Value {
        json!({ "label": self.label, "consume_back": self.consume_back })
    }

    fn create_view(
        &mut self,
        cx: &mut ControllerContext<'_>,
        _container: NodeId,
        _saved_view_state: Option<&Value>,
    ) -> NodeId {
        self.record(|c| c.create_view += 1);
        let host = cx.host();
        let view = host.create_node(None);
        let child = host.create_node(Some(CHILD_CONTAINER));
        host.add_child(view, child, None);
        view
    }

    fn on_context_available(&mut self, _cx: &mut ControllerContext<'_>) {
        self.record(|c| c.context_available += 1);
    }

    fn on_context_unavailable(&mut self, _cx: &mut ControllerContext<'_>) {
        self.record(|c| c.context_unavailable += 1);
    }

    fn on_attach(&mut self, _cx: &mut ControllerContext<'_>, _view: NodeId) {
        self.record(|c| c.attach += 1);
    }

    fn on_detach(&mut self, _cx: &mut ControllerContext<'_>, _view: NodeId) {
        self.record(|c| c.detach += 1);
    }

    fn on_destroy_view(&mut self, _cx: &mut ControllerContext<'_>, _view: NodeId) {
        self.record(|c| c.destroy_view += 1);
    }

    fn on_destroy(&mut self, _cx: &mut ControllerContext<'_>) {
        self.record(|c| c.destroy += 1);
    }

    fn on_change_started(
        &mut self,
        _cx: &mut ControllerContext<'_>,
        _handler: &dyn ChangeHandler,
        _change: ChangeType,
    ) {
        self.record(|c| c.change_start += 1);
    }

    fn on_change_ended(
        &mut self,
        _cx: &mut ControllerContext<'_>,
        _handler: &dyn ChangeHandler,
        _change: ChangeType,
    ) {
        self.record(|c| c.change_end += 1);
    }

    fn on_host_started(&mut self, _cx: &mut ControllerContext<'_>) {
        self.record(|c| c.host_started += 1);
    }

    fn on_host_stopped(&mut self, _cx: &mut ControllerContext<'_>) {
        self.record(|c| c.host_stopped += 1);
    }

    fn on_configuration_changed(&mut self, _cx: &mut ControllerContext<'_>) {
        self.record(|c| c.configuration_changed += 1);
    }

    fn on_save_view_state(&mut self, _cx: &mut ControllerContext<'_>, _view: NodeId) -> Value {
        self.record(|c| c.save_view_state += 1);
        json!({ "label": self.label })
    }

    fn on_restore_view_state(
        &mut self,
        _cx: &mut ControllerContext<'_>,
        _view: NodeId,
        _state: &Value,
    ) {
        self.record(|c| c.restore_view_state += 1);
    }

    fn on_save_instance_state(&mut self, _cx: &mut ControllerContext<'_>) -> Value {
        self.record(|c| c.save_instance_state += 1);
        json!({ "label": self.label })
    }

    fn on_restore_instance_state(&mut self, _cx: &mut ControllerContext<'_>, _state: &Value) {
        self.record(|c| c.restore_instance_state += 1);
    }

    fn on_activity_result(
        &mut self,
        _cx: &mut ControllerContext<'_>,
        _request_code: i32,
        _result_code: i32,
        _data: &Value,
    ) {
        self.record(|c| c.activity_results += 1);
    }

    fn on_permissions_result(
        &mut self,
        _cx: &mut ControllerContext<'_>,
        _request_code: i32,
        _permissions: &[String],
        _granted: &[bool],
    ) {
        self.record(|c| c.permission_results += 1);
    }

    fn handle_back(&mut self, _cx: &mut ControllerContext<'_>) -> bool {
        self.consume_back
    }
}

impl RestorableController for TestController {
    const TYPE_TAG: &'static str = "TestController";

    fn from_args(args: &Value) -> ftui_nav::Result<Self> {
        let label = args
            .get("label")
            .and_then(Value::as_str)
            .ok_or_else(|| NavError::instantiation(Self::TYPE_TAG, "missing `label` argument"))?;
        let mut controller = Self::new(label);
        controller.consume_back = args
            .get("consume_back")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        Ok(controller)
    }
}
