#![forbid(unsafe_code)]

//! Controllers: lifecycle-managed owners of one view and any child routers.
//!
//! A controller is split in two. The application supplies the *behavior*, an
//! implementation of [`Controller`] with hook methods. The navigator owns the
//! *slot*: lifecycle flags, the current view, handler overrides, listeners,
//! and child routers. Hooks receive a [`ControllerContext`] through which a
//! controller can reach its view host, create child routers, and queue
//! navigation commands.
//!
//! # Lifecycle
//!
//! ```text
//! Initialized ─▶ ContextAvailable ─▶ ViewCreated ─▶ Attached ⇄ Detached
//!                                         ▲                      │
//!                                         └──── ViewDestroyed ◀──┘
//!                                                     │
//!                                                     ▼
//!                                                 Destroyed
//! ```
//!
//! Context availability toggles independently of the view states (a host
//! window can go away and come back across a configuration change).
//!
//! # Invariants
//!
//! - At most one live view per controller.
//! - `attached` implies the controller has a view.
//! - `Destroyed` is terminal: no hook other than listeners already running
//!   fires after `on_destroy`.

mod context;
mod lifecycle;
pub(crate) mod ops;

use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use bitflags::bitflags;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::attach::AttachTracker;
use crate::change::{ChangeHandler, ChangeType};
use crate::host::HostRequest;
use crate::router::RouterId;
use crate::state::ViewStateRecord;
use crate::view::NodeId;

pub use context::ControllerContext;
pub use lifecycle::{
    ControllerEvent, LifecycleEvent, LifecycleListener, ListenerId, scope_end_event,
};

// ============================================================================
// Identity
// ============================================================================

/// Unique controller instance id, stable across save/restore.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ControllerId(Arc<str>);

impl ControllerId {
    /// Generate a fresh random id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Arc::from(uuid::Uuid::new_v4().to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ControllerId {
    fn from(value: &str) -> Self {
        Self(Arc::from(value))
    }
}

impl From<String> for ControllerId {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

impl fmt::Debug for ControllerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ControllerId({})", self.0)
    }
}

impl fmt::Display for ControllerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for ControllerId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ControllerId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::from)
    }
}

// ============================================================================
// Modes and states
// ============================================================================

/// What happens to a controller's view when it detaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetainViewMode {
    /// Release the view on detach; it is recreated on the next attach.
    #[default]
    ReleaseOnDetach,
    /// Keep the view across detach until the controller is destroyed.
    RetainOnDetach,
}

impl RetainViewMode {
    #[must_use]
    pub fn ordinal(self) -> u8 {
        match self {
            Self::ReleaseOnDetach => 0,
            Self::RetainOnDetach => 1,
        }
    }

    /// Unknown ordinals fall back to the default mode.
    #[must_use]
    pub fn from_ordinal(ordinal: u8) -> Self {
        match ordinal {
            1 => Self::RetainOnDetach,
            _ => Self::ReleaseOnDetach,
        }
    }
}

/// Where a controller is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecycleState {
    #[default]
    Initialized,
    ContextAvailable,
    ViewCreated,
    Attached,
    Detached,
    ViewDestroyed,
    Destroyed,
}

bitflags! {
    /// Boolean lifecycle bookkeeping for one controller.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ControllerFlags: u16 {
        const ATTACHED               = 1 << 0;
        const DESTROYED              = 1 << 1;
        const BEING_DESTROYED        = 1 << 2;
        const NEEDS_ATTACH           = 1 << 3;
        const AWAITING_PARENT_ATTACH = 1 << 4;
        const DETACH_FROZEN          = 1 << 5;
        const CONTEXT_AVAILABLE      = 1 << 6;
        const HAS_SAVED_VIEW_STATE   = 1 << 7;
        const PERFORMING_EXIT        = 1 << 8;
        const VIEW_WAS_DETACHED      = 1 << 9;
        /// The view sits somewhere other than the router's container.
        const UNOWNED_PARENT         = 1 << 10;
    }
}

// ============================================================================
// Behavior
// ============================================================================

/// Application-supplied controller behavior.
///
/// Every hook has a default so implementations only override what they use.
/// [`create_view`](Self::create_view) is the one required hook besides the
/// type tag.
pub trait Controller: 'static {
    /// Stable identifier used by the controller factory on restore.
    fn type_tag(&self) -> &str;

    /// Construction arguments persisted with the controller.
    fn args(&self) -> Value {
        Value::Null
    }

    /// Build this controller's view. The returned node must not be
    /// `container`; the router parents it during the transition.
    fn create_view(
        &mut self,
        cx: &mut ControllerContext<'_>,
        container: NodeId,
        saved_view_state: Option<&Value>,
    ) -> NodeId;

    fn on_context_available(&mut self, _cx: &mut ControllerContext<'_>) {}

    fn on_context_unavailable(&mut self, _cx: &mut ControllerContext<'_>) {}

    fn on_attach(&mut self, _cx: &mut ControllerContext<'_>, _view: NodeId) {}

    fn on_detach(&mut self, _cx: &mut ControllerContext<'_>, _view: NodeId) {}

    fn on_destroy_view(&mut self, _cx: &mut ControllerContext<'_>, _view: NodeId) {}

    fn on_destroy(&mut self, _cx: &mut ControllerContext<'_>) {}

    fn on_change_started(
        &mut self,
        _cx: &mut ControllerContext<'_>,
        _handler: &dyn ChangeHandler,
        _change: ChangeType,
    ) {
    }

    fn on_change_ended(
        &mut self,
        _cx: &mut ControllerContext<'_>,
        _handler: &dyn ChangeHandler,
        _change: ChangeType,
    ) {
    }

    fn on_host_started(&mut self, _cx: &mut ControllerContext<'_>) {}

    fn on_host_resumed(&mut self, _cx: &mut ControllerContext<'_>) {}

    fn on_host_paused(&mut self, _cx: &mut ControllerContext<'_>) {}

    fn on_host_stopped(&mut self, _cx: &mut ControllerContext<'_>) {}

    fn on_configuration_changed(&mut self, _cx: &mut ControllerContext<'_>) {}

    fn on_save_view_state(&mut self, _cx: &mut ControllerContext<'_>, _view: NodeId) -> Value {
        Value::Null
    }

    fn on_restore_view_state(
        &mut self,
        _cx: &mut ControllerContext<'_>,
        _view: NodeId,
        _state: &Value,
    ) {
    }

    fn on_save_instance_state(&mut self, _cx: &mut ControllerContext<'_>) -> Value {
        Value::Null
    }

    fn on_restore_instance_state(&mut self, _cx: &mut ControllerContext<'_>, _state: &Value) {}

    fn on_activity_result(
        &mut self,
        _cx: &mut ControllerContext<'_>,
        _request_code: i32,
        _result_code: i32,
        _data: &Value,
    ) {
    }

    fn on_permissions_result(
        &mut self,
        _cx: &mut ControllerContext<'_>,
        _request_code: i32,
        _permissions: &[String],
        _granted: &[bool],
    ) {
    }

    /// Consume a back press after child routers declined it.
    fn handle_back(&mut self, _cx: &mut ControllerContext<'_>) -> bool {
        false
    }
}

// ============================================================================
// Slot
// ============================================================================

/// Navigator-owned state of one controller.
pub(crate) struct ControllerSlot {
    /// `None` while a hook on this controller is running.
    pub behavior: Option<Box<dyn Controller>>,
    pub type_tag: String,
    pub flags: ControllerFlags,
    pub state: LifecycleState,
    pub last_event: Option<ControllerEvent>,
    pub retain_mode: RetainViewMode,
    pub router: Option<RouterId>,
    pub parent: Option<ControllerId>,
    pub view: Option<NodeId>,
    /// View released while being destroyed but still parented for an exit.
    pub destroyed_view: Option<NodeId>,
    pub tracker: AttachTracker,
    pub push_override: Option<Box<dyn ChangeHandler>>,
    pub pop_override: Option<Box<dyn ChangeHandler>>,
    pub target: Option<ControllerId>,
    pub child_routers: Vec<RouterId>,
    pub listeners: Vec<(ListenerId, Rc<dyn LifecycleListener>)>,
    pub requested_permissions: Vec<String>,
    pub view_state: Option<ViewStateRecord>,
    /// Saved instance state waiting for a router before it is delivered.
    pub pending_saved_state: Option<Value>,
    /// Host requests issued before the controller had a router.
    pub pending_requests: Vec<HostRequest>,
}

impl fmt::Debug for ControllerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerSlot")
            .field("type_tag", &self.type_tag)
            .field("flags", &self.flags)
            .field("state", &self.state)
            .field("router", &self.router)
            .field("view", &self.view)
            .field("child_routers", &self.child_routers)
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

impl ControllerSlot {
    pub(crate) fn new(behavior: Box<dyn Controller>, retain_mode: RetainViewMode) -> Self {
        Self {
            type_tag: behavior.type_tag().to_owned(),
            behavior: Some(behavior),
            flags: ControllerFlags::empty(),
            state: LifecycleState::Initialized,
            last_event: Some(ControllerEvent::Create),
            retain_mode,
            router: None,
            parent: None,
            view: None,
            destroyed_view: None,
            tracker: AttachTracker::default(),
            push_override: None,
            pop_override: None,
            target: None,
            child_routers: Vec::new(),
            listeners: Vec::new(),
            requested_permissions: Vec::new(),
            view_state: None,
            pending_saved_state: None,
            pending_requests: Vec::new(),
        }
    }

    #[inline]
    pub(crate) fn is(&self, flag: ControllerFlags) -> bool {
        self.flags.contains(flag)
    }

    #[inline]
    pub(crate) fn set(&mut self, flag: ControllerFlags, value: bool) {
        self.flags.set(flag, value);
    }

    /// Move to `next` unless the controller is already destroyed.
    pub(crate) fn advance(&mut self, next: LifecycleState) {
        if self.state != LifecycleState::Destroyed {
            self.state = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique() {
        let a = ControllerId::generate();
        let b = ControllerId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 36);
    }

    #[test]
    fn id_serializes_as_plain_string() {
        let id = ControllerId::from("abc");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc\"");
        let back: ControllerId = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn retain_mode_ordinals() {
        for mode in [RetainViewMode::ReleaseOnDetach, RetainViewMode::RetainOnDetach] {
            assert_eq!(RetainViewMode::from_ordinal(mode.ordinal()), mode);
        }
        assert_eq!(RetainViewMode::from_ordinal(9), RetainViewMode::ReleaseOnDetach);
    }
}
