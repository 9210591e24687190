#![forbid(unsafe_code)]

//! Transition handlers: strategies that swap two views inside a container.
//!
//! A router hands each transition to exactly one [`ChangeHandler`] instance
//! together with a [`ChangeContext`]. The handler manipulates the views
//! through the context and calls [`ChangeContext::complete`] when the swap
//! is finished, either during [`ChangeHandler::perform_change`] or on a
//! later [`ChangeHandler::on_frame`].
//!
//! # Interruption
//!
//! At most one handler is live per container. When a new transition targets
//! a container whose handler has not completed, the router interrupts it:
//!
//! ```text
//! live handler was a push ──▶ on_abort_push(new_handler, new_top)
//! live handler was a pop  ──▶ complete_immediately()
//! ```
//!
//! Either way the interrupted handler must leave parentage consistent and
//! call `complete()`. A handler that fails to do so is finalized by the
//! router anyway and a warning is logged.
//!
//! # Invariants
//!
//! - Completion bookkeeping runs exactly once per handler instance.
//!   `complete()` is idempotent; extra calls are ignored.

mod animator;
mod noop;
mod registry;
mod simple_swap;

use std::fmt;

use serde_json::Value;
use web_time::Duration;

use crate::controller::ControllerId;
use crate::view::{NodeId, ViewHost};

pub use animator::{AnimationStyle, AnimatorChangeHandler, Easing, TimedStyle};
pub use noop::NoOpChangeHandler;
pub use registry::{HandlerRecord, HandlerRegistry, RestorableHandler};
pub use simple_swap::SimpleSwapChangeHandler;

// ============================================================================
// Change type
// ============================================================================

/// Which side of a transition a controller is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeType {
    PushEnter,
    PushExit,
    PopEnter,
    PopExit,
}

impl ChangeType {
    #[must_use]
    pub fn enter(is_push: bool) -> Self {
        if is_push { Self::PushEnter } else { Self::PopEnter }
    }

    #[must_use]
    pub fn exit(is_push: bool) -> Self {
        if is_push { Self::PushExit } else { Self::PopExit }
    }

    #[must_use]
    pub fn is_push(self) -> bool {
        matches!(self, Self::PushEnter | Self::PushExit)
    }

    #[must_use]
    pub fn is_enter(self) -> bool {
        matches!(self, Self::PushEnter | Self::PopEnter)
    }
}

// ============================================================================
// Change context
// ============================================================================

/// Immutable description of one transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeInfo {
    pub container: NodeId,
    pub from: Option<NodeId>,
    pub to: Option<NodeId>,
    pub from_controller: Option<ControllerId>,
    pub to_controller: Option<ControllerId>,
    pub is_push: bool,
    pub default_duration: Duration,
}

/// What a handler may touch while it runs.
pub struct ChangeContext<'a> {
    host: &'a mut dyn ViewHost,
    info: &'a ChangeInfo,
    completed: bool,
}

impl fmt::Debug for ChangeContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeContext")
            .field("info", self.info)
            .field("completed", &self.completed)
            .finish()
    }
}

impl<'a> ChangeContext<'a> {
    #[must_use]
    pub fn new(host: &'a mut dyn ViewHost, info: &'a ChangeInfo) -> Self {
        Self {
            host,
            info,
            completed: false,
        }
    }

    pub fn host(&mut self) -> &mut dyn ViewHost {
        &mut *self.host
    }

    #[must_use]
    pub fn host_ref(&self) -> &dyn ViewHost {
        &*self.host
    }

    #[must_use]
    pub fn info(&self) -> &ChangeInfo {
        self.info
    }

    #[must_use]
    pub fn container(&self) -> NodeId {
        self.info.container
    }

    #[must_use]
    pub fn from(&self) -> Option<NodeId> {
        self.info.from
    }

    #[must_use]
    pub fn to(&self) -> Option<NodeId> {
        self.info.to
    }

    #[must_use]
    pub fn is_push(&self) -> bool {
        self.info.is_push
    }

    /// Duration used by handlers configured with the host default.
    #[must_use]
    pub fn default_duration(&self) -> Duration {
        self.info.default_duration
    }

    /// Report the transition finished. Idempotent.
    pub fn complete(&mut self) {
        if self.completed {
            tracing::warn!(
                target: "ftui.nav",
                container = %self.info.container,
                "change handler reported completion twice; ignoring"
            );
            return;
        }
        self.completed = true;
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Remove the "from" view from the container if it is still there.
    pub fn remove_from_view(&mut self) {
        if let Some(from) = self.info.from
            && self.host.parent(from) == Some(self.info.container)
        {
            self.host.remove_child(self.info.container, from);
        }
    }

    /// Add the "to" view to the container if it has no parent yet.
    ///
    /// On a pop the view is placed beneath the "from" view so an exit
    /// animation plays on top.
    pub fn add_to_view(&mut self) {
        let Some(to) = self.info.to else { return };
        if self.host.parent(to).is_some() {
            return;
        }
        let index = match (self.info.is_push, self.info.from) {
            (false, Some(from)) => self.host.index_of(self.info.container, from),
            _ => None,
        };
        self.host.add_child(self.info.container, to, index);
    }
}

// ============================================================================
// Handler trait
// ============================================================================

/// Strategy animating the swap of two views for one push or pop.
pub trait ChangeHandler: fmt::Debug {
    /// Stable identifier used to restore the handler from saved state.
    fn type_tag(&self) -> &str;

    fn perform_change(&mut self, cx: &mut ChangeContext<'_>);

    /// Advance a handler that did not complete synchronously.
    fn on_frame(&mut self, _dt: Duration, _cx: &mut ChangeContext<'_>) {}

    /// A push driven by this handler was interrupted by `new_handler`, whose
    /// transition will show `new_top`.
    fn on_abort_push(
        &mut self,
        _new_handler: &dyn ChangeHandler,
        _new_top: Option<&ControllerId>,
        _cx: &mut ChangeContext<'_>,
    ) {
    }

    /// Snap to the end state and complete now.
    fn complete_immediately(&mut self, _cx: &mut ChangeContext<'_>) {}

    /// Whether the "from" view leaves the container on push.
    fn removes_from_view_on_push(&self) -> bool {
        true
    }

    /// Whether one instance may drive more than one transition.
    fn is_reusable(&self) -> bool {
        false
    }

    /// Fresh instance with the same configuration and no transient state.
    fn copy(&self) -> Box<dyn ChangeHandler>;

    /// Configuration persisted alongside the type tag.
    fn save_config(&self) -> Value {
        Value::Null
    }
}
