#![forbid(unsafe_code)]

//! Lifecycle listeners and lifecycle scopes.
//!
//! Listeners observe every lifecycle transition of one controller. Fan-out
//! iterates a snapshot of the registration list taken before the first
//! callback, so a listener may add or remove listeners (itself included)
//! without affecting the notification in progress.
//!
//! A *scope* binds work to "until the matching end event": work started
//! after `Attach` ends at `Detach`, after `CreateView` at `DestroyView`,
//! and so on. Asking for a scope when the last event has no matching end
//! yields [`NavError::OutOfScope`].

use serde_json::Value;

use super::ControllerContext;
use crate::change::ChangeType;
use crate::error::{NavError, Result};
use crate::view::NodeId;

/// Handle returned when registering a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

/// Coarse lifecycle events used for scoping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControllerEvent {
    Create,
    ContextAvailable,
    CreateView,
    Attach,
    Detach,
    DestroyView,
    ContextUnavailable,
    Destroy,
}

impl ControllerEvent {
    /// The event that closes a scope opened at `self`.
    #[must_use]
    pub fn scope_end(self) -> Option<Self> {
        match self {
            Self::Create => Some(Self::Destroy),
            Self::ContextAvailable => Some(Self::ContextUnavailable),
            Self::CreateView => Some(Self::DestroyView),
            Self::Attach => Some(Self::Detach),
            Self::Detach => Some(Self::Destroy),
            Self::DestroyView | Self::ContextUnavailable | Self::Destroy => None,
        }
    }
}

/// Resolve the end of the scope opened by `last_event`.
pub fn scope_end_event(last_event: Option<ControllerEvent>) -> Result<ControllerEvent> {
    last_event
        .and_then(ControllerEvent::scope_end)
        .ok_or(NavError::OutOfScope { last_event })
}

/// Fine-grained notification delivered to [`LifecycleListener`]s.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    PreContextAvailable,
    PostContextAvailable,
    PreCreateView,
    PostCreateView { view: NodeId },
    PreAttach { view: NodeId },
    PostAttach { view: NodeId },
    PreDetach { view: NodeId },
    PostDetach { view: NodeId },
    PreDestroyView { view: NodeId },
    PostDestroyView,
    PreContextUnavailable,
    PostContextUnavailable,
    PreDestroy,
    PostDestroy,
    ChangeStart { handler: String, change: ChangeType },
    ChangeEnd { handler: String, change: ChangeType },
    SaveInstanceState { state: Value },
    RestoreInstanceState { state: Value },
    SaveViewState { state: Value },
    RestoreViewState { state: Value },
}

impl LifecycleEvent {
    /// The scoping event this notification corresponds to, if any.
    #[must_use]
    pub fn controller_event(&self) -> Option<ControllerEvent> {
        match self {
            Self::PostContextAvailable => Some(ControllerEvent::ContextAvailable),
            Self::PostCreateView { .. } => Some(ControllerEvent::CreateView),
            Self::PostAttach { .. } => Some(ControllerEvent::Attach),
            Self::PreDetach { .. } => Some(ControllerEvent::Detach),
            Self::PreDestroyView { .. } => Some(ControllerEvent::DestroyView),
            Self::PreContextUnavailable => Some(ControllerEvent::ContextUnavailable),
            Self::PreDestroy => Some(ControllerEvent::Destroy),
            _ => None,
        }
    }
}

/// Observer of one controller's lifecycle.
pub trait LifecycleListener {
    fn on_event(&self, cx: &mut ControllerContext<'_>, event: &LifecycleEvent);
}

impl<F> LifecycleListener for F
where
    F: Fn(&mut ControllerContext<'_>, &LifecycleEvent),
{
    fn on_event(&self, cx: &mut ControllerContext<'_>, event: &LifecycleEvent) {
        self(cx, event);
    }
}
