#![forbid(unsafe_code)]

//! Lifecycle transitions driven by routers and host events.
//!
//! Everything here runs inside a navigator operation. Hooks are invoked by
//! temporarily taking the behavior out of its slot, so a hook can never
//! observe its own controller mid-mutation; a nested call that would re-enter
//! the same behavior is skipped.
//!
//! # Invariants
//!
//! - `on_destroy` runs at most once, guarded by `DESTROYED`.
//! - A view is released (`release_node`) exactly once: either when its
//!   reference is dropped outside destruction, or when the exit transition
//!   that still shows it completes.
//! - Hooks never fire on a destroyed controller, except `on_destroy` itself.

use std::rc::Rc;

use serde_json::Value;

use super::{
    Controller, ControllerContext, ControllerFlags, ControllerId, LifecycleEvent,
    LifecycleListener, LifecycleState, RetainViewMode,
};
use crate::attach::{AttachSignal, AttachTracker};
use crate::change::{ChangeHandler, ChangeType};
use crate::command::NavCommand;
use crate::error::{NavError, Result};
use crate::navigator::Navigator;
use crate::router::RouterId;
use crate::state::ViewStateRecord;
use crate::view::NodeId;

impl Navigator {
    // ========================================================================
    // Hook plumbing
    // ========================================================================

    /// Run `f` against the controller's behavior with a fresh context.
    ///
    /// Returns `None` when the controller is unknown or its behavior is
    /// already borrowed by a running hook.
    pub(crate) fn with_controller<R>(
        &mut self,
        id: &ControllerId,
        f: impl FnOnce(&mut dyn Controller, &mut ControllerContext<'_>) -> R,
    ) -> Option<R> {
        let mut behavior = self.controllers.get_mut(id)?.behavior.take()?;
        let result = {
            let mut cx = ControllerContext::new(self, id.clone());
            f(behavior.as_mut(), &mut cx)
        };
        if let Some(slot) = self.controllers.get_mut(id) {
            slot.behavior = Some(behavior);
        }
        Some(result)
    }

    /// Run a hook unless the controller is destroyed.
    pub(crate) fn hook(
        &mut self,
        id: &ControllerId,
        f: impl FnOnce(&mut dyn Controller, &mut ControllerContext<'_>),
    ) {
        if self.has_flag(id, ControllerFlags::DESTROYED) {
            return;
        }
        self.with_controller(id, f);
    }

    /// Fan `event` out to a snapshot of the controller's listeners.
    pub(crate) fn notify(&mut self, id: &ControllerId, event: LifecycleEvent) {
        let Some(slot) = self.controllers.get_mut(id) else {
            return;
        };
        if let Some(scope) = event.controller_event() {
            slot.last_event = Some(scope);
        }
        let snapshot: Vec<Rc<dyn LifecycleListener>> = slot
            .listeners
            .iter()
            .map(|(_, listener)| Rc::clone(listener))
            .collect();
        if snapshot.is_empty() {
            return;
        }
        let mut cx = ControllerContext::new(self, id.clone());
        for listener in snapshot {
            listener.on_event(&mut cx, &event);
        }
    }

    pub(crate) fn has_flag(&self, id: &ControllerId, flag: ControllerFlags) -> bool {
        self.controllers.get(id).is_some_and(|slot| slot.is(flag))
    }

    pub(crate) fn set_flag(&mut self, id: &ControllerId, flag: ControllerFlags, value: bool) {
        if let Some(slot) = self.controllers.get_mut(id) {
            slot.set(flag, value);
        }
    }

    fn child_routers_of(&self, id: &ControllerId) -> Vec<RouterId> {
        self.controllers
            .get(id)
            .map(|slot| slot.child_routers.clone())
            .unwrap_or_default()
    }

    /// Detach `view` from whatever parent it has and hand it back to the host.
    pub(crate) fn release_view(&mut self, view: NodeId) {
        if let Some(parent) = self.host.parent(view) {
            self.host.remove_child(parent, view);
        }
        self.host.release_node(view);
        tracing::trace!(target: "ftui.nav", view = %view, "view released");
    }

    // ========================================================================
    // Router binding and context
    // ========================================================================

    pub(crate) fn set_controller_router(&mut self, id: &ControllerId, router: RouterId) {
        let parent = self.routers.get(&router).and_then(|r| r.parent.clone());
        let Some(slot) = self.controllers.get_mut(id) else {
            return;
        };
        slot.router = Some(router);
        slot.parent = parent;
        let requests = std::mem::take(&mut slot.pending_requests);
        let saved = slot.pending_saved_state.take();
        self.outbox.extend(requests);

        if let Some(state) = saved {
            self.hook(id, |c, cx| c.on_restore_instance_state(cx, &state));
            self.notify(id, LifecycleEvent::RestoreInstanceState { state });
        }
        self.context_available(id);
    }

    pub(crate) fn context_available(&mut self, id: &ControllerId) {
        if !self.phase.is_context_available() {
            return;
        }
        let Some(slot) = self.controllers.get(id) else {
            return;
        };
        if slot.router.is_none()
            || slot.is(ControllerFlags::CONTEXT_AVAILABLE)
            || slot.is(ControllerFlags::DESTROYED)
        {
            return;
        }
        self.notify(id, LifecycleEvent::PreContextAvailable);
        if let Some(slot) = self.controllers.get_mut(id) {
            slot.set(ControllerFlags::CONTEXT_AVAILABLE, true);
            if slot.state == LifecycleState::Initialized {
                slot.advance(LifecycleState::ContextAvailable);
            }
        }
        self.hook(id, |c, cx| c.on_context_available(cx));
        self.notify(id, LifecycleEvent::PostContextAvailable);
    }

    pub(crate) fn context_unavailable(&mut self, id: &ControllerId) {
        if !self.has_flag(id, ControllerFlags::CONTEXT_AVAILABLE) {
            return;
        }
        self.notify(id, LifecycleEvent::PreContextUnavailable);
        self.set_flag(id, ControllerFlags::CONTEXT_AVAILABLE, false);
        self.with_controller(id, |c, cx| c.on_context_unavailable(cx));
        self.notify(id, LifecycleEvent::PostContextUnavailable);
    }

    // ========================================================================
    // View creation
    // ========================================================================

    /// Make sure the controller has a view suitable for `container`.
    pub(crate) fn inflate(&mut self, id: &ControllerId, container: NodeId) -> Result<NodeId> {
        let slot = self
            .controllers
            .get(id)
            .ok_or_else(|| NavError::UnknownController { controller: id.clone() })?;
        if let Some(view) = slot.view
            && let Some(parent) = self.host.parent(view)
            && parent != container
        {
            self.detach(id, true, false);
            self.remove_view_reference(id);
        }

        let slot = self
            .controllers
            .get(id)
            .ok_or_else(|| NavError::UnknownController { controller: id.clone() })?;
        if let Some(view) = slot.view {
            if slot.retain_mode == RetainViewMode::RetainOnDetach {
                self.restore_child_hosts(id, view);
            }
            return Ok(view);
        }

        let saved = slot.view_state.as_ref().map(|record| record.state.clone());
        self.notify(id, LifecycleEvent::PreCreateView);
        let view = self
            .with_controller(id, |c, cx| c.create_view(cx, container, saved.as_ref()))
            .ok_or_else(|| NavError::UnknownController { controller: id.clone() })?;
        if view == container {
            return Err(NavError::ViewIsContainer { controller: id.clone() });
        }

        let host_started = self.phase.is_started();
        if let Some(slot) = self.controllers.get_mut(id) {
            slot.view = Some(view);
            slot.tracker = AttachTracker::new(host_started);
            slot.set(ControllerFlags::VIEW_WAS_DETACHED, false);
            slot.advance(LifecycleState::ViewCreated);
        }
        tracing::trace!(target: "ftui.nav", controller = %id, view = %view, "view created");
        self.notify(id, LifecycleEvent::PostCreateView { view });
        self.restore_view_state(id, view);
        self.restore_child_hosts(id, view);
        Ok(view)
    }

    /// Re-host child routers whose container was lost with an earlier view.
    fn restore_child_hosts(&mut self, id: &ControllerId, view: NodeId) {
        for router in self.child_routers_of(id) {
            let Some(slot) = self.routers.get(&router) else {
                continue;
            };
            if slot.destroyed || slot.container.is_some() {
                continue;
            }
            let Some(key) = slot.host_key.clone() else {
                continue;
            };
            if let Some(container) = self.host.find_by_key(view, &key)
                && let Some(slot) = self.routers.get_mut(&router)
            {
                slot.container = Some(container);
                self.commands.enqueue(NavCommand::Rebind { router });
            }
        }
    }

    fn restore_view_state(&mut self, id: &ControllerId, view: NodeId) {
        let Some(record) = self.controllers.get(id).and_then(|s| s.view_state.clone()) else {
            return;
        };
        self.host.restore_hierarchy_state(view, &record.hierarchy);
        self.hook(id, |c, cx| c.on_restore_view_state(cx, view, &record.state));
        self.notify(
            id,
            LifecycleEvent::RestoreViewState {
                state: record.state,
            },
        );
    }

    pub(crate) fn save_view_state(&mut self, id: &ControllerId, view: NodeId) {
        let hierarchy = self.host.save_hierarchy_state(view);
        let state = self
            .with_controller(id, |c, cx| c.on_save_view_state(cx, view))
            .unwrap_or(Value::Null);
        if let Some(slot) = self.controllers.get_mut(id) {
            slot.view_state = Some(ViewStateRecord {
                hierarchy,
                state: state.clone(),
            });
            slot.set(ControllerFlags::HAS_SAVED_VIEW_STATE, true);
        }
        self.notify(id, LifecycleEvent::SaveViewState { state });
    }

    // ========================================================================
    // Attach / detach
    // ========================================================================

    pub(crate) fn apply_attach_signal(&mut self, id: &ControllerId, signal: AttachSignal) {
        match signal {
            AttachSignal::Attached => {
                self.set_flag(id, ControllerFlags::VIEW_WAS_DETACHED, false);
                self.attach(id);
            }
            AttachSignal::Detached { from_host_stop } => {
                self.set_flag(id, ControllerFlags::VIEW_WAS_DETACHED, true);
                if !self.has_flag(id, ControllerFlags::DETACH_FROZEN) {
                    self.detach(id, false, from_host_stop);
                }
            }
            AttachSignal::DetachedAfterStop => {
                if !self.has_flag(id, ControllerFlags::DETACH_FROZEN) {
                    self.detach(id, false, false);
                }
            }
        }
    }

    pub(crate) fn attach(&mut self, id: &ControllerId) {
        let Some(slot) = self.controllers.get(id) else {
            return;
        };
        let Some(view) = slot.view else {
            return;
        };
        let container = slot
            .router
            .and_then(|router| self.routers.get(&router))
            .and_then(|router| router.container);
        let unowned = container.is_none() || self.host.parent(view) != container;
        let being_destroyed = slot.is(ControllerFlags::BEING_DESTROYED);
        let parent_detached = slot
            .parent
            .as_ref()
            .is_some_and(|parent| !self.has_flag(parent, ControllerFlags::ATTACHED));

        let Some(slot) = self.controllers.get_mut(id) else {
            return;
        };
        slot.set(ControllerFlags::UNOWNED_PARENT, unowned);
        if unowned || being_destroyed || slot.is(ControllerFlags::ATTACHED) {
            return;
        }
        slot.set(ControllerFlags::HAS_SAVED_VIEW_STATE, false);
        if parent_detached {
            slot.set(ControllerFlags::AWAITING_PARENT_ATTACH, true);
            return;
        }
        slot.set(ControllerFlags::AWAITING_PARENT_ATTACH, false);

        self.notify(id, LifecycleEvent::PreAttach { view });
        if let Some(slot) = self.controllers.get_mut(id) {
            slot.set(ControllerFlags::ATTACHED, true);
            slot.set(ControllerFlags::NEEDS_ATTACH, false);
            slot.advance(LifecycleState::Attached);
        }
        tracing::trace!(target: "ftui.nav", controller = %id, view = %view, "attached");
        self.hook(id, |c, cx| c.on_attach(cx, view));
        self.notify(id, LifecycleEvent::PostAttach { view });

        for router in self.child_routers_of(id) {
            let Some(slot) = self.routers.get(&router) else {
                continue;
            };
            let hosted = slot.container.is_some() && !slot.destroyed;
            let children = slot.backstack.controllers();
            for child in children {
                if self.has_flag(&child, ControllerFlags::AWAITING_PARENT_ATTACH) {
                    self.attach(&child);
                }
            }
            if hosted {
                self.commands.enqueue(NavCommand::Rebind { router });
            }
        }
    }

    /// Detach the controller. `force` releases the view regardless of
    /// retain mode; `block` keeps it even when it would otherwise go.
    pub(crate) fn detach(&mut self, id: &ControllerId, force: bool, block: bool) {
        let Some(slot) = self.controllers.get(id) else {
            return;
        };
        if !slot.is(ControllerFlags::UNOWNED_PARENT) {
            for router in slot.child_routers.clone() {
                self.prepare_router_for_host_detach(router);
            }
        }

        let Some(slot) = self.controllers.get(id) else {
            return;
        };
        let remove_ref = !block
            && (force
                || slot.retain_mode == RetainViewMode::ReleaseOnDetach
                || slot.is(ControllerFlags::BEING_DESTROYED));

        if slot.is(ControllerFlags::ATTACHED)
            && let Some(view) = slot.view
        {
            self.notify(id, LifecycleEvent::PreDetach { view });
            if let Some(slot) = self.controllers.get_mut(id) {
                slot.set(ControllerFlags::ATTACHED, false);
                slot.advance(LifecycleState::Detached);
            }
            tracing::trace!(target: "ftui.nav", controller = %id, view = %view, "detached");
            self.hook(id, |c, cx| c.on_detach(cx, view));
            self.notify(id, LifecycleEvent::PostDetach { view });
        }
        self.set_flag(id, ControllerFlags::AWAITING_PARENT_ATTACH, false);

        if remove_ref {
            self.remove_view_reference(id);
        }
    }

    pub(crate) fn prepare_for_host_detach(&mut self, id: &ControllerId) {
        let Some(slot) = self.controllers.get_mut(id) else {
            return;
        };
        if slot.is(ControllerFlags::ATTACHED) {
            slot.set(ControllerFlags::NEEDS_ATTACH, true);
        }
        for router in slot.child_routers.clone() {
            self.prepare_router_for_host_detach(router);
        }
    }

    /// Drop the view reference, saving its state first unless destroying.
    pub(crate) fn remove_view_reference(&mut self, id: &ControllerId) {
        let Some(slot) = self.controllers.get(id) else {
            return;
        };
        let being_destroyed = slot.is(ControllerFlags::BEING_DESTROYED);
        if let Some(view) = slot.view {
            if !being_destroyed && !slot.is(ControllerFlags::HAS_SAVED_VIEW_STATE) {
                self.save_view_state(id, view);
            }
            self.notify(id, LifecycleEvent::PreDestroyView { view });
            self.hook(id, |c, cx| c.on_destroy_view(cx, view));

            let parented = self.host.parent(view).is_some();
            if let Some(slot) = self.controllers.get_mut(id) {
                slot.view = None;
                slot.tracker = AttachTracker::default();
                slot.set(ControllerFlags::ATTACHED, false);
                slot.advance(LifecycleState::ViewDestroyed);
                if being_destroyed && parented {
                    // Still on screen for the exit transition.
                    slot.destroyed_view = Some(view);
                }
            }
            if !(being_destroyed && parented) {
                self.release_view(view);
            }
            self.notify(id, LifecycleEvent::PostDestroyView);

            for router in self.child_routers_of(id) {
                self.router_remove_host(router);
            }
        }
        if being_destroyed {
            self.perform_destroy(id);
        }
    }

    // ========================================================================
    // Destruction
    // ========================================================================

    /// Begin destroying the controller and its child routers.
    pub(crate) fn destroy(&mut self, id: &ControllerId, remove_views: bool) {
        let Some(slot) = self.controllers.get_mut(id) else {
            return;
        };
        slot.set(ControllerFlags::BEING_DESTROYED, true);
        let attached = slot.is(ControllerFlags::ATTACHED);
        for router in slot.child_routers.clone() {
            self.router_destroy(router, false);
        }
        if !attached {
            self.remove_view_reference(id);
        } else if remove_views {
            self.detach(id, true, false);
        }
    }

    fn perform_destroy(&mut self, id: &ControllerId) {
        self.context_unavailable(id);
        if self.has_flag(id, ControllerFlags::DESTROYED) {
            return;
        }
        self.notify(id, LifecycleEvent::PreDestroy);
        if let Some(slot) = self.controllers.get_mut(id) {
            slot.set(ControllerFlags::DESTROYED, true);
            slot.advance(LifecycleState::Destroyed);
        }
        self.with_controller(id, |c, cx| c.on_destroy(cx));
        tracing::trace!(target: "ftui.nav", controller = %id, "destroyed");
        self.notify(id, LifecycleEvent::PostDestroy);

        let router = self.controllers.get(id).and_then(|slot| slot.router);
        if let Some(router) = router
            && let Some(slot) = self.routers.get_mut(&router)
        {
            slot.destroying.retain(|c| c != id);
        }
    }

    // ========================================================================
    // Transition participation
    // ========================================================================

    pub(crate) fn change_started(
        &mut self,
        id: &ControllerId,
        handler: &dyn ChangeHandler,
        change: ChangeType,
    ) {
        if !change.is_enter() {
            self.set_flag(id, ControllerFlags::PERFORMING_EXIT, true);
            for router in self.child_routers_of(id) {
                self.set_router_detach_frozen(router, true);
            }
        }
        if self.has_flag(id, ControllerFlags::DESTROYED) {
            return;
        }
        self.with_controller(id, |c, cx| c.on_change_started(cx, handler, change));
        self.notify(
            id,
            LifecycleEvent::ChangeStart {
                handler: handler.type_tag().to_owned(),
                change,
            },
        );
    }

    pub(crate) fn change_ended(
        &mut self,
        id: &ControllerId,
        handler: &dyn ChangeHandler,
        change: ChangeType,
    ) {
        if !change.is_enter() {
            self.set_flag(id, ControllerFlags::PERFORMING_EXIT, false);
            for router in self.child_routers_of(id) {
                self.set_router_detach_frozen(router, false);
            }
        }
        if !self.has_flag(id, ControllerFlags::DESTROYED) {
            self.with_controller(id, |c, cx| c.on_change_ended(cx, handler, change));
            self.notify(
                id,
                LifecycleEvent::ChangeEnd {
                    handler: handler.type_tag().to_owned(),
                    change,
                },
            );
        }

        let leftover = self.controllers.get_mut(id).and_then(|slot| {
            if slot.is(ControllerFlags::BEING_DESTROYED) && !slot.is(ControllerFlags::ATTACHED) {
                slot.destroyed_view.take()
            } else {
                None
            }
        });
        if let Some(view) = leftover {
            self.release_view(view);
        }
    }

    pub(crate) fn set_detach_frozen(&mut self, id: &ControllerId, frozen: bool) {
        let Some(slot) = self.controllers.get_mut(id) else {
            return;
        };
        if slot.is(ControllerFlags::DETACH_FROZEN) == frozen {
            return;
        }
        slot.set(ControllerFlags::DETACH_FROZEN, frozen);
        let replay = !frozen && slot.view.is_some() && slot.is(ControllerFlags::VIEW_WAS_DETACHED);
        for router in slot.child_routers.clone() {
            self.set_router_detach_frozen(router, frozen);
        }
        if replay {
            self.detach(id, false, false);
        }
    }

    // ========================================================================
    // Retain mode
    // ========================================================================

    /// Release the view now if the controller is detached and no longer
    /// retains it.
    pub(crate) fn apply_retain_mode(&mut self, id: &ControllerId, mode: RetainViewMode) {
        let Some(slot) = self.controllers.get_mut(id) else {
            return;
        };
        slot.retain_mode = mode;
        if mode == RetainViewMode::ReleaseOnDetach
            && !slot.is(ControllerFlags::ATTACHED)
            && slot.view.is_some()
        {
            self.remove_view_reference(id);
        }
    }
}
