#![forbid(unsafe_code)]

//! Executing one controller change against a router's container.
//!
//! ```text
//! perform_controller_change
//!   ├─ index + bind "to" to the router
//!   ├─ hostless? ── bookkeeping only (needs_attach)
//!   ├─ interrupt the live handler (abort push / complete pop)
//!   ├─ inflate "to", change_started(to, from)
//!   ├─ handler.perform_change ── completed? ──▶ finish_change
//!   └─ otherwise park as the router's in-flight change; tick() drives it
//! ```
//!
//! # Invariants
//!
//! - At most one in-flight change per router.
//! - [`finish_change`](Navigator::finish_change) runs exactly once per
//!   handler instance, whether the handler completed on its own, after an
//!   interruption, or was force-finalized.

use std::rc::Rc;

use web_time::{Duration, Instant};

use crate::attach::AttachSignal;
use crate::change::{
    ChangeContext, ChangeHandler, ChangeInfo, ChangeType, NoOpChangeHandler,
    SimpleSwapChangeHandler,
};
use crate::controller::{ControllerFlags, ControllerId};
use crate::entry::NavigationEntry;
use crate::error::{NavError, Result};
use crate::navigator::Navigator;
use crate::router::{ChangeEvent, ChangeListener, RouterId};

/// Passes over the tree before reconciliation gives up on settling.
const MAX_RECONCILE_PASSES: usize = 8;

/// How a live handler is treated when a new change targets its container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Interrupt {
    /// A live push gets `on_abort_push`; a live pop completes immediately.
    Abort,
    /// The live handler completes immediately either way.
    Complete,
}

/// A change waiting to run.
pub(crate) struct PendingChange {
    pub router: RouterId,
    pub to: Option<ControllerId>,
    pub from: Option<ControllerId>,
    pub is_push: bool,
    pub handler: Option<Box<dyn ChangeHandler>>,
    pub force_remove_from: bool,
    pub interrupt: Interrupt,
}

impl PendingChange {
    pub(crate) fn push(
        router: RouterId,
        to: Option<ControllerId>,
        from: Option<ControllerId>,
        handler: Option<Box<dyn ChangeHandler>>,
    ) -> Self {
        Self {
            router,
            to,
            from,
            is_push: true,
            handler,
            force_remove_from: false,
            interrupt: Interrupt::Abort,
        }
    }

    pub(crate) fn pop(
        router: RouterId,
        to: Option<ControllerId>,
        from: Option<ControllerId>,
        handler: Option<Box<dyn ChangeHandler>>,
    ) -> Self {
        Self {
            is_push: false,
            ..Self::push(router, to, from, handler)
        }
    }

    pub(crate) fn force_remove(mut self) -> Self {
        self.force_remove_from = true;
        self
    }

    pub(crate) fn interrupting(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }
}

/// A change whose handler has not completed yet.
pub(crate) struct InFlightChange {
    pub handler: Box<dyn ChangeHandler>,
    pub info: ChangeInfo,
    pub event: ChangeEvent,
    pub listeners: Vec<Rc<dyn ChangeListener>>,
    pub force_remove_from: bool,
    pub started: Instant,
}

impl Navigator {
    // ========================================================================
    // Handler resolution
    // ========================================================================

    /// Push handler for `entry`: controller override, then the entry's
    /// template. `None` means the default instant swap.
    pub(crate) fn resolve_push_handler(
        &self,
        entry: &NavigationEntry,
    ) -> Option<Box<dyn ChangeHandler>> {
        self.controllers
            .get(entry.controller())
            .and_then(|slot| slot.push_override.as_deref())
            .or(entry.push_handler())
            .map(|handler| handler.copy())
    }

    pub(crate) fn resolve_pop_handler(
        &self,
        entry: &NavigationEntry,
    ) -> Option<Box<dyn ChangeHandler>> {
        self.controllers
            .get(entry.controller())
            .and_then(|slot| slot.pop_override.as_deref())
            .or(entry.pop_handler())
            .map(|handler| handler.copy())
    }

    /// Whether pushing `entry` hides whatever sits beneath it.
    pub(crate) fn push_removes_views(&self, entry: &NavigationEntry) -> bool {
        self.controllers
            .get(entry.controller())
            .and_then(|slot| slot.push_override.as_deref())
            .or(entry.push_handler())
            .is_none_or(|handler| handler.removes_from_view_on_push())
    }

    // ========================================================================
    // Execution
    // ========================================================================

    pub(crate) fn perform_controller_change(&mut self, change: PendingChange) -> Result<()> {
        let mut change = change;
        let router = change.router;
        let mut force_detach_from = false;

        if let Some(to) = change.to.clone() {
            self.with_indexer(router, |indexer, backstack| {
                if let Some(entry) = backstack.get_mut(&to) {
                    entry.ensure_valid_index(indexer);
                }
            });
            self.set_controller_router(&to, router);
        } else if let Some(slot) = self.routers.get(&router)
            && slot.backstack.is_empty()
            && !slot.pops_last_view
        {
            change.handler = Some(Box::new(NoOpChangeHandler));
            force_detach_from = true;
        }

        let from = change.from.clone();
        self.execute_change(change)?;

        if force_detach_from
            && let Some(from) = from
            && self.controllers.get(&from).is_some_and(|slot| slot.view.is_some())
        {
            self.detach(&from, true, false);
        }
        Ok(())
    }

    fn execute_change(&mut self, change: PendingChange) -> Result<()> {
        let PendingChange {
            router,
            to,
            from,
            is_push,
            handler,
            force_remove_from,
            interrupt,
        } = change;

        if is_push
            && let Some(to) = &to
            && self.has_flag(to, ControllerFlags::DESTROYED)
        {
            return Err(NavError::ControllerDestroyed {
                controller: to.clone(),
            });
        }

        let handler: Box<dyn ChangeHandler> =
            handler.unwrap_or_else(|| Box::new(SimpleSwapChangeHandler::default()));

        let Some(container) = self.routers.get(&router).and_then(|slot| slot.container) else {
            // Hostless: record what should show once a container returns.
            if let Some(to) = &to {
                self.set_flag(to, ControllerFlags::NEEDS_ATTACH, true);
            }
            if let Some(from) = &from
                && (!is_push || handler.removes_from_view_on_push())
            {
                self.set_flag(from, ControllerFlags::NEEDS_ATTACH, false);
            }
            tracing::trace!(
                target: "ftui.nav",
                router = %router,
                is_push,
                "router has no container; change recorded for rebind"
            );
            return Ok(());
        };

        self.interrupt_in_flight(router, interrupt, handler.as_ref(), to.as_ref());

        let span = tracing::debug_span!(
            target: "ftui.nav",
            "nav.change",
            router = %router,
            is_push,
            handler = handler.type_tag(),
            from = from.as_ref().map(ControllerId::as_str),
            to = to.as_ref().map(ControllerId::as_str),
        );
        let _guard = span.enter();

        let to_view = match &to {
            Some(to_id) => match self.inflate(to_id, container) {
                Ok(view) => Some(view),
                Err(err) => {
                    if is_push {
                        self.abandon_push(router, to_id);
                    }
                    return Err(err);
                }
            },
            None => None,
        };

        let event = ChangeEvent {
            router,
            from: from.clone(),
            to: to.clone(),
            is_push,
            handler: handler.type_tag().to_owned(),
        };
        let listeners: Vec<Rc<dyn ChangeListener>> = self
            .routers
            .get(&router)
            .map(|slot| {
                slot.change_listeners
                    .iter()
                    .map(|(_, listener)| Rc::clone(listener))
                    .collect()
            })
            .unwrap_or_default();
        for listener in &listeners {
            listener.on_change_started(&mut self.commands, &event);
        }

        if let Some(to) = &to {
            self.change_started(to, handler.as_ref(), ChangeType::enter(is_push));
        }
        let from_view = from
            .as_ref()
            .and_then(|from| self.controllers.get(from))
            .and_then(|slot| slot.view);
        if let Some(from) = &from {
            self.change_started(from, handler.as_ref(), ChangeType::exit(is_push));
        }

        let info = ChangeInfo {
            container,
            from: from_view,
            to: to_view,
            from_controller: from,
            to_controller: to,
            is_push,
            default_duration: self.config.default_animation_duration(),
        };
        let mut in_flight = InFlightChange {
            handler,
            info,
            event,
            listeners,
            force_remove_from,
            started: Instant::now(),
        };
        let completed = {
            let mut cx = ChangeContext::new(self.host.as_mut(), &in_flight.info);
            in_flight.handler.perform_change(&mut cx);
            cx.is_completed()
        };
        self.reconcile();

        if completed {
            self.finish_change(in_flight);
        } else if let Some(slot) = self.routers.get_mut(&router) {
            tracing::debug!(target: "ftui.nav", router = %router, "change in flight");
            slot.in_flight = Some(in_flight);
        } else {
            self.finish_change(in_flight);
        }
        Ok(())
    }

    /// Undo a push whose view could not be built: the entry leaves the stack
    /// and its controller is destroyed, so listeners never see the change.
    fn abandon_push(&mut self, router: RouterId, to: &ControllerId) {
        if let Some(slot) = self.routers.get_mut(&router) {
            slot.backstack.remove(to);
        }
        tracing::debug!(target: "ftui.nav", router = %router, controller = %to, "push abandoned");
        self.destroy(to, false);
    }

    /// Completion bookkeeping for a handler that reported done.
    pub(crate) fn finish_change(&mut self, change: InFlightChange) {
        let InFlightChange {
            handler,
            info,
            event,
            listeners,
            force_remove_from,
            started,
        } = change;

        if let Some(from) = &info.from_controller {
            self.change_ended(from, handler.as_ref(), ChangeType::exit(info.is_push));
        }
        if let Some(to) = &info.to_controller {
            self.change_ended(to, handler.as_ref(), ChangeType::enter(info.is_push));
        }
        for listener in &listeners {
            listener.on_change_completed(&mut self.commands, &event);
        }

        if force_remove_from
            && let Some(view) = info.from
            && let Some(parent) = self.host.parent(view)
        {
            self.host.remove_child(parent, view);
        }
        if handler.removes_from_view_on_push()
            && let Some(from) = &info.from_controller
        {
            self.set_flag(from, ControllerFlags::NEEDS_ATTACH, false);
        }

        tracing::debug!(
            target: "ftui.nav",
            router = %event.router,
            handler = handler.type_tag(),
            is_push = info.is_push,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "change completed"
        );
        self.reconcile();
    }

    fn interrupt_in_flight(
        &mut self,
        router: RouterId,
        interrupt: Interrupt,
        new_handler: &dyn ChangeHandler,
        new_top: Option<&ControllerId>,
    ) {
        let Some(mut change) = self.routers.get_mut(&router).and_then(|s| s.in_flight.take())
        else {
            return;
        };
        let completed = {
            let mut cx = ChangeContext::new(self.host.as_mut(), &change.info);
            if interrupt == Interrupt::Abort && change.info.is_push {
                change.handler.on_abort_push(new_handler, new_top, &mut cx);
            } else {
                change.handler.complete_immediately(&mut cx);
            }
            cx.is_completed()
        };
        if !completed {
            tracing::warn!(
                target: "ftui.nav",
                router = %router,
                handler = change.handler.type_tag(),
                "interrupted change handler did not complete; finalizing anyway"
            );
        }
        self.finish_change(change);
    }

    /// Complete the router's in-flight change now. Returns the controller it
    /// was bringing in, if any.
    pub(crate) fn complete_in_flight(&mut self, router: RouterId) -> Option<Option<ControllerId>> {
        let Some(mut change) = self.routers.get_mut(&router).and_then(|s| s.in_flight.take())
        else {
            return None;
        };
        let completed = {
            let mut cx = ChangeContext::new(self.host.as_mut(), &change.info);
            change.handler.complete_immediately(&mut cx);
            cx.is_completed()
        };
        if !completed {
            tracing::warn!(
                target: "ftui.nav",
                router = %router,
                handler = change.handler.type_tag(),
                "change handler ignored immediate completion; finalizing anyway"
            );
        }
        let to = change.info.to_controller.clone();
        self.finish_change(change);
        Some(to)
    }

    /// Advance every in-flight handler by `dt`.
    pub(crate) fn poll_in_flight(&mut self, dt: Duration) {
        let mut routers: Vec<RouterId> = self
            .routers
            .iter()
            .filter(|(_, slot)| slot.in_flight.is_some())
            .map(|(id, _)| *id)
            .collect();
        routers.sort_unstable();
        for router in routers {
            let Some(mut change) = self.routers.get_mut(&router).and_then(|s| s.in_flight.take())
            else {
                continue;
            };
            let completed = {
                let mut cx = ChangeContext::new(self.host.as_mut(), &change.info);
                change.handler.on_frame(dt, &mut cx);
                cx.is_completed()
            };
            if completed {
                self.finish_change(change);
            } else if let Some(slot) = self.routers.get_mut(&router)
                && slot.in_flight.is_none()
            {
                slot.in_flight = Some(change);
            } else {
                self.finish_change(change);
            }
        }
        self.reconcile();
    }

    // ========================================================================
    // Attach reconciliation
    // ========================================================================

    /// Compare every tracked view's window membership with what its
    /// controller last saw and deliver the resulting signals: detaches
    /// first, then attaches, parents before children.
    pub(crate) fn reconcile(&mut self) {
        if self.reconciling {
            self.reconcile_again = true;
            return;
        }
        self.reconciling = true;
        for _ in 0..MAX_RECONCILE_PASSES {
            self.reconcile_again = false;
            let order = self.tree_order();
            for id in &order {
                if let Some(signal) = self.observe_window(id, false) {
                    self.apply_attach_signal(id, signal);
                }
            }
            for id in &order {
                if let Some(signal) = self.observe_window(id, true) {
                    self.apply_attach_signal(id, signal);
                }
            }
            if !self.reconcile_again {
                break;
            }
        }
        self.reconciling = false;
    }

    fn observe_window(
        &mut self,
        id: &ControllerId,
        attaching: bool,
    ) -> Option<AttachSignal> {
        let view = self.controllers.get(id)?.view?;
        let in_window = self.host.is_in_window(view);
        let tracker = &mut self.controllers.get_mut(id)?.tracker;
        match (attaching, in_window, tracker.in_window()) {
            (true, true, false) => tracker.view_attached(),
            (false, false, true) => tracker.view_detached(),
            _ => None,
        }
    }
}
