#![forbid(unsafe_code)]

//! Routers: one backstack bound to one container.
//!
//! A router orchestrates push, pop, and bulk replacement of its backstack,
//! picks the transition handler for each change, and makes sure only one
//! handler is live in its container at a time.
//!
//! ```text
//!               attach_router / child_router
//!   Hostless ─────────────────────────────────▶ Hosted
//!      ▲  ▲                                        │
//!      │  └──── container lost (host destroyed ────┘
//!      │        for a configuration change, view released)
//!      │
//!      └──────────▶ Destroyed (entries popped and destroyed; terminal)
//! ```
//!
//! Routers live in the [`Navigator`]; [`Router`] is a short-lived handle
//! obtained with [`Navigator::router`]. Every operation on the handle is a
//! complete navigator operation: queued commands are drained and destroyed
//! controllers are swept before it returns.
//!
//! # Invariants
//!
//! - A controller is on at most one backstack.
//! - Order indices along a backstack increase from bottom to top after
//!   [`set_backstack`](Router::set_backstack).
//! - Popped controllers are destroyed before the operation returns, or kept
//!   on the router's destroying list until their exit transition releases
//!   their view.
//!
//! # Failure Modes
//!
//! - Operating on a destroyed router returns [`NavError::RouterDestroyed`].
//! - Commands queued for a router that is destroyed before they run are
//!   dropped with a warning.

use std::fmt;
use std::rc::Rc;

use crate::backstack::Backstack;
use crate::change::{ChangeHandler, SimpleSwapChangeHandler};
use crate::command::CommandQueue;
use crate::controller::{ControllerFlags, ControllerId, ListenerId};
use crate::entry::NavigationEntry;
use crate::error::{NavError, Result};
use crate::indexer::TransactionIndexer;
use crate::navigator::Navigator;
use crate::transition::{InFlightChange, Interrupt, PendingChange};
use crate::view::NodeId;

// ============================================================================
// Identity and listeners
// ============================================================================

/// Navigator-scoped router handle id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RouterId(pub u64);

impl fmt::Display for RouterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "router#{}", self.0)
    }
}

/// One change as seen by router-level listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub router: RouterId,
    pub from: Option<ControllerId>,
    pub to: Option<ControllerId>,
    pub is_push: bool,
    pub handler: String,
}

/// Observer of every change a router runs.
///
/// Listeners are snapshotted when a change starts; the same snapshot
/// receives the completion. Navigation requested from a listener goes
/// through `commands` and runs once the current operation settles.
pub trait ChangeListener {
    fn on_change_started(&self, _commands: &mut CommandQueue, _event: &ChangeEvent) {}

    fn on_change_completed(&self, _commands: &mut CommandQueue, _event: &ChangeEvent) {}
}

// ============================================================================
// Slot
// ============================================================================

pub(crate) struct RouterSlot {
    pub backstack: Backstack,
    pub container: Option<NodeId>,
    pub host_key: Option<String>,
    pub tag: Option<String>,
    /// Hosting controller; `None` for root routers.
    pub parent: Option<ControllerId>,
    /// Root routers own the indexer shared by their whole tree.
    pub indexer: Option<TransactionIndexer>,
    pub pops_last_view: bool,
    /// Popped controllers whose destruction has not finished.
    pub destroying: Vec<ControllerId>,
    pub in_flight: Option<InFlightChange>,
    pub change_listeners: Vec<(ListenerId, Rc<dyn ChangeListener>)>,
    pub destroyed: bool,
}

impl fmt::Debug for RouterSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterSlot")
            .field("backstack", &self.backstack.controllers())
            .field("container", &self.container)
            .field("host_key", &self.host_key)
            .field("parent", &self.parent)
            .field("in_flight", &self.in_flight.is_some())
            .field("destroyed", &self.destroyed)
            .finish_non_exhaustive()
    }
}

impl RouterSlot {
    pub(crate) fn new(parent: Option<ControllerId>, pops_last_view: bool) -> Self {
        Self {
            backstack: Backstack::new(),
            container: None,
            host_key: None,
            tag: None,
            indexer: parent.is_none().then(TransactionIndexer::new),
            parent,
            pops_last_view,
            destroying: Vec::new(),
            in_flight: None,
            change_listeners: Vec::new(),
            destroyed: false,
        }
    }
}

// ============================================================================
// Public handle
// ============================================================================

/// Borrowed handle to one router.
pub struct Router<'a> {
    nav: &'a mut Navigator,
    id: RouterId,
}

impl fmt::Debug for Router<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("id", &self.id)
            .field("slot", &self.nav.routers.get(&self.id))
            .finish()
    }
}

impl<'a> Router<'a> {
    pub(crate) fn new(nav: &'a mut Navigator, id: RouterId) -> Self {
        Self { nav, id }
    }

    #[must_use]
    pub fn id(&self) -> RouterId {
        self.id
    }

    /// Replace the whole stack with `entry`, animating with its push handler.
    pub fn set_root(&mut self, entry: NavigationEntry) -> Result<()> {
        let id = self.id;
        self.nav.operation(|nav| nav.router_set_root(id, entry))
    }

    pub fn push_controller(&mut self, entry: NavigationEntry) -> Result<()> {
        let id = self.id;
        self.nav.operation(|nav| nav.router_push(id, entry))
    }

    /// Pop and destroy the top, then push `entry` in its place.
    pub fn replace_top_controller(&mut self, entry: NavigationEntry) -> Result<()> {
        let id = self.id;
        self.nav.operation(|nav| nav.router_replace_top(id, entry))
    }

    /// Pop the top controller. Returns whether a controller remains on top
    /// (always `true` when the router pops its last view).
    pub fn pop_current_controller(&mut self) -> Result<bool> {
        let id = self.id;
        self.nav.operation(|nav| nav.router_pop_current(id))
    }

    pub fn pop_controller(&mut self, controller: &ControllerId) -> Result<bool> {
        let id = self.id;
        self.nav.operation(|nav| nav.router_pop(id, controller))
    }

    /// Pop everything above the entry tagged `tag`. Returns `false` when no
    /// entry carries the tag.
    pub fn pop_to_tag(&mut self, tag: &str) -> Result<bool> {
        let id = self.id;
        self.nav.operation(|nav| nav.router_pop_to_tag(id, tag, None))
    }

    pub fn pop_to_tag_with(
        &mut self,
        tag: &str,
        handler: impl ChangeHandler + 'static,
    ) -> Result<bool> {
        let id = self.id;
        self.nav
            .operation(|nav| nav.router_pop_to_tag(id, tag, Some(Box::new(handler))))
    }

    /// Pop down to the root entry. Returns `false` if there was nothing
    /// above it.
    pub fn pop_to_root(&mut self) -> Result<bool> {
        let id = self.id;
        self.nav.operation(|nav| nav.router_pop_to_root(id, None))
    }

    pub fn pop_to_root_with(&mut self, handler: impl ChangeHandler + 'static) -> Result<bool> {
        let id = self.id;
        self.nav
            .operation(|nav| nav.router_pop_to_root(id, Some(Box::new(handler))))
    }

    /// Replace the stack with `entries` (bottom to top), running the fewest
    /// transitions that take the visible controllers from old to new.
    pub fn set_backstack(
        &mut self,
        entries: Vec<NavigationEntry>,
        handler: Option<Box<dyn ChangeHandler>>,
    ) -> Result<()> {
        let id = self.id;
        self.nav
            .operation(|nav| nav.router_set_backstack(id, entries, handler))
    }

    /// Offer a back press to the tree rooted at this router.
    pub fn handle_back(&mut self) -> Result<bool> {
        let id = self.id;
        self.nav.operation(|nav| nav.router_handle_back(id))
    }

    /// Re-show controllers recorded while the router had no container.
    pub fn rebind_if_needed(&mut self) -> Result<()> {
        let id = self.id;
        self.nav.operation(|nav| nav.router_rebind(id))
    }

    pub fn set_pops_last_view(&mut self, pops_last_view: bool) -> Result<()> {
        let slot = self.nav.live_router_mut(self.id)?;
        slot.pops_last_view = pops_last_view;
        Ok(())
    }

    pub fn add_change_listener(
        &mut self,
        listener: impl ChangeListener + 'static,
    ) -> Result<ListenerId> {
        let listener_id = self.nav.next_listener_id();
        let slot = self.nav.live_router_mut(self.id)?;
        slot.change_listeners.push((listener_id, Rc::new(listener)));
        Ok(listener_id)
    }

    pub fn remove_change_listener(&mut self, listener: ListenerId) {
        if let Some(slot) = self.nav.routers.get_mut(&self.id) {
            slot.change_listeners.retain(|(id, _)| *id != listener);
        }
    }

    #[must_use]
    pub fn backstack(&self) -> Option<&Backstack> {
        self.nav.backstack(self.id)
    }

    #[must_use]
    pub fn backstack_size(&self) -> usize {
        self.backstack().map_or(0, Backstack::len)
    }

    #[must_use]
    pub fn has_root_controller(&self) -> bool {
        self.backstack_size() > 0
    }

    /// Controller ids bottom to top.
    #[must_use]
    pub fn controllers(&self) -> Vec<ControllerId> {
        self.backstack().map(Backstack::controllers).unwrap_or_default()
    }

    #[must_use]
    pub fn top_controller(&self) -> Option<ControllerId> {
        self.backstack()
            .and_then(Backstack::peek)
            .map(|entry| entry.controller().clone())
    }

    #[must_use]
    pub fn controller_with_tag(&self, tag: &str) -> Option<ControllerId> {
        self.backstack()?
            .iter()
            .find(|entry| entry.tag() == Some(tag))
            .map(|entry| entry.controller().clone())
    }

    #[must_use]
    pub fn container(&self) -> Option<NodeId> {
        self.nav.routers.get(&self.id).and_then(|slot| slot.container)
    }

    #[must_use]
    pub fn pops_last_view(&self) -> bool {
        self.nav
            .routers
            .get(&self.id)
            .is_some_and(|slot| slot.pops_last_view)
    }

    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.nav
            .routers
            .get(&self.id)
            .is_none_or(|slot| slot.destroyed)
    }

    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        self.nav.routers.get(&self.id).and_then(|slot| slot.tag.as_deref())
    }

    /// Controller hosting this router, `None` for root routers.
    #[must_use]
    pub fn parent_controller(&self) -> Option<&ControllerId> {
        self.nav
            .routers
            .get(&self.id)
            .and_then(|slot| slot.parent.as_ref())
    }

    /// Whether a change is still running in this router's container.
    #[must_use]
    pub fn is_changing(&self) -> bool {
        self.nav
            .routers
            .get(&self.id)
            .is_some_and(|slot| slot.in_flight.is_some())
    }
}

// ============================================================================
// Router operations
// ============================================================================

impl Navigator {
    pub(crate) fn live_router(&self, id: RouterId) -> Result<&RouterSlot> {
        let slot = self
            .routers
            .get(&id)
            .ok_or(NavError::UnknownRouter { router: id })?;
        if slot.destroyed {
            return Err(NavError::RouterDestroyed { router: id });
        }
        Ok(slot)
    }

    pub(crate) fn live_router_mut(&mut self, id: RouterId) -> Result<&mut RouterSlot> {
        let slot = self
            .routers
            .get_mut(&id)
            .ok_or(NavError::UnknownRouter { router: id })?;
        if slot.destroyed {
            return Err(NavError::RouterDestroyed { router: id });
        }
        Ok(slot)
    }

    /// The root router of `router`'s tree, if the chain of hosts is intact.
    pub(crate) fn root_router_of(&self, router: RouterId) -> Option<RouterId> {
        let mut current = router;
        for _ in 0..=self.routers.len() {
            let slot = self.routers.get(&current)?;
            match &slot.parent {
                None => return Some(current),
                Some(parent) => current = self.controllers.get(parent)?.router?,
            }
        }
        None
    }

    /// Run `f` with the tree's indexer and `router`'s backstack.
    pub(crate) fn with_indexer<R>(
        &mut self,
        router: RouterId,
        f: impl FnOnce(&mut TransactionIndexer, &mut Backstack) -> R,
    ) -> Option<R> {
        let root = self.root_router_of(router);
        let mut indexer = match root.and_then(|r| self.routers.get_mut(&r)) {
            Some(slot) => slot.indexer.take().unwrap_or_default(),
            None => std::mem::take(&mut self.orphan_indexer),
        };
        let result = self
            .routers
            .get_mut(&router)
            .map(|slot| f(&mut indexer, &mut slot.backstack));
        match root.and_then(|r| self.routers.get_mut(&r)) {
            Some(slot) => slot.indexer = Some(indexer),
            None => self.orphan_indexer = indexer,
        }
        result
    }

    /// Reject entries whose controller cannot join `router`.
    fn check_pushable(&self, controller: &ControllerId) -> Result<()> {
        let slot = self
            .controllers
            .get(controller)
            .ok_or_else(|| NavError::UnknownController {
                controller: controller.clone(),
            })?;
        if slot.is(ControllerFlags::DESTROYED) || slot.is(ControllerFlags::BEING_DESTROYED) {
            return Err(NavError::ControllerDestroyed {
                controller: controller.clone(),
            });
        }
        if self
            .routers
            .values()
            .any(|r| !r.destroyed && r.backstack.contains(controller))
        {
            return Err(NavError::DuplicateController {
                controller: controller.clone(),
            });
        }
        Ok(())
    }

    /// Entries currently on screen, bottom-most visible first.
    fn visible_controllers(&self, router: RouterId) -> Vec<ControllerId> {
        let Some(slot) = self.routers.get(&router) else {
            return Vec::new();
        };
        let mut visible = Vec::new();
        for entry in slot.backstack.iter() {
            visible.push(entry.controller().clone());
            if self.push_removes_views(entry) {
                break;
            }
        }
        visible.reverse();
        visible
    }

    /// Mark `controller` as leaving `router` and start destroying it.
    fn track_destroying(&mut self, router: RouterId, controller: &ControllerId) {
        if self.has_flag(controller, ControllerFlags::DESTROYED) {
            return;
        }
        if let Some(slot) = self.routers.get_mut(&router)
            && !slot.destroying.contains(controller)
        {
            slot.destroying.push(controller.clone());
        }
        self.destroy(controller, false);
    }

    // ------------------------------------------------------------------------
    // Push / replace
    // ------------------------------------------------------------------------

    pub(crate) fn router_set_root(&mut self, router: RouterId, entry: NavigationEntry) -> Result<()> {
        let handler = self.resolve_push_handler(&entry);
        self.router_set_backstack(router, vec![entry], handler)
    }

    pub(crate) fn router_push(&mut self, router: RouterId, entry: NavigationEntry) -> Result<()> {
        self.live_router(router)?;
        let to = entry.controller().clone();
        self.check_pushable(&to)?;
        let handler = self.resolve_push_handler(&entry);

        let slot = self.live_router_mut(router)?;
        let from = slot.backstack.peek().map(|e| e.controller().clone());
        slot.backstack.push(entry);
        tracing::debug!(target: "ftui.nav", router = %router, controller = %to, "push");
        self.perform_controller_change(PendingChange::push(router, Some(to), from, handler))
    }

    pub(crate) fn router_replace_top(
        &mut self,
        router: RouterId,
        entry: NavigationEntry,
    ) -> Result<()> {
        self.live_router(router)?;
        let to = entry.controller().clone();
        self.check_pushable(&to)?;
        let handler = self.resolve_push_handler(&entry);
        let new_removes = handler
            .as_ref()
            .is_none_or(|h| h.removes_from_view_on_push());

        let old_top = self.live_router_mut(router)?.backstack.pop();
        let from = old_top.as_ref().map(|e| e.controller().clone());
        if let Some(old_top) = &old_top {
            let old_removed = self.push_removes_views(old_top);
            self.track_destroying(router, old_top.controller());
            if !old_removed && new_removes {
                for visible in self.visible_controllers(router) {
                    let local = handler.as_ref().map(|h| h.copy());
                    self.perform_controller_change(
                        PendingChange::push(router, None, Some(visible), local)
                            .force_remove()
                            .interrupting(Interrupt::Complete),
                    )?;
                }
            }
        }

        self.live_router_mut(router)?.backstack.push(entry);
        tracing::debug!(target: "ftui.nav", router = %router, controller = %to, "replace top");
        self.perform_controller_change(
            PendingChange::push(router, Some(to), from, handler).force_remove(),
        )
    }

    // ------------------------------------------------------------------------
    // Pop
    // ------------------------------------------------------------------------

    pub(crate) fn router_pop_current(&mut self, router: RouterId) -> Result<bool> {
        let top = self
            .live_router(router)?
            .backstack
            .peek()
            .map(|e| e.controller().clone())
            .ok_or(NavError::EmptyBackstack { router })?;
        self.router_pop(router, &top)
    }

    pub(crate) fn router_pop(&mut self, router: RouterId, controller: &ControllerId) -> Result<bool> {
        let slot = self.live_router(router)?;
        if !slot.backstack.contains(controller) {
            return Err(NavError::NotOnStack {
                controller: controller.clone(),
            });
        }
        let top = slot.backstack.peek();
        let popping_top = top.is_some_and(|e| e.controller() == controller);
        let needs_next_attach = top.is_some_and(|top| {
            self.controllers
                .get(top.controller())
                .and_then(|s| s.push_override.as_deref())
                .or(top.push_handler())
                .is_some_and(|h| !h.removes_from_view_on_push())
        });

        let next = if popping_top {
            None
        } else {
            // The entry just beneath the removed one, if it is hidden and
            // about to be revealed.
            let below = slot
                .backstack
                .iter()
                .skip_while(|e| e.controller() != controller)
                .nth(1)
                .map(|e| e.controller().clone());
            below.filter(|c| needs_next_attach && !self.has_flag(c, ControllerFlags::ATTACHED))
        };

        let slot = self.live_router_mut(router)?;
        let Some(removed) = slot.backstack.remove(controller) else {
            return Err(NavError::NotOnStack {
                controller: controller.clone(),
            });
        };
        let to = if popping_top {
            slot.backstack.peek().map(|e| e.controller().clone())
        } else {
            next
        };
        let handler = self.resolve_pop_handler(&removed);
        tracing::debug!(target: "ftui.nav", router = %router, controller = %controller, "pop");
        self.track_destroying(router, controller);
        self.perform_controller_change(PendingChange::pop(
            router,
            to,
            Some(controller.clone()),
            handler,
        ))?;

        let slot = self.live_router(router)?;
        Ok(if slot.pops_last_view {
            true
        } else {
            !slot.backstack.is_empty()
        })
    }

    pub(crate) fn router_pop_to_tag(
        &mut self,
        router: RouterId,
        tag: &str,
        handler: Option<Box<dyn ChangeHandler>>,
    ) -> Result<bool> {
        let target = self
            .live_router(router)?
            .backstack
            .iter()
            .find(|e| e.tag() == Some(tag))
            .map(|e| e.controller().clone());
        let Some(target) = target else {
            return Ok(false);
        };
        self.router_pop_to(router, &target, handler)?;
        Ok(true)
    }

    pub(crate) fn router_pop_to_root(
        &mut self,
        router: RouterId,
        handler: Option<Box<dyn ChangeHandler>>,
    ) -> Result<bool> {
        let slot = self.live_router(router)?;
        if slot.backstack.len() <= 1 {
            return Ok(false);
        }
        let Some(root) = slot.backstack.root().map(|e| e.controller().clone()) else {
            return Ok(false);
        };
        self.router_pop_to(router, &root, handler)?;
        Ok(true)
    }

    /// Pop every entry above `target` through a bulk replace.
    pub(crate) fn router_pop_to(
        &mut self,
        router: RouterId,
        target: &ControllerId,
        handler: Option<Box<dyn ChangeHandler>>,
    ) -> Result<()> {
        let slot = self.live_router(router)?;
        if !slot.backstack.contains(target) {
            return Err(NavError::NotOnStack {
                controller: target.clone(),
            });
        }
        let handler = match handler {
            Some(handler) => Some(handler),
            None => slot
                .backstack
                .peek()
                .and_then(|top| self.resolve_pop_handler(top)),
        };
        let mut kept = Vec::new();
        for entry in slot.backstack.iter_bottom_up() {
            kept.push(entry.duplicate());
            if entry.controller() == target {
                break;
            }
        }
        self.router_set_backstack(router, kept, handler)
    }

    // ------------------------------------------------------------------------
    // Bulk replace
    // ------------------------------------------------------------------------

    pub(crate) fn router_set_backstack(
        &mut self,
        router: RouterId,
        entries: Vec<NavigationEntry>,
        handler: Option<Box<dyn ChangeHandler>>,
    ) -> Result<()> {
        let slot = self.live_router(router)?;
        let old_ids = slot.backstack.controllers();

        let mut new_ids: Vec<ControllerId> = Vec::with_capacity(entries.len());
        for entry in &entries {
            let id = entry.controller();
            if new_ids.contains(id) {
                return Err(NavError::DuplicateController {
                    controller: id.clone(),
                });
            }
            if !old_ids.contains(id) {
                self.check_pushable(id)?;
            }
            new_ids.push(id.clone());
        }

        let old_visible = self.visible_controllers(router);
        let old_root_pop = old_visible.first().and_then(|id| {
            self.routers
                .get(&router)
                .and_then(|slot| slot.backstack.get(id))
                .and_then(|entry| self.resolve_pop_handler(entry))
        });

        // Entries re-listed for controllers already on the stack keep their
        // original order index.
        let mut entries = entries;
        if let Some(slot) = self.routers.get(&router) {
            for entry in &mut entries {
                if entry.order_index().is_none()
                    && let Some(old) = slot.backstack.get(entry.controller())
                {
                    entry.set_order_index(old.order_index());
                }
            }
        }
        let mut new_stack = Backstack::new();
        new_stack.set_all(entries);
        self.with_indexer(router, |indexer, _| ensure_ordered_indices(&mut new_stack, indexer));

        let removed: Vec<ControllerId> = old_ids
            .iter()
            .filter(|id| !new_ids.contains(id))
            .cloned()
            .collect();
        for id in &removed {
            self.set_flag(id, ControllerFlags::BEING_DESTROYED, true);
        }

        self.live_router_mut(router)?.backstack = new_stack;
        for id in &new_ids {
            self.set_controller_router(id, router);
        }
        tracing::debug!(
            target: "ftui.nav",
            router = %router,
            size = new_ids.len(),
            removed = removed.len(),
            "set backstack"
        );

        let mut interrupt = Interrupt::Abort;
        if new_ids.is_empty() {
            let mut handler = handler;
            for id in old_visible.iter().rev() {
                let local = handler
                    .take()
                    .unwrap_or_else(|| Box::new(SimpleSwapChangeHandler::default()));
                handler = Some(local.copy());
                self.perform_controller_change(
                    PendingChange::pop(router, None, Some(id.clone()), Some(local))
                        .interrupting(interrupt),
                )?;
                interrupt = Interrupt::Complete;
            }
        } else {
            let new_visible = self.visible_controllers(router);
            if new_visible != old_visible {
                let old_root = old_visible.first().cloned();
                let new_root = new_visible[0].clone();
                if old_root.as_ref() != Some(&new_root) {
                    let is_push = !old_ids.contains(&new_root);
                    let root_handler = match handler.as_ref() {
                        Some(h) => Some(h.copy()),
                        None if is_push => self
                            .routers
                            .get(&router)
                            .and_then(|slot| slot.backstack.get(&new_root))
                            .and_then(|entry| self.resolve_push_handler(entry)),
                        None => old_root_pop,
                    };
                    let change = if is_push {
                        PendingChange::push(router, Some(new_root.clone()), old_root, root_handler)
                    } else {
                        PendingChange::pop(router, Some(new_root.clone()), old_root, root_handler)
                    };
                    self.perform_controller_change(change.interrupting(interrupt))?;
                    interrupt = Interrupt::Complete;
                }

                for id in old_visible.iter().skip(1).rev() {
                    if new_visible.contains(id) {
                        continue;
                    }
                    let local: Box<dyn ChangeHandler> = match handler.as_ref() {
                        Some(h) => h.copy(),
                        None => Box::new(SimpleSwapChangeHandler::default()),
                    };
                    self.perform_controller_change(
                        PendingChange::push(router, None, Some(id.clone()), Some(local))
                            .force_remove()
                            .interrupting(interrupt),
                    )?;
                    interrupt = Interrupt::Complete;
                }

                for pair in new_visible.windows(2) {
                    let (below, id) = (&pair[0], &pair[1]);
                    if old_visible.contains(id) {
                        continue;
                    }
                    let push_handler = self
                        .routers
                        .get(&router)
                        .and_then(|slot| slot.backstack.get(id))
                        .and_then(|entry| self.resolve_push_handler(entry));
                    self.perform_controller_change(
                        PendingChange::push(router, Some(id.clone()), Some(below.clone()), push_handler)
                            .interrupting(interrupt),
                    )?;
                    interrupt = Interrupt::Complete;
                }
            }
        }

        for id in &removed {
            self.track_destroying(router, id);
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Back handling and rebinding
    // ------------------------------------------------------------------------

    pub(crate) fn router_handle_back(&mut self, router: RouterId) -> Result<bool> {
        let slot = self.live_router(router)?;
        let Some(top) = slot.backstack.peek().map(|e| e.controller().clone()) else {
            return Ok(false);
        };
        let can_pop = slot.backstack.len() > 1 || slot.pops_last_view;
        if self.controller_handle_back(&top)? {
            return Ok(true);
        }
        if can_pop && self.live_router(router)?.backstack.peek().map(|e| e.controller()) == Some(&top) {
            self.router_pop(router, &top)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Children first, most recently pushed entry first; then the
    /// controller's own hook.
    fn controller_handle_back(&mut self, id: &ControllerId) -> Result<bool> {
        let mut candidates: Vec<(u64, ControllerId, RouterId)> = Vec::new();
        if let Some(slot) = self.controllers.get(id) {
            for router in &slot.child_routers {
                let Some(child) = self.routers.get(router) else {
                    continue;
                };
                if child.destroyed {
                    continue;
                }
                for entry in child.backstack.iter() {
                    candidates.push((
                        entry.order_index().unwrap_or(0),
                        entry.controller().clone(),
                        *router,
                    ));
                }
            }
        }
        candidates.sort_by(|a, b| b.0.cmp(&a.0));
        for (_, child, router) in candidates {
            if self.has_flag(&child, ControllerFlags::ATTACHED) && self.router_handle_back(router)? {
                return Ok(true);
            }
        }
        Ok(self
            .with_controller(id, |c, cx| c.handle_back(cx))
            .unwrap_or(false))
    }

    pub(crate) fn router_rebind(&mut self, router: RouterId) -> Result<()> {
        let slot = self.live_router(router)?;
        if slot.container.is_none() {
            return Ok(());
        }
        for id in slot.backstack.controllers() {
            if self.has_flag(&id, ControllerFlags::NEEDS_ATTACH) {
                self.perform_controller_change(
                    PendingChange::push(
                        router,
                        Some(id),
                        None,
                        Some(Box::new(SimpleSwapChangeHandler::new(false))),
                    )
                    .interrupting(Interrupt::Complete),
                )?;
            } else {
                self.set_controller_router(&id, router);
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Host loss and teardown
    // ------------------------------------------------------------------------

    /// Finish any running change and flag controllers that must come back
    /// when the host returns.
    pub(crate) fn prepare_router_for_host_detach(&mut self, router: RouterId) {
        if let Some(Some(to)) = self.complete_in_flight(router) {
            self.set_flag(&to, ControllerFlags::NEEDS_ATTACH, true);
        }
        let controllers = self
            .routers
            .get(&router)
            .map(|slot| slot.backstack.controllers())
            .unwrap_or_default();
        for id in controllers {
            self.prepare_for_host_detach(&id);
        }
    }

    /// Drop the router's container, force-detaching every controller view.
    pub(crate) fn router_remove_host(&mut self, router: RouterId) {
        self.complete_in_flight(router);
        let Some(slot) = self.routers.get(&router) else {
            return;
        };
        if slot.container.is_none() {
            return;
        }
        let mut controllers = slot.destroying.clone();
        controllers.extend(slot.backstack.controllers());
        for id in controllers {
            if self.controllers.get(&id).is_some_and(|s| s.view.is_some()) {
                self.detach(&id, true, false);
            }
        }
        if let Some(slot) = self.routers.get_mut(&router) {
            slot.container = None;
        }
        tracing::trace!(target: "ftui.nav", router = %router, "container removed");
    }

    /// Destroy every controller on the router. With `pop_views` their views
    /// leave the container immediately.
    pub(crate) fn router_destroy(&mut self, router: RouterId, pop_views: bool) {
        match self.routers.get(&router) {
            Some(slot) if !slot.destroyed => {}
            _ => return,
        }
        self.set_router_detach_frozen(router, false);
        self.complete_in_flight(router);

        let Some(slot) = self.routers.get_mut(&router) else {
            return;
        };
        slot.change_listeners.clear();
        slot.destroyed = true;
        let mut doomed = std::mem::take(&mut slot.destroying);
        for entry in slot.backstack.pop_all() {
            if !doomed.contains(entry.controller()) {
                doomed.push(entry.controller().clone());
            }
        }
        doomed.retain(|id| !self.has_flag(id, ControllerFlags::DESTROYED));
        if let Some(slot) = self.routers.get_mut(&router) {
            slot.destroying.clone_from(&doomed);
        }

        for id in &doomed {
            self.destroy(id, pop_views);
        }
        if pop_views {
            for id in &doomed {
                let leftover = self
                    .controllers
                    .get_mut(id)
                    .and_then(|s| s.destroyed_view.take().or(s.view.take()));
                if let Some(view) = leftover {
                    self.release_view(view);
                }
            }
            // Views are gone; the container can be dropped now. Otherwise the
            // host's own teardown detaches whatever is still showing.
            if let Some(slot) = self.routers.get_mut(&router) {
                slot.container = None;
            }
        }
        tracing::debug!(target: "ftui.nav", router = %router, pop_views, "router destroyed");
    }

    pub(crate) fn set_router_detach_frozen(&mut self, router: RouterId, frozen: bool) {
        let controllers = self
            .routers
            .get(&router)
            .map(|slot| slot.backstack.controllers())
            .unwrap_or_default();
        for id in controllers {
            self.set_detach_frozen(&id, frozen);
        }
    }
}

/// Assign missing indices, then redistribute the sorted index set so the
/// stack order matches index order.
fn ensure_ordered_indices(stack: &mut Backstack, indexer: &mut TransactionIndexer) {
    let mut indices: Vec<u64> = stack
        .iter_mut_bottom_up()
        .map(|entry| entry.ensure_valid_index(indexer))
        .collect();
    indices.sort_unstable();
    for (entry, index) in stack.iter_mut_bottom_up().zip(indices) {
        entry.set_order_index(Some(index));
    }
}
