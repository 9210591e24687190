#![forbid(unsafe_code)]

//! The navigator: owner of every controller, router, and the view host.
//!
//! Controllers and routers live in arenas keyed by id. Nothing outside the
//! navigator holds a reference into them, which is what lets hooks, change
//! listeners, and the host all participate in one navigation without shared
//! mutable aliasing:
//!
//! ```text
//!   host events ─┐            ┌─▶ Controller hooks ─┐
//!   Router ops ──┼─ operation ┤                     ├─▶ CommandQueue
//!   tick(dt) ────┘            └─▶ ChangeListeners ──┘        │
//!                     ▲                                      │
//!                     └──────── drained at depth 0 ◀─────────┘
//! ```
//!
//! # Invariants
//!
//! - Every public mutating call is one *operation*. Commands queued during
//!   it run before it returns; destroyed controllers and routers are swept
//!   once the outermost operation ends.
//! - The navigator is single-threaded (`!Send`): controllers and listeners
//!   are plain `Rc`/`Box` values owned by the host's UI thread.
//!
//! # Failure Modes
//!
//! - A command queue that keeps refilling aborts with
//!   [`NavError::CommandOverflow`] after `max_pending_commands` commands.
//!   The first error raised by a command is returned; later commands still
//!   run.

use std::fmt;

use ahash::{AHashMap, AHashSet};
use serde_json::Value;
use web_time::Duration;

use crate::backstack::Backstack;
use crate::change::{ChangeHandler, HandlerRecord, HandlerRegistry};
use crate::command::{CommandQueue, NavCommand};
use crate::config::NavConfig;
use crate::controller::{
    Controller, ControllerEvent, ControllerFlags, ControllerId, ControllerSlot, LifecycleEvent,
    LifecycleListener, LifecycleState, ListenerId, RetainViewMode, scope_end_event,
};
use crate::entry::NavigationEntry;
use crate::error::{NavError, Result};
use crate::factory::{ControllerFactory, ControllerRegistry};
use crate::host::{HostPhase, HostRequest};
use crate::indexer::TransactionIndexer;
use crate::router::{Router, RouterId, RouterSlot};
use crate::state::{ControllerRecord, EntryRecord, NavigatorState, RouterRecord};
use crate::view::{NodeId, ViewHost};

pub struct Navigator {
    pub(crate) host: Box<dyn ViewHost>,
    pub(crate) config: NavConfig,
    pub(crate) phase: HostPhase,
    pub(crate) changing_configurations: bool,
    pub(crate) controllers: AHashMap<ControllerId, ControllerSlot>,
    pub(crate) routers: AHashMap<RouterId, RouterSlot>,
    /// Oldest first.
    pub(crate) root_routers: Vec<RouterId>,
    /// Indexer for routers whose tree has lost its root.
    pub(crate) orphan_indexer: TransactionIndexer,
    pub(crate) commands: CommandQueue,
    pub(crate) reconciling: bool,
    pub(crate) reconcile_again: bool,
    pub(crate) outbox: Vec<HostRequest>,
    pub(crate) factory: Box<dyn ControllerFactory>,
    pub(crate) handlers: HandlerRegistry,
    next_router: u64,
    next_listener: u64,
    depth: usize,
}

impl fmt::Debug for Navigator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Navigator")
            .field("phase", &self.phase)
            .field("config", &self.config)
            .field("controllers", &self.controllers.len())
            .field("routers", &self.routers.len())
            .field("root_routers", &self.root_routers)
            .field("pending_commands", &self.commands.len())
            .field("handlers", &self.handlers)
            .finish_non_exhaustive()
    }
}

impl Navigator {
    /// Navigator with the default configuration.
    #[must_use]
    pub fn new(host: Box<dyn ViewHost>) -> Self {
        Self::with_config(host, NavConfig::default())
    }

    #[must_use]
    pub fn with_config(host: Box<dyn ViewHost>, config: NavConfig) -> Self {
        Self {
            host,
            config,
            phase: HostPhase::Uncreated,
            changing_configurations: false,
            controllers: AHashMap::new(),
            routers: AHashMap::new(),
            root_routers: Vec::new(),
            orphan_indexer: TransactionIndexer::new(),
            commands: CommandQueue::default(),
            reconciling: false,
            reconcile_again: false,
            outbox: Vec::new(),
            factory: Box::new(ControllerRegistry::new()),
            handlers: HandlerRegistry::with_defaults(),
            next_router: 0,
            next_listener: 0,
            depth: 0,
        }
    }

    #[must_use]
    pub fn with_controller_factory(mut self, factory: impl ControllerFactory + 'static) -> Self {
        self.factory = Box::new(factory);
        self
    }

    #[must_use]
    pub fn with_handler_registry(mut self, handlers: HandlerRegistry) -> Self {
        self.handlers = handlers;
        self
    }

    #[must_use]
    pub fn config(&self) -> &NavConfig {
        &self.config
    }

    #[must_use]
    pub fn host_phase(&self) -> HostPhase {
        self.phase
    }

    #[must_use]
    pub fn host_ref(&self) -> &dyn ViewHost {
        self.host.as_ref()
    }

    /// Downcast the view host to its concrete type.
    #[must_use]
    pub fn host_as<T: 'static>(&self) -> Option<&T> {
        self.host.as_any().downcast_ref::<T>()
    }

    /// Mutate the view host, then re-observe window membership.
    pub fn with_host<R>(&mut self, f: impl FnOnce(&mut dyn ViewHost) -> R) -> Result<R> {
        self.operation(|nav| {
            let result = f(nav.host.as_mut());
            nav.reconcile();
            Ok(result)
        })
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Run `f` as (part of) one navigator operation.
    pub(crate) fn operation<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.depth += 1;
        let result = f(self);
        let drained = if self.depth == 1 {
            self.drain_commands()
        } else {
            Ok(())
        };
        self.depth -= 1;
        if self.depth == 0 {
            self.sweep();
        }
        let value = result?;
        drained?;
        Ok(value)
    }

    fn drain_commands(&mut self) -> Result<()> {
        let limit = self.config.max_pending_commands;
        let mut executed = 0usize;
        let mut first_error = None;
        while let Some(command) = self.commands.next() {
            executed += 1;
            if executed > limit {
                self.commands.clear();
                tracing::warn!(
                    target: "ftui.nav",
                    limit,
                    "navigation command queue overflowed; dropping remaining commands"
                );
                return Err(NavError::CommandOverflow { limit });
            }
            tracing::trace!(target: "ftui.nav", ?command, "running queued command");
            if let Err(err) = self.run_command(command) {
                tracing::warn!(target: "ftui.nav", error = %err, "queued command failed");
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn run_command(&mut self, command: NavCommand) -> Result<()> {
        let router = match &command {
            NavCommand::RetainMode { .. } => None,
            NavCommand::SetRoot { router, .. }
            | NavCommand::Push { router, .. }
            | NavCommand::ReplaceTop { router, .. }
            | NavCommand::PopCurrent { router }
            | NavCommand::Pop { router, .. }
            | NavCommand::PopToTag { router, .. }
            | NavCommand::PopToRoot { router }
            | NavCommand::SetBackstack { router, .. }
            | NavCommand::Rebind { router } => Some(*router),
        };
        if let Some(router) = router
            && self.routers.get(&router).is_none_or(|slot| slot.destroyed)
        {
            tracing::warn!(
                target: "ftui.nav",
                router = %router,
                ?command,
                "dropping command for a destroyed router"
            );
            return Ok(());
        }

        match command {
            NavCommand::SetRoot { router, entry } => self.router_set_root(router, entry),
            NavCommand::Push { router, entry } => self.router_push(router, entry),
            NavCommand::ReplaceTop { router, entry } => self.router_replace_top(router, entry),
            NavCommand::PopCurrent { router } => self.router_pop_current(router).map(drop),
            NavCommand::Pop { router, controller } => self.router_pop(router, &controller).map(drop),
            NavCommand::PopToTag { router, tag } => {
                self.router_pop_to_tag(router, &tag, None).map(drop)
            }
            NavCommand::PopToRoot { router } => self.router_pop_to_root(router, None).map(drop),
            NavCommand::SetBackstack {
                router,
                entries,
                handler,
            } => self.router_set_backstack(router, entries, handler),
            NavCommand::Rebind { router } => self.router_rebind(router),
            NavCommand::RetainMode { controller, mode } => {
                self.apply_retain_mode(&controller, mode);
                Ok(())
            }
        }
    }

    /// Drop destroyed controllers and routers nothing references any more.
    fn sweep(&mut self) {
        let mut pinned: AHashSet<ControllerId> = AHashSet::new();
        for slot in self.routers.values() {
            pinned.extend(slot.destroying.iter().cloned());
            if let Some(change) = &slot.in_flight {
                pinned.extend(change.info.from_controller.iter().cloned());
                pinned.extend(change.info.to_controller.iter().cloned());
            }
        }
        let dead: Vec<ControllerId> = self
            .controllers
            .iter()
            .filter(|(id, slot)| slot.is(ControllerFlags::DESTROYED) && !pinned.contains(*id))
            .map(|(id, _)| id.clone())
            .collect();
        for id in dead {
            if let Some(slot) = self.controllers.remove(&id)
                && let Some(view) = slot.destroyed_view.or(slot.view)
            {
                self.release_view(view);
            }
        }

        let dead_routers: Vec<RouterId> = self
            .routers
            .iter()
            .filter(|(_, slot)| {
                slot.destroyed && slot.in_flight.is_none() && slot.destroying.is_empty()
            })
            .map(|(id, _)| *id)
            .collect();
        for id in dead_routers {
            let Some(slot) = self.routers.remove(&id) else {
                continue;
            };
            self.root_routers.retain(|r| *r != id);
            if let Some(parent) = slot.parent
                && let Some(parent) = self.controllers.get_mut(&parent)
            {
                parent.child_routers.retain(|r| *r != id);
            }
            tracing::trace!(target: "ftui.nav", router = %id, "router swept");
        }
    }

    pub(crate) fn next_listener_id(&mut self) -> ListenerId {
        self.next_listener += 1;
        ListenerId(self.next_listener)
    }

    fn allocate_router(&mut self, slot: RouterSlot) -> RouterId {
        self.next_router += 1;
        let id = RouterId(self.next_router);
        self.routers.insert(id, slot);
        id
    }

    /// Controllers in attach order: root routers oldest first, each stack
    /// bottom to top, parents before their children.
    pub(crate) fn tree_order(&self) -> Vec<ControllerId> {
        let mut order = Vec::new();
        let mut seen = AHashSet::new();
        for router in &self.root_routers {
            self.collect_router(*router, &mut order, &mut seen);
        }
        order
    }

    fn collect_router(
        &self,
        router: RouterId,
        order: &mut Vec<ControllerId>,
        seen: &mut AHashSet<ControllerId>,
    ) {
        let Some(slot) = self.routers.get(&router) else {
            return;
        };
        let ids = slot
            .backstack
            .iter_bottom_up()
            .map(NavigationEntry::controller)
            .chain(slot.destroying.iter());
        for id in ids {
            if !seen.insert(id.clone()) {
                continue;
            }
            order.push(id.clone());
            if let Some(controller) = self.controllers.get(id) {
                for child in &controller.child_routers {
                    self.collect_router(*child, order, seen);
                }
            }
        }
    }

    /// Every known controller, tree order first.
    fn all_controllers(&self) -> Vec<ControllerId> {
        let mut order = self.tree_order();
        let seen: AHashSet<&ControllerId> = order.iter().collect();
        let mut rest: Vec<ControllerId> = self
            .controllers
            .keys()
            .filter(|id| !seen.contains(id))
            .cloned()
            .collect();
        rest.sort();
        order.extend(rest);
        order
    }

    // ========================================================================
    // Controllers
    // ========================================================================

    /// Register a new controller. Its type must be constructible by the
    /// navigator's factory so it can be restored later.
    pub fn create_controller(&mut self, controller: impl Controller) -> Result<ControllerId> {
        self.insert_controller(Box::new(controller))
    }

    pub(crate) fn insert_controller(&mut self, behavior: Box<dyn Controller>) -> Result<ControllerId> {
        let type_tag = behavior.type_tag().to_owned();
        if !self.factory.contains(&type_tag) {
            return Err(NavError::MissingConstructor { type_tag });
        }
        let id = ControllerId::generate();
        self.controllers.insert(
            id.clone(),
            ControllerSlot::new(behavior, self.config.default_retain_mode),
        );
        tracing::debug!(target: "ftui.nav", controller = %id, type_tag, "controller created");
        Ok(id)
    }

    /// Destroy a controller. One on a backstack is popped first.
    pub fn discard_controller(&mut self, id: &ControllerId) -> Result<()> {
        self.operation(|nav| {
            let slot = nav
                .controllers
                .get(id)
                .ok_or_else(|| NavError::UnknownController { controller: id.clone() })?;
            if let Some(router) = slot.router
                && nav
                    .routers
                    .get(&router)
                    .is_some_and(|r| !r.destroyed && r.backstack.contains(id))
            {
                nav.router_pop(router, id)?;
                return Ok(());
            }
            nav.destroy(id, true);
            Ok(())
        })
    }

    #[must_use]
    pub fn contains_controller(&self, id: &ControllerId) -> bool {
        self.controllers.contains_key(id)
    }

    #[must_use]
    pub fn view(&self, id: &ControllerId) -> Option<NodeId> {
        self.controllers.get(id).and_then(|slot| slot.view)
    }

    #[must_use]
    pub fn is_attached(&self, id: &ControllerId) -> bool {
        self.has_flag(id, ControllerFlags::ATTACHED)
    }

    /// Unknown ids read as destroyed: swept controllers are forgotten.
    #[must_use]
    pub fn is_destroyed(&self, id: &ControllerId) -> bool {
        self.controllers
            .get(id)
            .is_none_or(|slot| slot.is(ControllerFlags::DESTROYED))
    }

    #[must_use]
    pub fn is_being_destroyed(&self, id: &ControllerId) -> bool {
        self.has_flag(id, ControllerFlags::BEING_DESTROYED)
    }

    #[must_use]
    pub fn needs_attach(&self, id: &ControllerId) -> bool {
        self.has_flag(id, ControllerFlags::NEEDS_ATTACH)
    }

    #[must_use]
    pub fn lifecycle_state(&self, id: &ControllerId) -> Option<LifecycleState> {
        self.controllers.get(id).map(|slot| slot.state)
    }

    #[must_use]
    pub fn retain_view_mode(&self, id: &ControllerId) -> Option<RetainViewMode> {
        self.controllers.get(id).map(|slot| slot.retain_mode)
    }

    pub fn set_retain_view_mode(&mut self, id: &ControllerId, mode: RetainViewMode) -> Result<()> {
        self.operation(|nav| {
            if !nav.controllers.contains_key(id) {
                return Err(NavError::UnknownController { controller: id.clone() });
            }
            nav.apply_retain_mode(id, mode);
            Ok(())
        })
    }

    /// The router whose backstack holds this controller.
    #[must_use]
    pub fn router_of(&self, id: &ControllerId) -> Option<RouterId> {
        self.controllers.get(id).and_then(|slot| slot.router)
    }

    #[must_use]
    pub fn parent_controller(&self, id: &ControllerId) -> Option<&ControllerId> {
        self.controllers.get(id).and_then(|slot| slot.parent.as_ref())
    }

    #[must_use]
    pub fn child_routers(&self, id: &ControllerId) -> &[RouterId] {
        self.controllers
            .get(id)
            .map_or(&[][..], |slot| slot.child_routers.as_slice())
    }

    /// The target set on `id`, if it is still alive in the same tree.
    #[must_use]
    pub fn target_controller(&self, id: &ControllerId) -> Option<ControllerId> {
        let slot = self.controllers.get(id)?;
        let target = slot.target.as_ref()?;
        let target_slot = self.controllers.get(target)?;
        if target_slot.is(ControllerFlags::DESTROYED) {
            return None;
        }
        let root = slot.router.and_then(|r| self.root_router_of(r));
        let target_root = target_slot.router.and_then(|r| self.root_router_of(r));
        (root.is_some() && root == target_root).then(|| target.clone())
    }

    /// Record which controller should receive `id`'s results. A target can
    /// only be set once.
    pub fn set_target_controller(&mut self, id: &ControllerId, target: &ControllerId) -> Result<()> {
        if !self.controllers.contains_key(target) {
            return Err(NavError::UnknownController {
                controller: target.clone(),
            });
        }
        let slot = self
            .controllers
            .get_mut(id)
            .ok_or_else(|| NavError::UnknownController { controller: id.clone() })?;
        if slot.target.is_some() {
            return Err(NavError::TargetAlreadySet { controller: id.clone() });
        }
        slot.target = Some(target.clone());
        Ok(())
    }

    /// Handler used whenever this controller is pushed, regardless of entry.
    pub fn override_push_handler(
        &mut self,
        id: &ControllerId,
        handler: Option<Box<dyn ChangeHandler>>,
    ) -> Result<()> {
        let slot = self
            .controllers
            .get_mut(id)
            .ok_or_else(|| NavError::UnknownController { controller: id.clone() })?;
        slot.push_override = handler;
        Ok(())
    }

    pub fn override_pop_handler(
        &mut self,
        id: &ControllerId,
        handler: Option<Box<dyn ChangeHandler>>,
    ) -> Result<()> {
        let slot = self
            .controllers
            .get_mut(id)
            .ok_or_else(|| NavError::UnknownController { controller: id.clone() })?;
        slot.pop_override = handler;
        Ok(())
    }

    pub fn add_lifecycle_listener(
        &mut self,
        id: &ControllerId,
        listener: impl LifecycleListener + 'static,
    ) -> Result<ListenerId> {
        let listener_id = self.next_listener_id();
        let slot = self
            .controllers
            .get_mut(id)
            .ok_or_else(|| NavError::UnknownController { controller: id.clone() })?;
        slot.listeners.push((listener_id, std::rc::Rc::new(listener)));
        Ok(listener_id)
    }

    pub fn remove_lifecycle_listener(&mut self, id: &ControllerId, listener: ListenerId) {
        if let Some(slot) = self.controllers.get_mut(id) {
            slot.listeners.retain(|(l, _)| *l != listener);
        }
    }

    /// Event that ends the scope the controller is currently in.
    pub fn scope_end_event(&self, id: &ControllerId) -> Result<ControllerEvent> {
        let slot = self
            .controllers
            .get(id)
            .ok_or_else(|| NavError::UnknownController { controller: id.clone() })?;
        scope_end_event(slot.last_event)
    }

    /// Permissions requested by `id` whose result has not been delivered.
    #[must_use]
    pub fn requested_permissions(&self, id: &ControllerId) -> &[String] {
        self.controllers
            .get(id)
            .map_or(&[][..], |slot| slot.requested_permissions.as_slice())
    }

    /// Child router of `id` hosted in `container`, created on first use.
    ///
    /// The container must carry a key so the router can find it again when
    /// the controller's view is recreated.
    pub fn child_router(
        &mut self,
        id: &ControllerId,
        container: NodeId,
        tag: Option<&str>,
    ) -> Result<RouterId> {
        self.operation(|nav| nav.child_router_inner(id, container, tag))
    }

    pub(crate) fn child_router_inner(
        &mut self,
        id: &ControllerId,
        container: NodeId,
        tag: Option<&str>,
    ) -> Result<RouterId> {
        let key = self.host.key(container).ok_or(NavError::ContainerWithoutKey)?;
        let slot = self
            .controllers
            .get(id)
            .ok_or_else(|| NavError::UnknownController { controller: id.clone() })?;
        let existing = slot.child_routers.iter().copied().find(|router| {
            self.routers.get(router).is_some_and(|r| {
                !r.destroyed && r.host_key.as_deref() == Some(key.as_str()) && r.tag.as_deref() == tag
            })
        });
        if let Some(router) = existing {
            if let Some(slot) = self.routers.get_mut(&router)
                && slot.container.is_none()
            {
                slot.container = Some(container);
                self.commands.enqueue(NavCommand::Rebind { router });
            }
            return Ok(router);
        }

        let mut slot = RouterSlot::new(Some(id.clone()), self.config.pops_last_view);
        slot.container = Some(container);
        slot.host_key = Some(key);
        slot.tag = tag.map(str::to_owned);
        let router = self.allocate_router(slot);
        if let Some(controller) = self.controllers.get_mut(id) {
            controller.child_routers.push(router);
        }
        tracing::debug!(target: "ftui.nav", controller = %id, router = %router, "child router created");
        Ok(router)
    }

    /// Destroy a child router and remove its views.
    pub fn remove_child_router(&mut self, id: &ControllerId, router: RouterId) -> Result<()> {
        self.operation(|nav| {
            nav.remove_child_router_inner(id, router);
            Ok(())
        })
    }

    pub(crate) fn remove_child_router_inner(&mut self, id: &ControllerId, router: RouterId) {
        let Some(slot) = self.controllers.get_mut(id) else {
            return;
        };
        if !slot.child_routers.contains(&router) {
            return;
        }
        slot.child_routers.retain(|r| *r != router);
        self.router_destroy(router, true);
    }

    // ========================================================================
    // Routers
    // ========================================================================

    #[must_use]
    pub fn backstack(&self, router: RouterId) -> Option<&Backstack> {
        self.routers.get(&router).map(|slot| &slot.backstack)
    }

    pub fn router(&mut self, id: RouterId) -> Router<'_> {
        Router::new(self, id)
    }

    #[must_use]
    pub fn root_routers(&self) -> &[RouterId] {
        &self.root_routers
    }

    /// Root router hosted in `container`.
    ///
    /// A router already bound to `container`, or a hostless root router
    /// that last lived in a container with the same key, is re-bound and
    /// returned; otherwise a new root router is created.
    pub fn attach_router(&mut self, container: NodeId) -> Result<RouterId> {
        self.operation(|nav| {
            let live_roots = nav
                .root_routers
                .iter()
                .copied()
                .filter(|r| nav.routers.get(r).is_some_and(|slot| !slot.destroyed))
                .collect::<Vec<_>>();

            if let Some(router) = live_roots
                .iter()
                .copied()
                .find(|r| nav.routers.get(r).is_some_and(|slot| slot.container == Some(container)))
            {
                nav.router_rebind(router)?;
                return Ok(router);
            }

            let key = nav.host.key(container);
            if let Some(key) = key.as_deref()
                && let Some(router) = live_roots.iter().copied().find(|r| {
                    nav.routers.get(r).is_some_and(|slot| {
                        slot.container.is_none() && slot.host_key.as_deref() == Some(key)
                    })
                })
            {
                if let Some(slot) = nav.routers.get_mut(&router) {
                    slot.container = Some(container);
                }
                tracing::debug!(target: "ftui.nav", router = %router, key, "root router re-hosted");
                nav.router_rebind(router)?;
                return Ok(router);
            }

            let mut slot = RouterSlot::new(None, nav.config.pops_last_view);
            slot.container = Some(container);
            slot.host_key = key;
            let router = nav.allocate_router(slot);
            nav.root_routers.push(router);
            tracing::debug!(target: "ftui.nav", router = %router, "root router attached");
            Ok(router)
        })
    }

    // ========================================================================
    // Host events
    // ========================================================================

    fn set_phase(&mut self, phase: HostPhase) {
        tracing::debug!(target: "ftui.nav", from = ?self.phase, to = ?phase, "host phase");
        self.phase = phase;
    }

    pub fn host_created(&mut self) -> Result<()> {
        self.operation(|nav| {
            nav.set_phase(HostPhase::Created);
            for id in nav.tree_order() {
                nav.context_available(&id);
            }
            Ok(())
        })
    }

    pub fn host_started(&mut self) -> Result<()> {
        self.operation(|nav| {
            nav.set_phase(HostPhase::Started);
            nav.reconcile();
            for id in nav.tree_order() {
                let signal = nav
                    .controllers
                    .get_mut(&id)
                    .filter(|slot| slot.view.is_some())
                    .and_then(|slot| slot.tracker.host_started());
                if let Some(signal) = signal {
                    nav.apply_attach_signal(&id, signal);
                }
                nav.hook(&id, |c, cx| c.on_host_started(cx));
            }
            Ok(())
        })
    }

    pub fn host_resumed(&mut self) -> Result<()> {
        self.operation(|nav| {
            nav.set_phase(HostPhase::Resumed);
            for id in nav.tree_order() {
                nav.hook(&id, |c, cx| c.on_host_resumed(cx));
            }
            Ok(())
        })
    }

    pub fn host_paused(&mut self) -> Result<()> {
        self.operation(|nav| {
            nav.set_phase(HostPhase::Paused);
            for id in nav.tree_order() {
                nav.hook(&id, |c, cx| c.on_host_paused(cx));
            }
            Ok(())
        })
    }

    pub fn host_stopped(&mut self) -> Result<()> {
        self.operation(|nav| {
            nav.set_phase(HostPhase::Stopped);
            for id in nav.tree_order() {
                let was_attached = nav.is_attached(&id);
                let signal = nav
                    .controllers
                    .get_mut(&id)
                    .filter(|slot| slot.view.is_some())
                    .and_then(|slot| slot.tracker.host_stopped());
                if let Some(signal) = signal {
                    nav.apply_attach_signal(&id, signal);
                }
                if was_attached && nav.changing_configurations {
                    nav.set_flag(&id, ControllerFlags::NEEDS_ATTACH, true);
                }
                nav.hook(&id, |c, cx| c.on_host_stopped(cx));
            }
            Ok(())
        })
    }

    /// The host window is gone. During a configuration change routers keep
    /// their stacks and wait for a new container; otherwise everything is
    /// destroyed.
    pub fn host_destroyed(&mut self) -> Result<()> {
        self.operation(|nav| {
            let roots = nav.root_routers.clone();
            if nav.changing_configurations {
                for router in &roots {
                    nav.prepare_router_for_host_detach(*router);
                    nav.router_remove_host(*router);
                }
            } else {
                for router in &roots {
                    nav.router_destroy(*router, true);
                }
            }
            for id in nav.all_controllers() {
                nav.context_unavailable(&id);
            }
            nav.set_phase(HostPhase::Destroyed);
            Ok(())
        })
    }

    pub fn set_changing_configurations(&mut self, changing: bool) {
        self.changing_configurations = changing;
    }

    #[must_use]
    pub fn is_changing_configurations(&self) -> bool {
        self.changing_configurations
    }

    pub fn configuration_changed(&mut self) -> Result<()> {
        self.operation(|nav| {
            for id in nav.tree_order() {
                nav.hook(&id, |c, cx| c.on_configuration_changed(cx));
            }
            Ok(())
        })
    }

    pub fn deliver_activity_result(
        &mut self,
        id: &ControllerId,
        request_code: i32,
        result_code: i32,
        data: &Value,
    ) -> Result<()> {
        self.operation(|nav| {
            if !nav.controllers.contains_key(id) {
                return Err(NavError::UnknownController { controller: id.clone() });
            }
            nav.hook(id, |c, cx| {
                c.on_activity_result(cx, request_code, result_code, data);
            });
            Ok(())
        })
    }

    pub fn deliver_permissions_result(
        &mut self,
        id: &ControllerId,
        request_code: i32,
        permissions: &[String],
        granted: &[bool],
    ) -> Result<()> {
        self.operation(|nav| {
            let slot = nav
                .controllers
                .get_mut(id)
                .ok_or_else(|| NavError::UnknownController { controller: id.clone() })?;
            slot.requested_permissions
                .retain(|p| !permissions.contains(p));
            nav.hook(id, |c, cx| {
                c.on_permissions_result(cx, request_code, permissions, granted);
            });
            Ok(())
        })
    }

    /// Requests issued by controllers since the last drain.
    pub fn drain_host_requests(&mut self) -> Vec<HostRequest> {
        std::mem::take(&mut self.outbox)
    }

    /// Advance running transitions by `dt`.
    pub fn tick(&mut self, dt: Duration) -> Result<()> {
        self.operation(|nav| {
            nav.poll_in_flight(dt);
            Ok(())
        })
    }

    /// Offer a back press to the most recently attached root router first.
    pub fn handle_back(&mut self) -> Result<bool> {
        self.operation(|nav| {
            for router in nav.root_routers.clone().into_iter().rev() {
                if nav.routers.get(&router).is_none_or(|slot| slot.destroyed) {
                    continue;
                }
                if nav.router_handle_back(router)? {
                    return Ok(true);
                }
            }
            Ok(false)
        })
    }

    // ========================================================================
    // Save / restore
    // ========================================================================

    /// Capture every root router's tree. Running transitions are completed
    /// first so the saved stacks match what is on screen.
    pub fn save_instance_state(&mut self) -> Result<NavigatorState> {
        self.operation(|nav| {
            let roots: Vec<RouterId> = nav
                .root_routers
                .iter()
                .copied()
                .filter(|r| nav.routers.get(r).is_some_and(|slot| !slot.destroyed))
                .collect();
            let routers = roots
                .into_iter()
                .filter_map(|r| nav.save_router(r))
                .collect();
            Ok(NavigatorState { routers })
        })
    }

    fn save_router(&mut self, router: RouterId) -> Option<RouterRecord> {
        self.prepare_router_for_host_detach(router);
        let slot = self.routers.get(&router)?;
        let mut record = RouterRecord {
            host_key: slot.host_key.clone(),
            tag: slot.tag.clone(),
            entries: Vec::with_capacity(slot.backstack.len()),
            pops_last_view: slot.pops_last_view,
            indexer: slot.indexer,
        };
        let ids: Vec<ControllerId> = slot
            .backstack
            .iter()
            .map(|entry| entry.controller().clone())
            .collect();

        for id in ids {
            let Some(controller) = self.save_controller(&id) else {
                continue;
            };
            let Some(entry) = self.routers.get(&router).and_then(|s| s.backstack.get(&id)) else {
                continue;
            };
            record.entries.push(EntryRecord {
                controller,
                push_handler: entry.push_handler().map(|h| HandlerRecord::of(h)),
                pop_handler: entry.pop_handler().map(|h| HandlerRecord::of(h)),
                tag: entry.tag().map(str::to_owned),
                order_index: entry.order_index(),
            });
        }
        Some(record)
    }

    fn save_controller(&mut self, id: &ControllerId) -> Option<ControllerRecord> {
        let slot = self.controllers.get(id)?;
        if let Some(view) = slot.view
            && !slot.is(ControllerFlags::HAS_SAVED_VIEW_STATE)
        {
            self.save_view_state(id, view);
        }
        let saved_state = if self.is_destroyed(id) {
            Value::Null
        } else {
            self.with_controller(id, |c, cx| c.on_save_instance_state(cx))
                .unwrap_or(Value::Null)
        };
        self.notify(
            id,
            LifecycleEvent::SaveInstanceState {
                state: saved_state.clone(),
            },
        );

        let child_routers: Vec<RouterId> = self
            .child_routers(id)
            .iter()
            .copied()
            .filter(|r| self.routers.get(r).is_some_and(|router| !router.destroyed))
            .collect();
        let child_routers = child_routers
            .into_iter()
            .filter_map(|r| self.save_router(r))
            .collect();

        let slot = self.controllers.get(id)?;
        Some(ControllerRecord {
            type_tag: slot.type_tag.clone(),
            args: slot
                .behavior
                .as_ref()
                .map_or(Value::Null, |behavior| behavior.args()),
            instance_id: id.clone(),
            target_instance_id: slot.target.clone(),
            requested_permissions: slot.requested_permissions.clone(),
            needs_attach: slot.is(ControllerFlags::NEEDS_ATTACH)
                || slot.is(ControllerFlags::ATTACHED),
            retain_mode: slot.retain_mode.ordinal(),
            push_handler: slot.push_override.as_deref().map(|h| HandlerRecord::of(h)),
            pop_handler: slot.pop_override.as_deref().map(|h| HandlerRecord::of(h)),
            child_routers,
            view_state: slot.view_state.clone(),
            saved_state,
        })
    }

    /// Rebuild routers and controllers from `state`. Restored routers are
    /// hostless until [`attach_router`](Self::attach_router) (or a parent's
    /// view) provides a container with the saved key.
    pub fn restore_instance_state(&mut self, state: &NavigatorState) -> Result<()> {
        self.operation(|nav| {
            let mut log = RestoreLog::default();
            for record in &state.routers {
                let mut slot = RouterSlot::new(None, record.pops_last_view);
                slot.host_key.clone_from(&record.host_key);
                slot.tag.clone_from(&record.tag);
                slot.indexer = Some(record.indexer.unwrap_or_default());
                let router = nav.allocate_router(slot);
                log.routers.push(router);
                nav.root_routers.push(router);
                if let Err(err) = nav.restore_router(router, record, &mut log) {
                    tracing::error!(
                        target: "ftui.nav",
                        router = %router,
                        error = %err,
                        "failed to restore navigation state"
                    );
                    nav.discard_restored(&log);
                    return Err(err);
                }
            }
            Ok(())
        })
    }

    /// Tear down everything a failed restore inserted. Controllers already
    /// bound to a router are destroyed with it; the rest never ran a hook.
    fn discard_restored(&mut self, log: &RestoreLog) {
        for router in &log.routers {
            self.router_destroy(*router, true);
        }
        for router in &log.routers {
            self.routers.remove(router);
        }
        self.root_routers.retain(|r| !log.routers.contains(r));
        for id in &log.controllers {
            self.controllers.remove(id);
        }
        tracing::debug!(
            target: "ftui.nav",
            routers = log.routers.len(),
            controllers = log.controllers.len(),
            "partial restore discarded"
        );
    }

    fn restore_router(
        &mut self,
        router: RouterId,
        record: &RouterRecord,
        log: &mut RestoreLog,
    ) -> Result<()> {
        let mut entries = Vec::with_capacity(record.entries.len());
        for entry_record in &record.entries {
            let id = self.restore_controller(&entry_record.controller, log)?;
            let mut entry = NavigationEntry::with(id);
            entry.set_push_handler(self.restore_handler(entry_record.push_handler.as_ref())?);
            entry.set_pop_handler(self.restore_handler(entry_record.pop_handler.as_ref())?);
            entry.set_tag(entry_record.tag.clone());
            entry.set_order_index(entry_record.order_index);
            entries.push(entry);
        }
        let slot = self.live_router_mut(router)?;
        slot.backstack.restore(entries);
        for id in slot.backstack.controllers() {
            self.set_controller_router(&id, router);
        }
        Ok(())
    }

    fn restore_handler(
        &self,
        record: Option<&HandlerRecord>,
    ) -> Result<Option<Box<dyn ChangeHandler>>> {
        record.map(|record| self.handlers.restore(record)).transpose()
    }

    fn restore_controller(
        &mut self,
        record: &ControllerRecord,
        log: &mut RestoreLog,
    ) -> Result<ControllerId> {
        let id = record.instance_id.clone();
        if self.controllers.contains_key(&id) {
            return Err(NavError::ControllerIdTaken { controller: id });
        }
        let behavior = self.factory.instantiate(&record.type_tag, &record.args)?;
        let mut slot = ControllerSlot::new(behavior, RetainViewMode::from_ordinal(record.retain_mode));
        slot.target.clone_from(&record.target_instance_id);
        slot.requested_permissions
            .clone_from(&record.requested_permissions);
        slot.set(ControllerFlags::NEEDS_ATTACH, record.needs_attach);
        slot.push_override = self.restore_handler(record.push_handler.as_ref())?;
        slot.pop_override = self.restore_handler(record.pop_handler.as_ref())?;
        slot.view_state.clone_from(&record.view_state);
        slot.set(ControllerFlags::HAS_SAVED_VIEW_STATE, record.view_state.is_some());
        if !record.saved_state.is_null() {
            slot.pending_saved_state = Some(record.saved_state.clone());
        }
        self.controllers.insert(id.clone(), slot);
        log.controllers.push(id.clone());
        tracing::debug!(
            target: "ftui.nav",
            controller = %id,
            type_tag = record.type_tag,
            "controller restored"
        );

        for child in &record.child_routers {
            let mut router = RouterSlot::new(Some(id.clone()), child.pops_last_view);
            router.host_key.clone_from(&child.host_key);
            router.tag.clone_from(&child.tag);
            let router = self.allocate_router(router);
            log.routers.push(router);
            if let Some(slot) = self.controllers.get_mut(&id) {
                slot.child_routers.push(router);
            }
            self.restore_router(router, child, log)?;
        }
        Ok(id)
    }
}

/// Routers and controllers inserted by one restore call.
#[derive(Debug, Default)]
struct RestoreLog {
    routers: Vec<RouterId>,
    controllers: Vec<ControllerId>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::MemoryViewTree;

    #[test]
    fn new_navigator_is_uncreated_and_empty() {
        let nav = Navigator::new(Box::new(MemoryViewTree::new()));
        assert_eq!(nav.host_phase(), HostPhase::Uncreated);
        assert!(nav.root_routers().is_empty());
        assert!(nav.host_as::<MemoryViewTree>().is_some());
    }

    #[test]
    fn unknown_controllers_read_as_destroyed() {
        let nav = Navigator::new(Box::new(MemoryViewTree::new()));
        let id = ControllerId::from("missing");
        assert!(nav.is_destroyed(&id));
        assert!(!nav.is_attached(&id));
        assert!(nav.requested_permissions(&id).is_empty());
        assert!(matches!(
            nav.scope_end_event(&id),
            Err(NavError::UnknownController { .. })
        ));
    }

    #[test]
    fn attach_router_reuses_router_for_same_container() {
        let mut tree = MemoryViewTree::new();
        let container = tree.create_node(Some("root"));
        let mut nav = Navigator::new(Box::new(tree));
        let first = nav.attach_router(container).unwrap();
        let second = nav.attach_router(container).unwrap();
        assert_eq!(first, second);
        assert_eq!(nav.root_routers(), &[first]);
    }

    #[test]
    fn unknown_router_operations_fail() {
        let mut nav = Navigator::new(Box::new(MemoryViewTree::new()));
        let err = nav.router(RouterId(42)).pop_current_controller().unwrap_err();
        assert!(matches!(err, NavError::UnknownRouter { .. }));
    }
}
