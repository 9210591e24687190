#![forbid(unsafe_code)]

//! What a controller can reach from inside a hook.

use std::fmt;

use serde_json::Value;

use super::{
    Controller, ControllerEvent, ControllerFlags, ControllerId, LifecycleListener, LifecycleState,
    ListenerId, RetainViewMode,
};
use crate::command::{CommandQueue, NavCommand};
use crate::error::{NavError, Result};
use crate::host::HostRequest;
use crate::navigator::Navigator;
use crate::router::RouterId;
use crate::view::{NodeId, ViewHost};

/// Handle passed to every [`Controller`] hook and lifecycle listener.
///
/// Stack mutations are not available directly; they go through
/// [`commands`](Self::commands) and run once the current operation settles.
pub struct ControllerContext<'a> {
    nav: &'a mut Navigator,
    id: ControllerId,
}

impl fmt::Debug for ControllerContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerContext")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl<'a> ControllerContext<'a> {
    pub(crate) fn new(nav: &'a mut Navigator, id: ControllerId) -> Self {
        Self { nav, id }
    }

    #[must_use]
    pub fn id(&self) -> &ControllerId {
        &self.id
    }

    /// Read-only view of the whole navigator.
    #[must_use]
    pub fn navigator(&self) -> &Navigator {
        &*self.nav
    }

    #[must_use]
    pub fn view(&self) -> Option<NodeId> {
        self.nav.view(&self.id)
    }

    #[must_use]
    pub fn router(&self) -> Option<RouterId> {
        self.nav.router_of(&self.id)
    }

    #[must_use]
    pub fn parent_controller(&self) -> Option<&ControllerId> {
        self.nav.parent_controller(&self.id)
    }

    #[must_use]
    pub fn lifecycle_state(&self) -> LifecycleState {
        self.nav
            .lifecycle_state(&self.id)
            .unwrap_or(LifecycleState::Destroyed)
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.nav.is_attached(&self.id)
    }

    #[must_use]
    pub fn is_being_destroyed(&self) -> bool {
        self.nav
            .has_flag(&self.id, ControllerFlags::BEING_DESTROYED)
    }

    #[must_use]
    pub fn target_controller(&self) -> Option<ControllerId> {
        self.nav.target_controller(&self.id)
    }

    pub fn scope_end_event(&self) -> Result<ControllerEvent> {
        self.nav.scope_end_event(&self.id)
    }

    pub fn host(&mut self) -> &mut dyn ViewHost {
        self.nav.host.as_mut()
    }

    #[must_use]
    pub fn host_ref(&self) -> &dyn ViewHost {
        self.nav.host.as_ref()
    }

    /// Queue navigation to run after the current operation.
    pub fn commands(&mut self) -> &mut CommandQueue {
        &mut self.nav.commands
    }

    pub fn create_controller(&mut self, controller: impl Controller) -> Result<ControllerId> {
        self.nav.insert_controller(Box::new(controller))
    }

    /// Child router hosted in `container` inside this controller's view.
    pub fn child_router(&mut self, container: NodeId, tag: Option<&str>) -> Result<RouterId> {
        self.nav.child_router_inner(&self.id, container, tag)
    }

    pub fn remove_child_router(&mut self, router: RouterId) {
        self.nav.remove_child_router_inner(&self.id, router);
    }

    #[must_use]
    pub fn child_routers(&self) -> &[RouterId] {
        self.nav.child_routers(&self.id)
    }

    pub fn add_lifecycle_listener(
        &mut self,
        listener: impl LifecycleListener + 'static,
    ) -> Result<ListenerId> {
        self.nav.add_lifecycle_listener(&self.id, listener)
    }

    pub fn remove_lifecycle_listener(&mut self, listener: ListenerId) {
        self.nav.remove_lifecycle_listener(&self.id, listener);
    }

    pub fn set_target_controller(&mut self, target: &ControllerId) -> Result<()> {
        self.nav.set_target_controller(&self.id, target)
    }

    /// Ask the host for permissions. Held until this controller is on a
    /// router.
    pub fn request_permissions(&mut self, permissions: Vec<String>, request_code: i32) {
        if let Some(slot) = self.nav.controllers.get_mut(&self.id) {
            for permission in &permissions {
                if !slot.requested_permissions.contains(permission) {
                    slot.requested_permissions.push(permission.clone());
                }
            }
        }
        self.send(HostRequest::RequestPermissions {
            controller: self.id.clone(),
            permissions,
            request_code,
        });
    }

    /// Ask the host to start something that reports back through
    /// [`Controller::on_activity_result`].
    pub fn start_for_result(&mut self, intent: Value, request_code: i32) {
        self.send(HostRequest::StartForResult {
            controller: self.id.clone(),
            intent,
            request_code,
        });
    }

    fn send(&mut self, request: HostRequest) {
        let Some(slot) = self.nav.controllers.get_mut(&self.id) else {
            return;
        };
        if slot.router.is_some() {
            self.nav.outbox.push(request);
        } else {
            slot.pending_requests.push(request);
        }
    }

    /// Takes effect immediately; a view that is no longer retained is
    /// released once the current operation settles.
    pub fn set_retain_view_mode(&mut self, mode: RetainViewMode) -> Result<()> {
        let slot = self
            .nav
            .controllers
            .get_mut(&self.id)
            .ok_or_else(|| NavError::UnknownController {
                controller: self.id.clone(),
            })?;
        slot.retain_mode = mode;
        self.nav.commands.enqueue(NavCommand::RetainMode {
            controller: self.id.clone(),
            mode,
        });
        Ok(())
    }
}
