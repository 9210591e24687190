#![forbid(unsafe_code)]

//! A scripted host window driving one navigator.

use std::time::Duration;

use ftui_nav::{
    Controller, ControllerId, ControllerRegistry, HandlerRegistry, MemoryViewTree, NavConfig,
    NavigationEntry, Navigator, NavigatorState, NodeId, Result, Router, RouterId, ViewHost,
};

use crate::controller::{CHILD_CONTAINER, TestController};
use crate::handlers::MockChangeHandler;

const WINDOW_KEY: &str = "window";
const CONTAINER_KEY: &str = "container";

/// Host window with one root router in a keyed container.
///
/// Lifecycle methods return `&mut Self` so calls chain the way a host
/// drives them: `host.pause()?.stop(true)?.destroy()?`.
#[derive(Debug)]
pub struct HostProxy {
    pub nav: Navigator,
    router: RouterId,
    window: NodeId,
    container: NodeId,
}

impl HostProxy {
    /// Created, started, and resumed host.
    pub fn new() -> Result<Self> {
        Self::with_config(NavConfig::default())
    }

    pub fn with_config(config: NavConfig) -> Result<Self> {
        let mut proxy = Self::created(config, None)?;
        proxy.start()?.resume()?;
        Ok(proxy)
    }

    /// Host rebuilt from saved state, as after process death.
    pub fn restored(state: &NavigatorState) -> Result<Self> {
        let mut proxy = Self::created(NavConfig::default(), Some(state))?;
        proxy.start()?.resume()?;
        Ok(proxy)
    }

    /// Host that has been created but not started.
    pub fn created(config: NavConfig, state: Option<&NavigatorState>) -> Result<Self> {
        let mut tree = MemoryViewTree::new();
        let (window, container) = window_with_container(&mut tree);

        let mut controllers = ControllerRegistry::new();
        controllers.register::<TestController>();
        let mut handlers = HandlerRegistry::with_defaults();
        handlers.register::<MockChangeHandler>();

        let mut nav = Navigator::with_config(Box::new(tree), config)
            .with_controller_factory(controllers)
            .with_handler_registry(handlers);
        if let Some(state) = state {
            nav.restore_instance_state(state)?;
        }
        nav.host_created()?;
        let router = nav.attach_router(container)?;
        tracing::debug!(target: "ftui.nav.harness", %router, "host created");
        Ok(Self {
            nav,
            router,
            window,
            container,
        })
    }

    pub fn start(&mut self) -> Result<&mut Self> {
        let window = self.window;
        self.nav.with_host(|host| {
            if let Some(tree) = host.as_any_mut().downcast_mut::<MemoryViewTree>() {
                tree.attach_to_window(window);
            }
        })?;
        self.nav.host_started()?;
        self.nav.tick(Duration::ZERO)?;
        Ok(self)
    }

    pub fn resume(&mut self) -> Result<&mut Self> {
        self.nav.host_resumed()?;
        Ok(self)
    }

    pub fn pause(&mut self) -> Result<&mut Self> {
        self.nav.host_paused()?;
        Ok(self)
    }

    /// Stop the host; with `detach_view` the window also leaves the screen.
    pub fn stop(&mut self, detach_view: bool) -> Result<&mut Self> {
        self.nav.host_stopped()?;
        if detach_view {
            let window = self.window;
            self.nav.with_host(|host| {
                if let Some(tree) = host.as_any_mut().downcast_mut::<MemoryViewTree>() {
                    tree.detach_from_window(window);
                }
            })?;
        }
        Ok(self)
    }

    pub fn destroy(&mut self) -> Result<&mut Self> {
        self.nav.host_destroyed()?;
        Ok(self)
    }

    /// Tear the window down and rebuild it as a configuration change does.
    /// The router survives and re-hosts in the new container.
    pub fn rotate(&mut self) -> Result<&mut Self> {
        self.begin_rotation()?.finish_rotation()
    }

    /// First half of [`rotate`](Self::rotate): the window is gone and the
    /// root router is hostless until [`finish_rotation`](Self::finish_rotation).
    pub fn begin_rotation(&mut self) -> Result<&mut Self> {
        self.nav.set_changing_configurations(true);
        self.pause()?.stop(true)?.destroy()
    }

    pub fn finish_rotation(&mut self) -> Result<&mut Self> {
        let (window, container) = self.nav.with_host(|host| {
            let window = host.create_node(Some(WINDOW_KEY));
            let container = host.create_node(Some(CONTAINER_KEY));
            host.add_child(window, container, None);
            (window, container)
        })?;
        self.window = window;
        self.container = container;

        self.nav.host_created()?;
        self.router = self.nav.attach_router(container)?;
        self.start()?.resume()?;
        self.nav.set_changing_configurations(false);
        self.nav.configuration_changed()?;
        Ok(self)
    }

    #[must_use]
    pub fn router_id(&self) -> RouterId {
        self.router
    }

    pub fn router(&mut self) -> Router<'_> {
        self.nav.router(self.router)
    }

    #[must_use]
    pub fn container(&self) -> NodeId {
        self.container
    }

    #[must_use]
    pub fn window(&self) -> NodeId {
        self.window
    }

    #[must_use]
    pub fn tree(&self) -> Option<&MemoryViewTree> {
        self.nav.host_as::<MemoryViewTree>()
    }

    /// Create `controller` and push it onto the root router.
    pub fn push(&mut self, controller: impl Controller) -> Result<ControllerId> {
        let id = self.nav.create_controller(controller)?;
        self.router().push_controller(NavigationEntry::with(id.clone()))?;
        Ok(id)
    }

    /// The keyed child container inside a [`TestController`] view.
    #[must_use]
    pub fn child_container(&self, controller: &ControllerId) -> Option<NodeId> {
        let view = self.nav.view(controller)?;
        self.nav.host_ref().find_by_key(view, CHILD_CONTAINER)
    }

    /// Whether `node` is a direct child of the root container.
    #[must_use]
    pub fn is_in_container(&self, node: NodeId) -> bool {
        self.nav.host_ref().parent(node) == Some(self.container)
    }
}

fn window_with_container(tree: &mut MemoryViewTree) -> (NodeId, NodeId) {
    let window = tree.create_node(Some(WINDOW_KEY));
    let container = tree.create_node(Some(CONTAINER_KEY));
    tree.add_child(window, container, None);
    (window, container)
}
