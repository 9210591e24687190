#![forbid(unsafe_code)]

//! Router stack operations against a started host.
//!
//! Covers:
//! - set_root / push / pop / replace_top bookkeeping
//! - pop_to_tag, pop_to_root, bulk set_backstack
//! - back handling
//! - change listeners, including snapshot semantics and queued commands
//! - interruption of a running push
//! - pushes while hostless, replayed by rebind
//! - a push whose view cannot be built
//!
//! Run:
//!   cargo test -p ftui-nav --test router_ops

use std::cell::Cell;

use ftui_nav::{
    ChangeEvent, ChangeListener, CommandQueue, Controller, ControllerContext, ControllerId,
    ControllerRegistry, MemoryViewTree, NavError, NavigationEntry, Navigator, NodeId,
    RestorableController, Result, RouterId, ViewHost,
};
use ftui_nav_harness::{
    ChangeHandlerHistory, HandlerCallKind, HostProxy, MockChangeHandler,
    NeverCompleteChangeHandler, RecordingChangeListener, TestController,
};

fn create(host: &mut HostProxy, label: &str) -> Result<ControllerId> {
    host.nav.create_controller(TestController::new(label))
}

// ============================================================================
// Push / pop
// ============================================================================

#[test]
fn set_root_installs_single_entry() -> Result<()> {
    let mut host = HostProxy::new()?;
    let root = create(&mut host, "root")?;
    host.router().set_root(NavigationEntry::with(root.clone()))?;

    let router = host.router();
    assert!(router.has_root_controller());
    assert_eq!(router.backstack_size(), 1);
    assert_eq!(router.top_controller(), Some(root.clone()));
    assert!(host.nav.is_attached(&root));
    Ok(())
}

#[test]
fn set_root_replaces_existing_stack() -> Result<()> {
    let mut host = HostProxy::new()?;
    let a = host.push(TestController::new("a"))?;
    let b = host.push(TestController::new("b"))?;
    let root = create(&mut host, "root")?;

    host.router().set_root(NavigationEntry::with(root.clone()))?;

    assert_eq!(host.router().controllers(), vec![root.clone()]);
    assert!(host.nav.is_destroyed(&a));
    assert!(host.nav.is_destroyed(&b));
    assert!(host.nav.is_attached(&root));
    Ok(())
}

#[test]
fn push_hides_previous_top_and_pop_reveals_it() -> Result<()> {
    let mut host = HostProxy::new()?;
    let a = host.push(TestController::new("a"))?;
    let b = host.push(TestController::new("b"))?;
    let c = host.push(TestController::new("c"))?;

    assert_eq!(host.router().backstack_size(), 3);
    assert!(host.nav.is_attached(&c));
    assert!(!host.nav.is_attached(&b));
    assert!(host.nav.view(&b).is_none());

    assert!(host.router().pop_current_controller()?);
    assert_eq!(host.router().backstack_size(), 2);
    assert_eq!(host.router().top_controller(), Some(b.clone()));
    assert!(host.nav.is_destroyed(&c));
    assert!(host.nav.is_attached(&b));
    let view = host.nav.view(&b).expect("revealed controller has a view");
    assert!(host.is_in_container(view));
    assert!(!host.nav.is_attached(&a));
    Ok(())
}

#[test]
fn pop_specific_controller_below_top() -> Result<()> {
    let mut host = HostProxy::new()?;
    let a = host.push(TestController::new("a"))?;
    let b = host.push(TestController::new("b"))?;
    let c = host.push(TestController::new("c"))?;

    assert!(host.router().pop_controller(&b)?);

    assert_eq!(host.router().controllers(), vec![a, c.clone()]);
    assert!(host.nav.is_destroyed(&b));
    assert!(host.nav.is_attached(&c));
    Ok(())
}

#[test]
fn popping_last_controller_empties_stack() -> Result<()> {
    let mut host = HostProxy::new()?;
    let root = host.push(TestController::new("root"))?;

    assert!(!host.router().pop_current_controller()?);

    assert_eq!(host.router().backstack_size(), 0);
    assert!(!host.router().has_root_controller());
    assert!(host.nav.is_destroyed(&root));
    Ok(())
}

#[test]
fn pop_on_empty_stack_is_an_error() -> Result<()> {
    let mut host = HostProxy::new()?;
    let err = host.router().pop_current_controller().unwrap_err();
    assert!(matches!(err, NavError::EmptyBackstack { .. }));
    Ok(())
}

#[test]
fn pop_of_unknown_entry_is_an_error() -> Result<()> {
    let mut host = HostProxy::new()?;
    host.push(TestController::new("root"))?;
    let stray = create(&mut host, "stray")?;
    let err = host.router().pop_controller(&stray).unwrap_err();
    assert!(matches!(err, NavError::NotOnStack { controller } if controller == stray));
    Ok(())
}

#[test]
fn pushing_same_controller_twice_is_rejected() -> Result<()> {
    let mut host = HostProxy::new()?;
    let a = host.push(TestController::new("a"))?;
    let err = host
        .router()
        .push_controller(NavigationEntry::with(a.clone()))
        .unwrap_err();
    assert!(matches!(err, NavError::DuplicateController { controller } if controller == a));
    assert_eq!(host.router().backstack_size(), 1);
    Ok(())
}

#[test]
fn destroyed_controllers_are_forgotten() -> Result<()> {
    let mut host = HostProxy::new()?;
    host.push(TestController::new("root"))?;
    let b = host.push(TestController::new("b"))?;
    host.router().pop_current_controller()?;

    assert!(!host.nav.contains_controller(&b));
    let err = host
        .router()
        .push_controller(NavigationEntry::with(b))
        .unwrap_err();
    assert!(matches!(err, NavError::UnknownController { .. }));
    Ok(())
}

#[test]
fn replace_top_destroys_old_top() -> Result<()> {
    let mut host = HostProxy::new()?;
    let a = host.push(TestController::new("a"))?;
    let b = host.push(TestController::new("b"))?;
    let c = create(&mut host, "c")?;

    host.router()
        .replace_top_controller(NavigationEntry::with(c.clone()))?;

    assert_eq!(host.router().controllers(), vec![a.clone(), c.clone()]);
    assert!(host.nav.is_destroyed(&b));
    assert!(host.nav.is_attached(&c));
    assert!(host.nav.view(&a).is_none());
    Ok(())
}

#[test]
fn replace_top_removes_views_left_visible_by_old_top() -> Result<()> {
    let mut host = HostProxy::new()?;
    let a = host.push(TestController::new("a"))?;
    let overlay = create(&mut host, "overlay")?;
    host.router().push_controller(
        NavigationEntry::with(overlay.clone())
            .with_push_handler(MockChangeHandler::default().keeping_from_view()),
    )?;
    assert!(host.nav.is_attached(&a));
    assert!(host.nav.is_attached(&overlay));

    let c = create(&mut host, "c")?;
    host.router()
        .replace_top_controller(NavigationEntry::with(c.clone()))?;

    assert!(host.nav.is_attached(&c));
    assert!(!host.nav.is_attached(&a));
    assert!(host.nav.is_destroyed(&overlay));
    Ok(())
}

// ============================================================================
// Bulk operations
// ============================================================================

#[test]
fn pop_to_tag_keeps_tagged_entry_on_top() -> Result<()> {
    let mut host = HostProxy::new()?;
    let a = host.push(TestController::new("a"))?;
    let b = create(&mut host, "b")?;
    host.router()
        .push_controller(NavigationEntry::with(b.clone()).with_tag("b"))?;
    let c = host.push(TestController::new("c"))?;
    let d = host.push(TestController::new("d"))?;

    assert_eq!(host.router().controller_with_tag("b"), Some(b.clone()));
    assert!(host.router().pop_to_tag("b")?);

    assert_eq!(host.router().controllers(), vec![a, b.clone()]);
    assert!(host.nav.is_attached(&b));
    assert!(host.nav.is_destroyed(&c));
    assert!(host.nav.is_destroyed(&d));

    assert!(!host.router().pop_to_tag("missing")?);
    assert_eq!(host.router().backstack_size(), 2);
    Ok(())
}

#[test]
fn pop_to_root_uses_supplied_handler() -> Result<()> {
    let mut host = HostProxy::new()?;
    let a = host.push(TestController::new("a"))?;
    host.push(TestController::new("b"))?;
    host.push(TestController::new("c"))?;
    let history = ChangeHandlerHistory::new();

    assert!(
        host.router()
            .pop_to_root_with(MockChangeHandler::new(history.clone()).tagged("to-root"))?
    );

    assert_eq!(host.router().controllers(), vec![a.clone()]);
    assert!(host.nav.is_attached(&a));
    let call = history.latest().expect("handler ran");
    assert_eq!(call.kind, HandlerCallKind::Perform);
    assert!(!call.is_push);
    assert_eq!(call.tag.as_deref(), Some("to-root"));
    assert_eq!(call.to, host.nav.view(&a));

    assert!(!host.router().pop_to_root()?);
    Ok(())
}

#[test]
fn set_backstack_shows_only_new_top() -> Result<()> {
    let mut host = HostProxy::new()?;
    let a = create(&mut host, "a")?;
    let b = create(&mut host, "b")?;
    let c = create(&mut host, "c")?;

    host.router().set_backstack(
        vec![
            NavigationEntry::with(a.clone()),
            NavigationEntry::with(b.clone()),
            NavigationEntry::with(c.clone()),
        ],
        None,
    )?;

    assert_eq!(host.router().controllers(), vec![a.clone(), b.clone(), c.clone()]);
    assert!(host.nav.is_attached(&c));
    assert!(host.nav.view(&a).is_none());
    assert!(host.nav.view(&b).is_none());

    let indices: Vec<u64> = host
        .router()
        .backstack()
        .expect("live router")
        .iter_bottom_up()
        .filter_map(NavigationEntry::order_index)
        .collect();
    assert_eq!(indices.len(), 3);
    assert!(indices.windows(2).all(|w| w[0] < w[1]));
    Ok(())
}

#[test]
fn set_backstack_destroys_dropped_controllers() -> Result<()> {
    let mut host = HostProxy::new()?;
    let a = host.push(TestController::new("a"))?;
    let b = host.push(TestController::new("b"))?;
    let c = host.push(TestController::new("c"))?;
    let d = create(&mut host, "d")?;

    host.router().set_backstack(
        vec![NavigationEntry::with(a.clone()), NavigationEntry::with(d.clone())],
        None,
    )?;

    assert_eq!(host.router().controllers(), vec![a.clone(), d.clone()]);
    assert!(host.nav.is_destroyed(&b));
    assert!(host.nav.is_destroyed(&c));
    assert!(host.nav.is_attached(&d));
    Ok(())
}

#[test]
fn set_backstack_keeps_order_index_of_relisted_entries() -> Result<()> {
    let mut host = HostProxy::new()?;
    let a = host.push(TestController::new("a"))?;
    let b = host.push(TestController::new("b"))?;
    let index_of = |host: &mut HostProxy, id: &ControllerId| {
        host.router()
            .backstack()
            .and_then(|stack| stack.get(id))
            .and_then(NavigationEntry::order_index)
    };
    let a_index = index_of(&mut host, &a);

    host.router().set_backstack(
        vec![NavigationEntry::with(a.clone()), NavigationEntry::with(b.clone())],
        None,
    )?;

    assert_eq!(index_of(&mut host, &a), a_index);
    assert!(host.nav.is_attached(&b));
    Ok(())
}

#[test]
fn set_backstack_rejects_duplicates() -> Result<()> {
    let mut host = HostProxy::new()?;
    let a = create(&mut host, "a")?;
    let err = host
        .router()
        .set_backstack(
            vec![NavigationEntry::with(a.clone()), NavigationEntry::with(a.clone())],
            None,
        )
        .unwrap_err();
    assert!(matches!(err, NavError::DuplicateController { .. }));
    assert_eq!(host.router().backstack_size(), 0);
    Ok(())
}

#[test]
fn set_backstack_to_empty_pops_everything() -> Result<()> {
    let mut host = HostProxy::new()?;
    let a = host.push(TestController::new("a"))?;
    let b = host.push(TestController::new("b"))?;

    host.router().set_backstack(Vec::new(), None)?;

    assert_eq!(host.router().backstack_size(), 0);
    assert!(host.nav.is_destroyed(&a));
    assert!(host.nav.is_destroyed(&b));
    Ok(())
}

// ============================================================================
// Back handling
// ============================================================================

#[test]
fn back_pops_until_root() -> Result<()> {
    let mut host = HostProxy::new()?;
    let a = host.push(TestController::new("a"))?;
    let b = host.push(TestController::new("b"))?;

    assert!(host.nav.handle_back()?);
    assert!(host.nav.is_destroyed(&b));
    assert!(!host.nav.handle_back()?);
    assert_eq!(host.router().controllers(), vec![a]);
    Ok(())
}

#[test]
fn back_consumed_by_controller_leaves_stack() -> Result<()> {
    let mut host = HostProxy::new()?;
    host.push(TestController::new("a"))?;
    let b = host.push(TestController::new("b").consuming_back())?;

    assert!(host.nav.handle_back()?);
    assert_eq!(host.router().top_controller(), Some(b));
    assert_eq!(host.router().backstack_size(), 2);
    Ok(())
}

#[test]
fn back_pops_last_view_when_enabled() -> Result<()> {
    let mut host = HostProxy::new()?;
    host.router().set_pops_last_view(true)?;
    let a = host.push(TestController::new("a"))?;

    assert!(host.nav.handle_back()?);
    assert!(host.nav.is_destroyed(&a));
    assert_eq!(host.router().backstack_size(), 0);
    Ok(())
}

// ============================================================================
// Listeners and interruption
// ============================================================================

#[test]
fn listener_sees_start_and_completion() -> Result<()> {
    let mut host = HostProxy::new()?;
    let listener = RecordingChangeListener::new();
    let id = host.router().add_change_listener(listener.clone())?;

    let a = host.push(TestController::new("a"))?;
    let b = host.push(TestController::new("b"))?;

    let events = listener.events();
    assert_eq!(events.len(), 4);
    let (started, event) = &events[2];
    assert!(*started);
    assert_eq!(event.from.as_ref(), Some(&a));
    assert_eq!(event.to.as_ref(), Some(&b));
    assert!(event.is_push);
    assert_eq!(event.handler, "SimpleSwapChangeHandler");
    assert_eq!(events[3], (false, event.clone()));

    host.router().remove_change_listener(id);
    host.router().pop_current_controller()?;
    assert_eq!(listener.events().len(), 4);
    Ok(())
}

#[test]
fn removed_listener_still_hears_completion_of_started_change() -> Result<()> {
    let mut host = HostProxy::new()?;
    host.push(TestController::new("a"))?;
    let listener = RecordingChangeListener::new();
    let id = host.router().add_change_listener(listener.clone())?;

    let b = host.nav.create_controller(TestController::new("b"))?;
    host.router().push_controller(
        NavigationEntry::with(b.clone()).with_push_handler(NeverCompleteChangeHandler::default()),
    )?;
    assert_eq!(listener.events().len(), 1);

    host.router().remove_change_listener(id);
    host.push(TestController::new("c"))?;

    let completed = listener.completed();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].to.as_ref(), Some(&b));
    assert_eq!(listener.events().len(), 2);
    Ok(())
}

struct PopOnArrival {
    router: RouterId,
    target: ControllerId,
    fired: Cell<bool>,
}

impl ChangeListener for PopOnArrival {
    fn on_change_completed(&self, commands: &mut CommandQueue, event: &ChangeEvent) {
        if event.to.as_ref() == Some(&self.target) && !self.fired.replace(true) {
            commands.pop_current_controller(self.router);
        }
    }
}

#[test]
fn listener_navigation_runs_after_the_change() -> Result<()> {
    let mut host = HostProxy::new()?;
    let a = host.push(TestController::new("a"))?;
    let b = create(&mut host, "b")?;
    let router = host.router_id();
    host.router().add_change_listener(PopOnArrival {
        router,
        target: b.clone(),
        fired: Cell::new(false),
    })?;

    host.router()
        .push_controller(NavigationEntry::with(b.clone()))?;

    assert_eq!(host.router().controllers(), vec![a.clone()]);
    assert!(host.nav.is_destroyed(&b));
    assert!(host.nav.is_attached(&a));
    Ok(())
}

#[test]
fn second_push_aborts_running_push_once() -> Result<()> {
    let mut host = HostProxy::new()?;
    host.push(TestController::new("a"))?;
    let history = ChangeHandlerHistory::new();
    let b = create(&mut host, "b")?;
    host.router().push_controller(
        NavigationEntry::with(b.clone())
            .with_push_handler(NeverCompleteChangeHandler::new(history.clone())),
    )?;
    assert!(host.router().is_changing());

    let c = host.push(TestController::new("c"))?;
    host.push(TestController::new("d"))?;

    assert_eq!(history.count(HandlerCallKind::Perform), 1);
    assert_eq!(history.count(HandlerCallKind::AbortPush), 1);
    assert_eq!(history.count(HandlerCallKind::CompleteImmediately), 0);
    assert!(!host.nav.is_attached(&c));
    assert!(!host.router().is_changing());
    Ok(())
}

#[test]
fn pop_interrupting_running_pop_completes_it() -> Result<()> {
    let mut host = HostProxy::new()?;
    host.push(TestController::new("a"))?;
    host.push(TestController::new("b"))?;
    let history = ChangeHandlerHistory::new();
    let c = create(&mut host, "c")?;
    host.router().push_controller(
        NavigationEntry::with(c.clone())
            .with_pop_handler(NeverCompleteChangeHandler::new(history.clone())),
    )?;

    host.router().pop_current_controller()?;
    assert!(host.router().is_changing());
    host.router().pop_current_controller()?;

    assert_eq!(history.count(HandlerCallKind::CompleteImmediately), 1);
    assert_eq!(history.count(HandlerCallKind::AbortPush), 0);
    assert_eq!(host.router().backstack_size(), 1);
    Ok(())
}

// ============================================================================
// Hostless
// ============================================================================

#[test]
fn push_while_hostless_shows_after_rebind() -> Result<()> {
    let mut host = HostProxy::new()?;
    let root = host.push(TestController::new("root"))?;
    host.begin_rotation()?;

    let detail = TestController::new("detail");
    let calls = detail.calls();
    let detail = host.push(detail)?;
    assert!(host.nav.view(&detail).is_none());
    assert_eq!(calls.borrow().create_view, 0);

    host.finish_rotation()?;
    host.router().rebind_if_needed()?;
    host.router().rebind_if_needed()?;

    assert_eq!(host.router().controllers(), vec![root.clone(), detail.clone()]);
    assert!(host.nav.is_attached(&detail));
    assert!(!host.nav.is_attached(&root));
    assert!(host.nav.view(&root).is_none());
    let view = host.nav.view(&detail).expect("detail view");
    assert!(host.is_in_container(view));
    let shown = host
        .tree()
        .map(|tree| tree.children(host.container()).len());
    assert_eq!(shown, Some(1));

    let calls = calls.borrow();
    assert_eq!(calls.create_view, 1);
    assert_eq!(calls.attach, 1);
    Ok(())
}

// ============================================================================
// Broken views
// ============================================================================

/// Hands back the container it was asked to fill.
struct ContainerAsView;

impl Controller for ContainerAsView {
    fn type_tag(&self) -> &str {
        Self::TYPE_TAG
    }

    fn create_view(
        &mut self,
        _cx: &mut ControllerContext<'_>,
        container: NodeId,
        _saved_view_state: Option<&serde_json::Value>,
    ) -> NodeId {
        container
    }
}

impl RestorableController for ContainerAsView {
    const TYPE_TAG: &'static str = "ContainerAsView";

    fn from_args(_args: &serde_json::Value) -> Result<Self> {
        Ok(Self)
    }
}

#[test]
fn push_of_view_that_is_its_container_leaves_stack_unchanged() -> Result<()> {
    let mut tree = MemoryViewTree::new();
    let window = tree.create_node(Some("window"));
    let container = tree.create_node(Some("container"));
    tree.add_child(window, container, None);
    tree.attach_to_window(window);
    let mut controllers = ControllerRegistry::new();
    controllers.register::<TestController>();
    controllers.register::<ContainerAsView>();
    let mut nav = Navigator::new(Box::new(tree)).with_controller_factory(controllers);
    nav.host_created()?;
    nav.host_started()?;
    nav.host_resumed()?;
    let router = nav.attach_router(container)?;

    let root = nav.create_controller(TestController::new("root"))?;
    nav.router(router)
        .push_controller(NavigationEntry::with(root.clone()))?;
    let listener = RecordingChangeListener::new();
    nav.router(router).add_change_listener(listener.clone())?;

    let broken = nav.create_controller(ContainerAsView)?;
    let err = nav
        .router(router)
        .push_controller(NavigationEntry::with(broken.clone()))
        .unwrap_err();

    assert!(matches!(err, NavError::ViewIsContainer { ref controller } if *controller == broken));
    assert!(err.is_programmer_error());
    assert_eq!(nav.router(router).controllers(), vec![root.clone()]);
    assert!(nav.is_destroyed(&broken));
    assert!(nav.is_attached(&root));
    assert!(listener.events().is_empty());
    Ok(())
}
