#![forbid(unsafe_code)]

//! Controllers must drop their views on every path that ends their screen
//! time: popped, popped mid-transition, host stopped, host destroyed.
//!
//! Run:
//!   cargo test -p ftui-nav --test view_leaks

use ftui_nav::{NavigationEntry, Result};
use ftui_nav_harness::{
    ChangeHandlerHistory, HostProxy, NeverAddChangeHandler, NeverCompleteChangeHandler,
    TestController,
};

fn released(host: &HostProxy, view: ftui_nav::NodeId) -> bool {
    host.tree().is_some_and(|tree| tree.is_released(view))
}

#[test]
fn pop_releases_view() -> Result<()> {
    let mut host = HostProxy::new()?;
    host.push(TestController::new("root"))?;
    let detail = host.push(TestController::new("detail"))?;
    let view = host.nav.view(&detail).expect("pushed controller has a view");
    assert!(host.is_in_container(view));

    host.router().pop_current_controller()?;

    assert!(host.nav.view(&detail).is_none());
    assert!(host.nav.is_destroyed(&detail));
    assert!(released(&host, view));
    assert!(!host.is_in_container(view));
    Ok(())
}

#[test]
fn pop_when_push_never_added_view() -> Result<()> {
    let mut host = HostProxy::new()?;
    host.push(TestController::new("root"))?;
    let detail = host.nav.create_controller(TestController::new("detail"))?;
    host.router()
        .push_controller(NavigationEntry::with(detail.clone()).with_push_handler(NeverAddChangeHandler))?;
    let view = host.nav.view(&detail).expect("view was created for the push");
    assert!(!host.nav.is_attached(&detail));

    host.router().pop_current_controller()?;

    assert!(host.nav.view(&detail).is_none());
    assert!(released(&host, view));
    Ok(())
}

#[test]
fn pop_when_push_never_completed() -> Result<()> {
    let mut host = HostProxy::new()?;
    host.push(TestController::new("root"))?;
    let detail = host.nav.create_controller(TestController::new("detail"))?;
    host.router().push_controller(
        NavigationEntry::with(detail.clone())
            .with_push_handler(NeverCompleteChangeHandler::default()),
    )?;
    assert!(host.router().is_changing());
    let view = host.nav.view(&detail).expect("view added by the running push");

    host.router().pop_current_controller()?;

    assert!(!host.router().is_changing());
    assert!(host.nav.view(&detail).is_none());
    assert!(released(&host, view));
    Ok(())
}

#[test]
fn host_stop_releases_view() -> Result<()> {
    let mut host = HostProxy::new()?;
    let root = host.push(TestController::new("root"))?;
    let view = host.nav.view(&root).expect("root view");

    host.pause()?.stop(true)?;

    assert!(host.nav.view(&root).is_none());
    assert!(!host.nav.is_destroyed(&root));
    assert!(released(&host, view));
    Ok(())
}

#[test]
fn host_stop_keeps_view_while_window_stays() -> Result<()> {
    let mut host = HostProxy::new()?;
    let root = host.push(TestController::new("root"))?;

    host.pause()?.stop(false)?;

    assert!(host.nav.view(&root).is_some());
    assert!(!host.nav.is_attached(&root));

    host.start()?;
    assert!(host.nav.is_attached(&root));
    Ok(())
}

#[test]
fn host_stop_when_push_never_completed() -> Result<()> {
    let mut host = HostProxy::new()?;
    host.push(TestController::new("root"))?;
    let history = ChangeHandlerHistory::new();
    let detail = host.nav.create_controller(TestController::new("detail"))?;
    host.router().push_controller(
        NavigationEntry::with(detail.clone())
            .with_push_handler(NeverCompleteChangeHandler::new(history.clone())),
    )?;

    host.pause()?.stop(true)?;

    assert!(host.nav.view(&detail).is_none());
    Ok(())
}

#[test]
fn host_destroy_when_push_never_added_view() -> Result<()> {
    let mut host = HostProxy::new()?;
    host.push(TestController::new("root"))?;
    let detail = host.nav.create_controller(TestController::new("detail"))?;
    host.router()
        .push_controller(NavigationEntry::with(detail.clone()).with_push_handler(NeverAddChangeHandler))?;
    let view = host.nav.view(&detail).expect("view was created for the push");

    host.pause()?.stop(true)?.destroy()?;

    assert!(host.nav.view(&detail).is_none());
    assert!(host.nav.is_destroyed(&detail));
    assert!(released(&host, view));
    Ok(())
}

#[test]
fn host_destroy_releases_every_view() -> Result<()> {
    let mut host = HostProxy::new()?;
    let root = host.push(TestController::new("root"))?;
    let detail = host.push(TestController::new("detail"))?;
    let view = host.nav.view(&detail).expect("detail view");

    host.pause()?.stop(true)?.destroy()?;

    assert!(host.nav.is_destroyed(&root));
    assert!(host.nav.is_destroyed(&detail));
    assert!(released(&host, view));
    let container = host.container();
    let tree = host.tree().expect("memory tree host");
    assert!(tree.children(container).is_empty());
    Ok(())
}
