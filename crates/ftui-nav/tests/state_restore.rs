#![forbid(unsafe_code)]

//! Save and restore of whole navigation trees.
//!
//! Run:
//!   cargo test -p ftui-nav --test state_restore

use ftui_nav::{
    ControllerRegistry, HandlerRecord, HandlerRegistry, MemoryViewTree, NavError,
    NavigationEntry, Navigator, NavigatorState, Result, RetainViewMode,
};
use ftui_nav_harness::{HostProxy, MockChangeHandler, TestController};
use serde_json::Value;

/// root <- detail (tagged, mock handlers), detail targets root.
fn two_screen_host() -> Result<HostProxy> {
    let mut host = HostProxy::new()?;
    let root = host.push(TestController::new("root"))?;
    let detail = host.nav.create_controller(TestController::new("detail"))?;
    host.router().push_controller(
        NavigationEntry::with(detail.clone())
            .with_push_handler(MockChangeHandler::default())
            .with_pop_handler(MockChangeHandler::default().tagged("pop"))
            .with_tag("detail"),
    )?;
    host.nav.set_target_controller(&detail, &root)?;
    Ok(host)
}

/// Navigator that knows the fixture types but has no host events yet.
fn bare_navigator() -> Navigator {
    let mut controllers = ControllerRegistry::new();
    controllers.register::<TestController>();
    let mut handlers = HandlerRegistry::with_defaults();
    handlers.register::<MockChangeHandler>();
    Navigator::new(Box::new(MemoryViewTree::new()))
        .with_controller_factory(controllers)
        .with_handler_registry(handlers)
}

/// Parent with a two-entry child stack, covered by a second root entry.
fn nested_state() -> Result<NavigatorState> {
    let mut host = HostProxy::new()?;
    let parent = host.push(TestController::new("parent"))?;
    let container = host.child_container(&parent).expect("child container");
    let child_router = host.nav.child_router(&parent, container, None)?;
    for label in ["first", "second"] {
        let id = host.nav.create_controller(TestController::new(label))?;
        host.nav
            .router(child_router)
            .push_controller(NavigationEntry::with(id))?;
    }
    host.push(TestController::new("cover"))?;
    host.nav.save_instance_state()
}

#[test]
fn save_restore_save_is_byte_identical() -> Result<()> {
    let mut host = two_screen_host()?;
    let saved = host.nav.save_instance_state()?;
    let first = saved.to_json()?;

    let mut restored = HostProxy::restored(&saved)?;
    let second = restored.nav.save_instance_state()?.to_json()?;

    assert_eq!(first, second);
    Ok(())
}

#[test]
fn state_survives_json_bytes() -> Result<()> {
    let mut host = two_screen_host()?;
    let saved = host.nav.save_instance_state()?;

    let parsed = NavigatorState::from_json_bytes(&saved.to_json_bytes()?)?;

    assert_eq!(parsed, saved);
    Ok(())
}

#[test]
fn entries_are_stored_top_first() -> Result<()> {
    let mut host = two_screen_host()?;
    let saved = host.nav.save_instance_state()?;

    let entries = &saved.routers[0].entries;
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].tag.as_deref(), Some("detail"));
    assert_eq!(entries[0].controller.args["label"], Value::from("detail"));
    assert_eq!(entries[1].controller.args["label"], Value::from("root"));
    assert!(entries[0].controller.needs_attach);
    assert!(!entries[1].controller.needs_attach);
    assert_eq!(
        entries[0].pop_handler.as_ref().map(|h| h.type_tag.as_str()),
        Some("MockChangeHandler")
    );
    Ok(())
}

#[test]
fn restored_stack_matches_saved_stack() -> Result<()> {
    let mut host = two_screen_host()?;
    let before = host.router().controllers();
    let saved = host.nav.save_instance_state()?;

    let mut restored = HostProxy::restored(&saved)?;
    assert_eq!(restored.router().controllers(), before);

    let root = &before[0];
    let detail = &before[1];
    assert_eq!(restored.router().controller_with_tag("detail"), Some(detail.clone()));
    assert!(restored.nav.is_attached(detail));
    assert!(!restored.nav.is_attached(root));
    assert_eq!(restored.nav.target_controller(detail), Some(root.clone()));

    let view = restored.nav.view(detail).expect("top view inflated on restore");
    assert!(restored.is_in_container(view));
    Ok(())
}

#[test]
fn restored_entries_keep_handlers_and_order() -> Result<()> {
    let mut host = two_screen_host()?;
    let saved = host.nav.save_instance_state()?;

    let mut restored = HostProxy::restored(&saved)?;
    let router = restored.router();
    let top = router
        .backstack()
        .and_then(|backstack| backstack.peek())
        .expect("restored top entry");

    assert_eq!(top.tag(), Some("detail"));
    assert_eq!(top.pop_handler().map(|h| h.type_tag()), Some("MockChangeHandler"));
    assert_eq!(top.order_index(), saved.routers[0].entries[0].order_index);
    Ok(())
}

#[test]
fn retain_mode_and_permissions_are_restored() -> Result<()> {
    let mut host = HostProxy::new()?;
    let root = host.push(TestController::new("root"))?;
    host.nav.set_retain_view_mode(&root, RetainViewMode::RetainOnDetach)?;
    let mut saved = host.nav.save_instance_state()?;
    saved.routers[0].entries[0].controller.requested_permissions = vec!["camera".to_owned()];

    let restored = HostProxy::restored(&saved)?;

    assert_eq!(restored.nav.retain_view_mode(&root), Some(RetainViewMode::RetainOnDetach));
    assert_eq!(restored.nav.requested_permissions(&root), ["camera".to_owned()]);
    Ok(())
}

#[test]
fn nested_child_router_round_trip() -> Result<()> {
    let mut host = HostProxy::new()?;
    let parent = host.push(TestController::new("parent"))?;
    let container = host.child_container(&parent).expect("child container");
    let child_router = host.nav.child_router(&parent, container, None)?;
    let first = host.nav.create_controller(TestController::new("first"))?;
    let second = host.nav.create_controller(TestController::new("second"))?;
    host.nav
        .router(child_router)
        .push_controller(NavigationEntry::with(first.clone()))?;
    host.nav
        .router(child_router)
        .push_controller(NavigationEntry::with(second.clone()))?;

    let saved = host.nav.save_instance_state()?;
    assert_eq!(saved.routers[0].entries[0].controller.child_routers.len(), 1);

    let mut restored = HostProxy::restored(&saved)?;
    let routers = restored.nav.child_routers(&parent).to_vec();
    assert_eq!(routers.len(), 1);
    let child = restored.nav.router(routers[0]);
    assert_eq!(child.controllers(), vec![first.clone(), second.clone()]);
    assert_eq!(child.parent_controller(), Some(&parent));

    assert!(restored.nav.is_attached(&parent));
    assert!(restored.nav.is_attached(&second));
    assert!(!restored.nav.is_attached(&first));
    let view = restored.nav.view(&second).expect("child view");
    let child_container = restored.child_container(&parent).expect("new child container");
    assert_eq!(restored.nav.host_ref().parent(view), Some(child_container));

    let again = restored.nav.save_instance_state()?;
    assert_eq!(again.to_json()?, saved.to_json()?);
    Ok(())
}

#[test]
fn restore_rebuilds_after_rotation_mid_stack() -> Result<()> {
    let mut host = two_screen_host()?;
    host.rotate()?;
    let saved = host.nav.save_instance_state()?;

    let mut restored = HostProxy::restored(&saved)?;

    assert_eq!(restored.router().backstack_size(), 2);
    assert_eq!(
        restored.nav.save_instance_state()?.to_json()?,
        saved.to_json()?
    );
    Ok(())
}

#[test]
fn unknown_controller_type_fails_restore() -> Result<()> {
    let mut host = two_screen_host()?;
    let mut saved = host.nav.save_instance_state()?;
    saved.routers[0].entries[1].controller.type_tag = "GoneController".to_owned();

    let err = HostProxy::restored(&saved).unwrap_err();

    assert!(matches!(err, NavError::MissingConstructor { type_tag } if type_tag == "GoneController"));
    Ok(())
}

#[test]
fn unknown_handler_type_fails_restore() -> Result<()> {
    let mut host = two_screen_host()?;
    let mut saved = host.nav.save_instance_state()?;
    saved.routers[0].entries[0].push_handler = Some(HandlerRecord {
        type_tag: "GoneHandler".to_owned(),
        config: Value::Null,
    });

    let err = HostProxy::restored(&saved).unwrap_err();

    assert!(matches!(err, NavError::UnknownHandler { type_tag } if type_tag == "GoneHandler"));
    Ok(())
}

#[test]
fn controller_without_label_fails_instantiation() -> Result<()> {
    let mut host = two_screen_host()?;
    let mut saved = host.nav.save_instance_state()?;
    saved.routers[0].entries[0].controller.args = Value::Null;

    let err = HostProxy::restored(&saved).unwrap_err();

    assert!(matches!(err, NavError::Instantiation { ref type_tag, .. } if type_tag == "TestController"));
    assert!(!err.is_programmer_error());
    Ok(())
}

#[test]
fn malformed_json_is_a_state_error() {
    let err = NavigatorState::from_json("{\"routers\": 3}").unwrap_err();
    assert!(matches!(err, NavError::State(_)));
}

#[test]
fn failed_restore_leaves_navigator_empty() -> Result<()> {
    let mut host = two_screen_host()?;
    let good = host.nav.save_instance_state()?;
    let detail = good.routers[0].entries[0].controller.instance_id.clone();
    let root = good.routers[0].entries[1].controller.instance_id.clone();
    let mut bad = good.clone();
    bad.routers[0].entries[1].controller.type_tag = "GoneController".to_owned();

    let mut nav = bare_navigator();
    let err = nav.restore_instance_state(&bad).unwrap_err();

    assert!(matches!(err, NavError::MissingConstructor { .. }));
    assert!(nav.root_routers().is_empty());
    assert!(!nav.contains_controller(&detail));

    nav.restore_instance_state(&good)?;
    assert_eq!(nav.root_routers().len(), 1);
    let router = nav.root_routers()[0];
    assert_eq!(nav.router(router).controllers(), vec![root, detail]);
    Ok(())
}

#[test]
fn failed_restore_tears_down_bound_child_stacks() -> Result<()> {
    let good = nested_state()?;
    let parent_record = &good.routers[0].entries[1].controller;
    let children: Vec<_> = parent_record.child_routers[0]
        .entries
        .iter()
        .map(|entry| entry.controller.instance_id.clone())
        .collect();
    assert_eq!(children.len(), 2);
    let mut bad = good.clone();
    bad.routers[0].entries[1].pop_handler = Some(HandlerRecord {
        type_tag: "GoneHandler".to_owned(),
        config: Value::Null,
    });

    let mut nav = bare_navigator();
    let err = nav.restore_instance_state(&bad).unwrap_err();

    assert!(matches!(err, NavError::UnknownHandler { .. }));
    assert!(nav.root_routers().is_empty());
    for child in &children {
        assert!(!nav.contains_controller(child));
    }
    assert!(!nav.contains_controller(&parent_record.instance_id));

    nav.restore_instance_state(&good)?;
    assert_eq!(nav.child_routers(&parent_record.instance_id).len(), 1);
    Ok(())
}

#[test]
fn restoring_known_ids_twice_is_rejected() -> Result<()> {
    let mut host = two_screen_host()?;
    let saved = host.nav.save_instance_state()?;
    let mut nav = bare_navigator();
    nav.restore_instance_state(&saved)?;
    let router = nav.root_routers()[0];
    let before = nav.router(router).controllers();

    let err = nav.restore_instance_state(&saved).unwrap_err();

    let detail = &saved.routers[0].entries[0].controller.instance_id;
    assert!(matches!(err, NavError::ControllerIdTaken { ref controller } if controller == detail));
    assert!(err.to_string().contains("already known to this navigator"));
    assert_eq!(nav.root_routers(), &[router]);
    assert_eq!(nav.router(router).controllers(), before);
    assert!(!nav.is_destroyed(detail));
    Ok(())
}
