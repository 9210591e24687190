#![forbid(unsafe_code)]

//! `NavConfig` loaded from TOML files and applied to a live navigator.
//!
//! Run:
//!   cargo test -p ftui-nav --features toml-config --test config_toml

use std::fs;

use ftui_nav::{NavConfig, NavConfigError, Result, RetainViewMode};
use ftui_nav_harness::{HostProxy, TestController};
use tempfile::tempdir;

fn write_config(body: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("nav.toml");
    fs::write(&path, body).expect("write config");
    (dir, path)
}

#[test]
fn full_file_round_trips_every_field() {
    let (_dir, path) = write_config(
        r#"
pops_last_view = true
default_retain_mode = "retain_on_detach"
default_animation_ms = 120
max_pending_commands = 16
"#,
    );

    let config = NavConfig::from_toml_file(&path).unwrap();

    assert!(config.pops_last_view);
    assert_eq!(config.default_retain_mode, RetainViewMode::RetainOnDetach);
    assert_eq!(config.default_animation_ms, 120);
    assert_eq!(config.max_pending_commands, 16);
    assert!(config.validate().is_empty());
}

#[test]
fn missing_fields_fall_back_to_defaults() {
    let (_dir, path) = write_config("default_animation_ms = 50\n");

    let config = NavConfig::from_toml_file(&path).unwrap();

    assert_eq!(
        config,
        NavConfig {
            default_animation_ms: 50,
            ..NavConfig::default()
        }
    );
}

#[test]
fn malformed_toml_is_a_parse_error() {
    let (_dir, path) = write_config("pops_last_view = [not toml");

    let err = NavConfig::from_toml_file(&path).unwrap_err();

    assert!(matches!(err, NavConfigError::Toml(_)));
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempdir().unwrap();

    let err = NavConfig::from_toml_file(dir.path().join("absent.toml")).unwrap_err();

    assert!(matches!(err, NavConfigError::Io(_)));
}

#[test]
fn out_of_range_values_fail_validation() {
    let (_dir, path) = write_config("max_pending_commands = 0\ndefault_animation_ms = 90000\n");

    let err = NavConfig::from_toml_file(&path)
        .and_then(NavConfig::validated)
        .unwrap_err();

    let NavConfigError::Validation(errors) = err else {
        panic!("expected validation error, got {err:?}");
    };
    assert_eq!(errors.len(), 2);
}

#[test]
fn loaded_config_drives_navigator() -> Result<()> {
    let (_dir, path) = write_config(
        "pops_last_view = true\ndefault_retain_mode = \"retain_on_detach\"\n",
    );
    let config = NavConfig::from_toml_file(&path)
        .and_then(NavConfig::validated)
        .expect("valid config");

    let mut host = HostProxy::with_config(config)?;
    let root = host.push(TestController::new("root"))?;
    assert_eq!(host.nav.retain_view_mode(&root), Some(RetainViewMode::RetainOnDetach));
    assert!(host.router().pops_last_view());

    assert!(host.nav.handle_back()?);
    assert!(!host.router().has_root_controller());
    assert!(host.nav.is_destroyed(&root));
    Ok(())
}
