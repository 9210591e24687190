#![forbid(unsafe_code)]

//! Nav harness: reference host fixtures for exercising `ftui-nav`.
//!
//! # Role in FrankenTUI
//! `ftui-nav-harness` plays the part of a host toolkit in tests. It owns a
//! [`MemoryViewTree`](ftui_nav::MemoryViewTree) window, forwards window
//! lifecycle events to a [`Navigator`](ftui_nav::Navigator), and provides
//! controllers and change handlers whose behavior tests can observe.
//!
//! # Primary responsibilities
//! - **HostProxy**: create/start/resume/pause/stop/destroy and rotate a host
//!   window around one root router.
//! - **TestController**: counts every hook it receives.
//! - **Handlers**: a recording mock, plus handlers that never add the
//!   entering view or never complete on their own.
//!
//! # Example
//!
//! ```ignore
//! let mut host = HostProxy::new();
//! let a = host.push(TestController::new("a"))?;
//! host.stop(true)?;
//! assert!(host.nav.view(&a).is_none());
//! ```

mod controller;
mod handlers;
mod host;

pub use controller::{CHILD_CONTAINER, CallState, TestController};
pub use handlers::{
    ChangeHandlerHistory, HandlerCall, HandlerCallKind, MockChangeHandler,
    NeverAddChangeHandler, NeverCompleteChangeHandler, RecordingChangeListener,
};
pub use host::HostProxy;
