#![forbid(unsafe_code)]

//! Nav: controller-based navigation for single-window view hierarchies.
//!
//! # Role in FrankenTUI
//! `ftui-nav` owns screen navigation. Screens are *controllers*: objects with
//! a lifecycle that own one view and may host nested navigation stacks.
//! A *router* binds a backstack of controllers to a container node and runs
//! interruptible transitions whenever that stack changes.
//!
//! # Primary responsibilities
//! - **Navigator**: arena of controllers and routers plus the view host;
//!   entry point for host lifecycle events, back presses, frame ticks, and
//!   save/restore.
//! - **Router**: push, pop, replace, and bulk `set_backstack` with minimal
//!   transitions.
//! - **Controller lifecycle**: create view, attach, detach, destroy view,
//!   destroy, with listener fan-out and lifecycle scopes.
//! - **Change handlers**: instant swaps, no-ops, and frame-driven animators,
//!   each interruptible mid-flight.
//!
//! # How it fits in the system
//! The host toolkit implements [`ViewHost`] and forwards its window events
//! (`host_created` .. `host_destroyed`) to the [`Navigator`]. Applications
//! implement [`Controller`] and register each type with a
//! [`ControllerRegistry`] so saved state can rebuild it.
//!
//! ```rust,ignore
//! let mut nav = Navigator::new(Box::new(tree))
//!     .with_controller_factory(registry);
//! nav.host_created()?;
//! let router = nav.attach_router(container)?;
//! let home = nav.create_controller(Home::default())?;
//! nav.router(router).set_root(NavigationEntry::with(home))?;
//! nav.host_started()?;
//! ```

pub mod attach;
pub mod backstack;
pub mod change;
pub mod command;
pub mod config;
pub mod controller;
pub mod entry;
pub mod error;
pub mod factory;
pub mod host;
pub mod indexer;
pub mod navigator;
pub mod router;
pub mod state;
mod transition;
pub mod view;

pub use backstack::Backstack;
pub use change::{
    AnimationStyle, AnimatorChangeHandler, ChangeContext, ChangeHandler, ChangeInfo, ChangeType,
    Easing, HandlerRecord, HandlerRegistry, NoOpChangeHandler, RestorableHandler,
    SimpleSwapChangeHandler, TimedStyle,
};
pub use command::CommandQueue;
pub use config::{NavConfig, NavConfigError};
pub use controller::{
    Controller, ControllerContext, ControllerEvent, ControllerFlags, ControllerId, LifecycleEvent,
    LifecycleListener, LifecycleState, ListenerId, RetainViewMode,
};
pub use entry::NavigationEntry;
pub use error::{NavError, Result};
pub use factory::{ControllerFactory, ControllerRegistry, RestorableController};
pub use host::{HostPhase, HostRequest};
pub use indexer::TransactionIndexer;
pub use navigator::Navigator;
pub use router::{ChangeEvent, ChangeListener, Router, RouterId};
pub use state::{ControllerRecord, EntryRecord, NavigatorState, RouterRecord, ViewStateRecord};
pub use view::{MemoryViewTree, NodeId, ViewHost};
