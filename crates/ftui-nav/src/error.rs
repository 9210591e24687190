#![forbid(unsafe_code)]

//! Error taxonomy for navigation operations.
//!
//! Contract violations (`MissingConstructor`, `TargetAlreadySet`,
//! `NotOnStack`, `ViewIsContainer`, ...) fail fast and are not meant to be
//! recovered from. `Instantiation` wraps a construction failure during state
//! restore. `OutOfScope` is the one recoverable condition: the caller asked
//! for a lifecycle scope the controller has already left.

use thiserror::Error;

use crate::controller::{ControllerEvent, ControllerId};
use crate::router::RouterId;

pub type Result<T> = std::result::Result<T, NavError>;

/// Boxed cause carried by [`NavError::Instantiation`].
pub type BoxedCause = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum NavError {
    #[error("no constructor registered for controller type `{type_tag}`")]
    MissingConstructor { type_tag: String },

    #[error("no change handler registered for type `{type_tag}`")]
    UnknownHandler { type_tag: String },

    #[error("target controller already set on {controller}; a target may only be set once")]
    TargetAlreadySet { controller: ControllerId },

    #[error("controller {controller} is not on the backstack")]
    NotOnStack { controller: ControllerId },

    #[error("create_view for {controller} returned the parent container")]
    ViewIsContainer { controller: ControllerId },

    #[error("controller {controller} already exists on a backstack")]
    DuplicateController { controller: ControllerId },

    #[error("controller id {controller} is already known to this navigator")]
    ControllerIdTaken { controller: ControllerId },

    #[error("cannot push controller {controller}: it has already been destroyed")]
    ControllerDestroyed { controller: ControllerId },

    #[error("router {router} has no controllers on its backstack")]
    EmptyBackstack { router: RouterId },

    #[error("unknown controller {controller}")]
    UnknownController { controller: ControllerId },

    #[error("unknown router {router}")]
    UnknownRouter { router: RouterId },

    #[error("router {router} has been destroyed")]
    RouterDestroyed { router: RouterId },

    #[error("child router container has no key; set a key on the container node")]
    ContainerWithoutKey,

    #[error("navigation command queue exceeded {limit} commands in one operation")]
    CommandOverflow { limit: usize },

    #[error("failed to instantiate `{type_tag}`: {source}")]
    Instantiation {
        type_tag: String,
        #[source]
        source: BoxedCause,
    },

    #[error("lifecycle scope ended (last event: {last_event:?})")]
    OutOfScope { last_event: Option<ControllerEvent> },

    #[error("malformed navigation state: {0}")]
    State(#[from] serde_json::Error),
}

impl NavError {
    /// Wrap a construction failure for `type_tag`.
    #[must_use]
    pub fn instantiation(
        type_tag: impl Into<String>,
        source: impl Into<BoxedCause>,
    ) -> Self {
        Self::Instantiation {
            type_tag: type_tag.into(),
            source: source.into(),
        }
    }

    /// Whether this error is a contract violation by the caller.
    #[must_use]
    pub fn is_programmer_error(&self) -> bool {
        !matches!(
            self,
            Self::Instantiation { .. } | Self::OutOfScope { .. } | Self::State(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::NavError;
    use crate::controller::ControllerId;

    #[test]
    fn instantiation_chains_its_cause() {
        let err = NavError::instantiation("Detail", "bad args");
        assert_eq!(err.to_string(), "failed to instantiate `Detail`: bad args");
        let source = err.source().expect("cause is chained");
        assert_eq!(source.to_string(), "bad args");
        assert!(!err.is_programmer_error());
    }

    #[test]
    fn target_already_set_names_controller() {
        let id = ControllerId::from("abc");
        let err = NavError::TargetAlreadySet { controller: id };
        assert!(err.to_string().contains("abc"));
        assert!(err.to_string().contains("already set"));
        assert!(err.is_programmer_error());
    }
}
