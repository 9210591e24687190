#![forbid(unsafe_code)]

//! Construction of controllers by type tag.
//!
//! Restoring saved state has to rebuild controllers from a type tag and
//! their persisted arguments. A [`ControllerFactory`] does that.
//! [`ControllerRegistry`] is the stock factory: an explicit table built at
//! startup and handed to the navigator, with no global state.
//!
//! Every controller type the application creates must be registered. The
//! navigator checks the registry when a controller is created, so a type
//! that could never be restored fails immediately with
//! [`NavError::MissingConstructor`] instead of at the next restore.

use std::fmt;

use ahash::AHashMap;
use serde_json::Value;

use crate::controller::Controller;
use crate::error::{NavError, Result};

/// Resolves a type tag plus construction arguments into a controller.
pub trait ControllerFactory {
    /// Whether `type_tag` can be instantiated.
    fn contains(&self, type_tag: &str) -> bool;

    fn instantiate(&self, type_tag: &str, args: &Value) -> Result<Box<dyn Controller>>;
}

/// A controller that can be rebuilt from its persisted arguments.
pub trait RestorableController: Controller + Sized {
    const TYPE_TAG: &'static str;

    fn from_args(args: &Value) -> Result<Self>;
}

type ControllerCtor = Box<dyn Fn(&Value) -> Result<Box<dyn Controller>>>;

/// Type tag to constructor table.
#[derive(Default)]
pub struct ControllerRegistry {
    ctors: AHashMap<String, ControllerCtor>,
}

impl fmt::Debug for ControllerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<&str> = self.ctors.keys().map(String::as_str).collect();
        tags.sort_unstable();
        f.debug_struct("ControllerRegistry")
            .field("tags", &tags)
            .finish()
    }
}

impl ControllerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<C: RestorableController>(&mut self) -> &mut Self {
        self.register_with(C::TYPE_TAG, |args| {
            C::from_args(args).map(|c| Box::new(c) as Box<dyn Controller>)
        })
    }

    pub fn register_with<F>(&mut self, type_tag: impl Into<String>, ctor: F) -> &mut Self
    where
        F: Fn(&Value) -> Result<Box<dyn Controller>> + 'static,
    {
        self.ctors.insert(type_tag.into(), Box::new(ctor));
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ctors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ctors.is_empty()
    }
}

impl ControllerFactory for ControllerRegistry {
    fn contains(&self, type_tag: &str) -> bool {
        self.ctors.contains_key(type_tag)
    }

    fn instantiate(&self, type_tag: &str, args: &Value) -> Result<Box<dyn Controller>> {
        let ctor = self
            .ctors
            .get(type_tag)
            .ok_or_else(|| NavError::MissingConstructor {
                type_tag: type_tag.to_owned(),
            })?;
        let controller = ctor(args)?;
        if controller.type_tag() != type_tag {
            return Err(NavError::instantiation(
                type_tag,
                format!(
                    "constructor produced a controller tagged `{}`",
                    controller.type_tag()
                ),
            ));
        }
        Ok(controller)
    }
}
