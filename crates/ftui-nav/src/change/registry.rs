#![forbid(unsafe_code)]

//! Type-tag registry for restoring handlers from saved state.

use std::fmt;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    AnimatorChangeHandler, ChangeHandler, NoOpChangeHandler, SimpleSwapChangeHandler, TimedStyle,
};
use crate::error::{NavError, Result};

/// Persisted form of a handler: its type tag plus its own configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerRecord {
    pub type_tag: String,
    #[serde(default)]
    pub config: Value,
}

impl HandlerRecord {
    #[must_use]
    pub fn of(handler: &dyn ChangeHandler) -> Self {
        Self {
            type_tag: handler.type_tag().to_owned(),
            config: handler.save_config(),
        }
    }
}

/// A handler that can be rebuilt from its saved configuration.
pub trait RestorableHandler: ChangeHandler + Sized + 'static {
    const TYPE_TAG: &'static str;

    fn from_config(config: &Value) -> Result<Self>;
}

type HandlerCtor = Box<dyn Fn(&Value) -> Result<Box<dyn ChangeHandler>>>;

/// Maps handler type tags to constructors.
pub struct HandlerRegistry {
    ctors: AHashMap<String, HandlerCtor>,
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<&str> = self.ctors.keys().map(String::as_str).collect();
        tags.sort_unstable();
        f.debug_struct("HandlerRegistry").field("tags", &tags).finish()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl HandlerRegistry {
    /// Registry with no handlers.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            ctors: AHashMap::new(),
        }
    }

    /// Registry pre-populated with the built-in handlers.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register::<SimpleSwapChangeHandler>();
        registry.register::<NoOpChangeHandler>();
        registry.register::<AnimatorChangeHandler<TimedStyle>>();
        registry
    }

    pub fn register<H: RestorableHandler>(&mut self) -> &mut Self {
        self.register_with(H::TYPE_TAG, |config| {
            H::from_config(config).map(|h| Box::new(h) as Box<dyn ChangeHandler>)
        })
    }

    /// Register an explicit constructor for `type_tag`.
    pub fn register_with<F>(&mut self, type_tag: impl Into<String>, ctor: F) -> &mut Self
    where
        F: Fn(&Value) -> Result<Box<dyn ChangeHandler>> + 'static,
    {
        self.ctors.insert(type_tag.into(), Box::new(ctor));
        self
    }

    #[must_use]
    pub fn contains(&self, type_tag: &str) -> bool {
        self.ctors.contains_key(type_tag)
    }

    pub fn restore(&self, record: &HandlerRecord) -> Result<Box<dyn ChangeHandler>> {
        let ctor = self
            .ctors
            .get(&record.type_tag)
            .ok_or_else(|| NavError::UnknownHandler {
                type_tag: record.type_tag.clone(),
            })?;
        ctor(&record.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restores_built_in_handlers() {
        let registry = HandlerRegistry::with_defaults();
        let handler = SimpleSwapChangeHandler::new(false);
        let record = HandlerRecord::of(&handler);
        let restored = registry.restore(&record).unwrap();
        assert_eq!(restored.type_tag(), SimpleSwapChangeHandler::TYPE_TAG);
        assert!(!restored.removes_from_view_on_push());
        assert_eq!(HandlerRecord::of(restored.as_ref()), record);
    }

    #[test]
    fn unknown_tag_is_an_error() {
        let registry = HandlerRegistry::empty();
        let record = HandlerRecord {
            type_tag: "Fade".into(),
            config: Value::Null,
        };
        let err = registry.restore(&record).unwrap_err();
        assert!(matches!(err, NavError::UnknownHandler { .. }));
    }
}
