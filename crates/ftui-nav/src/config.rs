#![forbid(unsafe_code)]

//! Navigator configuration loaded from JSON or TOML.
//!
//! ```toml
//! # ftui-nav.toml
//! pops_last_view = false
//! default_retain_mode = "release_on_detach"
//! default_animation_ms = 250
//! max_pending_commands = 1024
//! ```
//!
//! ```rust,ignore
//! let config = NavConfig::from_toml_file("ftui-nav.toml")?;
//! let navigator = Navigator::with_config(Box::new(host), config);
//! ```
//!
//! Every field has a default, so a partial file only overrides what it names.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use web_time::Duration;

use crate::controller::RetainViewMode;

/// Tunables applied to every router created by a navigator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavConfig {
    /// Whether emptying a stack animates the final view out.
    pub pops_last_view: bool,
    /// Retain mode given to newly created controllers.
    pub default_retain_mode: RetainViewMode,
    /// Duration used by animated handlers configured with the host default.
    pub default_animation_ms: u64,
    /// Bound on navigation commands queued by hooks during one operation.
    pub max_pending_commands: usize,
}

impl Default for NavConfig {
    fn default() -> Self {
        Self {
            pops_last_view: false,
            default_retain_mode: RetainViewMode::ReleaseOnDetach,
            default_animation_ms: 300,
            max_pending_commands: 1024,
        }
    }
}

/// Errors that can occur when loading a [`NavConfig`].
#[derive(Debug, Error)]
pub enum NavConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "toml-config")]
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("validation errors: {}", .0.join("; "))]
    Validation(Vec<String>),
}

impl NavConfig {
    #[must_use]
    pub fn default_animation_duration(&self) -> Duration {
        Duration::from_millis(self.default_animation_ms)
    }

    pub fn from_json_str(s: &str) -> Result<Self, NavConfigError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, NavConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    #[cfg(feature = "toml-config")]
    pub fn from_toml_str(s: &str) -> Result<Self, NavConfigError> {
        Ok(toml::from_str(s)?)
    }

    #[cfg(feature = "toml-config")]
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, NavConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Check ranges. An empty list means the config is valid.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.max_pending_commands == 0 {
            errors.push("max_pending_commands must be > 0".into());
        }
        if self.default_animation_ms > 60_000 {
            errors.push(format!(
                "default_animation_ms must be <= 60000, got {}",
                self.default_animation_ms
            ));
        }
        errors
    }

    /// Return `self` if it validates, or every problem found.
    pub fn validated(self) -> Result<Self, NavConfigError> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(self)
        } else {
            Err(NavConfigError::Validation(errors))
        }
    }
}
