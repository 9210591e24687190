#![forbid(unsafe_code)]

use serde_json::Value;

use super::{ChangeContext, ChangeHandler, RestorableHandler};
use crate::error::Result;

/// Completes immediately without touching any view.
///
/// Used when a router empties its stack without popping the last view; the
/// host is expected to hide or finish the container itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpChangeHandler;

impl ChangeHandler for NoOpChangeHandler {
    fn type_tag(&self) -> &str {
        Self::TYPE_TAG
    }

    fn perform_change(&mut self, cx: &mut ChangeContext<'_>) {
        cx.complete();
    }

    fn is_reusable(&self) -> bool {
        true
    }

    fn copy(&self) -> Box<dyn ChangeHandler> {
        Box::new(Self)
    }
}

impl RestorableHandler for NoOpChangeHandler {
    const TYPE_TAG: &'static str = "NoOpChangeHandler";

    fn from_config(_config: &Value) -> Result<Self> {
        Ok(Self)
    }
}
