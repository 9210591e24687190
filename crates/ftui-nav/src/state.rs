#![forbid(unsafe_code)]

//! Persisted navigation state.
//!
//! State is a tree of plain records, one per router, entry, and controller,
//! serialized with `serde_json`. Records are produced by
//! [`Navigator::save_instance_state`](crate::Navigator::save_instance_state)
//! and consumed by
//! [`Navigator::restore_instance_state`](crate::Navigator::restore_instance_state);
//! nothing is shared between the live tree and a record.
//!
//! ```text
//! NavigatorState
//! └── RouterRecord (host_key, entries top to bottom, indexer)
//!     └── EntryRecord (handlers, tag, order_index)
//!         └── ControllerRecord (type_tag, args, instance_id, ...)
//!             └── RouterRecord (child routers) ...
//! ```
//!
//! # Invariants
//!
//! - Serialization is deterministic: saving, restoring, and saving again
//!   yields identical bytes.
//! - Entries are stored top to bottom and restored in reverse.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::change::HandlerRecord;
use crate::controller::ControllerId;
use crate::error::Result;
use crate::indexer::TransactionIndexer;

/// Toolkit hierarchy state plus the controller's own view state.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ViewStateRecord {
    #[serde(default)]
    pub hierarchy: Value,
    #[serde(default)]
    pub state: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerRecord {
    pub type_tag: String,
    #[serde(default)]
    pub args: Value,
    pub instance_id: ControllerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_instance_id: Option<ControllerId>,
    #[serde(default)]
    pub requested_permissions: Vec<String>,
    #[serde(default)]
    pub needs_attach: bool,
    /// [`RetainViewMode`](crate::RetainViewMode) ordinal.
    #[serde(default)]
    pub retain_mode: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_handler: Option<HandlerRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pop_handler: Option<HandlerRecord>,
    #[serde(default)]
    pub child_routers: Vec<RouterRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_state: Option<ViewStateRecord>,
    #[serde(default)]
    pub saved_state: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryRecord {
    pub controller: ControllerRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_handler: Option<HandlerRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pop_handler: Option<HandlerRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_index: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterRecord {
    /// Key of the container node, used to re-host the router.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// Top to bottom.
    #[serde(default)]
    pub entries: Vec<EntryRecord>,
    #[serde(default)]
    pub pops_last_view: bool,
    /// Present on root routers only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indexer: Option<TransactionIndexer>,
}

/// Everything a host persists across process death.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NavigatorState {
    #[serde(default)]
    pub routers: Vec<RouterRecord>,
}

impl NavigatorState {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_json(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
