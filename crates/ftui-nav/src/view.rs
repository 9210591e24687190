#![forbid(unsafe_code)]

//! The host toolkit's view hierarchy, reduced to what navigation needs.
//!
//! Navigation never renders. It creates nodes through controllers, parents
//! them under containers, and asks whether a node is currently part of a
//! live window. [`ViewHost`] is that contract; [`MemoryViewTree`] is an
//! in-memory implementation used by tests and headless hosts.
//!
//! ```text
//! window root ── container ── controller view ── child container ── ...
//!      ^ attached to window: everything below reports is_in_window()
//! ```
//!
//! # Failure Modes
//!
//! - Operations on unknown node ids are ignored (`add_child`/`remove_child`)
//!   or answer "no" (`parent`, `is_in_window`).

use std::any::Any;
use std::fmt;

use ahash::{AHashMap, AHashSet};
use serde_json::Value;

/// Opaque handle to a node in the host's view hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// View hierarchy operations supplied by the host toolkit.
pub trait ViewHost {
    /// Create a detached node. `key` is a stable identifier used to find
    /// child-router containers again after a view is recreated.
    fn create_node(&mut self, key: Option<&str>) -> NodeId;

    /// Parent `child` under `parent`, at `index` or at the end.
    fn add_child(&mut self, parent: NodeId, child: NodeId, index: Option<usize>);

    fn remove_child(&mut self, parent: NodeId, child: NodeId);

    fn parent(&self, node: NodeId) -> Option<NodeId>;

    fn index_of(&self, parent: NodeId, child: NodeId) -> Option<usize>;

    fn key(&self, node: NodeId) -> Option<String>;

    /// Whether `node` is currently part of a window.
    fn is_in_window(&self, node: NodeId) -> bool;

    /// Whether `node` has been laid out with a non-zero size.
    fn has_layout(&self, node: NodeId) -> bool;

    /// Depth-first search below `root` for a node carrying `key`.
    fn find_by_key(&self, root: NodeId, key: &str) -> Option<NodeId>;

    /// Capture toolkit-level state of the subtree (scroll offsets, input text).
    fn save_hierarchy_state(&self, _node: NodeId) -> Value {
        Value::Null
    }

    fn restore_hierarchy_state(&mut self, _node: NodeId, _state: &Value) {}

    /// Called once navigation no longer references `node`.
    fn release_node(&mut self, _node: NodeId) {}

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

// ============================================================================
// MemoryViewTree
// ============================================================================

#[derive(Debug, Clone, Default)]
struct NodeData {
    key: Option<String>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    width: u16,
    height: u16,
    state: Value,
    released: bool,
}

/// In-memory [`ViewHost`].
///
/// Nodes become part of a window when an ancestor has been passed to
/// [`attach_to_window`](Self::attach_to_window). With `auto_layout`
/// enabled (the default) a node receives a 1x1 size as soon as it is
/// parented; disable it to exercise handlers that wait for layout.
#[derive(Debug, Default)]
pub struct MemoryViewTree {
    nodes: AHashMap<NodeId, NodeData>,
    windows: AHashSet<NodeId>,
    next_id: u64,
    auto_layout: bool,
}

impl MemoryViewTree {
    #[must_use]
    pub fn new() -> Self {
        Self {
            auto_layout: true,
            ..Self::default()
        }
    }

    /// Toggle automatic layout of newly parented nodes.
    #[must_use]
    pub fn with_auto_layout(mut self, enabled: bool) -> Self {
        self.auto_layout = enabled;
        self
    }

    pub fn set_auto_layout(&mut self, enabled: bool) {
        self.auto_layout = enabled;
    }

    pub fn attach_to_window(&mut self, node: NodeId) {
        self.windows.insert(node);
    }

    pub fn detach_from_window(&mut self, node: NodeId) {
        self.windows.remove(&node);
    }

    pub fn set_size(&mut self, node: NodeId, width: u16, height: u16) {
        if let Some(data) = self.nodes.get_mut(&node) {
            data.width = width;
            data.height = height;
        }
    }

    /// Store toolkit-level state on a node (what `save_hierarchy_state` reads).
    pub fn set_state(&mut self, node: NodeId, state: Value) {
        if let Some(data) = self.nodes.get_mut(&node) {
            data.state = state;
        }
    }

    #[must_use]
    pub fn state(&self, node: NodeId) -> Option<&Value> {
        self.nodes.get(&node).map(|data| &data.state)
    }

    #[must_use]
    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.nodes
            .get(&node)
            .map_or(&[], |data| data.children.as_slice())
    }

    /// Whether navigation has released `node`.
    #[must_use]
    pub fn is_released(&self, node: NodeId) -> bool {
        self.nodes.get(&node).is_some_and(|data| data.released)
    }

    /// Number of nodes created so far that have not been released.
    #[must_use]
    pub fn live_nodes(&self) -> usize {
        self.nodes.values().filter(|data| !data.released).count()
    }
}

impl ViewHost for MemoryViewTree {
    fn create_node(&mut self, key: Option<&str>) -> NodeId {
        self.next_id += 1;
        let id = NodeId(self.next_id);
        self.nodes.insert(
            id,
            NodeData {
                key: key.map(str::to_owned),
                ..NodeData::default()
            },
        );
        id
    }

    fn add_child(&mut self, parent: NodeId, child: NodeId, index: Option<usize>) {
        if parent == child || !self.nodes.contains_key(&parent) {
            return;
        }
        let old_parent = match self.nodes.get(&child) {
            Some(data) => data.parent,
            None => return,
        };
        if let Some(old) = old_parent {
            self.remove_child(old, child);
        }
        if let Some(data) = self.nodes.get_mut(&parent) {
            let at = index.unwrap_or(data.children.len()).min(data.children.len());
            data.children.insert(at, child);
        }
        let auto_layout = self.auto_layout;
        if let Some(data) = self.nodes.get_mut(&child) {
            data.parent = Some(parent);
            if auto_layout && data.width == 0 && data.height == 0 {
                data.width = 1;
                data.height = 1;
            }
        }
    }

    fn remove_child(&mut self, parent: NodeId, child: NodeId) {
        if let Some(data) = self.nodes.get_mut(&parent) {
            data.children.retain(|c| *c != child);
        }
        if let Some(data) = self.nodes.get_mut(&child)
            && data.parent == Some(parent)
        {
            data.parent = None;
        }
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(&node).and_then(|data| data.parent)
    }

    fn index_of(&self, parent: NodeId, child: NodeId) -> Option<usize> {
        self.nodes
            .get(&parent)
            .and_then(|data| data.children.iter().position(|c| *c == child))
    }

    fn key(&self, node: NodeId) -> Option<String> {
        self.nodes.get(&node).and_then(|data| data.key.clone())
    }

    fn is_in_window(&self, node: NodeId) -> bool {
        let mut cursor = Some(node);
        while let Some(current) = cursor {
            if self.windows.contains(&current) {
                return true;
            }
            cursor = self.parent(current);
        }
        false
    }

    fn has_layout(&self, node: NodeId) -> bool {
        self.nodes
            .get(&node)
            .is_some_and(|data| data.width > 0 || data.height > 0)
    }

    fn find_by_key(&self, root: NodeId, key: &str) -> Option<NodeId> {
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            let data = self.nodes.get(&node)?;
            if data.key.as_deref() == Some(key) {
                return Some(node);
            }
            stack.extend(data.children.iter().rev().copied());
        }
        None
    }

    fn save_hierarchy_state(&self, node: NodeId) -> Value {
        self.state(node).cloned().unwrap_or(Value::Null)
    }

    fn restore_hierarchy_state(&mut self, node: NodeId, state: &Value) {
        self.set_state(node, state.clone());
    }

    fn release_node(&mut self, node: NodeId) {
        if let Some(data) = self.nodes.get_mut(&node) {
            data.released = true;
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
