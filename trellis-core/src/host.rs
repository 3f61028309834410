//! Host Adapter
//!
//! The renderer never touches a concrete target tree. Every structural
//! operation goes through [`HostOps`], a trait the embedder implements
//! for its environment. Node identity is an opaque [`NodeHandle`]; the
//! renderer only stores and passes handles back.
//!
//! [`MemoryHost`] is the reference adapter: an in-memory node arena with
//! an operation log. It exists for tests and for embedders that want to
//! diff against a virtual target before committing elsewhere.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::value::Value;

/// Opaque identity of a host node. `0` is reserved for "unset".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeHandle(u64);

impl NodeHandle {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_raw(self) -> u64 {
        self.0
    }
}

/// Structural operations the renderer needs from its target tree.
pub trait HostOps: Send + Sync {
    fn create_element(&self, tag: &str) -> NodeHandle;
    fn create_text(&self, text: &str) -> NodeHandle;
    fn create_comment(&self, text: &str) -> NodeHandle;

    /// Insert `node` into `parent` before `anchor`; `None` appends.
    /// Inserting an attached node moves it.
    fn insert(&self, node: NodeHandle, parent: NodeHandle, anchor: Option<NodeHandle>);
    fn remove(&self, node: NodeHandle);

    fn set_text(&self, node: NodeHandle, text: &str);
    /// Replace an element's children with a single text node.
    fn set_element_text(&self, el: NodeHandle, text: &str);

    /// Reconcile one prop. `new: None` removes it.
    fn patch_prop(&self, el: NodeHandle, key: &str, old: Option<&Value>, new: Option<&Value>);

    fn parent_node(&self, node: NodeHandle) -> Option<NodeHandle>;
    fn next_sibling(&self, node: NodeHandle) -> Option<NodeHandle>;
    fn query_selector(&self, selector: &str) -> Option<NodeHandle>;
}

/// One logged [`MemoryHost`] operation, for assertions on renderer
/// behavior (how many inserts, which removes).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostOp {
    CreateElement(String),
    CreateText(String),
    CreateComment,
    /// An insert whose node was already attached somewhere, i.e. a move.
    Move(u64),
    Insert(u64),
    Remove(u64),
    SetText(u64),
    SetElementText(u64),
    PatchProp(u64, String),
}

enum MemNode {
    Element {
        tag: String,
        props: IndexMap<String, Value>,
    },
    Text(String),
    Comment(String),
}

struct MemNodeData {
    node: MemNode,
    parent: Option<u64>,
    children: Vec<u64>,
}

#[derive(Default)]
struct MemoryHostState {
    next_id: u64,
    nodes: HashMap<u64, MemNodeData>,
    ops: Vec<HostOp>,
}

impl MemoryHostState {
    fn alloc(&mut self, node: MemNode) -> NodeHandle {
        self.next_id += 1;
        let id = self.next_id;
        self.nodes.insert(
            id,
            MemNodeData {
                node,
                parent: None,
                children: Vec::new(),
            },
        );
        NodeHandle(id)
    }

    fn detach(&mut self, id: u64) {
        let parent = self.nodes.get(&id).and_then(|n| n.parent);
        if let Some(parent) = parent {
            if let Some(p) = self.nodes.get_mut(&parent) {
                p.children.retain(|c| *c != id);
            }
        }
        if let Some(n) = self.nodes.get_mut(&id) {
            n.parent = None;
        }
    }
}

/// In-memory [`HostOps`] adapter with an operation log.
#[derive(Clone, Default)]
pub struct MemoryHost {
    state: Arc<Mutex<MemoryHostState>>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// A detached element to render into.
    pub fn create_root(&self) -> NodeHandle {
        let mut state = self.state.lock();
        state.alloc(MemNode::Element {
            tag: "root".to_owned(),
            props: IndexMap::new(),
        })
    }

    /// Snapshot of the operation log.
    pub fn ops(&self) -> Vec<HostOp> {
        self.state.lock().ops.clone()
    }

    pub fn clear_ops(&self) {
        self.state.lock().ops.clear();
    }

    /// Number of inserts that moved an already-attached node.
    pub fn move_count(&self) -> usize {
        self.state
            .lock()
            .ops
            .iter()
            .filter(|op| matches!(op, HostOp::Move(_)))
            .count()
    }

    /// Serialize a node's subtree to an HTML-ish string for assertions.
    pub fn node_string(&self, node: NodeHandle) -> String {
        let state = self.state.lock();
        let mut out = String::new();
        Self::write_node(&state, node.0, &mut out);
        out
    }

    /// Serialize only the children of `node`.
    pub fn inner_string(&self, node: NodeHandle) -> String {
        let state = self.state.lock();
        let mut out = String::new();
        if let Some(data) = state.nodes.get(&node.0) {
            for child in &data.children {
                Self::write_node(&state, *child, &mut out);
            }
        }
        out
    }

    fn write_node(state: &MemoryHostState, id: u64, out: &mut String) {
        let Some(data) = state.nodes.get(&id) else {
            return;
        };
        match &data.node {
            MemNode::Element { tag, props } => {
                out.push('<');
                out.push_str(tag);
                for (key, value) in props {
                    out.push(' ');
                    out.push_str(key);
                    out.push_str("=\"");
                    out.push_str(&value.to_string());
                    out.push('"');
                }
                out.push('>');
                for child in &data.children {
                    Self::write_node(state, *child, out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
            MemNode::Text(text) => out.push_str(text),
            MemNode::Comment(text) => {
                out.push_str("<!--");
                out.push_str(text);
                out.push_str("-->");
            }
        }
    }
}

impl HostOps for MemoryHost {
    fn create_element(&self, tag: &str) -> NodeHandle {
        let mut state = self.state.lock();
        state.ops.push(HostOp::CreateElement(tag.to_owned()));
        state.alloc(MemNode::Element {
            tag: tag.to_owned(),
            props: IndexMap::new(),
        })
    }

    fn create_text(&self, text: &str) -> NodeHandle {
        let mut state = self.state.lock();
        state.ops.push(HostOp::CreateText(text.to_owned()));
        state.alloc(MemNode::Text(text.to_owned()))
    }

    fn create_comment(&self, text: &str) -> NodeHandle {
        let mut state = self.state.lock();
        state.ops.push(HostOp::CreateComment);
        state.alloc(MemNode::Comment(text.to_owned()))
    }

    fn insert(&self, node: NodeHandle, parent: NodeHandle, anchor: Option<NodeHandle>) {
        let mut state = self.state.lock();
        let was_attached = state
            .nodes
            .get(&node.0)
            .map(|n| n.parent.is_some())
            .unwrap_or(false);
        state.ops.push(if was_attached {
            HostOp::Move(node.0)
        } else {
            HostOp::Insert(node.0)
        });

        state.detach(node.0);
        let position = {
            let Some(p) = state.nodes.get(&parent.0) else {
                return;
            };
            match anchor {
                Some(anchor) => p
                    .children
                    .iter()
                    .position(|c| *c == anchor.0)
                    .unwrap_or(p.children.len()),
                None => p.children.len(),
            }
        };
        if let Some(p) = state.nodes.get_mut(&parent.0) {
            p.children.insert(position, node.0);
        }
        if let Some(n) = state.nodes.get_mut(&node.0) {
            n.parent = Some(parent.0);
        }
    }

    fn remove(&self, node: NodeHandle) {
        let mut state = self.state.lock();
        state.ops.push(HostOp::Remove(node.0));
        state.detach(node.0);
        state.nodes.remove(&node.0);
    }

    fn set_text(&self, node: NodeHandle, text: &str) {
        let mut state = self.state.lock();
        state.ops.push(HostOp::SetText(node.0));
        if let Some(data) = state.nodes.get_mut(&node.0) {
            if let MemNode::Text(t) = &mut data.node {
                *t = text.to_owned();
            }
        }
    }

    fn set_element_text(&self, el: NodeHandle, text: &str) {
        let text_node = {
            let mut state = self.state.lock();
            state.ops.push(HostOp::SetElementText(el.0));
            let children: Vec<u64> = state
                .nodes
                .get(&el.0)
                .map(|n| n.children.clone())
                .unwrap_or_default();
            for child in children {
                state.detach(child);
                state.nodes.remove(&child);
            }
            state.alloc(MemNode::Text(text.to_owned()))
        };
        self.insert(text_node, el, None);
    }

    fn patch_prop(&self, el: NodeHandle, key: &str, _old: Option<&Value>, new: Option<&Value>) {
        let mut state = self.state.lock();
        state.ops.push(HostOp::PatchProp(el.0, key.to_owned()));
        if let Some(data) = state.nodes.get_mut(&el.0) {
            if let MemNode::Element { props, .. } = &mut data.node {
                match new {
                    Some(value) => {
                        props.insert(key.to_owned(), value.clone());
                    }
                    None => {
                        props.shift_remove(key);
                    }
                }
            }
        }
    }

    fn parent_node(&self, node: NodeHandle) -> Option<NodeHandle> {
        self.state
            .lock()
            .nodes
            .get(&node.0)
            .and_then(|n| n.parent)
            .map(NodeHandle)
    }

    fn next_sibling(&self, node: NodeHandle) -> Option<NodeHandle> {
        let state = self.state.lock();
        let parent = state.nodes.get(&node.0).and_then(|n| n.parent)?;
        let siblings = &state.nodes.get(&parent)?.children;
        let index = siblings.iter().position(|c| *c == node.0)?;
        siblings.get(index + 1).copied().map(NodeHandle)
    }

    /// Supports `#id` lookups against the `id` prop and bare tag names.
    fn query_selector(&self, selector: &str) -> Option<NodeHandle> {
        let state = self.state.lock();
        let want_id = selector.strip_prefix('#');
        // Scan in allocation order so lookups are deterministic.
        let mut ids: Vec<u64> = state.nodes.keys().copied().collect();
        ids.sort_unstable();
        for id in ids {
            let Some(MemNodeData {
                node: MemNode::Element { tag, props },
                ..
            }) = state.nodes.get(&id)
            else {
                continue;
            };
            let hit = match want_id {
                Some(want) => props
                    .get("id")
                    .map(|v| v.to_string() == want)
                    .unwrap_or(false),
                None => tag == selector,
            };
            if hit {
                return Some(NodeHandle(id));
            }
        }
        None
    }
}
