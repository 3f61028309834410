//! Virtual Nodes
//!
//! A [`VNode`] describes one node of the desired target tree: an
//! element, raw text, a comment placeholder, a keyless grouping
//! fragment, a component occurrence, or a teleport. The kind is a tagged
//! union; a shape bitmask summarizes kind and children category so the
//! renderer can branch on cheap bit tests instead of re-inspecting
//! structure.
//!
//! The mounted host handle lives in a shared slot (`el`), so every clone
//! of one logical vnode observes the mount. Two vnodes are "the same
//! type" for diffing when their kinds match and their keys match; the
//! renderer patches same-type nodes in place and replaces otherwise.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::warn;

use crate::component::{ComponentDef, ComponentInstance, Slots};
use crate::host::NodeHandle;
use crate::value::Value;

/// Bitmask over vnode kind and children category.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct ShapeFlags(u32);

impl ShapeFlags {
    pub const NONE: ShapeFlags = ShapeFlags(0);
    pub const ELEMENT: ShapeFlags = ShapeFlags(1);
    pub const FUNCTIONAL_COMPONENT: ShapeFlags = ShapeFlags(1 << 1);
    pub const STATEFUL_COMPONENT: ShapeFlags = ShapeFlags(1 << 2);
    pub const TEXT_CHILDREN: ShapeFlags = ShapeFlags(1 << 3);
    pub const ARRAY_CHILDREN: ShapeFlags = ShapeFlags(1 << 4);
    pub const SLOTS_CHILDREN: ShapeFlags = ShapeFlags(1 << 5);
    pub const TELEPORT: ShapeFlags = ShapeFlags(1 << 6);
    pub const KEEP_ALIVE: ShapeFlags = ShapeFlags(1 << 7);
    pub const COMPONENT: ShapeFlags =
        ShapeFlags(Self::FUNCTIONAL_COMPONENT.0 | Self::STATEFUL_COMPONENT.0);

    pub fn contains(self, other: ShapeFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether any bit of `other` is set.
    pub fn intersects(self, other: ShapeFlags) -> bool {
        self.0 & other.0 != 0
    }
}

impl std::ops::BitOr for ShapeFlags {
    type Output = ShapeFlags;
    fn bitor(self, rhs: ShapeFlags) -> ShapeFlags {
        ShapeFlags(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for ShapeFlags {
    fn bitor_assign(&mut self, rhs: ShapeFlags) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for ShapeFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ShapeFlags({:#b})", self.0)
    }
}

/// Diffing key extracted from the `key` prop.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Key {
    Str(Arc<str>),
    Int(i64),
}

impl Key {
    fn from_value(value: &Value) -> Option<Key> {
        match value {
            Value::Str(s) => Some(Key::Str(s.clone())),
            Value::Int(n) => Some(Key::Int(*n)),
            Value::Null => None,
            other => {
                warn!(key = %other, "non-string, non-integer key ignored");
                None
            }
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Key {
        Key::Str(Arc::from(s))
    }
}

impl From<i64> for Key {
    fn from(n: i64) -> Key {
        Key::Int(n)
    }
}

/// What a vnode is.
#[derive(Clone)]
pub enum VNodeKind {
    Element(Arc<str>),
    Text,
    Comment,
    Fragment,
    Component(Arc<ComponentDef>),
    Teleport { target: Arc<str> },
}

impl VNodeKind {
    fn matches(&self, other: &VNodeKind) -> bool {
        match (self, other) {
            (VNodeKind::Element(a), VNodeKind::Element(b)) => a == b,
            (VNodeKind::Text, VNodeKind::Text) => true,
            (VNodeKind::Comment, VNodeKind::Comment) => true,
            (VNodeKind::Fragment, VNodeKind::Fragment) => true,
            (VNodeKind::Component(a), VNodeKind::Component(b)) => Arc::ptr_eq(a, b),
            (VNodeKind::Teleport { target: a }, VNodeKind::Teleport { target: b }) => a == b,
            _ => false,
        }
    }
}

/// Children of a vnode.
#[derive(Clone)]
pub enum Children {
    None,
    Text(Arc<str>),
    Nodes(Vec<VNode>),
    /// Named slot producers; only component vnodes carry these.
    Slots(Slots),
}

impl Children {
    pub fn text(s: impl AsRef<str>) -> Children {
        Children::Text(Arc::from(s.as_ref()))
    }

    pub fn nodes(nodes: impl IntoIterator<Item = VNode>) -> Children {
        Children::Nodes(nodes.into_iter().collect())
    }

    fn shape(&self) -> ShapeFlags {
        match self {
            Children::None => ShapeFlags::NONE,
            Children::Text(_) => ShapeFlags::TEXT_CHILDREN,
            Children::Nodes(_) => ShapeFlags::ARRAY_CHILDREN,
            Children::Slots(_) => ShapeFlags::SLOTS_CHILDREN,
        }
    }
}

/// Build a prop map from pairs. Convenience for vnode construction.
pub fn props<K, V, I>(pairs: I) -> IndexMap<String, Value>
where
    K: Into<String>,
    V: Into<Value>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

#[derive(Clone)]
pub struct VNode {
    pub kind: VNodeKind,
    pub props: IndexMap<String, Value>,
    pub key: Option<Key>,
    pub children: Children,
    pub shape: ShapeFlags,
    /// Mounted host handle, shared across clones. `0` means unmounted.
    el: Arc<AtomicU64>,
    /// End anchor for fragments, so siblings insert before it.
    anchor: Arc<AtomicU64>,
    /// Instance backing a mounted component vnode.
    instance: Arc<Mutex<Option<Arc<ComponentInstance>>>>,
}

impl VNode {
    fn build(
        kind: VNodeKind,
        mut props: IndexMap<String, Value>,
        children: Children,
        base_shape: ShapeFlags,
    ) -> VNode {
        let key = props
            .shift_remove("key")
            .as_ref()
            .and_then(Key::from_value);
        let shape = base_shape | children.shape();
        VNode {
            kind,
            props,
            key,
            children,
            shape,
            el: Arc::new(AtomicU64::new(0)),
            anchor: Arc::new(AtomicU64::new(0)),
            instance: Arc::new(Mutex::new(None)),
        }
    }

    pub fn element(
        tag: impl AsRef<str>,
        props: IndexMap<String, Value>,
        children: Children,
    ) -> VNode {
        debug_assert!(
            !matches!(children, Children::Slots(_)),
            "elements take text or node children"
        );
        Self::build(
            VNodeKind::Element(Arc::from(tag.as_ref())),
            props,
            children,
            ShapeFlags::ELEMENT,
        )
    }

    pub fn text(text: impl AsRef<str>) -> VNode {
        Self::build(
            VNodeKind::Text,
            IndexMap::new(),
            Children::text(text),
            ShapeFlags::NONE,
        )
    }

    /// Empty placeholder node.
    pub fn comment() -> VNode {
        Self::build(
            VNodeKind::Comment,
            IndexMap::new(),
            Children::None,
            ShapeFlags::NONE,
        )
    }

    pub fn fragment(children: impl IntoIterator<Item = VNode>) -> VNode {
        Self::build(
            VNodeKind::Fragment,
            IndexMap::new(),
            Children::nodes(children),
            ShapeFlags::NONE,
        )
    }

    pub fn component(def: Arc<ComponentDef>, props: IndexMap<String, Value>) -> VNode {
        let base = if def.is_functional() {
            ShapeFlags::FUNCTIONAL_COMPONENT
        } else {
            ShapeFlags::STATEFUL_COMPONENT
        };
        Self::build(VNodeKind::Component(def), props, Children::None, base)
    }

    pub fn component_with_slots(
        def: Arc<ComponentDef>,
        props: IndexMap<String, Value>,
        slots: Slots,
    ) -> VNode {
        let base = if def.is_functional() {
            ShapeFlags::FUNCTIONAL_COMPONENT
        } else {
            ShapeFlags::STATEFUL_COMPONENT
        };
        Self::build(VNodeKind::Component(def), props, Children::Slots(slots), base)
    }

    pub fn teleport(
        target: impl AsRef<str>,
        props: IndexMap<String, Value>,
        children: impl IntoIterator<Item = VNode>,
    ) -> VNode {
        Self::build(
            VNodeKind::Teleport {
                target: Arc::from(target.as_ref()),
            },
            props,
            Children::nodes(children),
            ShapeFlags::TELEPORT,
        )
    }

    pub fn el(&self) -> Option<NodeHandle> {
        match self.el.load(Ordering::Acquire) {
            0 => None,
            raw => Some(NodeHandle::from_raw(raw)),
        }
    }

    pub fn set_el(&self, handle: NodeHandle) {
        self.el.store(handle.as_raw(), Ordering::Release);
    }

    pub(crate) fn set_anchor(&self, handle: NodeHandle) {
        self.anchor.store(handle.as_raw(), Ordering::Release);
    }

    /// Adopt another vnode's mount slots (used when patching in place).
    pub(crate) fn inherit_mount(&self, from: &VNode) {
        self.el
            .store(from.el.load(Ordering::Acquire), Ordering::Release);
        self.anchor
            .store(from.anchor.load(Ordering::Acquire), Ordering::Release);
    }

    pub(crate) fn instance(&self) -> Option<Arc<ComponentInstance>> {
        self.instance.lock().clone()
    }

    pub(crate) fn set_instance(&self, instance: Arc<ComponentInstance>) {
        *self.instance.lock() = Some(instance);
    }

    /// Text payload of a text/comment vnode.
    pub fn text_content(&self) -> &str {
        match &self.children {
            Children::Text(t) => t,
            _ => "",
        }
    }
}

impl fmt::Debug for VNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            VNodeKind::Element(tag) => format!("element({tag})"),
            VNodeKind::Text => "text".to_owned(),
            VNodeKind::Comment => "comment".to_owned(),
            VNodeKind::Fragment => "fragment".to_owned(),
            VNodeKind::Component(def) => format!("component({})", def.name()),
            VNodeKind::Teleport { target } => format!("teleport({target})"),
        };
        f.debug_struct("VNode")
            .field("kind", &kind)
            .field("key", &self.key)
            .field("mounted", &self.el().is_some())
            .finish()
    }
}

/// Same-type check driving patch-vs-replace: kind and key must both
/// match.
pub fn is_same_vnode_type(a: &VNode, b: &VNode) -> bool {
    a.kind.matches(&b.kind) && a.key == b.key
}

/// What a render function may produce.
pub enum Rendered {
    Node(VNode),
    Many(Vec<VNode>),
    Text(String),
    Nothing,
}

impl From<VNode> for Rendered {
    fn from(node: VNode) -> Rendered {
        Rendered::Node(node)
    }
}

impl From<Vec<VNode>> for Rendered {
    fn from(nodes: Vec<VNode>) -> Rendered {
        Rendered::Many(nodes)
    }
}

impl From<String> for Rendered {
    fn from(text: String) -> Rendered {
        Rendered::Text(text)
    }
}

impl From<&str> for Rendered {
    fn from(text: &str) -> Rendered {
        Rendered::Text(text.to_owned())
    }
}

/// Coerce render output into exactly one vnode: lists become fragments,
/// text becomes a text node, nothing becomes a comment placeholder.
pub fn normalize_vnode(rendered: Rendered) -> VNode {
    match rendered {
        Rendered::Node(node) => node,
        Rendered::Many(nodes) => VNode::fragment(nodes),
        Rendered::Text(text) => VNode::text(text),
        Rendered::Nothing => VNode::comment(),
    }
}
