//! Dynamic Value Model
//!
//! Application state flows through the runtime as a dynamic value tree.
//! Rust has no dynamic property interception, so reactive containers are
//! explicit nodes (maps and lists) addressed through accessor wrappers
//! (see `reactive::store`) instead of transparent proxies.
//!
//! # Identity
//!
//! Every container node carries a process-unique `u64` id minted from an
//! atomic counter. The id is the node's identity in the dependency graph
//! and in the reactive registry. Ids are never reused, so a stale entry in
//! a side table can never be confused with a fresh node.
//!
//! # Equality
//!
//! `PartialEq` on `Value` mirrors the host-language rule the write traps
//! depend on: primitives and strings compare structurally, containers and
//! refs compare by identity. A write that swaps one map for a structurally
//! equal but distinct map is a change; a write that stores the same map
//! back is not.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::de::{MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::reactive::ValueRef;

/// Counter for container node ids. Starts at 1; 0 is never a valid id.
static NODE_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Mint a fresh container id.
pub(crate) fn next_node_id() -> u64 {
    NODE_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// A map container node: ordered string-keyed entries.
pub struct MapNode {
    id: u64,
    pub(crate) entries: RwLock<IndexMap<String, Value>>,
}

impl MapNode {
    pub fn new(entries: IndexMap<String, Value>) -> Arc<Self> {
        Arc::new(Self {
            id: next_node_id(),
            entries: RwLock::new(entries),
        })
    }

    /// The node's process-unique identity.
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// A list container node.
pub struct ListNode {
    id: u64,
    pub(crate) items: RwLock<Vec<Value>>,
}

impl ListNode {
    pub fn new(items: Vec<Value>) -> Arc<Self> {
        Arc::new(Self {
            id: next_node_id(),
            items: RwLock::new(items),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

/// A dynamic value.
///
/// Cloning is cheap: containers and refs are shared handles.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    List(Arc<ListNode>),
    Map(Arc<MapNode>),
    /// A reactive ref stored as a property value. Reads through
    /// `proxy_refs` auto-unwrap it; serialization flattens it.
    Ref(ValueRef),
}

impl Value {
    /// Build a map value from key/value pairs.
    pub fn map<K, I>(pairs: I) -> Value
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let entries = pairs.into_iter().map(|(k, v)| (k.into(), v)).collect();
        Value::Map(MapNode::new(entries))
    }

    /// Build a list value.
    pub fn list<I: IntoIterator<Item = Value>>(items: I) -> Value {
        Value::List(ListNode::new(items.into_iter().collect()))
    }

    pub fn str(s: impl AsRef<str>) -> Value {
        Value::Str(Arc::from(s.as_ref()))
    }

    /// The container id, if this value is a map or list.
    pub fn container_id(&self) -> Option<u64> {
        match self {
            Value::Map(node) => Some(node.id()),
            Value::List(node) => Some(node.id()),
            _ => None,
        }
    }

    pub fn is_container(&self) -> bool {
        self.container_id().is_some()
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Arc<MapNode>> {
        match self {
            Value::Map(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&Arc<ListNode>> {
        match self {
            Value::List(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_ref_value(&self) -> Option<&ValueRef> {
        match self {
            Value::Ref(r) => Some(r),
            _ => None,
        }
    }

    /// Truthiness, used by conditional render helpers.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(_) | Value::Map(_) => true,
            Value::Ref(r) => r.raw().is_truthy(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                *a as f64 == *b
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            // Containers and refs compare by identity, not structure.
            (Value::List(a), Value::List(b)) => Arc::ptr_eq(a, b),
            (Value::Map(a), Value::Map(b)) => Arc::ptr_eq(a, b),
            (Value::Ref(a), Value::Ref(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(n) => write!(f, "Int({n})"),
            Value::Float(x) => write!(f, "Float({x})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::List(node) => write!(f, "List(#{})", node.id()),
            Value::Map(node) => write!(f, "Map(#{})", node.id()),
            Value::Ref(_) => write!(f, "Ref(..)"),
        }
    }
}

/// String coercion for text vnodes: `Null` renders empty, containers
/// render as JSON, refs render their inner value.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::List(_) | Value::Map(_) => {
                let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
                write!(f, "{json}")
            }
            Value::Ref(r) => write!(f, "{}", r.raw()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Value {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Value {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Value {
        Value::Int(n as i64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Value {
        Value::Int(n as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Value {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value::Str(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Value {
        Value::Str(Arc::from(s.as_str()))
    }
}

impl From<ValueRef> for Value {
    fn from(r: ValueRef) -> Value {
        Value::Ref(r)
    }
}

// ---------------------------------------------------------------------------
// serde
// ---------------------------------------------------------------------------

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(n) => serializer.serialize_i64(*n),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Str(s) => serializer.serialize_str(s),
            Value::List(node) => {
                let items = node.items.read();
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items.iter() {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(node) => {
                let entries = node.entries.read();
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in entries.iter() {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
            // A ref is transparent on the wire.
            Value::Ref(r) => r.raw().serialize(serializer),
        }
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any JSON-like value")
    }

    fn visit_unit<E>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_none<E>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<Value, D::Error> {
        Value::deserialize(d)
    }

    fn visit_bool<E>(self, b: bool) -> Result<Value, E> {
        Ok(Value::Bool(b))
    }

    fn visit_i64<E>(self, n: i64) -> Result<Value, E> {
        Ok(Value::Int(n))
    }

    fn visit_u64<E>(self, n: u64) -> Result<Value, E> {
        Ok(Value::Int(n as i64))
    }

    fn visit_f64<E>(self, f: f64) -> Result<Value, E> {
        Ok(Value::Float(f))
    }

    fn visit_str<E>(self, s: &str) -> Result<Value, E> {
        Ok(Value::from(s))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Value, A::Error> {
        let mut items = Vec::new();
        while let Some(item) = seq.next_element::<Value>()? {
            items.push(item);
        }
        Ok(Value::list(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Value, A::Error> {
        let mut entries = IndexMap::new();
        while let Some((k, v)) = access.next_entry::<String, Value>()? {
            entries.insert(k, v);
        }
        Ok(Value::Map(MapNode::new(entries)))
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Value, D::Error> {
        deserializer.deserialize_any(ValueVisitor)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
