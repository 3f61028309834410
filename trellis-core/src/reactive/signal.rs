//! Refs And Signals
//!
//! Single-value reactive cells. [`ValueRef`] holds a dynamic [`Value`]
//! and participates in the `Value` tree (a `Value::Ref` variant exists);
//! [`Signal`] is its statically-typed counterpart for code that knows
//! its payload type up front.
//!
//! Both track reads under a synthetic `value` key on their own unique id
//! and trigger on writes only when the payload actually changed.
//! [`FieldRef`] is a ref-shaped view into one store field, so a field
//! can be handed out and written through without losing reactivity.

use std::sync::Arc;

use parking_lot::RwLock;

use super::dep::{track, trigger, DepKey};
use super::store::{reactive, Store};
use crate::value::{next_node_id, Value};

fn value_key() -> DepKey {
    DepKey::from("value")
}

struct RefInner {
    id: u64,
    value: RwLock<Value>,
}

/// A reactive cell holding one dynamic value.
#[derive(Clone)]
pub struct ValueRef {
    inner: Arc<RefInner>,
}

impl ValueRef {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            inner: Arc::new(RefInner {
                id: next_node_id(),
                value: RwLock::new(value.into()),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Tracked read. Container payloads are flagged reactive on the way
    /// out so nested reads track too.
    pub fn get(&self) -> Value {
        track(self.inner.id, value_key());
        reactive(self.inner.value.read().clone())
    }

    /// Untracked read of the raw payload.
    pub fn raw(&self) -> Value {
        self.inner.value.read().clone()
    }

    /// Write the cell, triggering readers only on a real change.
    pub fn set(&self, value: impl Into<Value>) {
        let value = value.into();
        let changed = {
            let mut slot = self.inner.value.write();
            if *slot == value {
                false
            } else {
                *slot = value;
                true
            }
        };
        if changed {
            trigger(self.inner.id, &value_key());
        }
    }

    pub fn ptr_eq(&self, other: &ValueRef) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for ValueRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueRef")
            .field("id", &self.inner.id)
            .field("value", &self.raw())
            .finish()
    }
}

/// Whether a value is a ref cell.
pub fn is_ref(value: &Value) -> bool {
    matches!(value, Value::Ref(_))
}

struct SignalInner<T> {
    id: u64,
    value: RwLock<T>,
}

/// A typed reactive cell.
pub struct Signal<T> {
    inner: Arc<SignalInner<T>>,
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> Signal<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(SignalInner {
                id: next_node_id(),
                value: RwLock::new(value),
            }),
        }
    }

    /// Tracked read.
    pub fn get(&self) -> T {
        track(self.inner.id, value_key());
        self.inner.value.read().clone()
    }

    pub fn get_untracked(&self) -> T {
        self.inner.value.read().clone()
    }

    /// Write, triggering readers only on a real change.
    pub fn set(&self, value: T) {
        let changed = {
            let mut slot = self.inner.value.write();
            if *slot == value {
                false
            } else {
                *slot = value;
                true
            }
        };
        if changed {
            trigger(self.inner.id, &value_key());
        }
    }

    /// Write computed from the current value.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let next = f(&self.inner.value.read());
        self.set(next);
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.id)
            .field("value", &*self.inner.value.read())
            .finish()
    }
}

/// A ref-shaped view into one field of a reactive store. Reads and
/// writes route through the store, so reactivity is preserved even when
/// the field travels on its own.
#[derive(Clone)]
pub struct FieldRef {
    source: Store,
    key: Arc<str>,
}

impl FieldRef {
    pub fn get(&self) -> Value {
        self.source.get(&self.key)
    }

    pub fn set(&self, value: impl Into<Value>) {
        self.source.set(&self.key, value);
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl std::fmt::Debug for FieldRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldRef")
            .field("key", &self.key)
            .finish()
    }
}

/// A ref view into one store field.
pub fn to_ref(source: &Store, key: &str) -> FieldRef {
    FieldRef {
        source: source.clone(),
        key: Arc::from(key),
    }
}

/// Ref views into every current field of a store.
pub fn to_refs(source: &Store) -> Vec<(String, FieldRef)> {
    source
        .keys()
        .into_iter()
        .map(|key| {
            let field = to_ref(source, &key);
            (key, field)
        })
        .collect()
}

/// A store view that unwraps ref fields on read and writes through to
/// them on write. Used for setup results, so templates never spell
/// `.value`.
#[derive(Clone, Debug)]
pub struct ProxyRefs {
    source: Store,
}

impl ProxyRefs {
    pub fn new(source: Store) -> Self {
        Self { source }
    }

    pub fn store(&self) -> &Store {
        &self.source
    }

    /// Tracked read, unwrapping a ref field to its payload.
    pub fn get(&self, key: &str) -> Value {
        match self.source.get(key) {
            Value::Ref(r) => r.get(),
            other => other,
        }
    }

    /// Writes a plain value through an existing ref field; otherwise a
    /// normal store write.
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        match self.source.get_untracked(key) {
            Value::Ref(existing) if !is_ref(&value) => existing.set(value),
            _ => self.source.set(key, value),
        }
    }
}
