//! Provide / Inject
//!
//! Dependency passing across component levels without prop threading.
//! Each instance starts out sharing its parent's [`Scope`] by reference;
//! the first `provide` gives the instance a scope of its own, chained to
//! the parent's, so lookups shadow outward like a prototype chain and a
//! child's provides never leak upward.
//!
//! The free functions operate on the ambient current instance and are
//! meant to be called from `setup`.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::warn;

use crate::lifecycle::current_instance;
use crate::value::Value;

pub struct Scope {
    values: RwLock<IndexMap<String, Value>>,
    parent: Option<Arc<Scope>>,
}

impl Scope {
    pub(crate) fn root() -> Scope {
        Scope {
            values: RwLock::new(IndexMap::new()),
            parent: None,
        }
    }

    pub(crate) fn child_of(parent: Arc<Scope>) -> Scope {
        Scope {
            values: RwLock::new(IndexMap::new()),
            parent: Some(parent),
        }
    }

    pub(crate) fn provide(&self, key: &str, value: Value) {
        self.values.write().insert(key.to_owned(), value);
    }

    /// Walk this scope, then the parent chain.
    pub(crate) fn lookup(&self, key: &str) -> Option<Value> {
        if let Some(value) = self.values.read().get(key) {
            return Some(value.clone());
        }
        self.parent.as_ref().and_then(|p| p.lookup(key))
    }
}

/// Provide a value to the current instance's descendants.
pub fn provide(key: &str, value: impl Into<Value>) {
    match current_instance() {
        Some(instance) => instance.provide(key, value),
        None => warn!(key, "provide called outside setup; ignored"),
    }
}

/// Look up a provided value through the current instance's scope chain.
pub fn inject(key: &str, default: Option<Value>) -> Value {
    match current_instance() {
        Some(instance) => instance.inject(key, default),
        None => {
            warn!(key, "inject called outside setup");
            default.unwrap_or(Value::Null)
        }
    }
}
