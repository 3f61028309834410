//! Reactive Containers
//!
//! # How It Works
//!
//! Rust has no dynamic property interception, so reactivity on plain data
//! lives in accessor wrappers instead of proxies. A container (`MapNode`
//! or `ListNode`) becomes reactive when its id is flagged in a global
//! registry; the flagged value IS the original `Arc`, so wrapping is
//! idempotent and identity stable.
//!
//! [`Store`] and [`ListStore`] are the accessor surfaces. Reads track
//! `(container id, key)` against the active effect and lazily flag nested
//! containers reactive as they are reached, so a deep tree pays for
//! reactivity only along the paths actually read. Writes compare old and
//! new values first (identity for containers, structural for primitives)
//! and trigger only on a real change.

use std::sync::{Arc, OnceLock};

use dashmap::DashSet;
use indexmap::IndexMap;
use tracing::warn;

use super::dep::{track, trigger, DepKey};
use crate::value::{ListNode, MapNode, Value};

/// Container ids flagged reactive. Ids are never reused, so a stale
/// entry can never alias a new container.
static REACTIVE_IDS: OnceLock<DashSet<u64>> = OnceLock::new();

fn reactive_ids() -> &'static DashSet<u64> {
    REACTIVE_IDS.get_or_init(DashSet::new)
}

/// Flag a container reactive and return it unchanged. Non-containers and
/// already-reactive containers pass through untouched.
pub fn reactive(value: Value) -> Value {
    if let Some(id) = value.container_id() {
        reactive_ids().insert(id);
    }
    value
}

/// Whether the value is a container that has been flagged reactive.
pub fn is_reactive(value: &Value) -> bool {
    value
        .container_id()
        .map(|id| reactive_ids().contains(&id))
        .unwrap_or(false)
}

/// Track a read of `key` on `node`, then flag the value reactive if it is
/// a container so nested reads observe it too.
fn tracked_child(id: u64, key: DepKey, child: Value) -> Value {
    track(id, key);
    reactive(child)
}

/// Accessor wrapper over a reactive map container.
#[derive(Clone)]
pub struct Store {
    node: Arc<MapNode>,
    readonly: bool,
}

impl Store {
    /// An empty reactive map.
    pub fn new() -> Self {
        let node = MapNode::new(IndexMap::new());
        reactive_ids().insert(node.id());
        Self {
            node,
            readonly: false,
        }
    }

    /// Wrap an existing map value, flagging it reactive.
    pub fn from_value(value: &Value) -> Option<Self> {
        let node = value.as_map()?.clone();
        reactive_ids().insert(node.id());
        Some(Self {
            node,
            readonly: false,
        })
    }

    /// A read-only view over the same container. Writes through this
    /// handle warn and are ignored; reads still track.
    pub fn readonly(&self) -> Self {
        Self {
            node: self.node.clone(),
            readonly: true,
        }
    }

    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    pub fn id(&self) -> u64 {
        self.node.id()
    }

    /// The underlying container as a value. Shares identity with the store.
    pub fn as_value(&self) -> Value {
        Value::Map(self.node.clone())
    }

    /// Tracked read. Missing keys read as `Null` (and still track, so a
    /// later insert of the key reruns the reader).
    pub fn get(&self, key: &str) -> Value {
        let child = self
            .node
            .entries
            .read()
            .get(key)
            .cloned()
            .unwrap_or(Value::Null);
        tracked_child(self.node.id(), DepKey::from(key), child)
    }

    /// Untracked read for internal bookkeeping.
    pub fn get_untracked(&self, key: &str) -> Value {
        self.node
            .entries
            .read()
            .get(key)
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// Write `key`, triggering readers only when the value actually
    /// changed.
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        if self.readonly {
            warn!(key, "write to readonly store ignored");
            return;
        }
        let value = value.into();
        let changed = {
            let mut entries = self.node.entries.write();
            match entries.get(key) {
                Some(old) if *old == value => false,
                _ => {
                    entries.insert(key.to_owned(), value);
                    true
                }
            }
        };
        if changed {
            trigger(self.node.id(), &DepKey::from(key));
        }
    }

    /// Remove `key`, triggering its readers if it was present.
    pub fn remove(&self, key: &str) {
        if self.readonly {
            warn!(key, "write to readonly store ignored");
            return;
        }
        let removed = self.node.entries.write().shift_remove(key).is_some();
        if removed {
            trigger(self.node.id(), &DepKey::from(key));
        }
    }

    /// Untracked presence check.
    pub fn contains(&self, key: &str) -> bool {
        self.node.entries.read().contains_key(key)
    }

    /// Snapshot of the current keys. Untracked.
    pub fn keys(&self) -> Vec<String> {
        self.node.entries.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.node.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.node.entries.read().is_empty()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("id", &self.node.id())
            .field("readonly", &self.readonly)
            .finish()
    }
}

/// Accessor wrapper over a reactive list container.
#[derive(Clone)]
pub struct ListStore {
    node: Arc<ListNode>,
}

impl ListStore {
    pub fn new() -> Self {
        let node = ListNode::new(Vec::new());
        reactive_ids().insert(node.id());
        Self { node }
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        let node = value.as_list()?.clone();
        reactive_ids().insert(node.id());
        Some(Self { node })
    }

    pub fn id(&self) -> u64 {
        self.node.id()
    }

    pub fn as_value(&self) -> Value {
        Value::List(self.node.clone())
    }

    /// Tracked read. Out-of-range reads as `Null`.
    pub fn get(&self, index: usize) -> Value {
        let child = self
            .node
            .items
            .read()
            .get(index)
            .cloned()
            .unwrap_or(Value::Null);
        tracked_child(self.node.id(), DepKey::Index(index), child)
    }

    /// Write an in-range index, triggering readers only on change.
    pub fn set(&self, index: usize, value: impl Into<Value>) {
        let value = value.into();
        let changed = {
            let mut items = self.node.items.write();
            match items.get_mut(index) {
                Some(slot) if *slot == value => false,
                Some(slot) => {
                    *slot = value;
                    true
                }
                None => {
                    warn!(index, len = items.len(), "list write out of range ignored");
                    false
                }
            }
        };
        if changed {
            trigger(self.node.id(), &DepKey::Index(index));
        }
    }

    pub fn push(&self, value: impl Into<Value>) {
        let index = {
            let mut items = self.node.items.write();
            items.push(value.into());
            items.len() - 1
        };
        trigger(self.node.id(), &DepKey::Index(index));
        trigger(self.node.id(), &DepKey::Len);
    }

    pub fn pop(&self) -> Value {
        let (popped, index) = {
            let mut items = self.node.items.write();
            let popped = items.pop();
            (popped, items.len())
        };
        match popped {
            Some(value) => {
                trigger(self.node.id(), &DepKey::Index(index));
                trigger(self.node.id(), &DepKey::Len);
                value
            }
            None => Value::Null,
        }
    }

    /// Tracked length read. Readers rerun when the list grows or shrinks.
    pub fn len(&self) -> usize {
        track(self.node.id(), DepKey::Len);
        self.node.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tracked snapshot of the whole list. Tracks the length plus every
    /// occupied index.
    pub fn to_vec(&self) -> Vec<Value> {
        track(self.node.id(), DepKey::Len);
        let items: Vec<Value> = self.node.items.read().clone();
        for (i, item) in items.iter().enumerate() {
            track(self.node.id(), DepKey::Index(i));
            reactive(item.clone());
        }
        items
    }
}

impl Default for ListStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ListStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListStore")
            .field("id", &self.node.id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::effect::Effect;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn reactive_is_idempotent_and_identity_stable() {
        let value = Value::map([("x", Value::from(1i64))]);
        let wrapped = reactive(value.clone());
        assert!(is_reactive(&wrapped));
        assert_eq!(wrapped, value);
        assert_eq!(reactive(wrapped.clone()), value);
    }

    #[test]
    fn primitives_pass_through_unwrapped() {
        let n = reactive(Value::from(5i64));
        assert!(!is_reactive(&n));
        assert_eq!(n, Value::from(5i64));
    }

    #[test]
    fn effect_reruns_on_change() {
        let store = Store::new();
        store.set("count", 0i64);

        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();
        let reader = store.clone();
        let _effect = Effect::new(move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
            let _ = reader.get("count");
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        store.set("count", 1i64);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn same_value_write_does_not_retrigger() {
        let store = Store::new();
        store.set("count", 7i64);

        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();
        let reader = store.clone();
        let _effect = Effect::new(move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
            let _ = reader.get("count");
        });

        store.set("count", 7i64);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn nested_container_becomes_reactive_on_access() {
        let store = Store::new();
        store.set("user", Value::map([("name", Value::str("ada"))]));

        let raw = store.get_untracked("user");
        assert!(!is_reactive(&raw));

        let nested = store.get("user");
        assert!(is_reactive(&nested));
    }

    #[test]
    fn readonly_store_refuses_writes() {
        let store = Store::new();
        store.set("x", 1i64);
        let ro = store.readonly();

        ro.set("x", 2i64);
        assert_eq!(store.get_untracked("x"), Value::from(1i64));
        ro.remove("x");
        assert!(store.contains("x"));
    }

    #[test]
    fn missing_key_read_tracks_future_insert() {
        let store = Store::new();
        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();
        let reader = store.clone();
        let _effect = Effect::new(move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
            let _ = reader.get("later");
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        store.set("later", Value::str("now"));
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn list_len_tracks_push_and_pop() {
        let list = ListStore::new();
        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();
        let reader = list.clone();
        let _effect = Effect::new(move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
            let _ = reader.len();
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        list.push(1i64);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        list.pop();
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn list_index_write_triggers_only_that_index() {
        let list = ListStore::new();
        list.push(1i64);
        list.push(2i64);

        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();
        let reader = list.clone();
        let _effect = Effect::new(move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
            let _ = reader.get(0);
        });

        list.set(1, 9i64);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        list.set(0, 9i64);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }
}
