//! Watchers
//!
//! A watcher observes a source and invokes a callback with the new and
//! previous values when the source changes. Sources come in three forms:
//! a reactive container (observed by deep traversal), a ref cell, or an
//! arbitrary tracked getter.
//!
//! Deep traversal visits every key reachable from the source, tracking
//! each read, with a visited set keyed by container id so cyclic trees
//! terminate. Traversal depth is configurable; shallow watchers touch
//! only the top level.
//!
//! Callbacks may register a cleanup that runs before the next invocation
//! (canceling stale async work is the typical use).

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use super::effect::Effect;
use super::signal::ValueRef;
use super::store::{ListStore, Store};
use crate::value::Value;

/// How far a reactive-source watcher traverses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Depth {
    /// Unbounded traversal.
    #[default]
    Default,
    /// Top level only.
    Shallow,
    /// At most `n` levels. `Limit(0)` behaves like `Shallow`.
    Limit(usize),
}

impl Depth {
    fn levels(self) -> usize {
        match self {
            Depth::Default => usize::MAX,
            Depth::Shallow | Depth::Limit(0) => 1,
            Depth::Limit(n) => n,
        }
    }
}

#[derive(Default)]
pub struct WatchOptions {
    /// Run the callback once right away, with `Null` as the old value.
    pub immediate: bool,
    pub deep: Depth,
}

/// What a watcher observes.
pub enum WatchSource {
    /// A reactive container, observed by traversal.
    Reactive(Value),
    /// A ref cell, observed through its tracked getter.
    Ref(ValueRef),
    /// An arbitrary getter; whatever it reads is tracked.
    Getter(Box<dyn Fn() -> Value + Send + Sync>),
}

impl WatchSource {
    pub fn getter<F>(f: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        WatchSource::Getter(Box::new(f))
    }
}

impl From<&Store> for WatchSource {
    fn from(store: &Store) -> Self {
        WatchSource::Reactive(store.as_value())
    }
}

impl From<&ListStore> for WatchSource {
    fn from(list: &ListStore) -> Self {
        WatchSource::Reactive(list.as_value())
    }
}

impl From<&ValueRef> for WatchSource {
    fn from(r: &ValueRef) -> Self {
        WatchSource::Ref(r.clone())
    }
}

/// Visit every key reachable from `value` within `depth` levels, tracking
/// each read. Cycles terminate via the visited set.
pub(crate) fn traverse(value: &Value, depth: usize, seen: &mut HashSet<u64>) {
    if depth == 0 {
        return;
    }
    match value {
        Value::Map(node) => {
            if !seen.insert(node.id()) {
                return;
            }
            let store = Store::from_value(value)
                .expect("map value wraps as a store");
            for key in store.keys() {
                let child = store.get(&key);
                traverse(&child, depth - 1, seen);
            }
        }
        Value::List(node) => {
            if !seen.insert(node.id()) {
                return;
            }
            let list = ListStore::from_value(value)
                .expect("list value wraps as a list store");
            let len = list.len();
            for i in 0..len {
                let child = list.get(i);
                traverse(&child, depth - 1, seen);
            }
        }
        Value::Ref(r) => {
            if !seen.insert(r.id()) {
                return;
            }
            let inner = r.get();
            traverse(&inner, depth - 1, seen);
        }
        _ => {}
    }
}

type Cleanup = Box<dyn FnOnce() + Send>;

/// Handed to watch callbacks to register a cleanup that runs before the
/// next invocation (and is dropped unrun if the watcher never fires
/// again).
pub struct OnCleanup<'a> {
    slot: &'a Mutex<Option<Cleanup>>,
}

impl OnCleanup<'_> {
    pub fn register<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        *self.slot.lock() = Some(Box::new(f));
    }
}

/// Stops the watcher when asked. Dropping the handle does NOT stop it.
pub struct WatchHandle {
    effect: Effect,
}

impl WatchHandle {
    pub fn stop(&self) {
        self.effect.stop();
    }

    pub fn is_active(&self) -> bool {
        self.effect.is_active()
    }
}

pub fn watch<C>(source: WatchSource, callback: C, options: WatchOptions) -> WatchHandle
where
    C: Fn(&Value, &Value, &OnCleanup) + Send + Sync + 'static,
{
    let depth = options.deep.levels();
    let getter: Box<dyn Fn() -> Value + Send + Sync> = match source {
        WatchSource::Reactive(value) => Box::new(move || {
            let mut seen = HashSet::new();
            traverse(&value, depth, &mut seen);
            value.clone()
        }),
        WatchSource::Ref(r) => Box::new(move || r.get()),
        WatchSource::Getter(f) => f,
    };

    let latest: Arc<Mutex<Value>> = Arc::new(Mutex::new(Value::Null));
    let old: Arc<Mutex<Value>> = Arc::new(Mutex::new(Value::Null));
    let cleanup_slot: Arc<Mutex<Option<Cleanup>>> = Arc::new(Mutex::new(None));

    // The effect is created after the job, so the job reaches it through
    // this cell.
    let effect_cell: Arc<Mutex<Option<Effect>>> = Arc::new(Mutex::new(None));

    let job = {
        let latest = latest.clone();
        let old = old.clone();
        let cleanup_slot = cleanup_slot.clone();
        let effect_cell = effect_cell.clone();
        let callback = Arc::new(callback);
        Arc::new(move || {
            let effect = effect_cell.lock().clone();
            let Some(effect) = effect else {
                return;
            };
            effect.run();
            let new_value = latest.lock().clone();
            if let Some(cleanup) = cleanup_slot.lock().take() {
                cleanup();
            }
            let old_value = old.lock().clone();
            callback(&new_value, &old_value, &OnCleanup { slot: &*cleanup_slot });
            *old.lock() = new_value;
        })
    };

    let body_latest = latest.clone();
    let scheduler_job = job.clone();
    let effect = Effect::with_scheduler(
        move || {
            *body_latest.lock() = getter();
        },
        move || scheduler_job(),
    );
    *effect_cell.lock() = Some(effect.clone());

    if options.immediate {
        job();
    } else {
        effect.run();
        *old.lock() = latest.lock().clone();
    }

    WatchHandle { effect }
}

/// Run `f` immediately and again whenever anything it read changes.
pub fn watch_effect<F>(f: F) -> WatchHandle
where
    F: Fn() + Send + Sync + 'static,
{
    WatchHandle {
        effect: Effect::new(f),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn ref_source_reports_new_and_old() {
        let count = ValueRef::new(1i64);
        let seen: Arc<Mutex<Vec<(Value, Value)>>> = Arc::new(Mutex::new(Vec::new()));

        let seen_clone = seen.clone();
        let handle = watch(
            WatchSource::from(&count),
            move |new, old, _| {
                seen_clone.lock().push((new.clone(), old.clone()));
            },
            WatchOptions::default(),
        );

        count.set(2i64);
        count.set(3i64);
        handle.stop();
        count.set(4i64);

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], (Value::from(2i64), Value::from(1i64)));
        assert_eq!(seen[1], (Value::from(3i64), Value::from(2i64)));
    }

    #[test]
    fn immediate_fires_once_with_null_old() {
        let count = ValueRef::new(5i64);
        let calls = Arc::new(AtomicI32::new(0));
        let first_old: Arc<Mutex<Option<Value>>> = Arc::new(Mutex::new(None));

        let calls_clone = calls.clone();
        let first_old_clone = first_old.clone();
        let _handle = watch(
            WatchSource::from(&count),
            move |_, old, _| {
                if calls_clone.fetch_add(1, Ordering::SeqCst) == 0 {
                    *first_old_clone.lock() = Some(old.clone());
                }
            },
            WatchOptions {
                immediate: true,
                ..WatchOptions::default()
            },
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(first_old.lock().clone(), Some(Value::Null));
    }

    #[test]
    fn deep_watch_sees_nested_change() {
        let store = Store::new();
        store.set("user", Value::map([("name", Value::str("ada"))]));

        let calls = Arc::new(AtomicI32::new(0));
        let calls_clone = calls.clone();
        let _handle = watch(
            WatchSource::from(&store),
            move |_, _, _| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            },
            WatchOptions::default(),
        );

        let user = Store::from_value(&store.get_untracked("user")).unwrap();
        user.set("name", Value::str("grace"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn shallow_watch_ignores_nested_change() {
        let store = Store::new();
        store.set("user", Value::map([("name", Value::str("ada"))]));

        let calls = Arc::new(AtomicI32::new(0));
        let calls_clone = calls.clone();
        let _handle = watch(
            WatchSource::from(&store),
            move |_, _, _| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            },
            WatchOptions {
                deep: Depth::Shallow,
                ..WatchOptions::default()
            },
        );

        let user = Store::from_value(&store.get_untracked("user")).unwrap();
        user.set("name", Value::str("grace"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        // Top-level replacement still fires.
        store.set("user", Value::map([("name", Value::str("lin"))]));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cleanup_runs_before_next_callback() {
        let count = ValueRef::new(0i64);
        let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

        let log_clone = log.clone();
        let _handle = watch(
            WatchSource::from(&count),
            move |new, _, on_cleanup| {
                let n = new.as_int().unwrap_or(-1);
                log_clone.lock().push(format!("cb {n}"));
                let log_inner = log_clone.clone();
                on_cleanup.register(move || {
                    log_inner.lock().push(format!("cleanup {n}"));
                });
            },
            WatchOptions::default(),
        );

        count.set(1i64);
        count.set(2i64);

        let log = log.lock();
        assert_eq!(
            log.as_slice(),
            ["cb 1", "cleanup 1", "cb 2"]
        );
    }

    #[test]
    fn getter_source_tracks_what_it_reads() {
        let store = Store::new();
        store.set("a", 1i64);
        store.set("b", 2i64);

        let calls = Arc::new(AtomicI32::new(0));
        let calls_clone = calls.clone();
        let reader = store.clone();
        let _handle = watch(
            WatchSource::getter(move || reader.get("a")),
            move |_, _, _| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            },
            WatchOptions::default(),
        );

        store.set("b", 9i64);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        store.set("a", 9i64);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn watch_effect_runs_immediately_and_on_change() {
        let store = Store::new();
        store.set("n", 1i64);

        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();
        let reader = store.clone();
        let handle = watch_effect(move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
            let _ = reader.get("n");
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        store.set("n", 2i64);
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        handle.stop();
        store.set("n", 3i64);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }
}
