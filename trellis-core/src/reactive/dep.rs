//! Dependency Sets
//!
//! The dependency graph maps `(target, key)` pairs to the set of effects
//! that read that key during their last run. The map has two levels:
//! a global table keyed by container id, and per-container key maps whose
//! values are shared dependency sets.
//!
//! Dependency sets are created lazily on first track and removed again by
//! their cleanup closure as soon as they become empty, so the table only
//! ever holds keys something is actually observing.
//!
//! Each entry in a set remembers the effect's track id from the run that
//! registered it. The same effect reading the same key several times in
//! one run (`a.x + a.x`) is recorded once.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use dashmap::DashMap;
use indexmap::IndexMap;
use parking_lot::Mutex;

use super::context::TrackingContext;
use super::effect::{track_effect, trigger_effects, EffectInner};

/// A key within a reactive container.
#[derive(Clone, PartialEq, Eq, Hash)]
pub(crate) enum DepKey {
    /// A named map property.
    Prop(Arc<str>),
    /// A list index.
    Index(usize),
    /// A list's length.
    Len,
}

impl fmt::Debug for DepKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DepKey::Prop(name) => write!(f, "{name}"),
            DepKey::Index(i) => write!(f, "[{i}]"),
            DepKey::Len => write!(f, "len"),
        }
    }
}

impl From<&str> for DepKey {
    fn from(s: &str) -> Self {
        DepKey::Prop(Arc::from(s))
    }
}

pub(crate) type Dep = Arc<DepInner>;

struct DepEntry {
    effect: Weak<EffectInner>,
    /// Track id of the run that last registered the effect.
    seen: u64,
}

/// One dependency set, associated with exactly one `(target, key)` pair
/// (or with a single ref/computed).
pub(crate) struct DepInner {
    entries: Mutex<IndexMap<u64, DepEntry>>,
    /// Invoked when the set becomes empty; detaches the set from its owner.
    cleanup: Box<dyn Fn() + Send + Sync>,
}

impl DepInner {
    pub(crate) fn new(cleanup: Box<dyn Fn() + Send + Sync>) -> Dep {
        Arc::new(Self {
            entries: Mutex::new(IndexMap::new()),
            cleanup,
        })
    }

    /// The track id under which `effect_id` was last recorded, if present.
    pub(crate) fn seen(&self, effect_id: u64) -> Option<u64> {
        self.entries.lock().get(&effect_id).map(|e| e.seen)
    }

    /// Record (or refresh) an effect's membership for the given run.
    pub(crate) fn record(&self, effect_id: u64, effect: Weak<EffectInner>, track_id: u64) {
        self.entries.lock().insert(
            effect_id,
            DepEntry {
                effect,
                seen: track_id,
            },
        );
    }

    /// Remove an effect from the set unless its entry was re-confirmed by
    /// the run identified by `track_id`. The positional dep list can hold
    /// the same dep in a stale slot and a live one when a run shrinks or
    /// reorders its reads; the `seen` mark tells the two apart.
    pub(crate) fn remove_stale(&self, effect_id: u64, track_id: u64) {
        let emptied = {
            let mut entries = self.entries.lock();
            if entries
                .get(&effect_id)
                .is_some_and(|entry| entry.seen == track_id)
            {
                return;
            }
            entries.shift_remove(&effect_id);
            entries.is_empty()
        };
        if emptied {
            (self.cleanup)();
        }
    }

    /// Remove an effect from the set, invoking the cleanup callback if the
    /// set became empty. The entries lock is released before cleanup runs.
    pub(crate) fn remove(&self, effect_id: u64) {
        let emptied = {
            let mut entries = self.entries.lock();
            entries.shift_remove(&effect_id);
            entries.is_empty()
        };
        if emptied {
            (self.cleanup)();
        }
    }

    /// Snapshot of the current subscribers, in insertion order. Taken so
    /// that trigger delivery never holds the set's lock while running
    /// schedulers (which may re-track into this very set).
    pub(crate) fn subscribers(&self) -> Vec<Weak<EffectInner>> {
        self.entries.lock().values().map(|e| e.effect.clone()).collect()
    }

}

/// Global two-level table: container id -> key -> dependency set.
static TARGET_MAP: OnceLock<DashMap<u64, HashMap<DepKey, Dep>>> = OnceLock::new();

fn target_map() -> &'static DashMap<u64, HashMap<DepKey, Dep>> {
    TARGET_MAP.get_or_init(DashMap::new)
}

/// Register the active effect (if any) as a reader of `(target, key)`.
/// No-op outside of effect execution.
pub(crate) fn track(target: u64, key: DepKey) {
    if !TrackingContext::is_tracking() {
        return;
    }
    let Some(effect) = TrackingContext::active_effect() else {
        return;
    };

    let dep = {
        let mut keys = target_map().entry(target).or_default();
        match keys.get(&key) {
            Some(dep) => dep.clone(),
            None => {
                let owner_key = key.clone();
                let dep = DepInner::new(Box::new(move || {
                    if let Some(mut keys) = target_map().get_mut(&target) {
                        keys.remove(&owner_key);
                    }
                }));
                keys.insert(key, dep.clone());
                dep
            }
        }
    };

    track_effect(&effect, &dep);
}

/// Notify every effect registered for `(target, key)`.
pub(crate) fn trigger(target: u64, key: &DepKey) {
    let dep = target_map()
        .get(&target)
        .and_then(|keys| keys.get(key).cloned());
    if let Some(dep) = dep {
        trigger_effects(&dep);
    }
}

/// Number of live dependency sets for a target. Test-only observability.
#[cfg(test)]
pub(crate) fn tracked_key_count(target: u64) -> usize {
    target_map().get(&target).map(|keys| keys.len()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::effect::Effect;
    use crate::value::next_node_id;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn track_outside_effect_is_noop() {
        let target = next_node_id();
        track(target, DepKey::from("x"));
        assert_eq!(tracked_key_count(target), 0);
    }

    #[test]
    fn track_inside_effect_registers() {
        let target = next_node_id();
        let _effect = Effect::new(move || {
            track(target, DepKey::from("x"));
        });
        assert_eq!(tracked_key_count(target), 1);
    }

    #[test]
    fn trigger_reruns_tracked_effect() {
        let target = next_node_id();
        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();

        let _effect = Effect::new(move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
            track(target, DepKey::from("x"));
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        trigger(target, &DepKey::from("x"));
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        trigger(target, &DepKey::from("y"));
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn empty_dep_set_is_reclaimed() {
        let target = next_node_id();
        let effect = Effect::new(move || {
            track(target, DepKey::from("x"));
        });
        assert_eq!(tracked_key_count(target), 1);

        effect.stop();
        assert_eq!(tracked_key_count(target), 0);
    }
}
