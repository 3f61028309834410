//! Computed Values
//!
//! A computed is a cached derived value that re-evaluates only when a
//! dependency changed AND the value is read again.
//!
//! # How It Works
//!
//! 1. On first read, the getter runs inside an internal effect and the
//!    result is cached.
//!
//! 2. Further reads return the cache while the internal effect is clean.
//!
//! 3. When a dependency changes, the internal effect's scheduler does NOT
//!    re-run the getter. It only notifies the computed's own subscribers,
//!    which in turn decide whether to read again.
//!
//! 4. The getter actually re-runs on the next read that finds the effect
//!    dirty. A computed nobody reads anymore costs nothing.
//!
//! A computed without a setter accepts writes but warns and ignores them,
//! so a stray write never corrupts the cache.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::warn;

use super::dep::{track, trigger, DepKey};
use super::effect::Effect;
use crate::value::next_node_id;

fn value_key() -> DepKey {
    DepKey::from("value")
}

struct ComputedInner<T> {
    id: u64,
    /// Lazy effect owning the getter run. Its scheduler pushes dirtiness
    /// outward instead of recomputing.
    effect: Effect,
    cache: Arc<RwLock<Option<T>>>,
    setter: Option<Box<dyn Fn(T) + Send + Sync>>,
}

/// A lazily recomputed derived value.
pub struct Computed<T> {
    inner: Arc<ComputedInner<T>>,
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Computed<T> {
    pub fn new<F>(getter: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::build(getter, None)
    }

    /// A writable computed. Writes are routed to `setter`, which is
    /// expected to update the sources the getter reads.
    pub fn writable<F, S>(getter: F, setter: S) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
        S: Fn(T) + Send + Sync + 'static,
    {
        Self::build(getter, Some(Box::new(setter)))
    }

    fn build<F>(getter: F, setter: Option<Box<dyn Fn(T) + Send + Sync>>) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let id = next_node_id();
        let cache: Arc<RwLock<Option<T>>> = Arc::new(RwLock::new(None));

        let getter_cache = cache.clone();
        let effect = Effect::with_scheduler(
            move || {
                *getter_cache.write() = Some(getter());
            },
            move || {
                // Pull-based invalidation: wake our readers, let them
                // decide whether to pull a fresh value.
                trigger(id, &value_key());
            },
        );

        Self {
            inner: Arc::new(ComputedInner {
                id,
                effect,
                cache,
                setter,
            }),
        }
    }

    /// Tracked read, recomputing first if a dependency changed since the
    /// last read.
    pub fn get(&self) -> T {
        track(self.inner.id, value_key());
        if self.inner.effect.is_dirty() {
            self.inner.effect.run();
        }
        self.inner
            .cache
            .read()
            .clone()
            .expect("computed cache filled by the run above")
    }

    /// Route a write to the setter; warn and ignore without one.
    pub fn set(&self, value: T) {
        match &self.inner.setter {
            Some(setter) => setter(value),
            None => warn!("write to a computed without a setter ignored"),
        }
    }

    /// Whether the next read would recompute.
    pub fn is_dirty(&self) -> bool {
        self.inner.effect.is_dirty()
    }
}

impl<T: Clone + Send + Sync + std::fmt::Debug + 'static> std::fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.inner.id)
            .field("dirty", &self.is_dirty())
            .finish()
    }
}

/// Shorthand constructor mirroring [`Computed::new`].
pub fn computed<T, F>(getter: F) -> Computed<T>
where
    T: Clone + Send + Sync + 'static,
    F: Fn() -> T + Send + Sync + 'static,
{
    Computed::new(getter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::signal::Signal;
    use crate::reactive::store::Store;
    use crate::value::Value;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn lazy_until_first_read() {
        let calls = Arc::new(AtomicI32::new(0));
        let calls_clone = calls.clone();
        let c = computed(move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            42i64
        });
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(c.get(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn caches_until_dependency_changes() {
        let count = Signal::new(1i64);
        let calls = Arc::new(AtomicI32::new(0));

        let calls_clone = calls.clone();
        let source = count.clone();
        let doubled = computed(move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            source.get() * 2
        });

        assert_eq!(doubled.get(), 2);
        assert_eq!(doubled.get(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        count.set(3);
        // Invalidation alone does not recompute.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(doubled.get(), 6);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn effect_reading_computed_reruns_on_source_change() {
        let store = Store::new();
        store.set("n", 1i64);

        let reader = store.clone();
        let doubled = computed(move || {
            reader.get("n").as_int().unwrap_or(0) * 2
        });

        let seen = Arc::new(AtomicI32::new(-1));
        let seen_clone = seen.clone();
        let c = doubled.clone();
        let _effect = crate::reactive::effect::Effect::new(move || {
            seen_clone.store(c.get() as i32, Ordering::SeqCst);
        });
        assert_eq!(seen.load(Ordering::SeqCst), 2);

        store.set("n", 5i64);
        assert_eq!(seen.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn write_without_setter_is_ignored() {
        let c = computed(|| 7i64);
        assert_eq!(c.get(), 7);
        c.set(99);
        assert_eq!(c.get(), 7);
    }

    #[test]
    fn writable_computed_routes_through_setter() {
        let count = Signal::new(2i64);

        let getter_src = count.clone();
        let setter_src = count.clone();
        let doubled = Computed::writable(
            move || getter_src.get() * 2,
            move |v| setter_src.set(v / 2),
        );

        assert_eq!(doubled.get(), 4);
        doubled.set(10);
        assert_eq!(count.get_untracked(), 5);
        assert_eq!(doubled.get(), 10);
    }

    #[test]
    fn same_result_still_counts_as_one_recompute_per_change() {
        let store = Store::new();
        store.set("x", Value::from(1i64));
        let calls = Arc::new(AtomicI32::new(0));

        let calls_clone = calls.clone();
        let reader = store.clone();
        let c = computed(move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            reader.get("x").is_truthy()
        });

        assert!(c.get());
        store.set("x", Value::from(2i64));
        assert!(c.get());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
