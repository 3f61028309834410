//! Reactive Effects
//!
//! # How It Works
//!
//! An effect wraps a closure and re-runs it whenever a reactive value it
//! read during its last run changes. Reads are collected automatically:
//! while the closure executes, the effect sits on the tracking stack and
//! every `track` call records it into the touched dependency set.
//!
//! Dependency lists are refreshed positionally. Each run bumps the
//! effect's track id and resets a cursor into the previous run's list;
//! every tracked dependency is compared against the slot under the cursor
//! and only mismatches pay for a remove/insert. Stable read patterns
//! (the common case) therefore re-track in O(deps) with no allocation.
//! Slots past the cursor after the run are stale reads from a branch not
//! taken this time and are unsubscribed.
//!
//! Triggering marks the effect dirty and hands it to its scheduler. The
//! default scheduler re-runs the effect synchronously; computeds and
//! watchers install their own. An effect that writes a value it also
//! reads would otherwise recurse forever, so triggers arriving while the
//! effect itself is running are recorded as dirtiness but not scheduled.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use smallvec::SmallVec;

use super::context::TrackingContext;
use super::dep::Dep;

static EFFECT_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

const DIRTY_NONE: u8 = 0;
const DIRTY: u8 = 1;

struct DepList {
    list: SmallVec<[Dep; 4]>,
    /// Cursor used during a run; slots below it have been re-confirmed.
    len: usize,
}

pub(crate) struct EffectInner {
    id: u64,
    body: Box<dyn Fn() + Send + Sync>,
    /// Invoked on trigger instead of running directly. `None` only during
    /// construction of the default self-running effect.
    scheduler: Option<Box<dyn Fn() + Send + Sync>>,
    dirty: AtomicU8,
    /// Bumped per run; dedups repeated tracks of one dependency in one run.
    track_id: AtomicU64,
    /// Re-entrancy depth. Nonzero suppresses scheduling from triggers.
    running: AtomicU32,
    active: AtomicBool,
    deps: Mutex<DepList>,
}

impl EffectInner {
    fn new(
        body: Box<dyn Fn() + Send + Sync>,
        scheduler: Option<Box<dyn Fn() + Send + Sync>>,
    ) -> Self {
        Self {
            id: EFFECT_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
            body,
            scheduler,
            dirty: AtomicU8::new(DIRTY),
            track_id: AtomicU64::new(0),
            running: AtomicU32::new(0),
            active: AtomicBool::new(true),
            deps: Mutex::new(DepList {
                list: SmallVec::new(),
                len: 0,
            }),
        }
    }

    pub(crate) fn track_id(&self) -> u64 {
        self.track_id.load(Ordering::Acquire)
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire) != DIRTY_NONE
    }

    pub(crate) fn set_dirty(&self, dirty: bool) {
        let level = if dirty { DIRTY } else { DIRTY_NONE };
        self.dirty.store(level, Ordering::Release);
    }

    /// Execute the body with tracking enabled, refreshing the dependency
    /// list in place.
    pub(crate) fn run(self: &Arc<Self>) {
        self.set_dirty(false);
        if !self.active.load(Ordering::Acquire) {
            // Stopped effects still run on explicit request, untracked.
            return (self.body)();
        }

        self.running.fetch_add(1, Ordering::AcqRel);
        {
            let mut deps = self.deps.lock();
            deps.len = 0;
        }
        self.track_id.fetch_add(1, Ordering::AcqRel);

        let _finish = RunFinishGuard { inner: self };
        let _tracking = TrackingContext::enter(self.clone());
        (self.body)();
    }

    /// Unsubscribe slots the run just finished did not re-confirm. A dep
    /// in the stale tail may also occupy an earlier live slot when the
    /// list shrank, so removal skips entries marked by this run.
    fn post_clean(&self) {
        let track_id = self.track_id();
        let mut deps = self.deps.lock();
        let confirmed = deps.len;
        for dep in deps.list.drain(confirmed..) {
            dep.remove_stale(self.id, track_id);
        }
    }

    /// Detach from every dependency set and refuse future tracking.
    pub(crate) fn stop(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        let mut deps = self.deps.lock();
        for dep in deps.list.drain(..) {
            dep.remove(self.id);
        }
        deps.len = 0;
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

/// Runs post-run cleanup even if the body panics. Declared before the
/// tracking guard so the tracking frame pops first.
struct RunFinishGuard<'a> {
    inner: &'a Arc<EffectInner>,
}

impl Drop for RunFinishGuard<'_> {
    fn drop(&mut self) {
        self.inner.post_clean();
        self.inner.running.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Subscribe `effect` to `dep`, positionally against the previous run's
/// dependency list.
pub(crate) fn track_effect(effect: &Arc<EffectInner>, dep: &Dep) {
    let track_id = effect.track_id();
    if dep.seen(effect.id) == Some(track_id) {
        // Already confirmed by this run.
        return;
    }
    dep.record(effect.id, Arc::downgrade(effect), track_id);

    let mut deps = effect.deps.lock();
    let pos = deps.len;
    let matches_slot = deps
        .list
        .get(pos)
        .map(|slot| Arc::ptr_eq(slot, dep))
        .unwrap_or(false);
    if !matches_slot {
        if pos < deps.list.len() {
            // The displaced dep may have been re-confirmed at an earlier
            // slot this run (reads reordered); only stale entries go.
            let old = deps.list[pos].clone();
            old.remove_stale(effect.id, track_id);
            deps.list[pos] = dep.clone();
        } else {
            deps.list.push(dep.clone());
        }
    }
    deps.len = pos + 1;
}

/// Mark every subscriber of `dep` dirty and hand it to its scheduler.
/// Effects currently running are marked but not scheduled.
pub(crate) fn trigger_effects(dep: &Dep) {
    for weak in dep.subscribers() {
        let Some(effect) = weak.upgrade() else {
            continue;
        };
        effect.set_dirty(true);
        if effect.running.load(Ordering::Acquire) == 0 {
            if let Some(scheduler) = &effect.scheduler {
                scheduler();
            }
        }
    }
}

/// A re-runnable reactive effect handle.
///
/// Construction via [`Effect::new`] runs the body once immediately and
/// re-runs it synchronously on every dependency change. [`Effect::stop`]
/// severs all subscriptions; a stopped effect can still be run manually
/// but no longer tracks.
#[derive(Clone)]
pub struct Effect {
    inner: Arc<EffectInner>,
}

impl Effect {
    /// Create an effect with the default self-running scheduler and run
    /// it once immediately.
    pub fn new<F>(body: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let effect = Self::lazy(body);
        effect.run();
        effect
    }

    /// Create an effect with the default self-running scheduler that does
    /// not run until asked to.
    pub fn lazy<F>(body: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let inner = Arc::new_cyclic(|weak: &Weak<EffectInner>| {
            let weak = weak.clone();
            EffectInner::new(
                Box::new(body),
                Some(Box::new(move || {
                    if let Some(inner) = weak.upgrade() {
                        inner.run();
                    }
                })),
            )
        });
        Self { inner }
    }

    /// Create a lazy effect whose triggers invoke `scheduler` instead of
    /// re-running the body.
    pub fn with_scheduler<F, S>(body: F, scheduler: S) -> Self
    where
        F: Fn() + Send + Sync + 'static,
        S: Fn() + Send + Sync + 'static,
    {
        let inner = Arc::new(EffectInner::new(
            Box::new(body),
            Some(Box::new(scheduler)),
        ));
        Self { inner }
    }

    pub fn run(&self) {
        self.inner.run();
    }

    pub fn stop(&self) {
        self.inner.stop();
    }

    pub fn is_active(&self) -> bool {
        self.inner.is_active()
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.is_dirty()
    }

    pub(crate) fn inner(&self) -> &Arc<EffectInner> {
        &self.inner
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("active", &self.inner.is_active())
            .field("dirty", &self.inner.is_dirty())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::dep::{track, tracked_key_count, trigger, DepKey};
    use crate::value::next_node_id;
    use std::sync::atomic::AtomicI32;

    #[test]
    fn runs_once_on_creation() {
        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();
        let _effect = Effect::new(move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn lazy_effect_waits_for_first_run() {
        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();
        let effect = Effect::lazy(move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        effect.run();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn branch_switch_drops_stale_dependency() {
        let flag_target = next_node_id();
        let a_target = next_node_id();
        let b_target = next_node_id();
        let on_a = Arc::new(AtomicBool::new(true));
        let runs = Arc::new(AtomicI32::new(0));

        let on_a_clone = on_a.clone();
        let runs_clone = runs.clone();
        let _effect = Effect::new(move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
            track(flag_target, DepKey::from("flag"));
            if on_a_clone.load(Ordering::SeqCst) {
                track(a_target, DepKey::from("x"));
            } else {
                track(b_target, DepKey::from("x"));
            }
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(tracked_key_count(a_target), 1);
        assert_eq!(tracked_key_count(b_target), 0);

        on_a.store(false, Ordering::SeqCst);
        trigger(flag_target, &DepKey::from("flag"));
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(tracked_key_count(a_target), 0);
        assert_eq!(tracked_key_count(b_target), 1);

        // The dropped branch's target no longer reruns the effect.
        trigger(a_target, &DepKey::from("x"));
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn shifted_dependency_survives_list_shrink() {
        let target = next_node_id();
        let wide = Arc::new(AtomicBool::new(true));
        let runs = Arc::new(AtomicI32::new(0));

        let wide_clone = wide.clone();
        let runs_clone = runs.clone();
        let _effect = Effect::new(move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
            track(target, DepKey::from("flag"));
            if wide_clone.load(Ordering::SeqCst) {
                track(target, DepKey::from("a"));
            }
            track(target, DepKey::from("b"));
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        // The narrow run reads "b" one slot earlier than before; the
        // stale-tail prune must not drop the re-confirmed subscription.
        wide.store(false, Ordering::SeqCst);
        trigger(target, &DepKey::from("flag"));
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        trigger(target, &DepKey::from("b"));
        assert_eq!(runs.load(Ordering::SeqCst), 3);

        // The branch that fell away really is gone.
        trigger(target, &DepKey::from("a"));
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn reordered_reads_keep_both_subscriptions() {
        let target = next_node_id();
        let swapped = Arc::new(AtomicBool::new(false));
        let runs = Arc::new(AtomicI32::new(0));

        let swapped_clone = swapped.clone();
        let runs_clone = runs.clone();
        let _effect = Effect::new(move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
            track(target, DepKey::from("flag"));
            if swapped_clone.load(Ordering::SeqCst) {
                track(target, DepKey::from("b"));
                track(target, DepKey::from("a"));
            } else {
                track(target, DepKey::from("a"));
                track(target, DepKey::from("b"));
            }
        });

        swapped.store(true, Ordering::SeqCst);
        trigger(target, &DepKey::from("flag"));
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        trigger(target, &DepKey::from("a"));
        trigger(target, &DepKey::from("b"));
        assert_eq!(runs.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn duplicate_reads_track_once() {
        let target = next_node_id();
        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();
        let _effect = Effect::new(move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
            track(target, DepKey::from("x"));
            track(target, DepKey::from("x"));
        });
        trigger(target, &DepKey::from("x"));
        // One rerun, not two.
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn self_trigger_during_run_does_not_recurse() {
        let target = next_node_id();
        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();
        let effect = Effect::new(move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
            track(target, DepKey::from("n"));
            // A write to a key the effect also reads fires its own
            // trigger mid-run.
            trigger(target, &DepKey::from("n"));
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(effect.is_dirty());
    }

    #[test]
    fn stopped_effect_ignores_triggers_but_runs_manually() {
        let target = next_node_id();
        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();
        let effect = Effect::new(move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
            track(target, DepKey::from("x"));
        });

        effect.stop();
        trigger(target, &DepKey::from("x"));
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        effect.run();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        // The manual run of a stopped effect must not re-subscribe.
        assert_eq!(tracked_key_count(target), 0);
    }

    #[test]
    fn stop_is_idempotent() {
        let effect = Effect::new(|| {});
        effect.stop();
        effect.stop();
        assert!(!effect.is_active());
    }
}
