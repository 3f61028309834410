//! End-to-end reactive scenarios: stores, computeds, effects, and
//! watchers working together.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use trellis_core::reactive::{
    computed, to_refs, watch, watch_effect, Depth, Effect, Signal, Store, ValueRef, WatchOptions,
    WatchSource,
};
use trellis_core::value::Value;

#[test]
fn store_computed_effect_pipeline() {
    let store = Store::new();
    store.set("first", Value::str("Ada"));
    store.set("last", Value::str("Lovelace"));

    let reader = store.clone();
    let compute_count = Arc::new(AtomicI32::new(0));
    let compute_clone = compute_count.clone();
    let full_name = computed(move || {
        compute_clone.fetch_add(1, Ordering::SeqCst);
        format!("{} {}", reader.get("first"), reader.get("last"))
    });

    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = seen.clone();
    let derived = full_name.clone();
    let _effect = Effect::new(move || {
        seen_clone.lock().push(derived.get());
    });

    assert_eq!(seen.lock().as_slice(), ["Ada Lovelace"]);
    assert_eq!(compute_count.load(Ordering::SeqCst), 1);

    store.set("first", Value::str("Grace"));
    assert_eq!(seen.lock().as_slice(), ["Ada Lovelace", "Grace Lovelace"]);
    assert_eq!(compute_count.load(Ordering::SeqCst), 2);

    // Writing the same value again must not ripple anywhere.
    store.set("first", Value::str("Grace"));
    assert_eq!(seen.lock().len(), 2);
    assert_eq!(compute_count.load(Ordering::SeqCst), 2);
}

#[test]
fn conditional_reads_retarget_dependencies() {
    let flags = Store::new();
    flags.set("use_a", true);
    let a = Store::new();
    a.set("v", Value::str("a"));
    let b = Store::new();
    b.set("v", Value::str("b"));

    let runs = Arc::new(AtomicI32::new(0));
    let runs_clone = runs.clone();
    let (flags_r, a_r, b_r) = (flags.clone(), a.clone(), b.clone());
    let _effect = Effect::new(move || {
        runs_clone.fetch_add(1, Ordering::SeqCst);
        if flags_r.get("use_a").is_truthy() {
            let _ = a_r.get("v");
        } else {
            let _ = b_r.get("v");
        }
    });
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    // While on the a-branch, b is not a dependency.
    b.set("v", Value::str("b2"));
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    flags.set("use_a", false);
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    // After the flip, a must have been dropped as a dependency.
    a.set("v", Value::str("a2"));
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    b.set("v", Value::str("b3"));
    assert_eq!(runs.load(Ordering::SeqCst), 3);
}

#[test]
fn computed_chain_recomputes_lazily() {
    let base = Signal::new(1i64);

    let doubled_calls = Arc::new(AtomicI32::new(0));
    let doubled_clone = doubled_calls.clone();
    let source = base.clone();
    let doubled = computed(move || {
        doubled_clone.fetch_add(1, Ordering::SeqCst);
        source.get() * 2
    });

    let quadrupled_calls = Arc::new(AtomicI32::new(0));
    let quadrupled_clone = quadrupled_calls.clone();
    let inner = doubled.clone();
    let quadrupled = computed(move || {
        quadrupled_clone.fetch_add(1, Ordering::SeqCst);
        inner.get() * 2
    });

    assert_eq!(quadrupled.get(), 4);
    assert_eq!(doubled_calls.load(Ordering::SeqCst), 1);
    assert_eq!(quadrupled_calls.load(Ordering::SeqCst), 1);

    // Invalidation propagates without recomputation.
    base.set(2);
    assert_eq!(doubled_calls.load(Ordering::SeqCst), 1);
    assert_eq!(quadrupled_calls.load(Ordering::SeqCst), 1);

    assert_eq!(quadrupled.get(), 8);
    assert_eq!(doubled_calls.load(Ordering::SeqCst), 2);
    assert_eq!(quadrupled_calls.load(Ordering::SeqCst), 2);
}

#[test]
fn to_refs_fields_stay_live() {
    let store = Store::new();
    store.set("x", 1i64);
    store.set("y", 2i64);

    let refs = to_refs(&store);
    let (_, x) = refs.iter().find(|(k, _)| k == "x").unwrap();

    // Reads through the detached field track the store.
    let runs = Arc::new(AtomicI32::new(0));
    let runs_clone = runs.clone();
    let field = x.clone();
    let _effect = Effect::new(move || {
        runs_clone.fetch_add(1, Ordering::SeqCst);
        let _ = field.get();
    });
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    store.set("x", 10i64);
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    // Writes through the field hit the store.
    x.set(20i64);
    assert_eq!(store.get_untracked("x"), Value::from(20i64));
    assert_eq!(runs.load(Ordering::SeqCst), 3);
}

#[test]
fn nested_tree_reactivity_reaches_deep_writes() {
    let store = Store::new();
    store.set(
        "user",
        Value::map([(
            "address",
            Value::map([("city", Value::str("Paris"))]),
        )]),
    );

    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = seen.clone();
    let reader = store.clone();
    let _effect = Effect::new(move || {
        let user = Store::from_value(&reader.get("user")).unwrap();
        let address = Store::from_value(&user.get("address")).unwrap();
        seen_clone.lock().push(address.get("city").to_string());
    });
    assert_eq!(seen.lock().as_slice(), ["Paris"]);

    let address = Store::from_value(
        &Store::from_value(&store.get_untracked("user"))
            .unwrap()
            .get_untracked("address"),
    )
    .unwrap();
    address.set("city", Value::str("Lyon"));
    assert_eq!(seen.lock().as_slice(), ["Paris", "Lyon"]);
}

#[test]
fn watch_scenario_with_limit_depth_and_stop() {
    let store = Store::new();
    store.set(
        "a",
        Value::map([("b", Value::map([("c", Value::from(1i64))]))]),
    );

    let calls = Arc::new(AtomicI32::new(0));
    let calls_clone = calls.clone();
    let handle = watch(
        WatchSource::from(&store),
        move |_, _, _| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        },
        WatchOptions {
            deep: Depth::Limit(2),
            ..WatchOptions::default()
        },
    );

    // Two levels in: `a.b` is within reach, `a.b.c` is not.
    let a = Store::from_value(&store.get_untracked("a")).unwrap();
    let b = Store::from_value(&a.get_untracked("b")).unwrap();
    b.set("c", Value::from(2i64));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    a.set("b", Value::map([("c", Value::from(3i64))]));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    handle.stop();
    a.set("b", Value::Null);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn watch_effect_with_ref_sources() {
    let width = ValueRef::new(2i64);
    let height = ValueRef::new(3i64);
    let area = Arc::new(AtomicI32::new(0));

    let area_clone = area.clone();
    let (w, h) = (width.clone(), height.clone());
    let _handle = watch_effect(move || {
        let a = w.get().as_int().unwrap_or(0) * h.get().as_int().unwrap_or(0);
        area_clone.store(a as i32, Ordering::SeqCst);
    });
    assert_eq!(area.load(Ordering::SeqCst), 6);

    width.set(5i64);
    assert_eq!(area.load(Ordering::SeqCst), 15);
    height.set(10i64);
    assert_eq!(area.load(Ordering::SeqCst), 50);
}
