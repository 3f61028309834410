//! Reactive Primitives
//!
//! This module implements the fine-grained reactive system: stores, refs,
//! computeds, effects, and watchers.
//!
//! # Concepts
//!
//! ## Stores and refs
//!
//! A [`Store`] (or [`ListStore`]) is a reactive container of dynamic
//! values; a [`ValueRef`] or typed [`Signal`] is a reactive cell holding
//! a single value. Reading through either inside a tracking context
//! registers the reader; writing notifies readers of the touched key,
//! and only when the value actually changed.
//!
//! ## Effects
//!
//! An [`Effect`] is a side-effecting computation that re-runs when its
//! dependencies change. Dependencies are collected automatically during
//! each run, so conditional reads stay precise run over run.
//!
//! ## Computeds
//!
//! A [`Computed`] is a cached derived value. Invalidation propagates
//! eagerly but recomputation is pulled by the next read, so unread
//! computeds cost nothing.
//!
//! ## Watchers
//!
//! [`watch`] and [`watch_effect`] observe sources and run callbacks with
//! new and old values, with depth control and cleanup registration.
//!
//! # Implementation Notes
//!
//! The system uses a thread-local tracking stack to detect dependencies:
//! every tracked read checks for an active effect and registers it in
//! the dependency set of the touched `(container, key)` pair. This
//! automatic dependency tracking is the approach used by SolidJS, Vue 3,
//! and Leptos.

mod computed;
mod context;
mod dep;
mod effect;
mod signal;
mod store;
mod watch;

pub use computed::{computed, Computed};
pub use effect::Effect;
pub use signal::{is_ref, to_ref, to_refs, FieldRef, ProxyRefs, Signal, ValueRef};
pub use store::{is_reactive, reactive, ListStore, Store};
pub use watch::{
    watch, watch_effect, Depth, OnCleanup, WatchHandle, WatchOptions, WatchSource,
};
