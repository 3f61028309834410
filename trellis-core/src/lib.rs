//! Trellis Core
//!
//! This crate provides the core runtime for the Trellis UI framework.
//! It implements:
//!
//! - Reactive primitives (stores, refs, computeds, effects, watchers)
//! - A batched update scheduler
//! - A virtual node model and diffing renderer with keyed reconciliation
//! - Components with props, slots, lifecycle hooks, and provide/inject
//!
//! The crate performs no I/O and ships no concrete rendering backend;
//! embedders implement [`host::HostOps`] for their target tree and drive
//! ticks through the scheduler.
//!
//! # Architecture
//!
//! - `reactive`: dependency tracking, stores/refs, computeds, watchers
//! - `scheduler`: deduplicated job queue with post-flush callbacks
//! - `vnode` / `renderer`: virtual tree model and reconciler
//! - `component` / `lifecycle` / `provide`: the component layer
//! - `host`: the target-tree seam plus an in-memory reference adapter
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use trellis_core::component::ComponentDef;
//! use trellis_core::host::MemoryHost;
//! use trellis_core::renderer::Renderer;
//! use trellis_core::scheduler::flush_jobs;
//! use trellis_core::value::Value;
//! use trellis_core::vnode::{Rendered, VNode};
//!
//! let counter = ComponentDef::new("counter")
//!     .data(|| Value::map([("count", Value::from(0i64))]))
//!     .render(|i| Rendered::Text(format!("count: {}", i.get("count"))))
//!     .build();
//!
//! let host = MemoryHost::new();
//! let root = host.create_root();
//! let renderer = Renderer::new(Arc::new(host.clone()));
//!
//! renderer.render(Some(VNode::component(counter, Default::default())), root);
//! assert_eq!(host.inner_string(root), "count: 0");
//!
//! // Reactive writes made after a render are applied by the next flush.
//! flush_jobs();
//! ```

pub mod component;
pub mod error;
pub mod host;
pub mod lifecycle;
pub mod provide;
pub mod reactive;
pub mod renderer;
pub mod scheduler;
pub mod value;
pub mod vnode;

pub use component::{ComponentDef, ComponentInstance, SetupResult};
pub use error::{Error, Result};
pub use host::{HostOps, MemoryHost, NodeHandle};
pub use lifecycle::{
    current_instance, on_before_mount, on_before_unmount, on_before_update, on_mounted,
    on_unmounted, on_updated,
};
pub use provide::{inject, provide};
pub use reactive::{
    computed, is_reactive, is_ref, reactive, watch, watch_effect, Computed, Effect, ListStore,
    Signal, Store, ValueRef,
};
pub use renderer::Renderer;
pub use scheduler::flush_jobs;
pub use value::Value;
pub use vnode::{Rendered, VNode};
