//! Lifecycle Hooks
//!
//! Hooks are registered against the ambient current instance: while
//! `setup`, a render function, or a hook itself runs, its instance sits
//! on a thread-local stack, and `on_mounted(...)` and friends attach to
//! whatever is on top. Registering with no instance current is misuse
//! and warns.
//!
//! Before-phases run synchronously inside the renderer; `mounted` and
//! `updated` run from the scheduler's post-flush queue, after the host
//! tree reflects the change.

use std::cell::RefCell;
use std::sync::Arc;

use tracing::warn;

use crate::component::ComponentInstance;

pub type HookFn = Arc<dyn Fn() + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LifecyclePhase {
    BeforeMount,
    Mounted,
    BeforeUpdate,
    Updated,
    BeforeUnmount,
    Unmounted,
}

thread_local! {
    static INSTANCE_STACK: RefCell<Vec<Arc<ComponentInstance>>> =
        const { RefCell::new(Vec::new()) };
}

/// RAII frame marking an instance current for the enclosed scope.
pub(crate) struct InstanceGuard {
    _private: (),
}

impl InstanceGuard {
    pub(crate) fn enter(instance: Arc<ComponentInstance>) -> Self {
        INSTANCE_STACK.with(|stack| stack.borrow_mut().push(instance));
        Self { _private: () }
    }
}

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        INSTANCE_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();
            debug_assert!(popped.is_some(), "instance stack underflow");
        });
    }
}

/// The instance whose setup/render/hook is currently executing.
pub fn current_instance() -> Option<Arc<ComponentInstance>> {
    INSTANCE_STACK.with(|stack| stack.borrow().last().cloned())
}

fn register(phase: LifecyclePhase, hook: HookFn) {
    match current_instance() {
        Some(instance) => instance.register_hook(phase, hook),
        None => warn!(
            ?phase,
            "lifecycle hook registered outside setup; ignored"
        ),
    }
}

pub fn on_before_mount<F: Fn() + Send + Sync + 'static>(f: F) {
    register(LifecyclePhase::BeforeMount, Arc::new(f));
}

pub fn on_mounted<F: Fn() + Send + Sync + 'static>(f: F) {
    register(LifecyclePhase::Mounted, Arc::new(f));
}

pub fn on_before_update<F: Fn() + Send + Sync + 'static>(f: F) {
    register(LifecyclePhase::BeforeUpdate, Arc::new(f));
}

pub fn on_updated<F: Fn() + Send + Sync + 'static>(f: F) {
    register(LifecyclePhase::Updated, Arc::new(f));
}

pub fn on_before_unmount<F: Fn() + Send + Sync + 'static>(f: F) {
    register(LifecyclePhase::BeforeUnmount, Arc::new(f));
}

pub fn on_unmounted<F: Fn() + Send + Sync + 'static>(f: F) {
    register(LifecyclePhase::Unmounted, Arc::new(f));
}
