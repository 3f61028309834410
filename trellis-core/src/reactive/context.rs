//! Tracking Context
//!
//! The tracking context records which effect is currently executing. When a
//! reactive value is read, the active effect is registered as a dependent.
//!
//! # Implementation
//!
//! A thread-local stack holds the currently executing effects, supporting
//! nested effects: running an inner effect pushes it on top of the outer
//! one, and the outer effect resumes tracking as soon as the inner one
//! finishes. The stack is popped by a guard's `Drop` impl, so a panicking
//! effect body cannot leave stale ambient state behind.

use std::cell::RefCell;
use std::sync::Arc;

use super::effect::EffectInner;

thread_local! {
    static EFFECT_STACK: RefCell<Vec<Arc<EffectInner>>> = const { RefCell::new(Vec::new()) };
}

/// Guard for one stack frame of effect execution. Created by
/// [`TrackingContext::enter`], pops the frame when dropped.
pub(crate) struct TrackingContext {
    _private: (),
}

impl TrackingContext {
    /// Make `effect` the active effect until the returned guard drops.
    pub(crate) fn enter(effect: Arc<EffectInner>) -> Self {
        EFFECT_STACK.with(|stack| stack.borrow_mut().push(effect));
        Self { _private: () }
    }

    /// The innermost running effect, if any.
    pub(crate) fn active_effect() -> Option<Arc<EffectInner>> {
        EFFECT_STACK.with(|stack| stack.borrow().last().cloned())
    }

    /// Whether any effect is currently tracking on this thread.
    pub(crate) fn is_tracking() -> bool {
        EFFECT_STACK.with(|stack| !stack.borrow().is_empty())
    }
}

impl Drop for TrackingContext {
    fn drop(&mut self) {
        EFFECT_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();
            debug_assert!(popped.is_some(), "tracking context stack underflow");
        });
    }
}
