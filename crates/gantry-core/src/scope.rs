//! ---
//! gantry_section: "01-lifecycle"
//! gantry_subsection: "module"
//! gantry_type: "source"
//! gantry_scope: "code"
//! gantry_description: "Thread-local execution scope saved and restored by the executor."
//! gantry_version: "v0.1.0"
//! gantry_owner: "tbd"
//! ---
use std::cell::RefCell;
use std::sync::Arc;

use crate::context::LifecycleContext;

thread_local! {
    static CURRENT_CONTEXT: RefCell<Option<Arc<LifecycleContext>>> = const { RefCell::new(None) };
}

/// Ambient execution scope of the launching thread.
///
/// The bounded launch executor saves the previous scope, installs the active
/// lifecycle context for the duration of the operation, and restores the
/// previous scope on every exit path. Code running on the launching thread
/// (hooks, deployable factories) can read the active context through
/// [`ExecutionScope::current`] regardless of ambient state.
pub struct ExecutionScope;

impl ExecutionScope {
    /// The lifecycle context installed on this thread, if any.
    pub fn current() -> Option<Arc<LifecycleContext>> {
        CURRENT_CONTEXT.with(|current| current.borrow().clone())
    }

    pub(crate) fn enter(ctx: Arc<LifecycleContext>) -> ScopeGuard {
        let previous = CURRENT_CONTEXT.with(|current| current.replace(Some(ctx)));
        ScopeGuard { previous }
    }
}

pub(crate) struct ScopeGuard {
    previous: Option<Arc<LifecycleContext>>,
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT_CONTEXT.with(|current| {
            *current.borrow_mut() = previous;
        });
    }
}
