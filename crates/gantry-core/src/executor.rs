//! ---
//! gantry_section: "01-lifecycle"
//! gantry_subsection: "module"
//! gantry_type: "source"
//! gantry_scope: "code"
//! gantry_description: "Bounded observation of async launch stages."
//! gantry_version: "v0.1.0"
//! gantry_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use gantry_runtime::{Completion, Interrupter, RuntimeError, WaitOutcome};
use tracing::error;

use crate::context::LifecycleContext;
use crate::error::StageFailure;
use crate::hooks::LaunchHooks;
use crate::scope::ExecutionScope;

/// Failure notification delivered to the hook set when a bounded stage does
/// not succeed.
pub(crate) type FailureHook = fn(&dyn LaunchHooks, &LifecycleContext, Option<&RuntimeError>);

/// Runs asynchronous launch operations under a wall-clock deadline on the
/// launching thread.
///
/// The operation starts on the runtime's own execution facilities; this
/// executor only observes its completion. On failure, timeout, or
/// interruption it invokes the stage's failure hook exactly once, logs, and
/// raises a [`StageFailure`] carrying the stage's exit code. The ambient
/// execution scope is installed before the operation starts and restored on
/// every exit path.
pub(crate) struct LaunchExecutor {
    ctx: Arc<LifecycleContext>,
    hooks: Arc<dyn LaunchHooks>,
    interrupter: Interrupter,
}

impl LaunchExecutor {
    pub(crate) fn new(
        ctx: Arc<LifecycleContext>,
        hooks: Arc<dyn LaunchHooks>,
        interrupter: Interrupter,
    ) -> Self {
        Self {
            ctx,
            hooks,
            interrupter,
        }
    }

    pub(crate) fn run_bounded<T: Send + 'static>(
        &self,
        stage: &'static str,
        deadline: Duration,
        exit_code: i32,
        failure_hook: FailureHook,
        op: impl FnOnce() -> Completion<T>,
    ) -> Result<T, StageFailure> {
        let outcome = {
            let _scope = ExecutionScope::enter(self.ctx.clone());
            let completion = op();
            completion.await_within(deadline, &self.interrupter)
        };
        match outcome {
            WaitOutcome::Completed(Ok(value)) => Ok(value),
            WaitOutcome::Completed(Err(cause)) => {
                failure_hook(self.hooks.as_ref(), &self.ctx, Some(&cause));
                error!(error = %cause, "failed in {}", stage);
                Err(StageFailure { stage, exit_code })
            }
            WaitOutcome::TimedOut => {
                error!("timed out in {}", stage);
                failure_hook(self.hooks.as_ref(), &self.ctx, None);
                Err(StageFailure { stage, exit_code })
            }
            WaitOutcome::Interrupted => {
                error!("interrupted in {}", stage);
                let cause = RuntimeError::Interrupted;
                failure_hook(self.hooks.as_ref(), &self.ctx, Some(&cause));
                Err(StageFailure { stage, exit_code })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exit;
    use parking_lot::Mutex;
    use std::time::Instant;

    #[derive(Default)]
    struct RecordingHooks {
        failures: Mutex<Vec<Option<RuntimeError>>>,
    }

    impl LaunchHooks for RecordingHooks {
        fn after_failure_to_start_runtime(
            &self,
            _ctx: &LifecycleContext,
            cause: Option<&RuntimeError>,
        ) {
            self.failures.lock().push(cause.cloned());
        }
    }

    fn executor(hooks: Arc<RecordingHooks>) -> (LaunchExecutor, Interrupter) {
        let interrupter = Interrupter::new();
        (
            LaunchExecutor::new(
                Arc::new(LifecycleContext::new()),
                hooks,
                interrupter.clone(),
            ),
            interrupter,
        )
    }

    fn start_failure_hook() -> FailureHook {
        |hooks, ctx, cause| hooks.after_failure_to_start_runtime(ctx, cause)
    }

    #[test]
    fn successful_operation_returns_its_value() {
        let hooks = Arc::new(RecordingHooks::default());
        let (executor, _) = executor(hooks.clone());
        let value = executor
            .run_bounded(
                "startup",
                Duration::from_secs(1),
                exit::RUNTIME_INITIALIZATION,
                start_failure_hook(),
                || Completion::succeeded(5u8),
            )
            .expect("success");
        assert_eq!(value, 5);
        assert!(hooks.failures.lock().is_empty());
        assert!(ExecutionScope::current().is_none());
    }

    #[test]
    fn operation_failure_notifies_the_hook_once_with_the_cause() {
        let hooks = Arc::new(RecordingHooks::default());
        let (executor, _) = executor(hooks.clone());
        let failure = executor
            .run_bounded(
                "startup",
                Duration::from_secs(1),
                exit::RUNTIME_INITIALIZATION,
                start_failure_hook(),
                || {
                    Completion::<u8>::failed(RuntimeError::Startup {
                        reason: "no threads".to_owned(),
                    })
                },
            )
            .expect_err("failure");
        assert_eq!(failure.exit_code, exit::RUNTIME_INITIALIZATION);
        let failures = hooks.failures.lock();
        assert_eq!(failures.len(), 1);
        assert_eq!(
            failures[0],
            Some(RuntimeError::Startup {
                reason: "no threads".to_owned()
            })
        );
        assert!(ExecutionScope::current().is_none());
    }

    #[test]
    fn timeout_notifies_the_hook_with_an_indeterminate_cause() {
        let hooks = Arc::new(RecordingHooks::default());
        let (executor, _) = executor(hooks.clone());
        let started = Instant::now();
        let failure = executor
            .run_bounded(
                "startup",
                Duration::from_millis(80),
                exit::RUNTIME_INITIALIZATION,
                start_failure_hook(),
                || Completion::<u8>::new().1,
            )
            .expect_err("timeout");
        assert!(started.elapsed() >= Duration::from_millis(80));
        assert_eq!(failure.exit_code, exit::RUNTIME_INITIALIZATION);
        let failures = hooks.failures.lock();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0], None);
    }

    #[test]
    fn interruption_fails_the_stage_with_an_interrupt_cause() {
        let hooks = Arc::new(RecordingHooks::default());
        let (executor, interrupter) = executor(hooks.clone());
        let remote = interrupter.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            remote.trigger();
        });
        let started = Instant::now();
        let failure = executor
            .run_bounded(
                "startup",
                Duration::from_secs(10),
                exit::RUNTIME_INITIALIZATION,
                start_failure_hook(),
                || Completion::<u8>::new().1,
            )
            .expect_err("interrupt");
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(failure.exit_code, exit::RUNTIME_INITIALIZATION);
        assert_eq!(hooks.failures.lock()[0], Some(RuntimeError::Interrupted));
        // Interrupt status stays observable after the wait.
        assert!(interrupter.is_triggered());
    }
}
