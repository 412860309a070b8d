//! ---
//! gantry_section: "01-lifecycle"
//! gantry_subsection: "module"
//! gantry_type: "source"
//! gantry_scope: "code"
//! gantry_description: "Signal-driven graceful shutdown coordination."
//! gantry_version: "v0.1.0"
//! gantry_owner: "tbd"
//! ---
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use gantry_runtime::{Interrupter, RuntimeError};
use tracing::{error, info, warn};

use crate::context::LifecycleContext;
use crate::hooks::LaunchHooks;

/// Narrow collaborator delivering the process termination request.
///
/// The default implementation listens for Ctrl-C/SIGTERM; tests and
/// embedders can inject their own trigger.
pub trait TerminationSignal: Send + 'static {
    /// Block the coordinator's thread until termination is requested.
    fn wait(self: Box<Self>);
}

/// Termination signal backed by the process signal handler.
pub struct CtrlCSignal {
    rx: mpsc::Receiver<()>,
}

impl CtrlCSignal {
    /// Install the process signal handler. The given interrupter is
    /// triggered alongside the termination request so a bounded wait in
    /// progress observes the interruption.
    pub fn install(interrupter: Interrupter) -> anyhow::Result<Self> {
        let (tx, rx) = mpsc::channel();
        ctrlc::set_handler(move || {
            interrupter.trigger();
            let _ = tx.send(());
        })?;
        Ok(Self { rx })
    }
}

impl TerminationSignal for CtrlCSignal {
    fn wait(self: Box<Self>) {
        let _ = self.rx.recv();
    }
}

/// Manually triggered termination signal, for tests and embedders that
/// manage process signals themselves.
pub struct ManualTermination {
    rx: mpsc::Receiver<()>,
}

impl ManualTermination {
    /// Create the signal and the handle that triggers it.
    pub fn new() -> (TerminationHandle, Self) {
        let (tx, rx) = mpsc::channel();
        (TerminationHandle { tx }, Self { rx })
    }
}

impl TerminationSignal for ManualTermination {
    fn wait(self: Box<Self>) {
        let _ = self.rx.recv();
    }
}

/// Triggers a [`ManualTermination`].
#[derive(Clone)]
pub struct TerminationHandle {
    tx: mpsc::Sender<()>,
}

impl TerminationHandle {
    /// Request termination. Subsequent calls are no-ops.
    pub fn terminate(&self) {
        let _ = self.tx.send(());
    }
}

/// Coordinates best-effort graceful teardown on its own thread.
///
/// Registered once, immediately after the runtime starts. When the
/// termination signal fires, the coordinator invokes the stop-side hooks and
/// waits for the runtime to close within a fixed budget, recomputing the
/// remaining budget from the wall clock across interruptions. It races
/// forced process termination and is not guaranteed to complete, but it
/// never blocks indefinitely.
pub struct ShutdownCoordinator {
    done: mpsc::Receiver<()>,
}

impl ShutdownCoordinator {
    pub(crate) fn register(
        signal: Box<dyn TerminationSignal>,
        ctx: Arc<LifecycleContext>,
        hooks: Arc<dyn LaunchHooks>,
        budget: Duration,
        interrupter: Interrupter,
    ) -> Self {
        let (done_tx, done_rx) = mpsc::channel();
        std::thread::spawn(move || {
            signal.wait();
            info!("termination requested; stopping the runtime");
            run_teardown(&ctx, hooks.as_ref(), budget, &interrupter);
            let _ = done_tx.send(());
        });
        Self { done: done_rx }
    }

    /// Park the calling thread until teardown has run to completion.
    pub fn wait_terminated(&self) {
        let _ = self.done.recv();
    }
}

fn run_teardown(
    ctx: &LifecycleContext,
    hooks: &dyn LaunchHooks,
    budget: Duration,
    interrupter: &Interrupter,
) {
    let mut hook_failure: Option<RuntimeError> = None;
    if let Err(err) = hooks.before_stopping_runtime(ctx) {
        warn!(error = %err, "before_stopping_runtime hook failed");
        hook_failure = Some(RuntimeError::Hook {
            reason: err.to_string(),
        });
    }
    let Some(runtime) = ctx.runtime() else {
        // The coordinator is only registered after a successful start.
        warn!("no runtime recorded at teardown");
        return;
    };
    match runtime.close().await_ignoring_interrupts(budget, interrupter) {
        Some(Ok(())) => match hook_failure {
            Some(cause) => hooks.after_failure_to_stop_runtime(ctx, Some(&cause)),
            None => {
                info!("runtime stopped");
                hooks.after_runtime_stopped(ctx);
            }
        },
        Some(Err(cause)) => {
            error!(error = %cause, "failure in stopping the runtime");
            hooks.after_failure_to_stop_runtime(ctx, Some(&cause));
        }
        None => {
            error!("timed out waiting for the runtime to close");
            hooks.after_failure_to_stop_runtime(ctx, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_config::{DeploymentOptions, WorkloadConfig};
    use gantry_runtime::{
        Completion, DeployableFactory, DeploymentId, Runtime, RuntimeError,
    };
    use parking_lot::Mutex;

    #[derive(Debug)]
    enum CloseBehavior {
        Clean,
        Failing,
        Hanging,
    }

    #[derive(Debug)]
    struct ScriptedRuntime {
        close: CloseBehavior,
    }

    impl Runtime for ScriptedRuntime {
        fn deploy(
            &self,
            _factory: std::sync::Arc<dyn DeployableFactory>,
            _options: DeploymentOptions,
            _config: WorkloadConfig,
        ) -> Completion<DeploymentId> {
            Completion::succeeded(DeploymentId::random())
        }

        fn close(&self) -> Completion<()> {
            match self.close {
                CloseBehavior::Clean => Completion::succeeded(()),
                CloseBehavior::Failing => Completion::failed(RuntimeError::Close {
                    reason: "stuck instance".to_owned(),
                }),
                CloseBehavior::Hanging => Completion::new().1,
            }
        }
    }

    #[derive(Debug, Default)]
    struct StopRecorder {
        events: Mutex<Vec<String>>,
        fail_before_stop: bool,
    }

    impl LaunchHooks for StopRecorder {
        fn before_stopping_runtime(&self, _ctx: &LifecycleContext) -> anyhow::Result<()> {
            self.events.lock().push("before_stopping".to_owned());
            if self.fail_before_stop {
                anyhow::bail!("refusing to stop");
            }
            Ok(())
        }

        fn after_runtime_stopped(&self, _ctx: &LifecycleContext) {
            self.events.lock().push("stopped".to_owned());
        }

        fn after_failure_to_stop_runtime(
            &self,
            _ctx: &LifecycleContext,
            cause: Option<&RuntimeError>,
        ) {
            self.events
                .lock()
                .push(format!("failure:{:?}", cause.cloned()));
        }
    }

    fn context_with(close: CloseBehavior) -> Arc<LifecycleContext> {
        let ctx = Arc::new(LifecycleContext::new());
        ctx.set_runtime(Arc::new(ScriptedRuntime { close }));
        ctx
    }

    fn run(
        close: CloseBehavior,
        hooks: Arc<StopRecorder>,
        budget: Duration,
    ) -> Arc<StopRecorder> {
        let (handle, signal) = ManualTermination::new();
        let coordinator = ShutdownCoordinator::register(
            Box::new(signal),
            context_with(close),
            hooks.clone(),
            budget,
            Interrupter::new(),
        );
        handle.terminate();
        coordinator.wait_terminated();
        hooks
    }

    #[test]
    fn clean_close_reports_runtime_stopped() {
        let hooks = run(
            CloseBehavior::Clean,
            Arc::new(StopRecorder::default()),
            Duration::from_secs(1),
        );
        assert_eq!(
            *hooks.events.lock(),
            vec!["before_stopping".to_owned(), "stopped".to_owned()]
        );
    }

    #[test]
    fn failing_close_reports_the_cause() {
        let hooks = run(
            CloseBehavior::Failing,
            Arc::new(StopRecorder::default()),
            Duration::from_secs(1),
        );
        let events = hooks.events.lock();
        assert_eq!(events[0], "before_stopping");
        assert!(events[1].starts_with("failure:Some(Close"));
    }

    #[test]
    fn hanging_close_reports_an_indeterminate_outcome() {
        let hooks = run(
            CloseBehavior::Hanging,
            Arc::new(StopRecorder::default()),
            Duration::from_millis(80),
        );
        assert_eq!(*hooks.events.lock(), vec![
            "before_stopping".to_owned(),
            "failure:None".to_owned()
        ]);
    }

    #[test]
    fn hook_failure_is_captured_as_a_failure_outcome() {
        let hooks = Arc::new(StopRecorder {
            fail_before_stop: true,
            ..StopRecorder::default()
        });
        let hooks = run(CloseBehavior::Clean, hooks, Duration::from_secs(1));
        let events = hooks.events.lock();
        assert_eq!(events[0], "before_stopping");
        assert!(events[1].starts_with("failure:Some(Hook"));
    }
}
