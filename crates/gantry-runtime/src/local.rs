//! ---
//! gantry_section: "03-runtime-contract"
//! gantry_subsection: "module"
//! gantry_type: "source"
//! gantry_scope: "code"
//! gantry_description: "Local tokio-backed implementation of the runtime contract."
//! gantry_version: "v0.1.0"
//! gantry_owner: "tbd"
//! ---
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use gantry_config::{DeploymentOptions, RuntimeOptions, ThreadingStrategy, WorkloadConfig};
use parking_lot::Mutex;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::completion::Completion;
use crate::contract::{
    Deployable, DeployableFactory, DeployContext, DeploymentId, Runtime, RuntimeError,
    RuntimeFactory,
};

/// Starts a [`LocalRuntime`] on a dedicated tokio multi-thread scheduler.
///
/// The local runtime hosts deployments in-process. Clustering options are
/// accepted through the contract but a local runtime joins no peers; a
/// request for clustering is logged and otherwise ignored.
#[derive(Debug, Default)]
pub struct LocalRuntimeFactory;

impl LocalRuntimeFactory {
    /// Create a factory with default behavior.
    pub fn new() -> Self {
        Self
    }
}

impl RuntimeFactory for LocalRuntimeFactory {
    fn start(&self, options: &RuntimeOptions) -> Completion<Arc<dyn Runtime>> {
        let (handle, completion) = Completion::<Arc<dyn Runtime>>::new();
        if options.cluster.enabled {
            info!(
                host = ?options.cluster.host,
                port = ?options.cluster.port,
                "clustering requested; the local runtime joins no peers"
            );
        }
        let mut builder = tokio::runtime::Builder::new_multi_thread();
        builder
            .worker_threads(options.event_loop_size)
            .max_blocking_threads(options.worker_pool_size)
            .thread_name("gantry-loop")
            .enable_all();
        match builder.build() {
            Ok(runtime) => {
                info!(
                    event_loops = options.event_loop_size,
                    workers = options.worker_pool_size,
                    "local runtime started"
                );
                handle.succeed(Arc::new(LocalRuntime::new(runtime)));
            }
            Err(err) => handle.fail(RuntimeError::Startup {
                reason: err.to_string(),
            }),
        }
        completion
    }
}

enum InstanceTask {
    Task(JoinHandle<()>),
    Thread(std::thread::JoinHandle<()>),
}

struct DeploymentRecord {
    id: DeploymentId,
    shutdown: broadcast::Sender<()>,
    tasks: Vec<InstanceTask>,
}

struct Inner {
    handle: tokio::runtime::Handle,
    // Parked here so the scheduler outlives the factory call; dropped with
    // the last runtime reference, which must not be on a loop thread.
    runtime: Mutex<Option<tokio::runtime::Runtime>>,
    deployments: Mutex<Vec<DeploymentRecord>>,
    closed: AtomicBool,
}

/// In-process runtime hosting deployable instances on tokio.
pub struct LocalRuntime {
    inner: Arc<Inner>,
}

impl LocalRuntime {
    fn new(runtime: tokio::runtime::Runtime) -> Self {
        let handle = runtime.handle().clone();
        Self {
            inner: Arc::new(Inner {
                handle,
                runtime: Mutex::new(Some(runtime)),
                deployments: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
            }),
        }
    }
}

impl fmt::Debug for LocalRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalRuntime")
            .field("closed", &self.inner.closed.load(Ordering::SeqCst))
            .field("deployments", &self.inner.deployments.lock().len())
            .finish()
    }
}

async fn instance_main(
    mut deployable: Box<dyn Deployable>,
    ctx: DeployContext,
    ready: oneshot::Sender<Result<(), RuntimeError>>,
    mut shutdown: broadcast::Receiver<()>,
) {
    match deployable.start(&ctx).await {
        Ok(()) => {
            if ready.send(Ok(())).is_err() {
                debug!(deployment = %ctx.deployment_id, instance = ctx.instance, "deploy observer gone before readiness");
            }
        }
        Err(err) => {
            let _ = ready.send(Err(err));
            return;
        }
    }
    let _ = shutdown.recv().await;
    if let Err(err) = deployable.stop().await {
        warn!(
            deployment = %ctx.deployment_id,
            instance = ctx.instance,
            error = %err,
            "deployable stop failed"
        );
    }
}

impl Runtime for LocalRuntime {
    fn deploy(
        &self,
        factory: Arc<dyn DeployableFactory>,
        options: DeploymentOptions,
        config: WorkloadConfig,
    ) -> Completion<DeploymentId> {
        let (done, completion) = Completion::new();
        if self.inner.closed.load(Ordering::SeqCst) {
            done.fail(RuntimeError::Closed);
            return completion;
        }
        let inner = self.inner.clone();
        let deployment_id = DeploymentId::random();
        self.inner.handle.spawn(async move {
            let runtime_handle = tokio::runtime::Handle::current();
            let (shutdown_tx, _) = broadcast::channel(1);
            let mut readies = Vec::with_capacity(options.instances);
            let mut tasks = Vec::with_capacity(options.instances);

            for instance in 0..options.instances {
                let deployable = factory.create();
                let ctx = DeployContext {
                    deployment_id: deployment_id.clone(),
                    instance,
                    config: config.clone(),
                };
                let (ready_tx, ready_rx) = oneshot::channel();
                let shutdown_rx = shutdown_tx.subscribe();
                readies.push(ready_rx);
                match options.threading {
                    ThreadingStrategy::EventLoop => {
                        tasks.push(InstanceTask::Task(tokio::spawn(instance_main(
                            deployable,
                            ctx,
                            ready_tx,
                            shutdown_rx,
                        ))));
                    }
                    ThreadingStrategy::Worker => {
                        let handle = runtime_handle.clone();
                        tasks.push(InstanceTask::Task(tokio::task::spawn_blocking(move || {
                            let _guard = handle.enter();
                            futures::executor::block_on(instance_main(
                                deployable,
                                ctx,
                                ready_tx,
                                shutdown_rx,
                            ));
                        })));
                    }
                    ThreadingStrategy::Dedicated => {
                        let handle = runtime_handle.clone();
                        let spawned = std::thread::Builder::new()
                            .name(format!("gantry-dedicated-{}", instance))
                            .spawn(move || {
                                let _guard = handle.enter();
                                futures::executor::block_on(instance_main(
                                    deployable,
                                    ctx,
                                    ready_tx,
                                    shutdown_rx,
                                ));
                            });
                        match spawned {
                            Ok(thread) => tasks.push(InstanceTask::Thread(thread)),
                            // The readiness sender died with the closure; the
                            // readiness loop below reports the failure.
                            Err(err) => {
                                warn!(instance, error = %err, "failed to spawn dedicated thread")
                            }
                        }
                    }
                }
            }

            let mut failure: Option<RuntimeError> = None;
            for ready in readies {
                match ready.await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => {
                        failure.get_or_insert(err);
                    }
                    Err(_) => {
                        failure.get_or_insert(RuntimeError::Deployment {
                            reason: "instance terminated before reporting readiness".to_owned(),
                        });
                    }
                }
            }

            match failure {
                Some(err) => {
                    // Roll back the instances that did come up.
                    let _ = shutdown_tx.send(());
                    warn!(deployment = %deployment_id, error = %err, "deployment failed");
                    done.fail(err);
                }
                None => {
                    debug!(
                        deployment = %deployment_id,
                        instances = options.instances,
                        threading = ?options.threading,
                        "deployment instances ready"
                    );
                    inner.deployments.lock().push(DeploymentRecord {
                        id: deployment_id.clone(),
                        shutdown: shutdown_tx,
                        tasks,
                    });
                    done.succeed(deployment_id);
                }
            }
        });
        completion
    }

    fn close(&self) -> Completion<()> {
        let (done, completion) = Completion::new();
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            done.succeed(());
            return completion;
        }
        let inner = self.inner.clone();
        // Joining runs off the event loops so dedicated-thread instances can
        // be joined without stalling the scheduler.
        std::thread::spawn(move || {
            let records: Vec<DeploymentRecord> = inner.deployments.lock().drain(..).collect();
            for record in &records {
                let _ = record.shutdown.send(());
            }
            let mut failures = Vec::new();
            for record in records {
                for task in record.tasks {
                    match task {
                        InstanceTask::Task(task) => {
                            if let Err(err) = inner.handle.block_on(task) {
                                failures.push(format!(
                                    "deployment {} instance task failed: {}",
                                    record.id, err
                                ));
                            }
                        }
                        InstanceTask::Thread(thread) => {
                            if thread.join().is_err() {
                                failures
                                    .push(format!("deployment {} instance thread panicked", record.id));
                            }
                        }
                    }
                }
            }
            if let Some(runtime) = inner.runtime.lock().take() {
                runtime.shutdown_background();
            }
            if failures.is_empty() {
                info!("local runtime closed");
                done.succeed(());
            } else {
                done.fail(RuntimeError::Close {
                    reason: failures.join("; "),
                });
            }
        });
        completion
    }
}
