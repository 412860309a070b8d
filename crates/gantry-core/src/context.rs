//! ---
//! gantry_section: "01-lifecycle"
//! gantry_subsection: "module"
//! gantry_type: "source"
//! gantry_scope: "code"
//! gantry_description: "Stage-scoped lifecycle state shared with hooks."
//! gantry_version: "v0.1.0"
//! gantry_owner: "tbd"
//! ---
use std::fmt;
use std::sync::Arc;

use gantry_config::{DeploymentOptions, RuntimeOptions, WorkloadConfig};
use gantry_runtime::{DeploymentId, Runtime};
use parking_lot::Mutex;

#[derive(Default)]
struct ContextState {
    runtime_options: Option<RuntimeOptions>,
    runtime: Option<Arc<dyn Runtime>>,
    deployable_name: Option<String>,
    deployment_options: Option<DeploymentOptions>,
    workload_config: Option<WorkloadConfig>,
    deployment_id: Option<DeploymentId>,
}

/// Mutable, thread-safe holder of stage-scoped launch state.
///
/// One context is created per launch and shared by reference with every hook
/// invocation. Hooks may run on the shutdown coordinator's thread, so all
/// access is synchronized. Fields are populated in stage order and never
/// transition back to unset: a hook observing a later stage always sees the
/// earlier stages fully populated.
#[derive(Default)]
pub struct LifecycleContext {
    state: Mutex<ContextState>,
}

impl LifecycleContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_runtime_options(&self, options: RuntimeOptions) {
        self.state.lock().runtime_options = Some(options);
    }

    /// The resolved runtime options. Set once before the runtime starts,
    /// then frozen for reads.
    pub fn runtime_options(&self) -> Option<RuntimeOptions> {
        self.state.lock().runtime_options.clone()
    }

    pub(crate) fn set_runtime(&self, runtime: Arc<dyn Runtime>) {
        self.state.lock().runtime = Some(runtime);
    }

    /// The started runtime. `None` until startup succeeded.
    pub fn runtime(&self) -> Option<Arc<dyn Runtime>> {
        self.state.lock().runtime.clone()
    }

    pub(crate) fn ready_to_deploy(
        &self,
        deployable_name: Option<String>,
        options: DeploymentOptions,
        config: WorkloadConfig,
    ) {
        let mut state = self.state.lock();
        state.deployable_name = deployable_name;
        state.deployment_options = Some(options);
        state.workload_config = Some(config);
    }

    /// The resolved deployable name. `None` until deployment is prepared,
    /// and also when a factory hook supplies the deployable.
    pub fn deployable_name(&self) -> Option<String> {
        self.state.lock().deployable_name.clone()
    }

    /// The deployment options recorded for the upcoming deployment.
    pub fn deployment_options(&self) -> Option<DeploymentOptions> {
        self.state.lock().deployment_options.clone()
    }

    /// Mutate the deployment options in place. Only effective until the
    /// deploy stage begins; later changes are not observed by the runtime.
    pub fn update_deployment_options(&self, mutate: impl FnOnce(&mut DeploymentOptions)) {
        let mut state = self.state.lock();
        if let Some(options) = state.deployment_options.as_mut() {
            mutate(options);
        }
    }

    /// The workload configuration payload recorded for the deployment.
    pub fn workload_config(&self) -> Option<WorkloadConfig> {
        self.state.lock().workload_config.clone()
    }

    pub(crate) fn set_deployment_id(&self, id: DeploymentId) {
        self.state.lock().deployment_id = Some(id);
    }

    /// The deployment identifier. `None` until the deployment succeeded.
    pub fn deployment_id(&self) -> Option<DeploymentId> {
        self.state.lock().deployment_id.clone()
    }
}

impl fmt::Debug for LifecycleContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("LifecycleContext")
            .field("runtime_options_set", &state.runtime_options.is_some())
            .field("runtime_set", &state.runtime.is_some())
            .field("deployable_name", &state.deployable_name)
            .field("deployment_options_set", &state.deployment_options.is_some())
            .field("deployment_id", &state.deployment_id)
            .finish()
    }
}
