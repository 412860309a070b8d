//! ---
//! gantry_section: "01-lifecycle"
//! gantry_subsection: "module"
//! gantry_type: "source"
//! gantry_scope: "code"
//! gantry_description: "Extension-point protocol invoked at each launch stage."
//! gantry_version: "v0.1.0"
//! gantry_owner: "tbd"
//! ---
use std::sync::Arc;

use anyhow::Result;
use gantry_runtime::{DeployableFactory, RuntimeError, RuntimeFactory};
use serde_json::Value;
use tracing::warn;

use crate::context::LifecycleContext;

/// Extension points invoked by the launcher at defined lifecycle stages.
///
/// Every method has a default implementation, so an embedder overrides only
/// the subset it cares about. Exactly one hook set instance is bound per
/// launch. On a successful run the stage hooks fire in this order:
/// `before_starting_runtime`, `after_runtime_started`, `before_deploying`,
/// `after_deployed`, and, once the process is told to terminate,
/// `before_stopping_runtime` followed by `after_runtime_stopped`.
///
/// The start and deploy hooks run on the launching thread; the stop hooks
/// run on the shutdown coordinator's thread. A failure `cause` of `None`
/// means the operation outcome is indeterminate because the wait timed out.
pub trait LaunchHooks: Send + Sync {
    /// Invoked after parsing the runtime options source. The returned value
    /// replaces the parsed one.
    fn after_runtime_options_parsed(&self, parsed: Option<Value>) -> Option<Value> {
        parsed
    }

    /// Invoked after parsing the deployment options source. The returned
    /// value replaces the parsed one.
    fn after_deployment_options_parsed(&self, parsed: Option<Value>) -> Option<Value> {
        parsed
    }

    /// Invoked after parsing the workload configuration source. The returned
    /// value replaces the parsed one.
    fn after_workload_config_parsed(&self, parsed: Option<Value>) -> Option<Value> {
        parsed
    }

    /// Invoked before the runtime starts. The runtime options recorded in
    /// the context are final at this point. An error aborts the startup
    /// stage.
    fn before_starting_runtime(&self, _ctx: &LifecycleContext) -> Result<()> {
        Ok(())
    }

    /// Supply a custom runtime factory, overriding the one configured on the
    /// application.
    fn runtime_factory(&self) -> Option<Arc<dyn RuntimeFactory>> {
        None
    }

    /// Invoked after the runtime started successfully.
    fn after_runtime_started(&self, _ctx: &LifecycleContext) {}

    /// Invoked after the runtime failed to start. A `None` cause means the
    /// startup wait timed out.
    fn after_failure_to_start_runtime(
        &self,
        _ctx: &LifecycleContext,
        _cause: Option<&RuntimeError>,
    ) {
    }

    /// Supply the deployable ahead of deployment, overriding any name from
    /// the command line or the metadata default.
    fn deployable_factory(&self) -> Option<Arc<dyn DeployableFactory>> {
        None
    }

    /// Invoked before deploying. The deployment options in the context can
    /// still be modified here. An error aborts the deployment stage.
    fn before_deploying(&self, _ctx: &LifecycleContext) -> Result<()> {
        Ok(())
    }

    /// Invoked after the deployable was deployed successfully.
    fn after_deployed(&self, _ctx: &LifecycleContext) {}

    /// Invoked after the deployable failed to deploy. A `None` cause means
    /// the deploy wait timed out. The default action closes the runtime.
    fn after_failure_to_deploy(&self, ctx: &LifecycleContext, _cause: Option<&RuntimeError>) {
        if let Some(runtime) = ctx.runtime() {
            warn!("deployment failed; closing the runtime");
            drop(runtime.close());
        }
    }

    /// Invoked before the runtime is stopped. An error is captured as a
    /// failure outcome of the stop stage rather than propagated.
    fn before_stopping_runtime(&self, _ctx: &LifecycleContext) -> Result<()> {
        Ok(())
    }

    /// Invoked after the runtime stopped cleanly.
    fn after_runtime_stopped(&self, _ctx: &LifecycleContext) {}

    /// Invoked after the runtime failed to stop. A `None` cause means the
    /// close wait timed out.
    fn after_failure_to_stop_runtime(
        &self,
        _ctx: &LifecycleContext,
        _cause: Option<&RuntimeError>,
    ) {
    }
}

/// The no-op hook set bound when an embedder supplies none.
#[derive(Debug, Default)]
pub struct DefaultHooks;

impl LaunchHooks for DefaultHooks {}
