//! ---
//! gantry_section: "03-runtime-contract"
//! gantry_subsection: "module"
//! gantry_type: "source"
//! gantry_scope: "code"
//! gantry_description: "Traits and types of the start/deploy/close contract."
//! gantry_version: "v0.1.0"
//! gantry_owner: "tbd"
//! ---
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use gantry_config::{DeploymentOptions, RuntimeOptions, WorkloadConfig};
use thiserror::Error;
use uuid::Uuid;

use crate::completion::Completion;

/// Errors reported through the runtime contract.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RuntimeError {
    /// The runtime could not be constructed or started.
    #[error("runtime startup failed: {reason}")]
    Startup {
        /// Human-readable failure description.
        reason: String,
    },
    /// The deployment did not complete successfully.
    #[error("deployment failed: {reason}")]
    Deployment {
        /// Human-readable failure description.
        reason: String,
    },
    /// Graceful close did not complete successfully.
    #[error("runtime close failed: {reason}")]
    Close {
        /// Human-readable failure description.
        reason: String,
    },
    /// An operation was requested on a runtime that is already closed.
    #[error("runtime already closed")]
    Closed,
    /// The observing thread was interrupted while waiting for the outcome.
    #[error("operation interrupted")]
    Interrupted,
    /// A lifecycle hook participating in the operation failed.
    #[error("lifecycle hook failed: {reason}")]
    Hook {
        /// Human-readable failure description.
        reason: String,
    },
}

/// Identifier assigned to a successful deployment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeploymentId(String);

impl DeploymentId {
    /// Generate a fresh random identifier.
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeploymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-instance context handed to a deployable when it starts.
#[derive(Debug, Clone)]
pub struct DeployContext {
    /// Identifier of the deployment this instance belongs to.
    pub deployment_id: DeploymentId,
    /// Zero-based index of this instance within the deployment.
    pub instance: usize,
    /// Workload configuration payload, exactly as resolved by the launcher.
    pub config: WorkloadConfig,
}

/// A unit of work hosted by the runtime.
///
/// `start` is awaited as part of the deployment; the instance then lives
/// until the runtime closes, at which point `stop` is awaited.
#[async_trait]
pub trait Deployable: Send {
    /// Bring the instance up. The deployment completes once every instance
    /// has returned from here.
    async fn start(&mut self, ctx: &DeployContext) -> Result<(), RuntimeError>;

    /// Tear the instance down. Invoked during runtime close.
    async fn stop(&mut self) -> Result<(), RuntimeError> {
        Ok(())
    }
}

/// Creates deployable instances. One factory serves every instance of a
/// deployment.
pub trait DeployableFactory: Send + Sync {
    /// Create a fresh instance.
    fn create(&self) -> Box<dyn Deployable>;
}

impl<F> DeployableFactory for F
where
    F: Fn() -> Box<dyn Deployable> + Send + Sync,
{
    fn create(&self) -> Box<dyn Deployable> {
        self()
    }
}

/// A started runtime, consumed only through deploy and close.
pub trait Runtime: Send + Sync + fmt::Debug {
    /// Deploy instances of a unit of work. The completion carries the
    /// deployment identifier once every instance reported readiness.
    fn deploy(
        &self,
        factory: Arc<dyn DeployableFactory>,
        options: DeploymentOptions,
        config: WorkloadConfig,
    ) -> Completion<DeploymentId>;

    /// Request graceful close: running instances are stopped and joined.
    fn close(&self) -> Completion<()>;
}

/// Constructs and starts a runtime from resolved options.
pub trait RuntimeFactory: Send + Sync {
    /// Start a runtime. The completion carries the handle once the runtime
    /// is ready to accept deployments.
    fn start(&self, options: &RuntimeOptions) -> Completion<Arc<dyn Runtime>>;
}
