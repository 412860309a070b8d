//! ---
//! gantry_section: "03-runtime-contract"
//! gantry_subsection: "module"
//! gantry_type: "source"
//! gantry_scope: "code"
//! gantry_description: "Runtime contract, completion primitive, and local runtime."
//! gantry_version: "v0.1.0"
//! gantry_owner: "tbd"
//! ---
//! The narrow contract through which the launcher consumes an execution
//! runtime, plus a local tokio-backed implementation of it.
//!
//! The launcher only ever sees three asynchronous operations: start the
//! runtime, deploy a unit of work into it, and close it. Each returns a
//! [`Completion`] that the launcher's thread observes under a wall-clock
//! deadline; the runtime's internal scheduling stays out of scope.

#![warn(missing_docs)]

mod completion;
mod contract;
mod local;
mod registry;

pub use completion::{Completion, CompletionHandle, Interrupter, WaitOutcome};
pub use contract::{
    Deployable, DeployableFactory, DeployContext, DeploymentId, Runtime, RuntimeError,
    RuntimeFactory,
};
pub use local::LocalRuntimeFactory;
pub use registry::DeployableRegistry;
