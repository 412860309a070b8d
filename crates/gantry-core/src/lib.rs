//! ---
//! gantry_section: "01-lifecycle"
//! gantry_subsection: "module"
//! gantry_type: "source"
//! gantry_scope: "code"
//! gantry_description: "Application lifecycle orchestration for the Gantry launcher."
//! gantry_version: "v0.1.0"
//! gantry_owner: "tbd"
//! ---
//! Application lifecycle orchestration.
//!
//! The driver resolves layered configuration, fires the pre-start hook,
//! starts the runtime under a bounded wait, registers the shutdown
//! coordinator, prepares and performs the deployment under a second bounded
//! wait, and converts every failure into a dedicated process exit code. The
//! embedding program customizes each stage through [`LaunchHooks`].

#![warn(missing_docs)]

mod context;
mod error;
mod executor;
pub mod exit;
mod hooks;
mod launcher;
mod scope;
mod shutdown;

pub use context::LifecycleContext;
pub use error::{LaunchError, StageFailure};
pub use hooks::{DefaultHooks, LaunchHooks};
pub use launcher::{GantryApplication, LaunchCommand, LaunchOutcome, MAIN_DEPLOYABLE_ENV};
pub use scope::ExecutionScope;
pub use shutdown::{
    CtrlCSignal, ManualTermination, ShutdownCoordinator, TerminationHandle, TerminationSignal,
};
