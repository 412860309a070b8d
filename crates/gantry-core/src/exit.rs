//! ---
//! gantry_section: "01-lifecycle"
//! gantry_subsection: "module"
//! gantry_type: "source"
//! gantry_scope: "code"
//! gantry_description: "Process exit codes produced by the launcher."
//! gantry_version: "v0.1.0"
//! gantry_owner: "tbd"
//! ---
//! Process exit codes produced by the launcher.

/// The deployment completed; the process keeps serving.
pub const SUCCESS: i32 = 0;
/// Catch-all for uncaught software errors.
pub const SOFTWARE: i32 = 1;
/// The command line could not be parsed, or help was requested.
pub const USAGE: i32 = 2;
/// Structurally invalid explicit configuration, detected before start.
pub const CONFIGURATION: i32 = 10;
/// The runtime failed to start, timed out, or the wait was interrupted.
pub const RUNTIME_INITIALIZATION: i32 = 11;
/// The deployment failed, timed out, or no deployable identity was resolved.
pub const DEPLOYMENT: i32 = 15;
