//! ---
//! gantry_section: "01-lifecycle"
//! gantry_subsection: "module"
//! gantry_type: "source"
//! gantry_scope: "code"
//! gantry_description: "Launcher error taxonomy mapped onto exit codes."
//! gantry_version: "v0.1.0"
//! gantry_owner: "tbd"
//! ---
use gantry_config::ConfigError;
use thiserror::Error;

use crate::exit;

/// Failure of a bounded launch stage, carrying the process exit code.
///
/// Raised by the launch executor when the runtime-start or deploy operation
/// fails, times out, or the waiting thread is interrupted, and by the driver
/// when a pre-stage hook fails.
#[derive(Debug, Error)]
#[error("failed in {stage}")]
pub struct StageFailure {
    /// Stage label used in log output.
    pub stage: &'static str,
    /// Exit code mapped to the failed stage.
    pub exit_code: i32,
}

/// Any failure the launcher converts into a non-zero process exit code.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// The command line could not be parsed.
    #[error("{message}")]
    Usage {
        /// Parser-produced message.
        message: String,
    },
    /// Structurally invalid explicit configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// No deployable name, factory hook, or metadata default was available.
    #[error(
        "no deployable to deploy: pass a <DEPLOYABLE> argument, register a default, or supply a factory hook"
    )]
    MissingDeployable,
    /// A bounded stage failed; the failure hook has already been notified.
    #[error(transparent)]
    Stage(#[from] StageFailure),
    /// An unexpected launcher-internal failure.
    #[error("{message}")]
    Internal {
        /// Human-readable description.
        message: String,
    },
}

impl LaunchError {
    /// The process exit code this failure maps to.
    pub fn exit_code(&self) -> i32 {
        match self {
            LaunchError::Usage { .. } => exit::USAGE,
            LaunchError::Config(_) => exit::CONFIGURATION,
            LaunchError::MissingDeployable => exit::DEPLOYMENT,
            LaunchError::Stage(failure) => failure.exit_code,
            LaunchError::Internal { .. } => exit::SOFTWARE,
        }
    }

    /// Whether usage text should accompany the error report.
    pub fn wants_usage(&self) -> bool {
        matches!(
            self,
            LaunchError::Usage { .. } | LaunchError::MissingDeployable
        )
    }
}
