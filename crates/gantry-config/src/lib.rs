//! ---
//! gantry_section: "02-configuration"
//! gantry_subsection: "module"
//! gantry_type: "source"
//! gantry_scope: "code"
//! gantry_description: "Layered configuration resolution for the launcher."
//! gantry_version: "v0.1.0"
//! gantry_owner: "tbd"
//! ---
//! Configuration resolution for the Gantry launcher.
//!
//! Option values are merged from layered sources with a fixed precedence,
//! highest first: explicit command-line flags, dotted property definitions,
//! environment variables, a JSON file or inline JSON object, and finally the
//! compiled-in defaults. Malformed sources degrade to defaults with a
//! warning; only structurally invalid flag combinations are fatal.

mod options;
mod overrides;
mod resolver;
mod source;

pub use options::{
    ClusterOptions, DeploymentOptions, RuntimeOptions, ThreadingStrategy, WorkloadConfig,
};
pub use overrides::{
    CLUSTER_OPTIONS_ENV_PREFIX, CLUSTER_OPTIONS_PROP_PREFIX, DEPLOYMENT_OPTIONS_ENV_PREFIX,
    DEPLOYMENT_OPTIONS_PROP_PREFIX, RUNTIME_OPTIONS_ENV_PREFIX, RUNTIME_OPTIONS_PROP_PREFIX,
};
pub use resolver::{ConfigError, ExplicitFlags, OverrideLayers, RawSources, ResolvedConfig};
pub use source::read_json_file_or_string;
