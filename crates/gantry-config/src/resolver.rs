//! ---
//! gantry_section: "02-configuration"
//! gantry_subsection: "module"
//! gantry_type: "source"
//! gantry_scope: "code"
//! gantry_description: "Layered option resolution with fixed precedence."
//! gantry_version: "v0.1.0"
//! gantry_owner: "tbd"
//! ---
use indexmap::IndexMap;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::options::{DeploymentOptions, RuntimeOptions, ThreadingStrategy, WorkloadConfig};
use crate::overrides::{
    apply_field_overrides, env_entries, property_entries, CLUSTER_OPTIONS_ENV_PREFIX,
    CLUSTER_OPTIONS_PROP_PREFIX, CLUSTER_OPTION_FIELDS, DEPLOYMENT_OPTIONS_ENV_PREFIX,
    DEPLOYMENT_OPTIONS_PROP_PREFIX, DEPLOYMENT_OPTION_FIELDS, RUNTIME_OPTIONS_ENV_PREFIX,
    RUNTIME_OPTIONS_PROP_PREFIX, RUNTIME_OPTION_FIELDS,
};
use crate::source::read_json_file_or_string;

/// Errors raised for structurally invalid explicit configuration. Malformed
/// option sources are never fatal; they degrade to defaults with a warning.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("the worker and dedicated threading flags are mutually exclusive")]
    ConflictingThreadingFlags,
    #[error("invalid options: {reason}")]
    Invalid { reason: String },
}

/// Explicit command-line flag values, the highest-precedence layer.
///
/// This structure is deliberately parser-agnostic: the launcher maps its
/// parsed command line into it, tests construct it directly.
#[derive(Debug, Clone, Default)]
pub struct ExplicitFlags {
    pub cluster: Option<bool>,
    pub cluster_host: Option<String>,
    pub cluster_port: Option<u16>,
    pub cluster_public_host: Option<String>,
    pub cluster_public_port: Option<u16>,
    pub worker: Option<bool>,
    pub dedicated: Option<bool>,
    pub instances: Option<usize>,
}

/// Raw option sources as given on the command line, each a path or inline JSON.
#[derive(Debug, Clone, Default)]
pub struct RawSources {
    pub options: Option<String>,
    pub deployment_options: Option<String>,
    pub workload_config: Option<String>,
}

/// Environment and property override layers, threaded through explicitly so
/// resolution never reaches for ambient process state.
#[derive(Debug, Clone, Default)]
pub struct OverrideLayers {
    pub env: IndexMap<String, String>,
    pub properties: IndexMap<String, String>,
}

impl OverrideLayers {
    /// Snapshot the process environment, with an empty property layer.
    pub fn from_process_env() -> Self {
        Self {
            env: std::env::vars().collect(),
            properties: IndexMap::new(),
        }
    }

    /// Replace the property layer with dotted `key=value` definitions.
    pub fn with_properties(mut self, properties: IndexMap<String, String>) -> Self {
        self.properties = properties;
        self
    }

    /// Look up a single environment variable from the snapshot.
    pub fn env_var(&self, name: &str) -> Option<&str> {
        self.env.get(name).map(String::as_str)
    }
}

/// The three option sets produced by a resolution run.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub runtime_options: RuntimeOptions,
    pub deployment_options: DeploymentOptions,
    pub workload_config: WorkloadConfig,
}

impl ResolvedConfig {
    /// Resolve configuration from raw sources and override layers.
    ///
    /// Precedence, highest first: explicit flags, properties, environment,
    /// JSON source, compiled-in defaults.
    pub fn resolve(
        flags: &ExplicitFlags,
        sources: &RawSources,
        layers: &OverrideLayers,
    ) -> Result<Self, ConfigError> {
        let options_json = read_json_file_or_string("options", sources.options.as_deref());
        let deployment_json =
            read_json_file_or_string("deployment-options", sources.deployment_options.as_deref());
        let config_json = read_json_file_or_string("conf", sources.workload_config.as_deref());
        Self::from_values(flags, options_json, deployment_json, config_json, layers)
    }

    /// Resolve configuration from already-parsed source values. This is the
    /// entry point used by the launcher after its parse-stage hooks ran.
    pub fn from_values(
        flags: &ExplicitFlags,
        options_json: Option<Value>,
        deployment_json: Option<Value>,
        config_json: Option<Value>,
        layers: &OverrideLayers,
    ) -> Result<Self, ConfigError> {
        if flags.worker == Some(true) && flags.dedicated == Some(true) {
            return Err(ConfigError::ConflictingThreadingFlags);
        }

        let mut runtime_options = base_options::<RuntimeOptions>(options_json, "options");
        apply_field_overrides(
            &mut runtime_options,
            RUNTIME_OPTION_FIELDS,
            env_entries(&layers.env, RUNTIME_OPTIONS_ENV_PREFIX),
            "environment",
            "runtime options",
        );
        apply_field_overrides(
            &mut runtime_options,
            RUNTIME_OPTION_FIELDS,
            property_entries(&layers.properties, RUNTIME_OPTIONS_PROP_PREFIX),
            "property",
            "runtime options",
        );

        let clustered = flags.cluster.unwrap_or(runtime_options.cluster.enabled);
        runtime_options.cluster.enabled = clustered;
        if clustered {
            apply_field_overrides(
                &mut runtime_options.cluster,
                CLUSTER_OPTION_FIELDS,
                env_entries(&layers.env, CLUSTER_OPTIONS_ENV_PREFIX),
                "environment",
                "cluster options",
            );
            apply_field_overrides(
                &mut runtime_options.cluster,
                CLUSTER_OPTION_FIELDS,
                property_entries(&layers.properties, CLUSTER_OPTIONS_PROP_PREFIX),
                "property",
                "cluster options",
            );
            if let Some(host) = &flags.cluster_host {
                runtime_options.cluster.host = Some(host.clone());
            }
            if let Some(port) = flags.cluster_port {
                runtime_options.cluster.port = Some(port);
            }
            if let Some(host) = &flags.cluster_public_host {
                runtime_options.cluster.public_host = Some(host.clone());
            }
            if let Some(port) = flags.cluster_public_port {
                runtime_options.cluster.public_port = Some(port);
            }
        }

        let mut deployment_options =
            base_options::<DeploymentOptions>(deployment_json, "deployment-options");
        apply_field_overrides(
            &mut deployment_options,
            DEPLOYMENT_OPTION_FIELDS,
            env_entries(&layers.env, DEPLOYMENT_OPTIONS_ENV_PREFIX),
            "environment",
            "deployment options",
        );
        apply_field_overrides(
            &mut deployment_options,
            DEPLOYMENT_OPTION_FIELDS,
            property_entries(&layers.properties, DEPLOYMENT_OPTIONS_PROP_PREFIX),
            "property",
            "deployment options",
        );
        if flags.worker == Some(true) {
            deployment_options.threading = ThreadingStrategy::Worker;
        } else if flags.dedicated == Some(true) {
            deployment_options.threading = ThreadingStrategy::Dedicated;
        }
        if let Some(instances) = flags.instances {
            deployment_options.instances = instances;
        }

        // The workload payload is passed through verbatim; anything that is
        // not an object has already been reported by the source reader.
        let workload_config = match config_json {
            Some(value) if value.is_object() => value,
            _ => Value::Object(serde_json::Map::new()),
        };

        runtime_options.validate()?;
        deployment_options.validate()?;

        Ok(Self {
            runtime_options,
            deployment_options,
            workload_config,
        })
    }
}

fn base_options<T>(json: Option<Value>, option_name: &str) -> T
where
    T: Default + serde::de::DeserializeOwned,
{
    match json {
        Some(value) => serde_json::from_value(value).unwrap_or_else(|err| {
            warn!(
                option = option_name,
                error = %err,
                "source object does not match the options schema; using defaults"
            );
            T::default()
        }),
        None => T::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn layers(env: &[(&str, &str)], properties: &[(&str, &str)]) -> OverrideLayers {
        OverrideLayers {
            env: env
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect(),
            properties: properties
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect(),
        }
    }

    #[test]
    fn defaults_when_everything_is_absent() {
        let resolved = ResolvedConfig::from_values(
            &ExplicitFlags::default(),
            None,
            None,
            None,
            &OverrideLayers::default(),
        )
        .expect("resolve");
        assert_eq!(resolved.deployment_options.instances, 1);
        assert_eq!(
            resolved.deployment_options.threading,
            ThreadingStrategy::EventLoop
        );
        assert_eq!(resolved.workload_config, json!({}));
    }

    #[test]
    fn explicit_flags_beat_properties_beat_env_beat_source() {
        let flags = ExplicitFlags {
            instances: Some(5),
            ..ExplicitFlags::default()
        };
        let resolved = ResolvedConfig::from_values(
            &flags,
            None,
            Some(json!({ "instances": 2 })),
            None,
            &layers(
                &[("GANTRY_DEPLOYMENT_OPTIONS_INSTANCES", "3")],
                &[("deployment.options.instances", "4")],
            ),
        )
        .expect("resolve");
        assert_eq!(resolved.deployment_options.instances, 5);
    }

    #[test]
    fn properties_beat_env_without_explicit_flag() {
        let resolved = ResolvedConfig::from_values(
            &ExplicitFlags::default(),
            None,
            Some(json!({ "instances": 2 })),
            None,
            &layers(
                &[("GANTRY_DEPLOYMENT_OPTIONS_INSTANCES", "3")],
                &[("deployment.options.instances", "4")],
            ),
        )
        .expect("resolve");
        assert_eq!(resolved.deployment_options.instances, 4);
    }

    #[test]
    fn env_beats_source_without_properties() {
        let resolved = ResolvedConfig::from_values(
            &ExplicitFlags::default(),
            Some(json!({ "worker_pool_size": 2 })),
            None,
            None,
            &layers(&[("GANTRY_RUNTIME_OPTIONS_WORKER_POOL_SIZE", "3")], &[]),
        )
        .expect("resolve");
        assert_eq!(resolved.runtime_options.worker_pool_size, 3);
    }

    #[test]
    fn conflicting_threading_flags_are_fatal() {
        let flags = ExplicitFlags {
            worker: Some(true),
            dedicated: Some(true),
            ..ExplicitFlags::default()
        };
        let err = ResolvedConfig::from_values(
            &flags,
            None,
            None,
            None,
            &OverrideLayers::default(),
        )
        .expect_err("conflict");
        assert_eq!(err, ConfigError::ConflictingThreadingFlags);
    }

    #[test]
    fn worker_flag_selects_worker_threading() {
        let flags = ExplicitFlags {
            worker: Some(true),
            ..ExplicitFlags::default()
        };
        let resolved = ResolvedConfig::from_values(
            &flags,
            None,
            Some(json!({ "threading": "dedicated" })),
            None,
            &OverrideLayers::default(),
        )
        .expect("resolve");
        assert_eq!(
            resolved.deployment_options.threading,
            ThreadingStrategy::Worker
        );
    }

    #[test]
    fn cluster_overrides_only_apply_when_clustered() {
        let ignored = ResolvedConfig::from_values(
            &ExplicitFlags::default(),
            None,
            None,
            None,
            &layers(&[("GANTRY_CLUSTER_OPTIONS_PORT", "4711")], &[]),
        )
        .expect("resolve");
        assert_eq!(ignored.runtime_options.cluster.port, None);

        let flags = ExplicitFlags {
            cluster: Some(true),
            cluster_host: Some("10.0.0.7".to_owned()),
            ..ExplicitFlags::default()
        };
        let resolved = ResolvedConfig::from_values(
            &flags,
            None,
            None,
            None,
            &layers(&[("GANTRY_CLUSTER_OPTIONS_PORT", "4711")], &[]),
        )
        .expect("resolve");
        assert!(resolved.runtime_options.cluster.enabled);
        assert_eq!(resolved.runtime_options.cluster.port, Some(4711));
        assert_eq!(
            resolved.runtime_options.cluster.host.as_deref(),
            Some("10.0.0.7")
        );
    }

    #[test]
    fn cluster_flag_can_disable_source_enabled_clustering() {
        let flags = ExplicitFlags {
            cluster: Some(false),
            ..ExplicitFlags::default()
        };
        let resolved = ResolvedConfig::from_values(
            &flags,
            Some(json!({ "cluster": { "enabled": true } })),
            None,
            None,
            &OverrideLayers::default(),
        )
        .expect("resolve");
        assert!(!resolved.runtime_options.cluster.enabled);
    }

    #[test]
    fn schema_mismatch_degrades_to_defaults() {
        let resolved = ResolvedConfig::from_values(
            &ExplicitFlags::default(),
            Some(json!({ "worker_pool_size": "eight" })),
            None,
            None,
            &OverrideLayers::default(),
        )
        .expect("resolve");
        assert_eq!(resolved.runtime_options.worker_pool_size, 20);
    }

    #[test]
    fn workload_config_passes_through_verbatim() {
        let resolved = ResolvedConfig::from_values(
            &ExplicitFlags::default(),
            None,
            None,
            Some(json!({ "random": 42 })),
            &OverrideLayers::default(),
        )
        .expect("resolve");
        assert_eq!(resolved.workload_config, json!({ "random": 42 }));
    }

    #[test]
    fn timeouts_overridable_through_layers() {
        let resolved = ResolvedConfig::from_values(
            &ExplicitFlags::default(),
            None,
            None,
            None,
            &layers(
                &[("GANTRY_RUNTIME_OPTIONS_STARTUP_TIMEOUT", "30")],
                &[("deployment.options.timeout", "45")],
            ),
        )
        .expect("resolve");
        assert_eq!(
            resolved.runtime_options.startup_timeout,
            Duration::from_secs(30)
        );
        assert_eq!(
            resolved.deployment_options.timeout,
            Duration::from_secs(45)
        );
    }
}
