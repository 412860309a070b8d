//! ---
//! gantry_section: "02-configuration"
//! gantry_subsection: "module"
//! gantry_type: "source"
//! gantry_scope: "code"
//! gantry_description: "Environment and property override application."
//! gantry_version: "v0.1.0"
//! gantry_owner: "tbd"
//! ---
//! Statically declared setter tables mapping external field names onto the
//! option structures. The environment layer uses `UPPER_SNAKE` names behind a
//! `GANTRY_*_OPTIONS_` prefix; the property layer uses dotted `snake_case`
//! keys. Unknown fields and coercion failures are warnings, never fatal.

use std::time::Duration;

use indexmap::IndexMap;
use tracing::warn;

use crate::options::{ClusterOptions, DeploymentOptions, RuntimeOptions, ThreadingStrategy};

/// Environment prefix for [`RuntimeOptions`] fields.
pub const RUNTIME_OPTIONS_ENV_PREFIX: &str = "GANTRY_RUNTIME_OPTIONS_";
/// Environment prefix for [`DeploymentOptions`] fields.
pub const DEPLOYMENT_OPTIONS_ENV_PREFIX: &str = "GANTRY_DEPLOYMENT_OPTIONS_";
/// Environment prefix for [`ClusterOptions`] fields.
pub const CLUSTER_OPTIONS_ENV_PREFIX: &str = "GANTRY_CLUSTER_OPTIONS_";
/// Property prefix for [`RuntimeOptions`] fields.
pub const RUNTIME_OPTIONS_PROP_PREFIX: &str = "runtime.options.";
/// Property prefix for [`DeploymentOptions`] fields.
pub const DEPLOYMENT_OPTIONS_PROP_PREFIX: &str = "deployment.options.";
/// Property prefix for [`ClusterOptions`] fields.
pub const CLUSTER_OPTIONS_PROP_PREFIX: &str = "cluster.options.";

pub(crate) struct FieldSetter<T> {
    pub name: &'static str,
    pub kind: &'static str,
    pub apply: fn(&mut T, &str) -> Result<(), String>,
}

fn parse_usize(value: &str) -> Result<usize, String> {
    value
        .parse::<usize>()
        .map_err(|_| format!("'{}' is not a valid integer", value))
}

fn parse_u64(value: &str) -> Result<u64, String> {
    value
        .parse::<u64>()
        .map_err(|_| format!("'{}' is not a valid integer", value))
}

fn parse_u16(value: &str) -> Result<u16, String> {
    value
        .parse::<u16>()
        .map_err(|_| format!("'{}' is not a valid port", value))
}

fn parse_bool(value: &str) -> Result<bool, String> {
    value
        .parse::<bool>()
        .map_err(|_| format!("'{}' is not a valid boolean", value))
}

pub(crate) static RUNTIME_OPTION_FIELDS: &[FieldSetter<RuntimeOptions>] = &[
    FieldSetter {
        name: "event_loop_size",
        kind: "int",
        apply: |options, value| {
            options.event_loop_size = parse_usize(value)?;
            Ok(())
        },
    },
    FieldSetter {
        name: "worker_pool_size",
        kind: "int",
        apply: |options, value| {
            options.worker_pool_size = parse_usize(value)?;
            Ok(())
        },
    },
    FieldSetter {
        name: "max_worker_execute_time_ms",
        kind: "long",
        apply: |options, value| {
            options.max_worker_execute_time_ms = parse_u64(value)?;
            Ok(())
        },
    },
    FieldSetter {
        name: "startup_timeout",
        kind: "long",
        apply: |options, value| {
            options.startup_timeout = Duration::from_secs(parse_u64(value)?);
            Ok(())
        },
    },
    FieldSetter {
        name: "shutdown_timeout",
        kind: "long",
        apply: |options, value| {
            options.shutdown_timeout = Duration::from_secs(parse_u64(value)?);
            Ok(())
        },
    },
];

pub(crate) static CLUSTER_OPTION_FIELDS: &[FieldSetter<ClusterOptions>] = &[
    FieldSetter {
        name: "enabled",
        kind: "bool",
        apply: |options, value| {
            options.enabled = parse_bool(value)?;
            Ok(())
        },
    },
    FieldSetter {
        name: "host",
        kind: "string",
        apply: |options, value| {
            options.host = Some(value.to_owned());
            Ok(())
        },
    },
    FieldSetter {
        name: "port",
        kind: "int",
        apply: |options, value| {
            options.port = Some(parse_u16(value)?);
            Ok(())
        },
    },
    FieldSetter {
        name: "public_host",
        kind: "string",
        apply: |options, value| {
            options.public_host = Some(value.to_owned());
            Ok(())
        },
    },
    FieldSetter {
        name: "public_port",
        kind: "int",
        apply: |options, value| {
            options.public_port = Some(parse_u16(value)?);
            Ok(())
        },
    },
];

pub(crate) static DEPLOYMENT_OPTION_FIELDS: &[FieldSetter<DeploymentOptions>] = &[
    FieldSetter {
        name: "instances",
        kind: "int",
        apply: |options, value| {
            options.instances = parse_usize(value)?;
            Ok(())
        },
    },
    FieldSetter {
        name: "threading",
        kind: "enum",
        apply: |options, value| {
            options.threading = value.parse::<ThreadingStrategy>()?;
            Ok(())
        },
    },
    FieldSetter {
        name: "timeout",
        kind: "long",
        apply: |options, value| {
            options.timeout = Duration::from_secs(parse_u64(value)?);
            Ok(())
        },
    },
];

/// Collect `(field, value)` pairs from an environment snapshot, stripping the
/// prefix and mapping `UPPER_SNAKE` names to `snake_case` fields.
pub(crate) fn env_entries(
    env: &IndexMap<String, String>,
    prefix: &str,
) -> Vec<(String, String)> {
    env.iter()
        .filter_map(|(key, value)| {
            key.strip_prefix(prefix)
                .map(|field| (field.to_lowercase(), value.clone()))
        })
        .collect()
}

/// Collect `(field, value)` pairs from the property layer, stripping the
/// dotted prefix.
pub(crate) fn property_entries(
    properties: &IndexMap<String, String>,
    prefix: &str,
) -> Vec<(String, String)> {
    properties
        .iter()
        .filter_map(|(key, value)| {
            key.strip_prefix(prefix)
                .map(|field| (field.to_owned(), value.clone()))
        })
        .collect()
}

/// Apply override entries through a setter table. Unknown fields and coercion
/// failures are logged and skipped; the prior value is kept.
pub(crate) fn apply_field_overrides<T>(
    target: &mut T,
    table: &[FieldSetter<T>],
    entries: Vec<(String, String)>,
    layer: &str,
    options_name: &str,
) {
    for (field, value) in entries {
        match table.iter().find(|setter| setter.name == field) {
            Some(setter) => {
                if let Err(reason) = (setter.apply)(target, &value) {
                    warn!(
                        layer,
                        field = %field,
                        kind = setter.kind,
                        "ignoring override on {}: {}",
                        options_name,
                        reason
                    );
                }
            }
            None => {
                warn!(
                    layer,
                    field = %field,
                    "no such field to configure on {}",
                    options_name
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn env_entries_map_upper_snake_to_field_names() {
        let mut env = IndexMap::new();
        env.insert(
            "GANTRY_RUNTIME_OPTIONS_EVENT_LOOP_SIZE".to_owned(),
            "42".to_owned(),
        );
        env.insert("UNRELATED".to_owned(), "x".to_owned());
        let collected = env_entries(&env, RUNTIME_OPTIONS_ENV_PREFIX);
        assert_eq!(
            collected,
            vec![("event_loop_size".to_owned(), "42".to_owned())]
        );
    }

    #[test]
    fn overrides_set_typed_fields() {
        let mut options = RuntimeOptions::default();
        apply_field_overrides(
            &mut options,
            RUNTIME_OPTION_FIELDS,
            entries(&[("event_loop_size", "42"), ("startup_timeout", "7")]),
            "environment",
            "runtime options",
        );
        assert_eq!(options.event_loop_size, 42);
        assert_eq!(options.startup_timeout, Duration::from_secs(7));
    }

    #[test]
    fn coercion_failure_keeps_prior_value() {
        let mut options = RuntimeOptions::default();
        let prior = options.worker_pool_size;
        apply_field_overrides(
            &mut options,
            RUNTIME_OPTION_FIELDS,
            entries(&[("worker_pool_size", "not-a-number")]),
            "environment",
            "runtime options",
        );
        assert_eq!(options.worker_pool_size, prior);
    }

    #[test]
    fn unknown_field_is_skipped() {
        let mut options = DeploymentOptions::default();
        apply_field_overrides(
            &mut options,
            DEPLOYMENT_OPTION_FIELDS,
            entries(&[("no_such_field", "1"), ("instances", "3")]),
            "property",
            "deployment options",
        );
        assert_eq!(options.instances, 3);
    }

    #[test]
    fn enum_fields_coerce_through_from_str() {
        let mut options = DeploymentOptions::default();
        apply_field_overrides(
            &mut options,
            DEPLOYMENT_OPTION_FIELDS,
            entries(&[("threading", "worker")]),
            "environment",
            "deployment options",
        );
        assert_eq!(options.threading, ThreadingStrategy::Worker);
    }
}
