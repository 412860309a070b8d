//! ---
//! gantry_section: "02-configuration"
//! gantry_subsection: "module"
//! gantry_type: "source"
//! gantry_scope: "code"
//! gantry_description: "Option structures consumed by the launcher and runtime."
//! gantry_version: "v0.1.0"
//! gantry_owner: "tbd"
//! ---
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};

use crate::resolver::ConfigError;

/// Workload configuration payload handed to the deployed unit, verbatim.
pub type WorkloadConfig = serde_json::Value;

fn default_event_loop_size() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get() * 2)
        .unwrap_or(2)
}

fn default_worker_pool_size() -> usize {
    20
}

fn default_max_worker_execute_time_ms() -> u64 {
    60_000
}

fn default_startup_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_instances() -> usize {
    1
}

fn default_deploy_timeout() -> Duration {
    Duration::from_secs(120)
}

/// Options governing runtime construction and lifecycle budgets.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuntimeOptions {
    /// Number of event-loop threads the runtime schedules async tasks on.
    #[serde(default = "default_event_loop_size")]
    pub event_loop_size: usize,
    /// Size of the pool executing worker deployments.
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,
    /// Budget a worker task may execute before it is reported as blocked.
    #[serde(default = "default_max_worker_execute_time_ms")]
    pub max_worker_execute_time_ms: u64,
    /// Wall-clock budget for runtime startup.
    #[serde(default = "default_startup_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub startup_timeout: Duration,
    /// Wall-clock budget for graceful runtime shutdown.
    #[serde(default = "default_shutdown_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub shutdown_timeout: Duration,
    #[serde(default)]
    pub cluster: ClusterOptions,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            event_loop_size: default_event_loop_size(),
            worker_pool_size: default_worker_pool_size(),
            max_worker_execute_time_ms: default_max_worker_execute_time_ms(),
            startup_timeout: default_startup_timeout(),
            shutdown_timeout: default_shutdown_timeout(),
            cluster: ClusterOptions::default(),
        }
    }
}

impl RuntimeOptions {
    /// Validate structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.event_loop_size == 0 {
            return Err(ConfigError::Invalid {
                reason: "event_loop_size must be at least 1".to_owned(),
            });
        }
        if self.worker_pool_size == 0 {
            return Err(ConfigError::Invalid {
                reason: "worker_pool_size must be at least 1".to_owned(),
            });
        }
        Ok(())
    }
}

/// Clustering overrides, only honoured when clustering is enabled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ClusterOptions {
    #[serde(default)]
    pub enabled: bool,
    /// Host to bind to for cluster communication. Chosen by the runtime when absent.
    #[serde(default)]
    pub host: Option<String>,
    /// Port for cluster communication. A spare port is chosen when absent.
    #[serde(default)]
    pub port: Option<u16>,
    /// Public host advertised to peers. Defaults to the bind host.
    #[serde(default)]
    pub public_host: Option<String>,
    /// Public port advertised to peers. Defaults to the bind port.
    #[serde(default)]
    pub public_port: Option<u16>,
}

/// Threading strategy applied to deployed instances.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ThreadingStrategy {
    /// Instances run as tasks on the runtime's event loops.
    #[default]
    EventLoop,
    /// Instances run on the blocking worker pool.
    Worker,
    /// Each instance runs on its own dedicated OS thread.
    Dedicated,
}

impl std::str::FromStr for ThreadingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "event-loop" | "event_loop" | "eventloop" => Ok(ThreadingStrategy::EventLoop),
            "worker" => Ok(ThreadingStrategy::Worker),
            "dedicated" => Ok(ThreadingStrategy::Dedicated),
            other => Err(format!("unknown threading strategy: {}", other)),
        }
    }
}

/// Options governing how the deployable is placed into the runtime.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeploymentOptions {
    /// Number of deployable instances to create.
    #[serde(default = "default_instances")]
    pub instances: usize,
    #[serde(default)]
    pub threading: ThreadingStrategy,
    /// Wall-clock budget for the deployment to complete.
    #[serde(default = "default_deploy_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub timeout: Duration,
}

impl Default for DeploymentOptions {
    fn default() -> Self {
        Self {
            instances: default_instances(),
            threading: ThreadingStrategy::default(),
            timeout: default_deploy_timeout(),
        }
    }
}

impl DeploymentOptions {
    /// Validate structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.instances == 0 {
            return Err(ConfigError::Invalid {
                reason: "instances must be at least 1".to_owned(),
            });
        }
        Ok(())
    }
}
