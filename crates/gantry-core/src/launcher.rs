//! ---
//! gantry_section: "01-lifecycle"
//! gantry_subsection: "module"
//! gantry_type: "source"
//! gantry_scope: "code"
//! gantry_description: "Top-level launch sequence from parsed flags to a deployed unit."
//! gantry_version: "v0.1.0"
//! gantry_owner: "tbd"
//! ---
use std::sync::Arc;

use clap::error::ErrorKind;
use clap::{ArgAction, CommandFactory, Parser};
use gantry_config::{
    ExplicitFlags, OverrideLayers, RawSources, ResolvedConfig, ThreadingStrategy,
};
use gantry_runtime::{
    Completion, DeployableFactory, DeployableRegistry, Interrupter, LocalRuntimeFactory,
    RuntimeError, RuntimeFactory,
};
use indexmap::IndexMap;
use tracing::{error, info, warn};

use crate::context::LifecycleContext;
use crate::error::{LaunchError, StageFailure};
use crate::executor::LaunchExecutor;
use crate::exit;
use crate::hooks::{DefaultHooks, LaunchHooks};
use crate::shutdown::{CtrlCSignal, ShutdownCoordinator, TerminationSignal};

/// Environment variable naming the default deployable, standing in for
/// packaging metadata.
pub const MAIN_DEPLOYABLE_ENV: &str = "GANTRY_MAIN_DEPLOYABLE";

/// Parsed command line of a launch.
#[derive(Debug, Parser)]
#[command(
    name = "gantryd",
    version,
    about = "Runs a Gantry application.",
    disable_help_subcommand = true
)]
pub struct LaunchCommand {
    /// Name of the deployable to deploy.
    #[arg(value_name = "DEPLOYABLE")]
    pub deployable: Option<String>,

    /// Runtime options, as a path to a JSON file or an inline JSON object.
    #[arg(long, value_name = "PATH|JSON")]
    pub options: Option<String>,

    /// Deployment options, as a path to a JSON file or an inline JSON object.
    #[arg(long, value_name = "PATH|JSON")]
    pub deployment_options: Option<String>,

    /// Workload configuration given to the deployable, as a path to a JSON
    /// file or an inline JSON object.
    #[arg(long, value_name = "PATH|JSON")]
    pub conf: Option<String>,

    /// Form a cluster with other runtime instances on the network.
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true", value_name = "BOOL")]
    pub cluster: Option<bool>,

    /// Host to bind to for cluster communication.
    #[arg(long, value_name = "HOST")]
    pub cluster_host: Option<String>,

    /// Port to use for cluster communication. A spare port is chosen by default.
    #[arg(long, value_name = "PORT")]
    pub cluster_port: Option<u16>,

    /// Public host advertised for cluster communication.
    #[arg(long, value_name = "HOST")]
    pub cluster_public_host: Option<String>,

    /// Public port advertised for cluster communication.
    #[arg(long, value_name = "PORT")]
    pub cluster_public_port: Option<u16>,

    /// Deploy with the worker threading strategy. Takes precedence over the
    /// value in deployment options.
    #[arg(short = 'w', long, num_args = 0..=1, require_equals = true, default_missing_value = "true", value_name = "BOOL")]
    pub worker: Option<bool>,

    /// Deploy each instance on a dedicated thread. Takes precedence over the
    /// value in deployment options.
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true", value_name = "BOOL")]
    pub dedicated: Option<bool>,

    /// How many instances of the deployable to deploy.
    #[arg(long, value_name = "N")]
    pub instances: Option<usize>,

    /// Property definition applied over environment overrides. Repeatable.
    #[arg(short = 'D', long = "define", value_name = "KEY=VALUE", action = ArgAction::Append)]
    pub defines: Vec<String>,
}

impl LaunchCommand {
    fn explicit_flags(&self) -> ExplicitFlags {
        ExplicitFlags {
            cluster: self.cluster,
            cluster_host: self.cluster_host.clone(),
            cluster_port: self.cluster_port,
            cluster_public_host: self.cluster_public_host.clone(),
            cluster_public_port: self.cluster_public_port,
            worker: self.worker,
            dedicated: self.dedicated,
            instances: self.instances,
        }
    }

    fn raw_sources(&self) -> RawSources {
        RawSources {
            options: self.options.clone(),
            deployment_options: self.deployment_options.clone(),
            workload_config: self.conf.clone(),
        }
    }

    fn properties(&self) -> IndexMap<String, String> {
        let mut properties = IndexMap::new();
        for define in &self.defines {
            match define.split_once('=') {
                Some((key, value)) => {
                    properties.insert(key.to_owned(), value.to_owned());
                }
                None => warn!(define = %define, "ignoring malformed property definition"),
            }
        }
        properties
    }
}

enum DeployableRef {
    Named(String),
    Supplied(Arc<dyn DeployableFactory>),
}

/// The result of a launch: the exit code, and on success the coordinator the
/// process parks on until it is externally terminated.
pub struct LaunchOutcome {
    exit_code: i32,
    coordinator: Option<ShutdownCoordinator>,
}

impl LaunchOutcome {
    /// Exit code of the launch. `0` means the deployment completed.
    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }

    /// On success, park until the termination signal fired and teardown ran;
    /// then return the exit code. On failure, return the exit code at once.
    pub fn park(self) -> i32 {
        if let Some(coordinator) = self.coordinator {
            coordinator.wait_terminated();
        }
        self.exit_code
    }
}

/// A launchable application: program arguments, a hook set, and the
/// collaborators the launch sequence consumes.
///
/// Mirrors the embedding contract of the launcher: construct with arguments,
/// optionally bind hooks, a deployable registry, a runtime factory, or a
/// termination signal, then call [`GantryApplication::launch`].
pub struct GantryApplication {
    args: Vec<String>,
    hooks: Arc<dyn LaunchHooks>,
    registry: Arc<DeployableRegistry>,
    runtime_factory: Arc<dyn RuntimeFactory>,
    layers: Option<OverrideLayers>,
    termination: Option<Box<dyn TerminationSignal>>,
    interrupter: Interrupter,
    print_usage_on_failure: bool,
    exit_on_failure: bool,
}

impl GantryApplication {
    /// Create an application from program arguments (the first one being the
    /// program name), with default behavior: no-op hooks, an empty registry,
    /// the local runtime factory, usage printed on usage-class failures, and
    /// the process exited on failure.
    pub fn new(args: impl IntoIterator<Item = String>) -> Self {
        Self {
            args: args.into_iter().collect(),
            hooks: Arc::new(DefaultHooks),
            registry: Arc::new(DeployableRegistry::new()),
            runtime_factory: Arc::new(LocalRuntimeFactory::new()),
            layers: None,
            termination: None,
            interrupter: Interrupter::new(),
            print_usage_on_failure: true,
            exit_on_failure: true,
        }
    }

    /// Bind the hook set invoked at each lifecycle stage.
    pub fn with_hooks(mut self, hooks: Arc<dyn LaunchHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Bind the registry the deployable name is resolved against.
    pub fn with_registry(mut self, registry: Arc<DeployableRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Replace the runtime factory used to start the runtime.
    pub fn with_runtime_factory(mut self, factory: Arc<dyn RuntimeFactory>) -> Self {
        self.runtime_factory = factory;
        self
    }

    /// Replace the environment and property override layers. By default they
    /// are snapshotted from the process environment at launch.
    pub fn with_override_layers(mut self, layers: OverrideLayers) -> Self {
        self.layers = Some(layers);
        self
    }

    /// Replace the termination signal. By default the process signal handler
    /// is installed at launch.
    pub fn with_termination_signal(mut self, signal: Box<dyn TerminationSignal>) -> Self {
        self.termination = Some(signal);
        self
    }

    /// Whether usage text is printed on usage-class failures.
    pub fn print_usage_on_failure(mut self, enabled: bool) -> Self {
        self.print_usage_on_failure = enabled;
        self
    }

    /// Whether the process is exited directly on a failed launch. Disable to
    /// observe the exit code instead.
    pub fn exit_on_failure(mut self, enabled: bool) -> Self {
        self.exit_on_failure = enabled;
        self
    }

    /// The interrupter observed by the bounded launch waits.
    pub fn interrupter(&self) -> Interrupter {
        self.interrupter.clone()
    }

    /// Run the launch sequence and report its outcome.
    pub fn launch(mut self) -> LaunchOutcome {
        let command = match LaunchCommand::try_parse_from(&self.args) {
            Ok(command) => command,
            Err(err) => {
                return match err.kind() {
                    ErrorKind::DisplayVersion => {
                        print!("{}", err);
                        self.finish(exit::SUCCESS, None)
                    }
                    ErrorKind::DisplayHelp => {
                        print!("{}", err);
                        self.finish(exit::USAGE, None)
                    }
                    _ => {
                        // The parser's message already carries its own
                        // prefix and usage hint.
                        eprintln!(
                            "{}",
                            LaunchError::Usage {
                                message: err.to_string(),
                            }
                        );
                        self.finish(exit::USAGE, None)
                    }
                };
            }
        };
        match self.run(&command) {
            Ok(coordinator) => self.finish(exit::SUCCESS, Some(coordinator)),
            Err(err) => {
                eprintln!("error: {}", err);
                if err.wants_usage() && self.print_usage_on_failure {
                    print_usage();
                }
                self.finish(err.exit_code(), None)
            }
        }
    }

    fn finish(&self, exit_code: i32, coordinator: Option<ShutdownCoordinator>) -> LaunchOutcome {
        if exit_code != exit::SUCCESS && self.exit_on_failure {
            std::process::exit(exit_code);
        }
        LaunchOutcome {
            exit_code,
            coordinator,
        }
    }

    fn run(&mut self, command: &LaunchCommand) -> Result<ShutdownCoordinator, LaunchError> {
        let mut layers = self
            .layers
            .take()
            .unwrap_or_else(OverrideLayers::from_process_env);
        layers.properties.extend(command.properties());

        let sources = command.raw_sources();
        let options_json = self.hooks.after_runtime_options_parsed(
            gantry_config::read_json_file_or_string("options", sources.options.as_deref()),
        );
        let deployment_json = self.hooks.after_deployment_options_parsed(
            gantry_config::read_json_file_or_string(
                "deployment-options",
                sources.deployment_options.as_deref(),
            ),
        );
        let config_json = self.hooks.after_workload_config_parsed(
            gantry_config::read_json_file_or_string("conf", sources.workload_config.as_deref()),
        );

        let resolved = ResolvedConfig::from_values(
            &command.explicit_flags(),
            options_json,
            deployment_json,
            config_json,
            &layers,
        )?;

        let termination: Box<dyn TerminationSignal> = match self.termination.take() {
            Some(signal) => signal,
            None => Box::new(
                CtrlCSignal::install(self.interrupter.clone()).map_err(|err| {
                    LaunchError::Internal {
                        message: format!("failed to install the termination handler: {}", err),
                    }
                })?,
            ),
        };

        let ctx = Arc::new(LifecycleContext::new());
        ctx.set_runtime_options(resolved.runtime_options.clone());
        let executor =
            LaunchExecutor::new(ctx.clone(), self.hooks.clone(), self.interrupter.clone());

        if let Err(err) = self.hooks.before_starting_runtime(&ctx) {
            error!(error = %err, "before_starting_runtime hook failed");
            return Err(StageFailure {
                stage: "startup",
                exit_code: exit::RUNTIME_INITIALIZATION,
            }
            .into());
        }
        let factory = self
            .hooks
            .runtime_factory()
            .unwrap_or_else(|| self.runtime_factory.clone());
        let runtime_options = resolved.runtime_options.clone();
        let runtime = executor.run_bounded(
            "startup",
            runtime_options.startup_timeout,
            exit::RUNTIME_INITIALIZATION,
            |hooks, ctx, cause| hooks.after_failure_to_start_runtime(ctx, cause),
            || factory.start(&runtime_options),
        )?;
        ctx.set_runtime(runtime.clone());
        self.hooks.after_runtime_started(&ctx);

        let coordinator = ShutdownCoordinator::register(
            termination,
            ctx.clone(),
            self.hooks.clone(),
            resolved.runtime_options.shutdown_timeout,
            self.interrupter.clone(),
        );

        let deployable = match self.hooks.deployable_factory() {
            Some(factory) => DeployableRef::Supplied(factory),
            None => {
                let name = command
                    .deployable
                    .clone()
                    .or_else(|| self.registry.default_deployable().map(str::to_owned))
                    .or_else(|| layers.env_var(MAIN_DEPLOYABLE_ENV).map(str::to_owned));
                match name {
                    Some(name) => DeployableRef::Named(name),
                    None => {
                        error!(
                            "no deployable name was given and no factory hook or metadata default is present"
                        );
                        return Err(LaunchError::MissingDeployable);
                    }
                }
            }
        };
        let deployable_name = match &deployable {
            DeployableRef::Named(name) => Some(name.clone()),
            DeployableRef::Supplied(_) => None,
        };
        ctx.ready_to_deploy(
            deployable_name,
            resolved.deployment_options.clone(),
            resolved.workload_config.clone(),
        );

        if let Err(err) = self.hooks.before_deploying(&ctx) {
            error!(error = %err, "before_deploying hook failed");
            return Err(StageFailure {
                stage: "deployment",
                exit_code: exit::DEPLOYMENT,
            }
            .into());
        }

        // The hook may have adjusted the options recorded in the context.
        let options = ctx
            .deployment_options()
            .unwrap_or_else(|| resolved.deployment_options.clone());
        let config = ctx
            .workload_config()
            .unwrap_or_else(|| resolved.workload_config.clone());
        let stage = match options.threading {
            ThreadingStrategy::Worker => "deploying worker deployable",
            ThreadingStrategy::Dedicated => "deploying dedicated-thread deployable",
            ThreadingStrategy::EventLoop => "deploying deployable",
        };

        let registry = self.registry.clone();
        let deploy_runtime = runtime.clone();
        let deploy_options = options.clone();
        let deployment_id = executor.run_bounded(
            stage,
            options.timeout,
            exit::DEPLOYMENT,
            |hooks, ctx, cause| hooks.after_failure_to_deploy(ctx, cause),
            move || match deployable {
                DeployableRef::Supplied(factory) => {
                    deploy_runtime.deploy(factory, deploy_options, config)
                }
                DeployableRef::Named(name) => match registry.lookup(&name) {
                    Some(factory) => deploy_runtime.deploy(factory, deploy_options, config),
                    None => Completion::failed(RuntimeError::Deployment {
                        reason: format!("unknown deployable '{}'", name),
                    }),
                },
            },
        )?;
        info!(deployment = %deployment_id, "succeeded in {}", stage);
        ctx.set_deployment_id(deployment_id);
        self.hooks.after_deployed(&ctx);
        Ok(coordinator)
    }
}

fn print_usage() {
    let mut command = LaunchCommand::command();
    println!("{}", command.render_long_help());
}
