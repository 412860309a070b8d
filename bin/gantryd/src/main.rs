//! ---
//! gantry_section: "05-entrypoint"
//! gantry_subsection: "binary"
//! gantry_type: "source"
//! gantry_scope: "code"
//! gantry_description: "Binary entrypoint for the Gantry daemon."
//! gantry_version: "v0.1.0"
//! gantry_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gantry_common::{init_tracing, LoggingConfig};
use gantry_core::GantryApplication;
use gantry_runtime::{Deployable, DeployableRegistry, DeployContext, RuntimeError};
use serde_json::Value;
use tracing::info;

/// Built-in deployable emitting a periodic heartbeat log line.
///
/// The workload configuration may carry `interval_ms` to tune the cadence.
#[derive(Debug, Default)]
struct Heartbeat {
    ticker: Option<tokio::task::JoinHandle<()>>,
}

#[async_trait]
impl Deployable for Heartbeat {
    async fn start(&mut self, ctx: &DeployContext) -> Result<(), RuntimeError> {
        let interval_ms = ctx
            .config
            .get("interval_ms")
            .and_then(Value::as_u64)
            .unwrap_or(1000)
            .max(1);
        let deployment = ctx.deployment_id.clone();
        let instance = ctx.instance;
        self.ticker = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
            let mut tick: u64 = 0;
            loop {
                ticker.tick().await;
                tick += 1;
                info!(deployment = %deployment, instance, tick, "heartbeat");
            }
        }));
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), RuntimeError> {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
        Ok(())
    }
}

fn main() {
    if let Err(err) = init_tracing("gantryd", &LoggingConfig::default()) {
        eprintln!("failed to initialise logging: {}", err);
    }

    let mut registry = DeployableRegistry::new();
    registry.register_fn("heartbeat", || Box::new(Heartbeat::default()) as Box<dyn Deployable>);

    let outcome = GantryApplication::new(std::env::args())
        .with_registry(Arc::new(registry))
        .launch();
    std::process::exit(outcome.park());
}
