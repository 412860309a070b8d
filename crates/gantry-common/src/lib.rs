//! ---
//! gantry_section: "04-observability"
//! gantry_subsection: "module"
//! gantry_type: "source"
//! gantry_scope: "code"
//! gantry_description: "Shared logging and observability primitives."
//! gantry_version: "v0.1.0"
//! gantry_owner: "tbd"
//! ---
//! Shared primitives for the Gantry launcher workspace.
//! This crate exposes the tracing initialisation used by the daemon binary
//! and by embedders that want the stock logging layout.

pub mod logging;

pub use logging::{init_tracing, LogFormat, LoggingConfig};
