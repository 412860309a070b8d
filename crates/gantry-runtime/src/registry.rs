//! ---
//! gantry_section: "03-runtime-contract"
//! gantry_subsection: "module"
//! gantry_type: "source"
//! gantry_scope: "code"
//! gantry_description: "Named deployable factories and the metadata default."
//! gantry_version: "v0.1.0"
//! gantry_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::contract::{Deployable, DeployableFactory};

/// Registry mapping deployable names to factories.
///
/// Embedders register the units of work their binary can host; the launcher
/// resolves the command-line name against it at deploy time. The optional
/// default name stands in for packaging metadata: it is used when no name is
/// given on the command line and no hook supplies a factory.
#[derive(Default)]
pub struct DeployableRegistry {
    factories: HashMap<String, Arc<dyn DeployableFactory>>,
    default_deployable: Option<String>,
}

impl DeployableRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under a name. A later registration under the same
    /// name replaces the earlier one.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        factory: Arc<dyn DeployableFactory>,
    ) -> &mut Self {
        self.factories.insert(name.into(), factory);
        self
    }

    /// Register a closure-based factory under a name.
    pub fn register_fn<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> Box<dyn Deployable> + Send + Sync + 'static,
    {
        self.register(name, Arc::new(factory))
    }

    /// Declare the default deployable name used when none is supplied.
    pub fn set_default_deployable(&mut self, name: impl Into<String>) -> &mut Self {
        self.default_deployable = Some(name.into());
        self
    }

    /// The declared default deployable name, if any.
    pub fn default_deployable(&self) -> Option<&str> {
        self.default_deployable.as_deref()
    }

    /// Look up a factory by name.
    pub fn lookup(&self, name: &str) -> Option<Arc<dyn DeployableFactory>> {
        self.factories.get(name).cloned()
    }
}

impl fmt::Debug for DeployableRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("DeployableRegistry")
            .field("names", &names)
            .field("default_deployable", &self.default_deployable)
            .finish()
    }
}
