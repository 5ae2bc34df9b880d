//! Caller-supplied container configuration.
//!
//! A configuration declares which FMUs to nest, which of their variables to
//! expose, how exposed variables are renamed, and how component variables
//! are wired together. It is read once and never mutated by the engine.
//!
//! Configurations are plain data and deserialise from TOML:
//!
//! ```toml
//! description = "Controlled drivetrain"
//!
//! [default_experiment]
//! stop_time = 4.0
//!
//! [[component]]
//! filename = "Controller.fmu"
//! name = "controller"
//! interface_type = "CoSimulation"
//! variables = ["u_s", "PI.k"]
//!
//! [variable.'controller.u_s']
//! name = "u_s"
//!
//! [[connection]]
//! start_component = "controller"
//! start_variable = "y"
//! end_component = "drivetrain"
//! end_variable = "tau"
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::descriptor::{DefaultExperiment, InterfaceType};
use crate::errors::{ContainerError, ContainerResult};

/// One nested FMU to include in the container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentConfig {
    /// Location of the FMU archive.
    pub filename: PathBuf,
    /// Instance name, unique within the container.
    pub name: String,
    /// Interface the component is instantiated through.
    pub interface_type: InterfaceType,
    /// Names of the component variables exposed on the container interface,
    /// in the order they are assigned container value references.
    #[serde(default)]
    pub variables: Vec<String>,
}

/// Name and description overrides for one exposed variable.
///
/// Either field may be set independently; unset fields keep their defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VariableMapping {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// A directed connection from one component variable to another.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub start_component: String,
    pub start_variable: String,
    pub end_component: String,
    pub end_variable: String,
}

/// The complete input of a container composition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerConfiguration {
    /// Free-text description of the container.
    pub description: Option<String>,
    /// When set, the runtime steps the components on independent threads,
    /// joining them at every communication step boundary.
    #[serde(default)]
    pub parallel_do_step: bool,
    pub default_experiment: Option<DefaultExperiment>,
    #[serde(default, rename = "component")]
    pub components: Vec<ComponentConfig>,
    /// Overrides keyed by the default exposed name `component.variable`.
    #[serde(default, rename = "variable")]
    pub variables: HashMap<String, VariableMapping>,
    #[serde(default, rename = "connection")]
    pub connections: Vec<ConnectionConfig>,
}

impl ContainerConfiguration {
    /// Parse a configuration from TOML text.
    pub fn from_toml(text: &str) -> ContainerResult<Self> {
        toml::from_str(text).map_err(|e| ContainerError::Configuration {
            reason: e.to_string(),
        })
    }

    /// Load a configuration from a TOML file.
    pub fn load(path: &Path) -> ContainerResult<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml(&text)
    }
}
