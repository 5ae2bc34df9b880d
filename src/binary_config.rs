//! The binary runtime configuration.
//!
//! The container runtime loads `resources/config.mp`, a MessagePack
//! document, at instantiation time and trusts it without further
//! validation. The runtime looks every field up by name, so the structs
//! below are serialised in struct-map mode and the key spellings are part
//! of the contract; changing any of them breaks runtime compatibility.

use serde::{Deserialize, Serialize};

use crate::builder::Composition;
use crate::descriptor::{InterfaceType, VariableType};
use crate::errors::ContainerResult;

/// File name of the runtime configuration inside the bundle's `resources`
/// directory.
pub const RUNTIME_CONFIG_FILENAME: &str = "config.mp";

/// One nested component as seen by the runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeComponent {
    #[serde(rename = "interfaceType")]
    pub interface_type: InterfaceType,
    pub name: String,
    pub guid: String,
    #[serde(rename = "modelIdentifier")]
    pub model_identifier: String,
    pub nx: u32,
    pub nz: u32,
}

/// One exposed variable: the owning component and the component-local
/// value reference. The container value reference is the entry's index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeVariable {
    pub component: u32,
    #[serde(rename = "valueReference")]
    pub value_reference: u32,
}

/// One connection, addressed with component indices and component-local
/// value references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConnection {
    #[serde(rename = "type")]
    pub var_type: VariableType,
    #[serde(rename = "startComponent")]
    pub start_component: u32,
    #[serde(rename = "endComponent")]
    pub end_component: u32,
    #[serde(rename = "startValueReference")]
    pub start_value_reference: u32,
    #[serde(rename = "endValueReference")]
    pub end_value_reference: u32,
}

/// The complete runtime configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub components: Vec<RuntimeComponent>,
    pub variables: Vec<RuntimeVariable>,
    pub connections: Vec<RuntimeConnection>,
    /// Total continuous states the runtime must integrate.
    pub nx: u32,
    /// Total event indicators the runtime must monitor.
    pub nz: u32,
    /// When set, the runtime steps components on independent threads and
    /// joins them at every communication step before exchanging connection
    /// values.
    #[serde(rename = "parallelDoStep")]
    pub parallel_do_step: bool,
}

impl RuntimeConfig {
    /// Project a resolved composition onto the runtime contract.
    pub fn from_composition(composition: &Composition) -> Self {
        Self {
            components: composition
                .components
                .iter()
                .map(|c| RuntimeComponent {
                    interface_type: c.interface_type,
                    name: c.name.clone(),
                    guid: c.guid.clone(),
                    model_identifier: c.model_identifier.clone(),
                    nx: c.nx,
                    nz: c.nz,
                })
                .collect(),
            variables: composition
                .variables
                .iter()
                .map(|v| RuntimeVariable {
                    component: v.component as u32,
                    value_reference: v.value_reference,
                })
                .collect(),
            connections: composition
                .connections
                .iter()
                .map(|c| RuntimeConnection {
                    var_type: c.var_type,
                    start_component: c.start_component as u32,
                    end_component: c.end_component as u32,
                    start_value_reference: c.start_value_reference,
                    end_value_reference: c.end_value_reference,
                })
                .collect(),
            nx: composition.nx,
            nz: composition.nz,
            parallel_do_step: composition.parallel_do_step,
        }
    }

    /// Encode as MessagePack with named fields.
    pub fn to_bytes(&self) -> ContainerResult<Vec<u8>> {
        let mut buffer = Vec::new();
        rmp_serde::encode::write_named(&mut buffer, self)?;
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runtime_config() -> RuntimeConfig {
        RuntimeConfig {
            components: vec![
                RuntimeComponent {
                    interface_type: InterfaceType::ModelExchange,
                    name: "a".to_string(),
                    guid: "{a}".to_string(),
                    model_identifier: "A".to_string(),
                    nx: 2,
                    nz: 1,
                },
                RuntimeComponent {
                    interface_type: InterfaceType::CoSimulation,
                    name: "b".to_string(),
                    guid: "{b}".to_string(),
                    model_identifier: "B".to_string(),
                    nx: 0,
                    nz: 0,
                },
            ],
            variables: vec![
                RuntimeVariable {
                    component: 0,
                    value_reference: 10,
                },
                RuntimeVariable {
                    component: 1,
                    value_reference: 20,
                },
            ],
            connections: vec![RuntimeConnection {
                var_type: VariableType::Real,
                start_component: 0,
                end_component: 1,
                start_value_reference: 11,
                end_value_reference: 21,
            }],
            nx: 2,
            nz: 1,
            parallel_do_step: true,
        }
    }

    #[test]
    fn encodes_and_decodes_identically() {
        let config = runtime_config();
        let bytes = config.to_bytes().unwrap();
        let decoded: RuntimeConfig = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(decoded, config);
    }

    #[test]
    fn uses_the_contract_key_spellings() {
        // decode into free-form JSON to check the map keys the runtime
        // looks up by name
        let bytes = runtime_config().to_bytes().unwrap();
        let value: serde_json::Value = rmp_serde::from_slice(&bytes).unwrap();

        let root = value.as_object().unwrap();
        for key in ["components", "variables", "connections", "nx", "nz", "parallelDoStep"] {
            assert!(root.contains_key(key), "missing top-level key '{key}'");
        }

        let component = value["components"][0].as_object().unwrap();
        for key in ["interfaceType", "name", "guid", "modelIdentifier", "nx", "nz"] {
            assert!(component.contains_key(key), "missing component key '{key}'");
        }
        assert_eq!(value["components"][0]["interfaceType"], "ModelExchange");
        assert_eq!(value["components"][1]["interfaceType"], "CoSimulation");

        let variable = value["variables"][0].as_object().unwrap();
        assert!(variable.contains_key("component"));
        assert!(variable.contains_key("valueReference"));

        let connection = value["connections"][0].as_object().unwrap();
        for key in [
            "type",
            "startComponent",
            "endComponent",
            "startValueReference",
            "endValueReference",
        ] {
            assert!(connection.contains_key(key), "missing connection key '{key}'");
        }
        assert_eq!(value["connections"][0]["type"], "Real");
    }

    #[test]
    fn encoding_is_deterministic() {
        let config = runtime_config();
        assert_eq!(config.to_bytes().unwrap(), config.to_bytes().unwrap());
    }
}
