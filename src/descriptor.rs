//! Model description parsing for nested FMUs.
//!
//! Every FMU carries a `modelDescription.xml` at its root describing the
//! variables it exposes, the interfaces it implements and the sizes of its
//! continuous state and event indicator vectors. The composition engine
//! reads these documents once per component and treats them as immutable.

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::errors::{ContainerError, ContainerResult};

/// The kind of simulation interface a component is instantiated through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InterfaceType {
    /// The component exposes its continuous states and event indicators and
    /// relies on the importer to integrate them.
    ModelExchange,
    /// The component brings its own solver and is stepped between
    /// communication points.
    CoSimulation,
}

impl fmt::Display for InterfaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterfaceType::ModelExchange => write!(f, "ModelExchange"),
            InterfaceType::CoSimulation => write!(f, "CoSimulation"),
        }
    }
}

/// A variable's causality, i.e. its role in the component interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Causality {
    Parameter,
    CalculatedParameter,
    Input,
    Output,
    #[default]
    Local,
    Independent,
}

impl Causality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Causality::Parameter => "parameter",
            Causality::CalculatedParameter => "calculatedParameter",
            Causality::Input => "input",
            Causality::Output => "output",
            Causality::Local => "local",
            Causality::Independent => "independent",
        }
    }
}

impl FromStr for Causality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "parameter" => Ok(Causality::Parameter),
            "calculatedParameter" => Ok(Causality::CalculatedParameter),
            "input" => Ok(Causality::Input),
            "output" => Ok(Causality::Output),
            "local" => Ok(Causality::Local),
            "independent" => Ok(Causality::Independent),
            other => Err(format!("unknown causality '{other}'")),
        }
    }
}

/// A variable's variability, i.e. how its value may change over time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Variability {
    Constant,
    Fixed,
    Tunable,
    Discrete,
    #[default]
    Continuous,
}

impl Variability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Variability::Constant => "constant",
            Variability::Fixed => "fixed",
            Variability::Tunable => "tunable",
            Variability::Discrete => "discrete",
            Variability::Continuous => "continuous",
        }
    }
}

impl FromStr for Variability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "constant" => Ok(Variability::Constant),
            "fixed" => Ok(Variability::Fixed),
            "tunable" => Ok(Variability::Tunable),
            "discrete" => Ok(Variability::Discrete),
            "continuous" => Ok(Variability::Continuous),
            other => Err(format!("unknown variability '{other}'")),
        }
    }
}

/// The scalar type of a variable.
///
/// Connections are only valid between endpoints of the same type, and the
/// type name is part of the runtime configuration contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VariableType {
    Real,
    Integer,
    Boolean,
    String,
    Enumeration,
}

impl VariableType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VariableType::Real => "Real",
            VariableType::Integer => "Integer",
            VariableType::Boolean => "Boolean",
            VariableType::String => "String",
            VariableType::Enumeration => "Enumeration",
        }
    }
}

impl fmt::Display for VariableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VariableType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Real" => Ok(VariableType::Real),
            "Integer" => Ok(VariableType::Integer),
            "Boolean" => Ok(VariableType::Boolean),
            "String" => Ok(VariableType::String),
            "Enumeration" => Ok(VariableType::Enumeration),
            other => Err(format!("unknown variable type '{other}'")),
        }
    }
}

/// One entry of a component's variable table.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarVariable {
    pub name: String,
    /// Component-local handle used by the runtime to read and write the value.
    pub value_reference: u32,
    pub causality: Causality,
    pub variability: Variability,
    pub var_type: VariableType,
    /// Initial value, kept verbatim as written in the document.
    pub start: Option<String>,
    /// Unit declared directly on the variable.
    pub unit: Option<String>,
    /// Name of the simple type this variable refers to, if any.
    pub declared_type: Option<String>,
    pub description: Option<String>,
}

/// Default experiment settings declared by a model description or a
/// container configuration. All fields are optional and only the ones
/// present are propagated to the emitted document.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DefaultExperiment {
    pub start_time: Option<f64>,
    pub stop_time: Option<f64>,
    pub tolerance: Option<f64>,
}

/// Parsed model description of a nested FMU.
#[derive(Debug, Clone)]
pub struct ModelDescription {
    pub fmi_version: String,
    pub model_name: String,
    pub guid: String,
    pub description: Option<String>,
    /// Model identifier of the ModelExchange interface, when implemented.
    pub model_exchange: Option<String>,
    /// Model identifier of the CoSimulation interface, when implemented.
    pub co_simulation: Option<String>,
    pub default_experiment: Option<DefaultExperiment>,
    /// Number of continuous states, taken from the derivatives listed in the
    /// model structure.
    pub number_of_continuous_states: u32,
    pub number_of_event_indicators: u32,
    /// Units of the declared simple types, keyed by type name.
    pub type_units: HashMap<String, String>,
    /// Variables in declaration order.
    pub variables: Vec<ScalarVariable>,
}

impl ModelDescription {
    /// Parse a model description document.
    pub fn parse(xml: &str) -> ContainerResult<Self> {
        let doc = roxmltree::Document::parse(xml).map_err(|e| parse_error(e.to_string()))?;
        let root = doc.root_element();
        if root.tag_name().name() != "fmiModelDescription" {
            return Err(parse_error(format!(
                "unexpected root element '{}'",
                root.tag_name().name()
            )));
        }

        let fmi_version = required_attribute(&root, "fmiVersion")?.to_string();
        let model_name = required_attribute(&root, "modelName")?.to_string();
        let guid = required_attribute(&root, "guid")?.to_string();
        let description = root.attribute("description").map(str::to_string);
        let number_of_event_indicators = match root.attribute("numberOfEventIndicators") {
            Some(raw) => raw
                .parse()
                .map_err(|_| parse_error(format!("invalid numberOfEventIndicators '{raw}'")))?,
            None => 0,
        };

        let mut model_exchange = None;
        let mut co_simulation = None;
        let mut default_experiment = None;
        let mut number_of_continuous_states = 0;
        let mut type_units = HashMap::new();
        let mut variables = Vec::new();

        for child in root.children().filter(roxmltree::Node::is_element) {
            match child.tag_name().name() {
                "ModelExchange" => {
                    model_exchange = Some(required_attribute(&child, "modelIdentifier")?.to_string());
                }
                "CoSimulation" => {
                    co_simulation = Some(required_attribute(&child, "modelIdentifier")?.to_string());
                }
                "DefaultExperiment" => {
                    default_experiment = Some(parse_default_experiment(&child)?);
                }
                "TypeDefinitions" => {
                    for simple_type in child.children().filter(roxmltree::Node::is_element) {
                        let name = required_attribute(&simple_type, "name")?;
                        if let Some(unit) = simple_type
                            .children()
                            .filter(roxmltree::Node::is_element)
                            .find_map(|n| n.attribute("unit"))
                        {
                            type_units.insert(name.to_string(), unit.to_string());
                        }
                    }
                }
                "ModelVariables" => {
                    for node in child.children().filter(roxmltree::Node::is_element) {
                        variables.push(parse_scalar_variable(&node)?);
                    }
                }
                "ModelStructure" => {
                    number_of_continuous_states = child
                        .children()
                        .filter(|n| n.has_tag_name("Derivatives"))
                        .flat_map(|n| n.children())
                        .filter(roxmltree::Node::is_element)
                        .count() as u32;
                }
                _ => {}
            }
        }

        debug!(
            "parsed model description '{}' ({} variables, nx={}, nz={})",
            model_name,
            variables.len(),
            number_of_continuous_states,
            number_of_event_indicators
        );

        Ok(ModelDescription {
            fmi_version,
            model_name,
            guid,
            description,
            model_exchange,
            co_simulation,
            default_experiment,
            number_of_continuous_states,
            number_of_event_indicators,
            type_units,
            variables,
        })
    }

    /// The model identifier of the given interface, if the component
    /// implements it.
    pub fn model_identifier(&self, interface_type: InterfaceType) -> Option<&str> {
        match interface_type {
            InterfaceType::ModelExchange => self.model_exchange.as_deref(),
            InterfaceType::CoSimulation => self.co_simulation.as_deref(),
        }
    }

    /// Look up a variable by name.
    pub fn variable(&self, name: &str) -> Option<&ScalarVariable> {
        self.variables.iter().find(|v| v.name == name)
    }

    /// The unit of a variable: its own unit if declared, otherwise the unit
    /// of its declared type, otherwise none.
    pub fn unit_for<'a>(&'a self, variable: &'a ScalarVariable) -> Option<&'a str> {
        variable.unit.as_deref().or_else(|| {
            variable
                .declared_type
                .as_deref()
                .and_then(|t| self.type_units.get(t))
                .map(String::as_str)
        })
    }
}

fn parse_error(reason: String) -> ContainerError {
    ContainerError::DescriptorParse {
        location: "modelDescription.xml".to_string(),
        reason,
    }
}

fn required_attribute<'a>(node: &'a roxmltree::Node, name: &str) -> ContainerResult<&'a str> {
    node.attribute(name).ok_or_else(|| {
        parse_error(format!(
            "element '{}' is missing the '{}' attribute",
            node.tag_name().name(),
            name
        ))
    })
}

fn parse_default_experiment(node: &roxmltree::Node) -> ContainerResult<DefaultExperiment> {
    let parse_time = |attr: &str| -> ContainerResult<Option<f64>> {
        match node.attribute(attr) {
            Some(raw) => raw
                .parse()
                .map(Some)
                .map_err(|_| parse_error(format!("invalid DefaultExperiment {attr} '{raw}'"))),
            None => Ok(None),
        }
    };
    Ok(DefaultExperiment {
        start_time: parse_time("startTime")?,
        stop_time: parse_time("stopTime")?,
        tolerance: parse_time("tolerance")?,
    })
}

fn parse_scalar_variable(node: &roxmltree::Node) -> ContainerResult<ScalarVariable> {
    let name = required_attribute(node, "name")?.to_string();
    let raw_reference = required_attribute(node, "valueReference")?;
    let value_reference = raw_reference.parse().map_err(|_| {
        parse_error(format!(
            "variable '{name}' has an invalid value reference '{raw_reference}'"
        ))
    })?;
    let causality = match node.attribute("causality") {
        Some(raw) => raw.parse().map_err(parse_error)?,
        None => Causality::default(),
    };
    let variability = match node.attribute("variability") {
        Some(raw) => raw.parse().map_err(parse_error)?,
        None => Variability::default(),
    };
    let description = node.attribute("description").map(str::to_string);

    // The variable's type is given by its single element child.
    let type_node = node
        .children()
        .find(roxmltree::Node::is_element)
        .ok_or_else(|| parse_error(format!("variable '{name}' has no type element")))?;
    let var_type = type_node.tag_name().name().parse().map_err(parse_error)?;
    let start = type_node.attribute("start").map(str::to_string);
    let unit = type_node.attribute("unit").map(str::to_string);
    let declared_type = type_node.attribute("declaredType").map(str::to_string);

    Ok(ScalarVariable {
        name,
        value_reference,
        causality,
        variability,
        var_type,
        start,
        unit,
        declared_type,
        description,
    })
}

/// Read the model description from an FMU archive.
///
/// Fails with [`ContainerError::DescriptorParse`] if the archive cannot be
/// opened, does not contain a `modelDescription.xml`, or the document itself
/// is malformed.
pub fn read_model_description(path: &Path) -> ContainerResult<ModelDescription> {
    let location = path.display().to_string();
    let file =
        File::open(path).map_err(|e| ContainerError::DescriptorParse {
            location: location.clone(),
            reason: e.to_string(),
        })?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|e| ContainerError::DescriptorParse {
            location: location.clone(),
            reason: e.to_string(),
        })?;
    let mut xml = String::new();
    archive
        .by_name("modelDescription.xml")
        .map_err(|e| ContainerError::DescriptorParse {
            location: location.clone(),
            reason: e.to_string(),
        })?
        .read_to_string(&mut xml)
        .map_err(|e| ContainerError::DescriptorParse {
            location: location.clone(),
            reason: e.to_string(),
        })?;
    ModelDescription::parse(&xml).map_err(|e| e.with_location(location))
}
