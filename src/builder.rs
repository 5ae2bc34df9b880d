//! Container composition.
//!
//! The [`ContainerBuilder`] is the composition session: it owns the running
//! value-reference counter and the growing variable and connection tables.
//! Components are registered in configuration order, [`build`] resolves the
//! whole topology in one pass and returns an immutable [`Composition`].
//!
//! [`build`]: ContainerBuilder::build

use std::collections::{BTreeSet, HashMap, HashSet};

use log::debug;

use crate::config::{
    ComponentConfig, ConnectionConfig, ContainerConfiguration, VariableMapping,
};
use crate::descriptor::{
    Causality, DefaultExperiment, InterfaceType, ModelDescription, ScalarVariable, Variability,
    VariableType,
};
use crate::errors::{ContainerError, ContainerResult};
use crate::platform::{intersect_platforms, Platform};

/// A nested FMU registered with the builder: its instance name, the
/// interface it is used through, the variables it exposes, its parsed model
/// description and the platforms it ships binaries for.
#[derive(Debug, Clone)]
pub struct ContainerComponent {
    pub name: String,
    pub interface_type: InterfaceType,
    /// Exposed variable names in the order they receive container value
    /// references.
    pub exposed_variables: Vec<String>,
    pub model_description: ModelDescription,
    pub platforms: BTreeSet<Platform>,
}

impl ContainerComponent {
    pub fn new(
        config: &ComponentConfig,
        model_description: ModelDescription,
        platforms: BTreeSet<Platform>,
    ) -> Self {
        Self {
            name: config.name.clone(),
            interface_type: config.interface_type,
            exposed_variables: config.variables.clone(),
            model_description,
            platforms,
        }
    }
}

/// A component entry of the resolved container.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedComponent {
    pub name: String,
    pub interface_type: InterfaceType,
    pub guid: String,
    pub model_identifier: String,
    /// Continuous states contributed to the container, zero for
    /// CoSimulation components.
    pub nx: u32,
    /// Event indicators contributed to the container, zero for
    /// CoSimulation components.
    pub nz: u32,
}

/// A variable exposed on the container interface.
#[derive(Debug, Clone, PartialEq)]
pub struct ExposedVariable {
    /// Index of the owning component.
    pub component: usize,
    /// The variable's handle inside the owning component.
    pub value_reference: u32,
    /// The container-wide handle, equal to the variable's position in the
    /// exposed variable table.
    pub composite_reference: u32,
    /// Externally visible name after overrides.
    pub name: String,
    pub description: Option<String>,
    pub causality: Causality,
    pub variability: Variability,
    pub var_type: VariableType,
    pub start: Option<String>,
    pub unit: Option<String>,
}

/// A resolved connection between two component variables.
///
/// Endpoints are addressed by component index and component-local value
/// reference; container value references play no role here, so internal
/// variables are valid endpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConnection {
    pub var_type: VariableType,
    pub start_component: usize,
    pub end_component: usize,
    pub start_value_reference: u32,
    pub end_value_reference: u32,
}

/// The resolved container topology, produced once per composition.
#[derive(Debug, Clone, PartialEq)]
pub struct Composition {
    pub model_name: String,
    pub description: Option<String>,
    pub default_experiment: Option<DefaultExperiment>,
    pub parallel_do_step: bool,
    pub components: Vec<ResolvedComponent>,
    /// Exposed variables ordered by composite reference.
    pub variables: Vec<ExposedVariable>,
    pub connections: Vec<ResolvedConnection>,
    /// Total continuous states over all ModelExchange components.
    pub nx: u32,
    /// Total event indicators over all ModelExchange components.
    pub nz: u32,
    pub platforms: BTreeSet<Platform>,
}

/// Builds a [`Composition`] from registered components, variable overrides
/// and connections.
pub struct ContainerBuilder {
    model_name: String,
    description: Option<String>,
    default_experiment: Option<DefaultExperiment>,
    parallel_do_step: bool,
    runtime_platforms: BTreeSet<Platform>,
    components: Vec<ContainerComponent>,
    variable_mappings: HashMap<String, VariableMapping>,
    connections: Vec<ConnectionConfig>,
}

impl ContainerBuilder {
    /// Create a new builder for a container with the given model name.
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            description: None,
            default_experiment: None,
            parallel_do_step: false,
            runtime_platforms: Platform::shippable(),
            components: vec![],
            variable_mappings: HashMap::new(),
            connections: vec![],
        }
    }

    /// Create a builder pre-populated with everything a configuration
    /// declares besides the components themselves.
    pub fn from_configuration(
        model_name: impl Into<String>,
        configuration: &ContainerConfiguration,
    ) -> Self {
        let mut builder = Self::new(model_name);
        builder.description = configuration.description.clone();
        builder.default_experiment = configuration.default_experiment;
        builder.parallel_do_step = configuration.parallel_do_step;
        builder.variable_mappings = configuration.variables.clone();
        builder.connections = configuration.connections.clone();
        builder
    }

    pub fn with_description(&mut self, description: impl Into<String>) -> &mut Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_default_experiment(&mut self, experiment: DefaultExperiment) -> &mut Self {
        self.default_experiment = Some(experiment);
        self
    }

    /// Declare that the runtime should step components on independent
    /// threads, joined at every communication step boundary.
    pub fn with_parallel_do_step(&mut self, parallel: bool) -> &mut Self {
        self.parallel_do_step = parallel;
        self
    }

    /// Restrict the starting platform set, normally the platforms the
    /// container runtime payload actually provides.
    pub fn with_runtime_platforms(&mut self, platforms: BTreeSet<Platform>) -> &mut Self {
        self.runtime_platforms = platforms;
        self
    }

    /// Override the name and/or description of an exposed variable. The key
    /// is the default exposed name `component.variable`.
    pub fn with_variable_mapping(
        &mut self,
        key: impl Into<String>,
        mapping: VariableMapping,
    ) -> &mut Self {
        self.variable_mappings.insert(key.into(), mapping);
        self
    }

    pub fn with_connection(&mut self, connection: ConnectionConfig) -> &mut Self {
        self.connections.push(connection);
        self
    }

    /// Register a component with the builder.
    pub fn with_component(&mut self, component: ContainerComponent) -> &mut Self {
        self.components.push(component);
        self
    }

    /// Resolve the registered components into a container topology.
    ///
    /// Exposed variables are numbered contiguously from zero in component
    /// registration order, then per-component exposure order, so the result
    /// is identical across runs for unchanged input.
    pub fn build(&self) -> ContainerResult<Composition> {
        let mut component_index = HashMap::new();
        for (i, component) in self.components.iter().enumerate() {
            if component_index.insert(component.name.as_str(), i).is_some() {
                return Err(ContainerError::DuplicateComponentName {
                    name: component.name.clone(),
                });
            }
        }

        let mut components = Vec::with_capacity(self.components.len());
        let mut variables = Vec::new();
        let mut visible_names = HashSet::new();
        let mut next_reference: u32 = 0;
        let mut nx = 0;
        let mut nz = 0;

        for (i, component) in self.components.iter().enumerate() {
            let md = &component.model_description;
            let model_identifier = md
                .model_identifier(component.interface_type)
                .ok_or_else(|| ContainerError::UnsupportedInterface {
                    component: component.name.clone(),
                    interface_type: component.interface_type,
                })?;

            // Only ModelExchange components hand their states and event
            // indicators to the container's integrator.
            let (component_nx, component_nz) = match component.interface_type {
                InterfaceType::ModelExchange => {
                    (md.number_of_continuous_states, md.number_of_event_indicators)
                }
                InterfaceType::CoSimulation => (0, 0),
            };
            nx += component_nx;
            nz += component_nz;

            components.push(ResolvedComponent {
                name: component.name.clone(),
                interface_type: component.interface_type,
                guid: md.guid.clone(),
                model_identifier: model_identifier.to_string(),
                nx: component_nx,
                nz: component_nz,
            });

            for variable_name in &component.exposed_variables {
                let variable = md.variable(variable_name).ok_or_else(|| {
                    ContainerError::UnknownVariable {
                        component: component.name.clone(),
                        variable: variable_name.clone(),
                    }
                })?;

                let default_name = format!("{}.{}", component.name, variable.name);
                let mut name = default_name.clone();
                let mut description = variable.description.clone();
                if let Some(mapping) = self.variable_mappings.get(&default_name) {
                    if let Some(mapped_name) = &mapping.name {
                        name = mapped_name.clone();
                    }
                    if let Some(mapped_description) = &mapping.description {
                        description = Some(mapped_description.clone());
                    }
                }
                if !visible_names.insert(name.clone()) {
                    return Err(ContainerError::DuplicateExposedName { name });
                }

                variables.push(ExposedVariable {
                    component: i,
                    value_reference: variable.value_reference,
                    composite_reference: next_reference,
                    name,
                    description,
                    causality: variable.causality,
                    variability: variable.variability,
                    var_type: variable.var_type,
                    start: variable.start.clone(),
                    unit: md.unit_for(variable).map(str::to_string),
                });
                next_reference += 1;
            }
        }

        let mut connections = Vec::with_capacity(self.connections.len());
        for connection in &self.connections {
            let (start_component, start) = self.resolve_endpoint(
                &component_index,
                &connection.start_component,
                &connection.start_variable,
            )?;
            let (end_component, end) = self.resolve_endpoint(
                &component_index,
                &connection.end_component,
                &connection.end_variable,
            )?;
            if start.var_type != end.var_type {
                return Err(ContainerError::TypeMismatch {
                    start_component: connection.start_component.clone(),
                    start_variable: connection.start_variable.clone(),
                    end_component: connection.end_component.clone(),
                    end_variable: connection.end_variable.clone(),
                    start_type: start.var_type.to_string(),
                    end_type: end.var_type.to_string(),
                });
            }
            connections.push(ResolvedConnection {
                var_type: start.var_type,
                start_component,
                end_component,
                start_value_reference: start.value_reference,
                end_value_reference: end.value_reference,
            });
        }

        let platforms = intersect_platforms(
            self.runtime_platforms.clone(),
            self.components.iter().map(|c| &c.platforms),
        )?;

        debug!(
            "composed '{}': {} components, {} variables, {} connections, nx={}, nz={}",
            self.model_name,
            components.len(),
            variables.len(),
            connections.len(),
            nx,
            nz
        );

        Ok(Composition {
            model_name: self.model_name.clone(),
            description: self.description.clone(),
            default_experiment: self.default_experiment,
            parallel_do_step: self.parallel_do_step,
            components,
            variables,
            connections,
            nx,
            nz,
            platforms,
        })
    }

    /// Resolve a connection endpoint against the full variable table of its
    /// component; the variable does not have to be exposed.
    fn resolve_endpoint<'a>(
        &'a self,
        component_index: &HashMap<&str, usize>,
        component: &str,
        variable: &str,
    ) -> ContainerResult<(usize, &'a ScalarVariable)> {
        let &i = component_index
            .get(component)
            .ok_or_else(|| ContainerError::UnknownComponent {
                component: component.to_string(),
            })?;
        let scalar = self.components[i]
            .model_description
            .variable(variable)
            .ok_or_else(|| ContainerError::UnknownVariable {
                component: component.to_string(),
                variable: variable.to_string(),
            })?;
        Ok((i, scalar))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variable(name: &str, value_reference: u32, var_type: VariableType) -> ScalarVariable {
        ScalarVariable {
            name: name.to_string(),
            value_reference,
            causality: Causality::Local,
            variability: Variability::Continuous,
            var_type,
            start: None,
            unit: None,
            declared_type: None,
            description: None,
        }
    }

    fn model_description(model_identifier: &str, variables: Vec<ScalarVariable>) -> ModelDescription {
        ModelDescription {
            fmi_version: "2.0".to_string(),
            model_name: model_identifier.to_string(),
            guid: format!("{{{model_identifier}}}"),
            description: None,
            model_exchange: Some(format!("{model_identifier}_me")),
            co_simulation: Some(model_identifier.to_string()),
            default_experiment: None,
            number_of_continuous_states: 2,
            number_of_event_indicators: 1,
            type_units: HashMap::new(),
            variables,
        }
    }

    fn component(
        name: &str,
        interface_type: InterfaceType,
        exposed: &[&str],
        variables: Vec<ScalarVariable>,
    ) -> ContainerComponent {
        ContainerComponent {
            name: name.to_string(),
            interface_type,
            exposed_variables: exposed.iter().map(|s| s.to_string()).collect(),
            model_description: model_description(name, variables),
            platforms: Platform::shippable(),
        }
    }

    fn connection(sc: &str, sv: &str, ec: &str, ev: &str) -> ConnectionConfig {
        ConnectionConfig {
            start_component: sc.to_string(),
            start_variable: sv.to_string(),
            end_component: ec.to_string(),
            end_variable: ev.to_string(),
        }
    }

    /// Two components as in the reference scenario: a ModelExchange source
    /// with two states and a CoSimulation sink.
    fn two_component_builder() -> ContainerBuilder {
        let mut builder = ContainerBuilder::new("Composite");
        builder
            .with_component(component(
                "a",
                InterfaceType::ModelExchange,
                &["x", "y"],
                vec![
                    variable("x", 10, VariableType::Real),
                    variable("y", 11, VariableType::Real),
                ],
            ))
            .with_component(component(
                "b",
                InterfaceType::CoSimulation,
                &["z"],
                vec![
                    variable("z", 20, VariableType::Real),
                    variable("in", 21, VariableType::Real),
                ],
            ))
            .with_connection(connection("a", "y", "b", "in"));
        builder
    }

    #[test]
    fn composite_references_are_contiguous() {
        let composition = two_component_builder().build().unwrap();

        let references: Vec<u32> = composition
            .variables
            .iter()
            .map(|v| v.composite_reference)
            .collect();
        assert_eq!(references, vec![0, 1, 2]);

        let names: Vec<&str> = composition.variables.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["a.x", "a.y", "b.z"]);

        // the component-local references are preserved alongside
        assert_eq!(composition.variables[0].value_reference, 10);
        assert_eq!(composition.variables[2].value_reference, 20);
        assert_eq!(composition.variables[2].component, 1);
    }

    #[test]
    fn composition_is_deterministic() {
        let first = two_component_builder().build().unwrap();
        let second = two_component_builder().build().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn state_counts_sum_over_model_exchange_only() {
        let composition = two_component_builder().build().unwrap();

        // component "a" is ModelExchange (nx=2, nz=1), "b" is CoSimulation
        // and contributes nothing regardless of its own counts
        assert_eq!(composition.nx, 2);
        assert_eq!(composition.nz, 1);
        assert_eq!(composition.components[0].nx, 2);
        assert_eq!(composition.components[1].nx, 0);
        assert_eq!(composition.components[1].nz, 0);
    }

    #[test]
    fn connections_carry_local_references_and_type() {
        let composition = two_component_builder().build().unwrap();

        assert_eq!(composition.connections.len(), 1);
        let connection = &composition.connections[0];
        assert_eq!(connection.var_type, VariableType::Real);
        assert_eq!(connection.start_component, 0);
        assert_eq!(connection.end_component, 1);
        assert_eq!(connection.start_value_reference, 11);
        assert_eq!(connection.end_value_reference, 21);
    }

    #[test]
    fn internal_variables_are_valid_endpoints() {
        // "b.in" is not exposed but the connection above targets it
        let composition = two_component_builder().build().unwrap();
        assert!(composition.variables.iter().all(|v| v.name != "b.in"));
        assert_eq!(composition.connections[0].end_value_reference, 21);
    }

    #[test]
    fn overrides_apply_independently() {
        let mut builder = two_component_builder();
        builder
            .with_variable_mapping(
                "a.x",
                VariableMapping {
                    name: Some("x".to_string()),
                    description: None,
                },
            )
            .with_variable_mapping(
                "a.y",
                VariableMapping {
                    name: None,
                    description: Some("renamed description".to_string()),
                },
            );
        let composition = builder.build().unwrap();

        assert_eq!(composition.variables[0].name, "x");
        assert_eq!(composition.variables[0].description, None);
        assert_eq!(composition.variables[1].name, "a.y");
        assert_eq!(
            composition.variables[1].description.as_deref(),
            Some("renamed description")
        );
    }

    #[test]
    fn colliding_exposed_names_are_rejected() {
        let mut builder = two_component_builder();
        builder.with_variable_mapping(
            "b.z",
            VariableMapping {
                name: Some("a.x".to_string()),
                description: None,
            },
        );
        let err = builder.build().unwrap_err();
        assert!(matches!(
            err,
            ContainerError::DuplicateExposedName { name } if name == "a.x"
        ));

        // the collision is detected no matter which side is renamed
        let mut builder = two_component_builder();
        builder.with_variable_mapping(
            "a.x",
            VariableMapping {
                name: Some("b.z".to_string()),
                description: None,
            },
        );
        assert!(matches!(
            builder.build(),
            Err(ContainerError::DuplicateExposedName { .. })
        ));
    }

    #[test]
    fn unknown_exposed_variable_is_rejected() {
        let mut builder = ContainerBuilder::new("Composite");
        builder.with_component(component(
            "a",
            InterfaceType::CoSimulation,
            &["missing"],
            vec![variable("x", 0, VariableType::Real)],
        ));
        assert!(matches!(
            builder.build(),
            Err(ContainerError::UnknownVariable { component, variable })
                if component == "a" && variable == "missing"
        ));
    }

    #[test]
    fn dangling_connection_endpoints_are_rejected() {
        let mut builder = two_component_builder();
        builder.with_connection(connection("nope", "y", "b", "in"));
        assert!(matches!(
            builder.build(),
            Err(ContainerError::UnknownComponent { component }) if component == "nope"
        ));

        let mut builder = two_component_builder();
        builder.with_connection(connection("a", "y", "b", "nope"));
        assert!(matches!(
            builder.build(),
            Err(ContainerError::UnknownVariable { variable, .. }) if variable == "nope"
        ));
    }

    #[test]
    fn mismatched_connection_types_are_rejected() {
        let mut builder = ContainerBuilder::new("Composite");
        builder
            .with_component(component(
                "a",
                InterfaceType::CoSimulation,
                &[],
                vec![variable("y", 0, VariableType::Real)],
            ))
            .with_component(component(
                "b",
                InterfaceType::CoSimulation,
                &[],
                vec![variable("in", 0, VariableType::Integer)],
            ))
            .with_connection(connection("a", "y", "b", "in"));
        assert!(matches!(
            builder.build(),
            Err(ContainerError::TypeMismatch { start_type, end_type, .. })
                if start_type == "Real" && end_type == "Integer"
        ));
    }

    #[test]
    fn duplicate_component_names_are_rejected() {
        let mut builder = ContainerBuilder::new("Composite");
        builder
            .with_component(component("a", InterfaceType::CoSimulation, &[], vec![]))
            .with_component(component("a", InterfaceType::CoSimulation, &[], vec![]));
        assert!(matches!(
            builder.build(),
            Err(ContainerError::DuplicateComponentName { name }) if name == "a"
        ));
    }

    #[test]
    fn missing_interface_is_rejected() {
        let mut component = component("a", InterfaceType::ModelExchange, &[], vec![]);
        component.model_description.model_exchange = None;
        let mut builder = ContainerBuilder::new("Composite");
        builder.with_component(component);
        assert!(matches!(
            builder.build(),
            Err(ContainerError::UnsupportedInterface { component, .. }) if component == "a"
        ));
    }

    #[test]
    fn disjoint_platforms_fail_the_composition() {
        let mut builder = two_component_builder();
        builder.components[0].platforms = BTreeSet::from([Platform::Linux64]);
        builder.components[1].platforms = BTreeSet::from([Platform::Win64]);
        assert!(matches!(
            builder.build(),
            Err(ContainerError::PlatformCompatibility)
        ));
    }

    #[test]
    fn platforms_are_intersected() {
        let mut builder = two_component_builder();
        builder.components[0].platforms =
            BTreeSet::from([Platform::Linux64, Platform::Darwin64]);
        builder.components[1].platforms =
            BTreeSet::from([Platform::Linux64, Platform::Win64]);
        let composition = builder.build().unwrap();
        assert_eq!(composition.platforms, BTreeSet::from([Platform::Linux64]));
    }
}
