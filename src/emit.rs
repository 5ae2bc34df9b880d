//! Rendering of the container model description.
//!
//! The emitted document covers the merged, renamed variable table keyed by
//! container value reference plus the experiment defaults of the
//! configuration. Emission order follows composite-reference order, so the
//! output is stable across runs except for the generation timestamp.

use chrono::{SecondsFormat, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::Writer;

use crate::builder::Composition;
use crate::descriptor::VariableType;
use crate::errors::{ContainerError, ContainerResult};

/// Model identifier of the container runtime. The runtime's shared
/// libraries are named after it, so it is part of the bundle contract.
pub const CONTAINER_MODEL_IDENTIFIER: &str = "FMUContainer";

/// The FMI version the emitted document declares.
pub const FMI_VERSION: &str = "2.0";

fn render_err(err: impl std::fmt::Display) -> ContainerError {
    ContainerError::DescriptorRender {
        reason: err.to_string(),
    }
}

/// UTC timestamp for the `generationDateAndTime` attribute.
pub fn generation_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Render the container's model description document.
///
/// `source_files` lists the runtime source files shipped in the bundle and
/// is empty unless source packaging was requested.
pub fn render_model_description(
    composition: &Composition,
    generated_at: &str,
    source_files: &[String],
) -> ContainerResult<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(render_err)?;

    let mut root = BytesStart::new("fmiModelDescription");
    root.push_attribute(("fmiVersion", FMI_VERSION));
    root.push_attribute(("modelName", composition.model_name.as_str()));
    root.push_attribute(("guid", ""));
    if let Some(description) = &composition.description {
        root.push_attribute(("description", description.as_str()));
    }
    root.push_attribute((
        "generationTool",
        format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")).as_str(),
    ));
    root.push_attribute(("generationDateAndTime", generated_at));
    writer.write_event(Event::Start(root)).map_err(render_err)?;

    let mut co_simulation = BytesStart::new("CoSimulation");
    co_simulation.push_attribute(("modelIdentifier", CONTAINER_MODEL_IDENTIFIER));
    if source_files.is_empty() {
        writer
            .write_event(Event::Empty(co_simulation))
            .map_err(render_err)?;
    } else {
        writer
            .write_event(Event::Start(co_simulation))
            .map_err(render_err)?;
        writer
            .write_event(Event::Start(BytesStart::new("SourceFiles")))
            .map_err(render_err)?;
        for source_file in source_files {
            let mut file = BytesStart::new("File");
            file.push_attribute(("name", source_file.as_str()));
            writer.write_event(Event::Empty(file)).map_err(render_err)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new("SourceFiles")))
            .map_err(render_err)?;
        writer
            .write_event(Event::End(BytesEnd::new("CoSimulation")))
            .map_err(render_err)?;
    }

    // only the configured fields are emitted
    if let Some(experiment) = &composition.default_experiment {
        let mut element = BytesStart::new("DefaultExperiment");
        if let Some(start_time) = experiment.start_time {
            element.push_attribute(("startTime", start_time.to_string().as_str()));
        }
        if let Some(stop_time) = experiment.stop_time {
            element.push_attribute(("stopTime", stop_time.to_string().as_str()));
        }
        if let Some(tolerance) = experiment.tolerance {
            element.push_attribute(("tolerance", tolerance.to_string().as_str()));
        }
        writer.write_event(Event::Empty(element)).map_err(render_err)?;
    }

    writer
        .write_event(Event::Start(BytesStart::new("ModelVariables")))
        .map_err(render_err)?;
    for variable in &composition.variables {
        let mut scalar = BytesStart::new("ScalarVariable");
        scalar.push_attribute(("name", variable.name.as_str()));
        scalar.push_attribute((
            "valueReference",
            variable.composite_reference.to_string().as_str(),
        ));
        scalar.push_attribute(("causality", variable.causality.as_str()));
        scalar.push_attribute(("variability", variable.variability.as_str()));
        if let Some(description) = &variable.description {
            scalar.push_attribute(("description", description.as_str()));
        }
        writer.write_event(Event::Start(scalar)).map_err(render_err)?;

        let mut type_element = BytesStart::new(variable.var_type.as_str());
        if let Some(start) = &variable.start {
            type_element.push_attribute(("start", start.as_str()));
        }
        if variable.var_type == VariableType::Real {
            if let Some(unit) = &variable.unit {
                type_element.push_attribute(("unit", unit.as_str()));
            }
        }
        writer
            .write_event(Event::Empty(type_element))
            .map_err(render_err)?;

        writer
            .write_event(Event::End(BytesEnd::new("ScalarVariable")))
            .map_err(render_err)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new("ModelVariables")))
        .map_err(render_err)?;

    writer
        .write_event(Event::Empty(BytesStart::new("ModelStructure")))
        .map_err(render_err)?;

    writer
        .write_event(Event::End(BytesEnd::new("fmiModelDescription")))
        .map_err(render_err)?;

    let mut xml = String::from_utf8(writer.into_inner()).map_err(render_err)?;
    xml.push('\n');
    Ok(xml)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{ExposedVariable, ResolvedComponent};
    use crate::descriptor::{Causality, DefaultExperiment, InterfaceType, Variability};
    use crate::platform::Platform;
    use std::collections::BTreeSet;

    fn composition() -> Composition {
        Composition {
            model_name: "Composite".to_string(),
            description: Some("two nested models".to_string()),
            default_experiment: Some(DefaultExperiment {
                start_time: Some(0.0),
                stop_time: Some(4.0),
                tolerance: None,
            }),
            parallel_do_step: false,
            components: vec![ResolvedComponent {
                name: "a".to_string(),
                interface_type: InterfaceType::CoSimulation,
                guid: "{a}".to_string(),
                model_identifier: "A".to_string(),
                nx: 0,
                nz: 0,
            }],
            variables: vec![
                ExposedVariable {
                    component: 0,
                    value_reference: 7,
                    composite_reference: 0,
                    name: "a.x".to_string(),
                    description: Some("an input".to_string()),
                    causality: Causality::Input,
                    variability: Variability::Continuous,
                    var_type: VariableType::Real,
                    start: Some("1.5".to_string()),
                    unit: Some("m/s".to_string()),
                },
                ExposedVariable {
                    component: 0,
                    value_reference: 9,
                    composite_reference: 1,
                    name: "a.n".to_string(),
                    description: None,
                    causality: Causality::Output,
                    variability: Variability::Discrete,
                    var_type: VariableType::Integer,
                    start: None,
                    unit: None,
                },
            ],
            connections: vec![],
            nx: 0,
            nz: 0,
            platforms: BTreeSet::from([Platform::Linux64]),
        }
    }

    #[test]
    fn renders_header_and_variable_table() {
        let xml = render_model_description(&composition(), "2024-06-01T12:00:00Z", &[]).unwrap();
        let doc = roxmltree::Document::parse(&xml).unwrap();
        let root = doc.root_element();

        assert_eq!(root.tag_name().name(), "fmiModelDescription");
        assert_eq!(root.attribute("fmiVersion"), Some("2.0"));
        assert_eq!(root.attribute("modelName"), Some("Composite"));
        assert_eq!(root.attribute("guid"), Some(""));
        assert_eq!(root.attribute("description"), Some("two nested models"));
        assert_eq!(
            root.attribute("generationDateAndTime"),
            Some("2024-06-01T12:00:00Z")
        );

        let co_simulation = root
            .children()
            .find(|n| n.has_tag_name("CoSimulation"))
            .unwrap();
        assert_eq!(
            co_simulation.attribute("modelIdentifier"),
            Some(CONTAINER_MODEL_IDENTIFIER)
        );

        let scalars: Vec<_> = root
            .children()
            .find(|n| n.has_tag_name("ModelVariables"))
            .unwrap()
            .children()
            .filter(roxmltree::Node::is_element)
            .collect();
        assert_eq!(scalars.len(), 2);

        assert_eq!(scalars[0].attribute("name"), Some("a.x"));
        assert_eq!(scalars[0].attribute("valueReference"), Some("0"));
        assert_eq!(scalars[0].attribute("causality"), Some("input"));
        assert_eq!(scalars[0].attribute("variability"), Some("continuous"));
        assert_eq!(scalars[0].attribute("description"), Some("an input"));
        let real = scalars[0].children().find(roxmltree::Node::is_element).unwrap();
        assert_eq!(real.tag_name().name(), "Real");
        assert_eq!(real.attribute("start"), Some("1.5"));
        assert_eq!(real.attribute("unit"), Some("m/s"));

        assert_eq!(scalars[1].attribute("valueReference"), Some("1"));
        assert_eq!(scalars[1].attribute("description"), None);
        let integer = scalars[1].children().find(roxmltree::Node::is_element).unwrap();
        assert_eq!(integer.tag_name().name(), "Integer");
        assert_eq!(integer.attribute("start"), None);

        assert!(root.children().any(|n| n.has_tag_name("ModelStructure")));
    }

    #[test]
    fn default_experiment_emits_only_configured_fields() {
        let xml = render_model_description(&composition(), "2024-06-01T12:00:00Z", &[]).unwrap();
        let doc = roxmltree::Document::parse(&xml).unwrap();
        let experiment = doc
            .root_element()
            .children()
            .find(|n| n.has_tag_name("DefaultExperiment"))
            .unwrap();

        assert_eq!(experiment.attribute("startTime"), Some("0"));
        assert_eq!(experiment.attribute("stopTime"), Some("4"));
        assert_eq!(experiment.attribute("tolerance"), None);

        let mut without_experiment = composition();
        without_experiment.default_experiment = None;
        let xml =
            render_model_description(&without_experiment, "2024-06-01T12:00:00Z", &[]).unwrap();
        let doc = roxmltree::Document::parse(&xml).unwrap();
        assert!(!doc
            .root_element()
            .children()
            .any(|n| n.has_tag_name("DefaultExperiment")));
    }

    #[test]
    fn source_files_are_listed_when_present() {
        let sources = vec!["FMUContainer.c".to_string(), "mpack.c".to_string()];
        let xml =
            render_model_description(&composition(), "2024-06-01T12:00:00Z", &sources).unwrap();
        let doc = roxmltree::Document::parse(&xml).unwrap();

        let files: Vec<_> = doc
            .descendants()
            .filter(|n| n.has_tag_name("File"))
            .filter_map(|n| n.attribute("name"))
            .collect();
        assert_eq!(files, vec!["FMUContainer.c", "mpack.c"]);
    }

    #[test]
    fn rendering_is_deterministic_up_to_the_timestamp() {
        let first = render_model_description(&composition(), "2024-06-01T12:00:00Z", &[]).unwrap();
        let second = render_model_description(&composition(), "2024-06-01T12:00:00Z", &[]).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn special_characters_are_escaped() {
        let mut composition = composition();
        composition.variables[0].description = Some("a < b & c".to_string());
        let xml = render_model_description(&composition, "2024-06-01T12:00:00Z", &[]).unwrap();
        assert!(xml.contains("a &lt; b &amp; c"));

        // and the document still parses back to the original text
        let doc = roxmltree::Document::parse(&xml).unwrap();
        let scalar = doc
            .descendants()
            .find(|n| n.has_tag_name("ScalarVariable"))
            .unwrap();
        assert_eq!(scalar.attribute("description"), Some("a < b & c"));
    }
}
