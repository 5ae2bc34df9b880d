use crate::descriptor::InterfaceType;
use thiserror::Error;

/// Error type for failed container composition.
///
/// All variants are configuration or input errors and are fatal: composition
/// aborts without writing anything to the output path.
#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("invalid model description in {location}: {reason}")]
    DescriptorParse { location: String, reason: String },

    #[error("invalid container configuration: {reason}")]
    Configuration { reason: String },

    #[error("unknown component '{component}'")]
    UnknownComponent { component: String },

    #[error("unknown variable '{variable}' in component '{component}'")]
    UnknownVariable { component: String, variable: String },

    #[error("component name '{name}' is used more than once")]
    DuplicateComponentName { name: String },

    #[error("exposed variable name '{name}' is used more than once")]
    DuplicateExposedName { name: String },

    #[error(
        "connection {start_component}.{start_variable} -> {end_component}.{end_variable} \
         has mismatched types ({start_type} vs {end_type})"
    )]
    TypeMismatch {
        start_component: String,
        start_variable: String,
        end_component: String,
        end_variable: String,
        start_type: String,
        end_type: String,
    },

    #[error("component '{component}' does not implement the {interface_type} interface")]
    UnsupportedInterface {
        component: String,
        interface_type: InterfaceType,
    },

    #[error("the components have no platform in common")]
    PlatformCompatibility,

    #[error("failed to render the container model description: {reason}")]
    DescriptorRender { reason: String },

    #[error("failed to encode the runtime configuration: {0}")]
    ConfigEncode(#[from] rmp_serde::encode::Error),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ContainerError {
    /// Rewrites the location of a `DescriptorParse` error, used when a parse
    /// failure bubbles up from an FMU archive and the file path is known.
    pub(crate) fn with_location(self, location: impl Into<String>) -> Self {
        match self {
            ContainerError::DescriptorParse { reason, .. } => ContainerError::DescriptorParse {
                location: location.into(),
                reason,
            },
            other => other,
        }
    }
}

/// Convenience type for `Result<T, ContainerError>`.
pub type ContainerResult<T> = Result<T, ContainerError>;
