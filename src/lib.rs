//! Compose nested FMUs into a single container FMU.
//!
//! The composition engine reads the model description of every nested FMU,
//! renumbers the exposed variables into one flat container namespace,
//! resolves the connections between components, intersects the supported
//! platform sets and packages everything into a new FMU. The resulting
//! bundle carries a MessagePack configuration that a fixed external
//! runtime uses to instantiate and step the nested components; the engine
//! itself never simulates anything.
//!
//! ```no_run
//! use fmu_container::bundle::{create_container, PackagingOptions};
//! use fmu_container::config::ContainerConfiguration;
//! use std::path::Path;
//!
//! # fn main() -> fmu_container::errors::ContainerResult<()> {
//! let configuration = ContainerConfiguration::load(Path::new("container.toml"))?;
//! let options = PackagingOptions {
//!     runtime_dir: "runtime".into(),
//!     add_source: false,
//! };
//! create_container(&configuration, Path::new("Composite.fmu"), &options)?;
//! # Ok(())
//! # }
//! ```

pub mod binary_config;
pub mod builder;
pub mod bundle;
pub mod config;
pub mod descriptor;
pub mod emit;
pub mod errors;
pub mod platform;

pub use crate::builder::{Composition, ContainerBuilder};
pub use crate::bundle::{create_container, PackagingOptions};
pub use crate::config::ContainerConfiguration;
pub use crate::errors::{ContainerError, ContainerResult};
