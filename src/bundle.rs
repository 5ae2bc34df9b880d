//! Bundle staging and packaging.
//!
//! This is the only part of the engine with side effects on persistent
//! storage. All artifacts are staged in a temporary directory that is
//! removed on every exit path; the finished archive is promoted to the
//! output path only after it has been fully written, so a failed
//! composition never leaves a partial bundle behind.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info};
use tempfile::NamedTempFile;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::binary_config::{RuntimeConfig, RUNTIME_CONFIG_FILENAME};
use crate::builder::{ContainerBuilder, ContainerComponent};
use crate::config::ContainerConfiguration;
use crate::descriptor::read_model_description;
use crate::emit::{generation_timestamp, render_model_description};
use crate::errors::{ContainerError, ContainerResult};
use crate::platform::{supported_platforms, Platform};

/// Packaging settings that are not part of the container configuration.
#[derive(Debug, Clone)]
pub struct PackagingOptions {
    /// Directory holding the container runtime payload: a
    /// `binaries/<platform>/` tree per supported platform and, optionally,
    /// a `sources/` tree.
    pub runtime_dir: PathBuf,
    /// Include the runtime's source files in the bundle.
    pub add_source: bool,
}

/// Compose a container FMU and write it to `output`.
///
/// The model name of the container is the output file's stem. On any
/// failure the output path is left untouched.
pub fn create_container(
    configuration: &ContainerConfiguration,
    output: &Path,
    options: &PackagingOptions,
) -> ContainerResult<()> {
    let model_name = output
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| ContainerError::Configuration {
            reason: format!("output path '{}' has no file name", output.display()),
        })?;

    info!(
        "composing container '{}' from {} components",
        model_name,
        configuration.components.len()
    );

    let staging = tempfile::tempdir()?;
    let resources_dir = staging.path().join("resources");

    let mut builder = ContainerBuilder::from_configuration(model_name, configuration);
    builder.with_runtime_platforms(runtime_platforms(&options.runtime_dir)?);

    for component in &configuration.components {
        debug!(
            "reading component '{}' from {}",
            component.name,
            component.filename.display()
        );
        let model_description = read_model_description(&component.filename)?;
        let platforms = supported_platforms(&component.filename)?;
        let model_identifier = model_description
            .model_identifier(component.interface_type)
            .ok_or_else(|| ContainerError::UnsupportedInterface {
                component: component.name.clone(),
                interface_type: component.interface_type,
            })?
            .to_string();
        // The whole nested FMU lands below resources/, namespaced by its
        // model identifier so different components cannot collide.
        extract_archive(&component.filename, &resources_dir.join(&model_identifier))?;
        builder.with_component(ContainerComponent::new(
            component,
            model_description,
            platforms,
        ));
    }

    let composition = builder.build()?;

    let source_files = if options.add_source {
        runtime_source_files(&options.runtime_dir.join("sources"))?
    } else {
        Vec::new()
    };

    let xml = render_model_description(&composition, &generation_timestamp(), &source_files)?;
    fs::write(staging.path().join("modelDescription.xml"), xml)?;

    fs::create_dir_all(&resources_dir)?;
    let runtime_config = RuntimeConfig::from_composition(&composition);
    fs::write(
        resources_dir.join(RUNTIME_CONFIG_FILENAME),
        runtime_config.to_bytes()?,
    )?;

    for platform in &composition.platforms {
        let platform_dir = Path::new("binaries").join(platform.as_str());
        copy_tree(
            &options.runtime_dir.join(&platform_dir),
            &staging.path().join(&platform_dir),
        )?;
    }

    if options.add_source {
        let sources = options.runtime_dir.join("sources");
        if sources.is_dir() {
            copy_tree(&sources, &staging.path().join("sources"))?;
        }
    }

    archive_directory(staging.path(), output)?;
    info!("wrote container FMU to {}", output.display());
    Ok(())
}

/// Extract a nested FMU archive below the staging tree.
pub fn extract_archive(path: &Path, dest: &Path) -> ContainerResult<()> {
    let file = File::open(path)?;
    let mut archive = zip::ZipArchive::new(file)?;
    fs::create_dir_all(dest)?;
    archive.extract(dest)?;
    Ok(())
}

/// The platforms the runtime payload provides binaries for.
fn runtime_platforms(runtime_dir: &Path) -> ContainerResult<BTreeSet<Platform>> {
    let binaries = runtime_dir.join("binaries");
    if !binaries.is_dir() {
        return Err(ContainerError::Configuration {
            reason: format!(
                "runtime directory '{}' has no binaries tree",
                runtime_dir.display()
            ),
        });
    }
    let mut platforms = BTreeSet::new();
    for entry in fs::read_dir(&binaries)? {
        let entry = entry?;
        if !entry.path().is_dir() {
            continue;
        }
        if let Some(Ok(platform)) = entry.file_name().to_str().map(str::parse::<Platform>) {
            platforms.insert(platform);
        }
    }
    Ok(platforms)
}

/// Relative paths of the C sources of the runtime, for the SourceFiles
/// listing of the emitted model description.
fn runtime_source_files(sources_dir: &Path) -> ContainerResult<Vec<String>> {
    let mut files = Vec::new();
    if !sources_dir.is_dir() {
        return Ok(files);
    }
    for entry in WalkDir::new(sources_dir).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.path().extension().map(|e| e == "c").unwrap_or(false) {
            let relative = entry
                .path()
                .strip_prefix(sources_dir)
                .expect("walked path is below its root");
            files.push(relative.to_string_lossy().replace('\\', "/"));
        }
    }
    Ok(files)
}

fn copy_tree(source: &Path, dest: &Path) -> ContainerResult<()> {
    for entry in WalkDir::new(source) {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .expect("walked path is below its root");
        let target = dest.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Zip a staged directory and atomically promote the archive to `output`.
///
/// The archive is produced as a temporary file next to the destination and
/// only renamed over it once complete; an existing file at `output` is
/// never truncated in place.
fn archive_directory(source: &Path, output: &Path) -> ContainerResult<()> {
    let parent = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let staged = NamedTempFile::new_in(parent)?;
    let mut zip = ZipWriter::new(staged.as_file().try_clone()?);
    let zip_options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for entry in WalkDir::new(source).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .expect("walked path is below its root");
        if relative.as_os_str().is_empty() {
            continue;
        }
        let name = relative.to_string_lossy().replace('\\', "/");
        if entry.file_type().is_dir() {
            zip.add_directory(name, zip_options)?;
        } else {
            zip.start_file(name, zip_options)?;
            let mut file = File::open(entry.path())?;
            io::copy(&mut file, &mut zip)?;
        }
    }
    zip.finish()?;

    staged
        .persist(output)
        .map_err(|e| ContainerError::Io(e.error))?;
    Ok(())
}
