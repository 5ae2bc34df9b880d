//! Platform detection and intersection.
//!
//! An FMU ships one shared library per supported platform under
//! `binaries/<platform>/`. The container can only be shipped for the
//! platforms every nested FMU supports, intersected with the platforms the
//! container runtime itself is built for.

use std::collections::BTreeSet;
use std::fmt;
use std::fs::File;
use std::path::Path;
use std::str::FromStr;

use crate::errors::{ContainerError, ContainerResult};

/// A binary platform an FMU can ship libraries for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Platform {
    Darwin64,
    Linux32,
    Linux64,
    Win32,
    Win64,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Darwin64 => "darwin64",
            Platform::Linux32 => "linux32",
            Platform::Linux64 => "linux64",
            Platform::Win32 => "win32",
            Platform::Win64 => "win64",
        }
    }

    /// The platforms the container runtime is distributed for. This is the
    /// starting set the component intersection is applied to.
    pub fn shippable() -> BTreeSet<Platform> {
        BTreeSet::from([
            Platform::Darwin64,
            Platform::Linux64,
            Platform::Win32,
            Platform::Win64,
        ])
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "darwin64" => Ok(Platform::Darwin64),
            "linux32" => Ok(Platform::Linux32),
            "linux64" => Ok(Platform::Linux64),
            "win32" => Ok(Platform::Win32),
            "win64" => Ok(Platform::Win64),
            other => Err(format!("unknown platform '{other}'")),
        }
    }
}

fn is_shared_library(name: &str) -> bool {
    name.ends_with(".so") || name.ends_with(".dylib") || name.ends_with(".dll")
}

/// Collect the platforms present in an iterator of archive entry names.
///
/// An entry counts towards a platform when it is a shared library below
/// `binaries/<platform>/`. Unknown platform directories are ignored.
pub fn platforms_from_entries<'a>(entries: impl Iterator<Item = &'a str>) -> BTreeSet<Platform> {
    let mut platforms = BTreeSet::new();
    for entry in entries {
        let mut parts = entry.split('/');
        if parts.next() != Some("binaries") {
            continue;
        }
        let Some(platform_dir) = parts.next() else {
            continue;
        };
        let Some(file_name) = parts.next() else {
            continue;
        };
        if !is_shared_library(file_name) {
            continue;
        }
        if let Ok(platform) = platform_dir.parse() {
            platforms.insert(platform);
        }
    }
    platforms
}

/// Determine the platforms an FMU ships binaries for.
pub fn supported_platforms(path: &Path) -> ContainerResult<BTreeSet<Platform>> {
    let file = File::open(path)?;
    let archive = zip::ZipArchive::new(file)?;
    Ok(platforms_from_entries(archive.file_names()))
}

/// Intersect the platform sets of all components with the starting set.
///
/// Fails with [`ContainerError::PlatformCompatibility`] when the result is
/// empty: such a composite cannot be shipped for any platform.
pub fn intersect_platforms<'a>(
    mut platforms: BTreeSet<Platform>,
    components: impl Iterator<Item = &'a BTreeSet<Platform>>,
) -> ContainerResult<BTreeSet<Platform>> {
    for component_platforms in components {
        platforms = platforms
            .intersection(component_platforms)
            .copied()
            .collect();
    }
    if platforms.is_empty() {
        return Err(ContainerError::PlatformCompatibility);
    }
    Ok(platforms)
}
