//! Command line driver for container composition.
//!
//! Reads a TOML container configuration, composes the nested FMUs it
//! declares and writes the container FMU to the requested output path.

use clap::Parser;
use std::path::PathBuf;

use fmu_container::bundle::{create_container, PackagingOptions};
use fmu_container::config::ContainerConfiguration;

/// Compose nested FMUs into a single container FMU
#[derive(Parser, Debug)]
#[command(name = "fmu-container")]
#[command(about = "Compose nested FMUs into a single container FMU")]
struct Args {
    /// Container configuration (TOML)
    config: PathBuf,

    /// Output path of the container FMU
    #[arg(short, long)]
    output: PathBuf,

    /// Directory holding the container runtime payload
    /// (binaries/<platform>/ trees and optionally sources/)
    #[arg(long)]
    runtime_dir: PathBuf,

    /// Include the runtime's source files in the bundle
    #[arg(long)]
    add_source: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let configuration = match ContainerConfiguration::load(&args.config) {
        Ok(configuration) => configuration,
        Err(e) => {
            eprintln!("Failed to load {}: {}", args.config.display(), e);
            std::process::exit(1);
        }
    };

    let options = PackagingOptions {
        runtime_dir: args.runtime_dir,
        add_source: args.add_source,
    };

    if let Err(e) = create_container(&configuration, &args.output, &options) {
        eprintln!("Composition failed: {}", e);
        std::process::exit(1);
    }

    println!("{}", args.output.display());
}
