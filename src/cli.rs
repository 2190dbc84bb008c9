//! Command line interface definition using clap.
//!
//! This module defines the [`Cli`] structure and its subcommands.

use crate::backend::Backend;
use crate::tools::Flavor;
use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

fn parse_prefix(s: &str) -> Result<Utf8PathBuf, String> {
    let path = Utf8PathBuf::from(s);
    if path.is_absolute() {
        Ok(path)
    } else {
        Err(format!("install prefix '{s}' must be an absolute path"))
    }
}

/// Generate Make, Ninja or MSBuild files from a build description.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Change to this directory before doing anything.
    #[arg(short = 'C', long, value_name = "DIR")]
    pub directory: Option<PathBuf>,

    /// Enable verbose logging output.
    #[arg(short, long)]
    pub verbose: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Arguments accepted by the `configure` command.
#[derive(Debug, Args, PartialEq, Eq, Clone)]
pub struct ConfigureArgs {
    /// Build tool to generate files for.
    #[arg(long, value_enum, default_value_t = Backend::Make)]
    pub backend: Backend,

    /// Compiler family of the toolchain.
    #[arg(long, value_enum, default_value_t = Flavor::Cc)]
    pub toolchain: Flavor,

    /// Installation prefix.
    #[arg(long, value_name = "DIR", value_parser = parse_prefix)]
    pub prefix: Option<Utf8PathBuf>,

    /// Directory holding `build.gantry.json`.
    #[arg(value_name = "SRCDIR")]
    pub srcdir: PathBuf,

    /// Directory to write build files into.
    #[arg(value_name = "BUILDDIR")]
    pub builddir: PathBuf,
}

/// Available top-level commands for gantry.
#[derive(Debug, Subcommand, PartialEq, Eq, Clone)]
pub enum Commands {
    /// Generate build files for a source tree.
    Configure(ConfigureArgs),

    /// Rewrite the build files of a configured build directory.
    Regenerate {
        /// A build directory previously passed to `configure`.
        #[arg(value_name = "BUILDDIR")]
        builddir: PathBuf,
    },
}
