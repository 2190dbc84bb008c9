//! CLI execution and command dispatch logic.
//!
//! This module keeps `main` minimal by providing a single entry point that
//! handles command execution. `configure` reads the build description from
//! the source directory, writes the backend's files into the build directory
//! and saves the configuration next to them; `regenerate` reloads that
//! configuration and writes the files again.

mod error;
mod path_helpers;

pub use error::RunnerError;

use crate::backend::{self, Backend, OutputFile};
use crate::cli::{Cli, Commands, ConfigureArgs};
use crate::description::{BuildDescription, DESCRIPTION_FILE};
use crate::environment::Environment;
use crate::graph::BuildGraph;
use crate::version;
use anyhow::{Context, Result};
use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use std::io::Write;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use path_helpers::{absolute_dir, resolve_cli_path};

/// Name of the saved configuration in the build directory.
pub const CONFIG_FILE: &str = ".gantry_config.json";

/// Everything `regenerate` needs to reproduce a `configure` run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SavedConfig {
    /// The backend files were generated for.
    pub backend: Backend,
    /// The environment captured at configure time.
    pub environment: Environment,
}

/// Execute the parsed [`Cli`] commands.
///
/// # Errors
///
/// Returns an error if the description cannot be loaded, the graph cannot
/// be generated or a file cannot be written.
pub fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Configure(args) => configure(cli, args),
        Commands::Regenerate { builddir } => {
            let dir = resolve_cli_path(cli, builddir);
            regenerate(&absolute_dir(dir.as_ref())?)
        }
    }
}

fn configure(cli: &Cli, args: &ConfigureArgs) -> Result<()> {
    let srcdir = absolute_dir(resolve_cli_path(cli, &args.srcdir).as_ref())?;
    let build_arg = resolve_cli_path(cli, &args.builddir);
    std::fs::create_dir_all(build_arg.as_ref())
        .with_context(|| format!("creating build directory {}", build_arg.display()))?;
    let builddir = absolute_dir(build_arg.as_ref())?;
    if srcdir == builddir {
        return Err(RunnerError::SameDirectory { path: srcdir }.into());
    }

    let mut env = Environment::new(srcdir, builddir)
        .with_variables(|name| std::env::var(name).ok());
    env.toolchain = args.toolchain;
    if let Some(prefix) = &args.prefix {
        env.install_dirs.prefix.clone_from(prefix);
    }
    if let Some(exe) = std::env::current_exe()
        .ok()
        .and_then(|path| path.into_os_string().into_string().ok())
    {
        env.generator = vec![exe];
    }
    env.backend_version = version::probe(args.backend, &env);
    info!(backend = %args.backend, srcdir = %env.srcdir, builddir = %env.builddir, "configuring");

    let config = SavedConfig {
        backend: args.backend,
        environment: env,
    };
    generate(&config)?;
    save_config(&config)
}

/// Rewrite the build files of a configured build directory.
///
/// # Errors
///
/// Fails if `builddir` holds no saved configuration or generation fails.
pub fn regenerate(builddir: &Utf8Path) -> Result<()> {
    let path = builddir.join(CONFIG_FILE);
    if !path.is_file() {
        return Err(RunnerError::NotConfigured {
            path: builddir.to_owned(),
        }
        .into());
    }
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("reading configuration {path}"))?;
    let config: SavedConfig = serde_json::from_str(&text)
        .with_context(|| format!("parsing configuration {path}"))?;
    info!(backend = %config.backend, builddir = %builddir, "regenerating");
    generate(&config)
}

/// Load the description, build the graph and write every backend file.
fn generate(config: &SavedConfig) -> Result<()> {
    let env = &config.environment;
    let description_path = env.srcdir.join(DESCRIPTION_FILE);
    if !description_path.is_file() {
        return Err(RunnerError::DescriptionNotFound {
            path: description_path,
        }
        .into());
    }
    let description = BuildDescription::from_path(&description_path)
        .with_context(|| format!("loading build description {description_path}"))?;
    let graph = BuildGraph::from_description(&description)
        .context("building the build graph")?;
    let files = backend::generate(config.backend, &graph, env)
        .with_context(|| format!("generating {} files", config.backend))?;
    for file in &files {
        write_output(&env.builddir, file)?;
    }
    Ok(())
}

fn save_config(config: &SavedConfig) -> Result<()> {
    let mut contents =
        serde_json::to_string_pretty(config).context("serialising configuration")?;
    contents.push('\n');
    write_output(
        &config.environment.builddir,
        &OutputFile::new(CONFIG_FILE, contents),
    )
}

/// Atomically replace `file` under `builddir`.
///
/// The contents are written to a temporary file in the destination directory
/// and renamed into place, so a build tool never observes a partial file.
fn write_output(builddir: &Utf8Path, file: &OutputFile) -> Result<()> {
    let path = builddir.join(&file.path);
    let parent = path.parent().unwrap_or(builddir);
    std::fs::create_dir_all(parent).with_context(|| format!("creating directory {parent}"))?;
    let mut tmp = NamedTempFile::new_in(parent)
        .with_context(|| format!("creating temporary file in {parent}"))?;
    tmp.write_all(file.contents.as_bytes())
        .with_context(|| format!("writing {path}"))?;
    tmp.persist(&path)
        .with_context(|| format!("replacing {path}"))?;
    debug!(bytes = file.contents.len(), "wrote {path}");
    Ok(())
}

#[cfg(test)]
mod tests;
