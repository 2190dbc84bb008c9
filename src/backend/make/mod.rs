//! The Make backend.
//!
//! Produces a single `Makefile` for GNU Make. Shared recipes are written
//! as `define` blocks invoked through `$(call ...)`, per-target flags are
//! target-specific variables layered over `GLOBAL_*` defaults, and output
//! directories are created through order-only `.dir` sentinels.

mod builtins;
pub mod rules;
pub mod syntax;

pub use rules::MakeEmitter;

use super::{EmitError, OutputFile, emit_all, find_depfile};
use crate::environment::Environment;
use crate::graph::BuildGraph;
use tracing::debug;

/// The generated file's name.
pub const MAKEFILE: &str = "Makefile";

/// Generate the `Makefile` (and the find depfile, when needed).
///
/// # Errors
///
/// Fails if the graph cannot be represented as a Makefile.
pub fn write(graph: &BuildGraph, env: &Environment) -> Result<Vec<OutputFile>, EmitError> {
    let mut emitter = MakeEmitter::new(env);
    emitter.path_variables(graph)?;
    emitter.all_rule(graph)?;
    emitter.install_rule(graph)?;
    emitter.test_rule(graph)?;
    emit_all(&mut emitter, graph)?;
    emitter.directory_rule()?;
    emitter.clean_rule(graph)?;

    let depfile = find_depfile(graph, env, MAKEFILE, true)?;
    emitter.regenerate_rule(graph, depfile.is_some())?;

    let contents = emitter.makefile().write()?;
    debug!(bytes = contents.len(), "rendered Makefile");
    let mut files = vec![OutputFile::new(MAKEFILE, contents)];
    files.extend(depfile);
    Ok(files)
}
