//! The Ninja backend.
//!
//! Produces `build.ninja`. Each compiler, linker and helper gets one named
//! rule; per-target flags are statement-level variables layered over
//! `global_*` defaults. Ninja creates output directories itself and reads
//! header dependencies through `deps`, so no sentinels or depfile includes
//! are needed.

mod builtins;
pub mod rules;
pub mod syntax;

pub use rules::NinjaEmitter;

use super::{EmitError, OutputFile, emit_all, find_depfile};
use crate::environment::Environment;
use crate::graph::BuildGraph;
use tracing::debug;

/// The generated file's name.
pub const NINJAFILE: &str = "build.ninja";

/// Generate `build.ninja` (and the find depfile, when needed).
///
/// # Errors
///
/// Fails if the graph cannot be represented as a Ninja file.
pub fn write(graph: &BuildGraph, env: &Environment) -> Result<Vec<OutputFile>, EmitError> {
    let mut emitter = NinjaEmitter::new(env);
    emitter.path_variables(graph)?;
    emitter.all_rule(graph)?;
    emitter.install_rule(graph)?;
    emitter.test_rule(graph)?;
    emit_all(&mut emitter, graph)?;
    emitter.clean_rule()?;

    let depfile = find_depfile(graph, env, NINJAFILE, false)?;
    emitter.regenerate_rule(graph, depfile.is_some())?;

    let contents = emitter.file().write()?;
    debug!(
        bytes = contents.len(),
        required = ?emitter.file().required_version(),
        "rendered build.ninja"
    );
    let mut files = vec![OutputFile::new(NINJAFILE, contents)];
    files.extend(depfile);
    Ok(files)
}
