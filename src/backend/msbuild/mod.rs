//! The MSBuild backend.
//!
//! Produces a Visual Studio solution, one project file per linked binary or
//! custom step, and the GUID map that keeps project identities stable across
//! regenerations. There is no `install` or `clean` project: Visual Studio
//! provides clean itself and has no install convention.

mod builtins;
pub mod project;
pub mod rules;
pub mod solution;
pub mod syntax;
pub mod uuid_map;

pub use rules::MsBuildEmitter;
pub use uuid_map::UuidMap;

use super::{EmitError, OutputFile, emit_all};
use crate::environment::Environment;
use crate::graph::BuildGraph;
use tracing::debug;

/// The solution file's name, relative to the build directory.
pub const SOLUTION_FILE: &str = "project.sln";

/// Generate the solution, its projects and the GUID map, reusing GUIDs saved
/// in the build directory.
///
/// # Errors
///
/// Fails if the saved GUID map is unreadable or the graph cannot be
/// represented as MSBuild projects.
pub fn write(graph: &BuildGraph, env: &Environment) -> Result<Vec<OutputFile>, EmitError> {
    let uuids = UuidMap::load(graph.project_name(), &env.builddir)?;
    write_with(graph, env, uuids)
}

/// As [`write`], with an explicit GUID map.
///
/// # Errors
///
/// As for [`write`].
pub fn write_with(
    graph: &BuildGraph,
    env: &Environment,
    uuids: UuidMap,
) -> Result<Vec<OutputFile>, EmitError> {
    let sln = SOLUTION_FILE;
    let mut emitter = MsBuildEmitter::new(env, uuids);
    emit_all(&mut emitter, graph)?;
    emitter.test_project(graph)?;
    emitter.regenerate_project(graph, sln)?;
    emitter.default_project(graph);

    let solution = emitter.solution();
    let mut files = vec![OutputFile::new(sln, solution.write())];
    for project in solution.projects() {
        files.push(OutputFile::new(project.path(), project.write()?));
    }
    files.push(emitter.uuids.save()?);
    debug!(projects = solution.projects().len(), "rendered {sln}");
    Ok(files)
}
