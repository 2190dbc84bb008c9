//! Shared helpers for integration tests.
//!
//! Integration tests under `tests/` compile as independent crates. This module
//! is included via `mod common;` in individual test files to share fixtures and
//! helpers while keeping test modules small and avoiding duplication.

use anyhow::{Context, Result};
use gantry::backend::OutputFile;
use gantry::description::BuildDescription;
use gantry::environment::Environment;
use gantry::graph::BuildGraph;
use std::path::Path;

/// Load a description from `tests/data` and build its graph.
pub fn graph_from_data(name: &str) -> Result<BuildGraph> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/data").join(name);
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("read {}", path.display()))?;
    let description = BuildDescription::parse(&text).context("parse description")?;
    BuildGraph::from_description(&description).context("build graph")
}

/// An environment for `srcdir` and `builddir` with no captured variables.
pub fn environment(srcdir: &str, builddir: &str) -> Environment {
    Environment::new(srcdir, builddir)
}

/// The contents of the generated file at `path`.
pub fn contents<'a>(files: &'a [OutputFile], path: &str) -> Result<&'a str> {
    files
        .iter()
        .find(|file| file.path == path)
        .map(|file| file.contents.as_str())
        .with_context(|| format!("no generated file named {path}"))
}
