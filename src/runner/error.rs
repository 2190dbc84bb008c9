//! Error types for the runner module.
//!
//! This submodule isolates derive-macro-affected code to scope lint suppressions
//! narrowly. The `unused_assignments` lint fires in some Rust versions due to
//! thiserror/miette derive macro expansion.

// Scoped suppression for version-dependent lint false positives from
// miette/thiserror derive macros. `#[expect]` fails when the lint doesn't
// fire, so `#[allow]` is used here.
// FIXME(rust-lang/rust#130021): remove once upstream is fixed.
#![allow(
    clippy::allow_attributes,
    clippy::allow_attributes_without_reason,
    unused_assignments
)]

use camino::Utf8PathBuf;
use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised during command execution.
#[derive(Debug, Error, Diagnostic)]
pub enum RunnerError {
    /// The source directory has no build description.
    #[error("no build description at '{path}'")]
    #[diagnostic(
        code(gantry::runner::description_not_found),
        help("run the front-end on the source tree to produce build.gantry.json")
    )]
    DescriptionNotFound {
        /// The path that was attempted.
        path: Utf8PathBuf,
    },
    /// The build directory was never configured.
    #[error("'{path}' is not a configured build directory")]
    #[diagnostic(
        code(gantry::runner::not_configured),
        help("run `gantry configure` for this build directory first")
    )]
    NotConfigured {
        /// The build directory.
        path: Utf8PathBuf,
    },
    /// Source and build directories coincide.
    #[error("source and build directories must differ: '{path}'")]
    #[diagnostic(code(gantry::runner::same_directory))]
    SameDirectory {
        /// The shared directory.
        path: Utf8PathBuf,
    },
    /// A path given on the command line is not valid UTF-8.
    #[error("path is not valid UTF-8: {}", path.display())]
    #[diagnostic(code(gantry::runner::non_utf8_path))]
    NonUtf8Path {
        /// The offending path.
        path: PathBuf,
    },
}
