//! Errors raised while writing backend files.

// miette/thiserror derive expansion trips `unused_assignments` on some
// toolchains; `expect` would fail where the lint does not fire.
// FIXME(rust-lang/rust#130021): remove once upstream is fixed.
#![allow(
    clippy::allow_attributes,
    clippy::allow_attributes_without_reason,
    unused_assignments
)]

use crate::environment::EnvError;
use crate::graph::GraphError;
use crate::path::PathError;
use miette::Diagnostic;
use thiserror::Error;

/// Errors raised by the backend writers and rule emitters.
#[derive(Debug, Error, Diagnostic)]
pub enum EmitError {
    /// A value written in a single-token position contains a newline.
    #[error("illegal newline in {0:?}")]
    #[diagnostic(
        code(gantry::emit::illegal_newline),
        help("build files cannot represent newlines inside a single value")
    )]
    IllegalNewline(String),
    /// A variable was defined twice.
    #[error("variable '{0}' already exists")]
    #[diagnostic(code(gantry::emit::duplicate_variable))]
    DuplicateVariable(String),
    /// A rule name was defined twice.
    #[error("rule '{0}' already exists")]
    #[diagnostic(code(gantry::emit::duplicate_rule))]
    DuplicateRule(String),
    /// Two build statements produce the same output.
    #[error("build for '{0}' already exists")]
    #[diagnostic(code(gantry::emit::duplicate_build))]
    DuplicateBuild(String),
    /// A build statement refers to a rule that was never defined.
    #[error("unknown rule '{0}'")]
    #[diagnostic(code(gantry::emit::unknown_rule))]
    UnknownRule(String),
    /// A rule name contains characters other than letters, digits and `_`.
    #[error("rule name '{0}' contains invalid characters")]
    #[diagnostic(code(gantry::emit::invalid_rule_name))]
    InvalidRuleName(String),
    /// A Make rule was declared without targets.
    #[error("rule must have at least one target")]
    #[diagnostic(code(gantry::emit::no_targets))]
    NoTargets,
    /// A Make pattern does not contain exactly one `%`.
    #[error("pattern '{0}' must contain exactly one unescaped '%'")]
    #[diagnostic(code(gantry::emit::invalid_pattern))]
    InvalidPattern(String),
    /// A project depends on a library that no project builds.
    #[error("unknown dependency '{0}'")]
    #[diagnostic(
        code(gantry::emit::unknown_dependency),
        help("libraries must be built before the projects that link them")
    )]
    UnknownDependency(String),
    /// The saved UUID map was written by a newer version.
    #[error("UUID map version {found} is newer than supported version {supported}")]
    #[diagnostic(code(gantry::emit::uuid_version))]
    UuidVersion {
        /// The version found on disk.
        found: u32,
        /// The newest version this build understands.
        supported: u32,
    },
    /// The saved UUID map holds a value that is not a GUID.
    #[error("invalid UUID '{value}' for '{key}'")]
    #[diagnostic(
        code(gantry::emit::invalid_uuid),
        help("delete the UUID map to regenerate every GUID")
    )]
    InvalidUuid {
        /// The project name the GUID belongs to.
        key: String,
        /// The stored text.
        value: String,
    },
    /// The saved UUID map could not be parsed.
    #[error("invalid UUID map")]
    #[diagnostic(code(gantry::emit::uuid_map))]
    UuidMap(#[from] serde_json::Error),
    /// Reading a previous run's state failed.
    #[error("failed to read {path}")]
    #[diagnostic(code(gantry::emit::io))]
    Io {
        /// The file being read.
        path: String,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The graph is inconsistent.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),
    /// A path could not be resolved.
    #[error(transparent)]
    #[diagnostic(code(gantry::emit::path))]
    Path(#[from] PathError),
    /// A tool could not be found.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Env(#[from] EnvError),
}
