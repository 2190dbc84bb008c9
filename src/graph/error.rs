//! Errors raised while assembling a build graph.

// miette/thiserror derive expansion trips `unused_assignments` on some
// toolchains; `expect` would fail where the lint does not fire.
// FIXME(rust-lang/rust#130021): remove once upstream is fixed.
#![allow(
    clippy::allow_attributes,
    clippy::allow_attributes_without_reason,
    unused_assignments
)]

use crate::path::PathError;
use miette::Diagnostic;
use thiserror::Error;

/// Errors raised by [`super::BuildGraph`] operations.
#[derive(Debug, Error, Diagnostic, PartialEq, Eq)]
pub enum GraphError {
    /// Two edges (or one edge twice) claim the same output.
    #[error("'{output}' is already produced by another build step")]
    #[diagnostic(
        code(gantry::graph::duplicate_output),
        help("each file may be created by exactly one build step")
    )]
    DuplicateOutput {
        /// Display form of the clashing output.
        output: String,
    },
    /// An edge was registered without any outputs.
    #[error("build step has no outputs")]
    #[diagnostic(code(gantry::graph::no_outputs))]
    NoOutputs,
    /// A link or archive step has nothing to link.
    #[error("'{output}' has no input files")]
    #[diagnostic(code(gantry::graph::missing_inputs))]
    MissingInputs {
        /// Display form of the step's primary output.
        output: String,
    },
    /// Options were supplied that the step kind cannot honour.
    #[error("'{output}': {reason}")]
    #[diagnostic(code(gantry::graph::incompatible_options))]
    IncompatibleOptions {
        /// Display form of the step's primary output.
        output: String,
        /// Why the options are rejected.
        reason: String,
    },
    /// A node or driver identifier does not belong to this graph.
    #[error("unknown node #{0}")]
    #[diagnostic(code(gantry::graph::unknown_node))]
    UnknownNode(usize),
    /// A node of the wrong kind was supplied.
    #[error("'{node}' must be {expected}")]
    #[diagnostic(code(gantry::graph::wrong_node_kind))]
    WrongNodeKind {
        /// Display form of the node.
        node: String,
        /// Description of the required kind.
        expected: &'static str,
    },
    /// A test was declared in a way the test runner cannot express.
    #[error("invalid test: {0}")]
    #[diagnostic(code(gantry::graph::invalid_test))]
    InvalidTest(String),
    /// A path could not be constructed.
    #[error(transparent)]
    #[diagnostic(code(gantry::graph::path))]
    Path(#[from] PathError),
}
