//! The build description handed over by a front-end.
//!
//! A front-end evaluates the user's build script and serialises the result
//! as a [`BuildDescription`] JSON document (`build.gantry.json`). Its shape
//! mirrors the graph closely: files are referenced by root-relative path,
//! phony targets by name, and every build step carries its kind in a `kind`
//! tag. [`crate::graph::BuildGraph::from_description`] turns the document
//! into a validated graph.
//!
//! ```rust
//! use gantry::description::BuildDescription;
//!
//! let json = r#"{
//!     "gantry_version": "1.0.0",
//!     "project": "hello",
//!     "edges": [{
//!         "outputs": [{"path": "hello.o"}],
//!         "rule": {
//!             "kind": "compile",
//!             "source": {"path": "hello.c", "root": "srcdir"},
//!             "lang": "c"
//!         }
//!     }]
//! }"#;
//! let description = BuildDescription::parse(json)?;
//! assert_eq!(description.edges.len(), 1);
//! # Ok::<(), gantry::description::DescriptionError>(())
//! ```

// miette/thiserror derive expansion trips `unused_assignments` on some
// toolchains; `expect` would fail where the lint does not fire.
// FIXME(rust-lang/rust#130021): remove once upstream is fixed.
#![allow(
    clippy::allow_attributes,
    clippy::allow_attributes_without_reason,
    unused_assignments
)]

use crate::graph::{FileType, GraphError, LinkMode};
use crate::path::{Path, PathError, Root};
use crate::safe_str::SafeStr;
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use miette::Diagnostic;
use semver::Version;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Name of the description file looked up in the source directory.
pub const DESCRIPTION_FILE: &str = "build.gantry.json";

/// The major version of the description format this build understands.
pub const FORMAT_MAJOR: u64 = 1;

/// Errors raised while loading or converting a build description.
#[derive(Debug, Error, Diagnostic)]
pub enum DescriptionError {
    /// The file could not be read.
    #[error("failed to read build description '{path}'")]
    #[diagnostic(code(gantry::description::io))]
    Io {
        /// The file being read.
        path: Utf8PathBuf,
        /// The underlying failure.
        #[source]
        source: std::io::Error,
    },
    /// The document is not valid JSON or does not match the format.
    #[error("malformed build description")]
    #[diagnostic(code(gantry::description::parse))]
    Parse(#[from] serde_json::Error),
    /// The document was written for a newer format.
    #[error("unsupported description format {found}")]
    #[diagnostic(
        code(gantry::description::version),
        help("this build of gantry reads format 1.x; upgrade gantry")
    )]
    UnsupportedVersion {
        /// The version the document declares.
        found: Version,
    },
    /// A path in the document is invalid.
    #[error("invalid path '{path}'")]
    #[diagnostic(code(gantry::description::path))]
    Path {
        /// The path as written.
        path: String,
        /// Why it was rejected.
        #[source]
        source: PathError,
    },
    /// A build step was declared with the wrong kind of reference.
    #[error("{0}")]
    #[diagnostic(code(gantry::description::invalid))]
    Invalid(String),
    /// The graph rejected a step.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),
}

const fn default_root() -> Root {
    Root::BuildDir
}

/// A root-relative path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PathRef {
    /// The path text.
    pub path: String,
    /// The root it is relative to; defaults to the build directory.
    #[serde(default = "default_root")]
    pub root: Root,
}

impl PathRef {
    /// Resolve to a [`Path`].
    ///
    /// # Errors
    ///
    /// Returns [`DescriptionError::Path`] for paths that escape their root.
    pub fn to_path(&self) -> Result<Path, DescriptionError> {
        Path::new(&self.path, self.root).map_err(|source| DescriptionError::Path {
            path: self.path.clone(),
            source,
        })
    }

    /// Resolve to a directory [`Path`].
    ///
    /// # Errors
    ///
    /// As for [`PathRef::to_path`].
    pub fn to_directory(&self) -> Result<Path, DescriptionError> {
        Path::directory(&self.path, self.root).map_err(|source| DescriptionError::Path {
            path: self.path.clone(),
            source,
        })
    }
}

/// A file or directory node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileRef {
    /// The path text.
    pub path: String,
    /// The root it is relative to; defaults to the build directory.
    #[serde(default = "default_root")]
    pub root: Root,
    /// The file type; inferred from the step that uses it when omitted.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub file_type: Option<FileType>,
    /// The source language.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    /// Whether the node is a directory.
    #[serde(default)]
    pub directory: bool,
}

/// A phony target referenced by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PhonyRef {
    /// The target name.
    pub phony: String,
}

/// A reference to a node.
///
/// A bare string names a file in the source directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeRef {
    /// A source-directory file by relative name.
    Name(String),
    /// A phony target.
    Phony(PhonyRef),
    /// A file or directory.
    File(FileRef),
}

/// A command word: raw text, or a path resolved by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Word {
    /// Raw text, quoted as needed.
    Text(String),
    /// A root-relative path.
    Path(PathRef),
}

impl Word {
    /// Convert to a [`SafeStr`].
    ///
    /// # Errors
    ///
    /// Fails for invalid paths.
    pub fn to_safe_str(&self) -> Result<SafeStr, DescriptionError> {
        Ok(match self {
            Self::Text(text) => SafeStr::text(text),
            Self::Path(path) => SafeStr::from(path.to_path()?),
        })
    }
}

/// One command of a custom step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandDecl {
    /// A command string passed to the shell unquoted.
    Raw(String),
    /// A list of words, each quoted individually.
    Args(Vec<Word>),
}

/// The kind-specific part of a build step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum RuleDecl {
    /// Compile one source file.
    Compile {
        /// The source file.
        source: NodeRef,
        /// The source language.
        lang: String,
        /// Per-file compiler options.
        #[serde(default)]
        options: Vec<Word>,
        /// Extra header search directories.
        #[serde(default)]
        includes: Vec<PathRef>,
        /// A precompiled header the source is compiled against.
        #[serde(default)]
        pch: Option<NodeRef>,
        /// Precompile the source as a header.
        #[serde(default)]
        precompile: bool,
        /// The file MSVC compiles in place of a precompiled header.
        #[serde(default)]
        pch_source: Option<NodeRef>,
    },
    /// Link or archive object files.
    Link {
        /// The kind of binary.
        mode: LinkMode,
        /// Object files.
        #[serde(default)]
        files: Vec<NodeRef>,
        /// Libraries linked against.
        #[serde(default)]
        libs: Vec<NodeRef>,
        /// Static libraries linked in their entirety.
        #[serde(default)]
        whole_archive: Vec<NodeRef>,
        /// Linker options.
        #[serde(default)]
        options: Vec<Word>,
        /// Library options placed after the inputs.
        #[serde(default)]
        lib_options: Vec<Word>,
        /// IDE project name.
        #[serde(default)]
        project_name: Option<String>,
    },
    /// Copy a file.
    CopyFile {
        /// The file to copy.
        source: NodeRef,
    },
    /// Create a symbolic link.
    Symlink {
        /// The link target.
        target: NodeRef,
    },
    /// Run commands.
    Command {
        /// Commands in order.
        commands: Vec<CommandDecl>,
        /// Environment exported for every command.
        #[serde(default)]
        env: IndexMap<String, Word>,
        /// Whether the commands need the terminal.
        #[serde(default)]
        console: bool,
    },
    /// Write fixed lines to a file.
    WriteFile {
        /// The file's lines.
        lines: Vec<String>,
    },
    /// Echo one line into a file.
    EchoFile {
        /// The line.
        text: String,
    },
    /// Group the step's extra dependencies under a phony name.
    Alias,
}

/// A build step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EdgeDecl {
    /// Files produced, public output first.
    pub outputs: Vec<NodeRef>,
    /// Additional prerequisites.
    #[serde(default)]
    pub extra_deps: Vec<NodeRef>,
    /// Files installed along with the public output.
    #[serde(default)]
    pub install_deps: Vec<NodeRef>,
    /// Summary shown while building.
    #[serde(default)]
    pub description: Option<String>,
    /// What the step does.
    pub rule: RuleDecl,
}

/// An installed file or directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstallDecl {
    /// What to install.
    pub target: NodeRef,
    /// Where to; chosen from the file type when omitted.
    #[serde(default)]
    pub root: Option<Root>,
}

/// An entry in the test tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum TestDecl {
    /// A single test.
    Case {
        /// The program to run.
        #[serde(default)]
        target: Option<NodeRef>,
        /// Its arguments.
        #[serde(default)]
        options: Vec<Word>,
        /// Environment for this test only.
        #[serde(default)]
        env: IndexMap<String, Word>,
    },
    /// A driver running nested tests.
    Driver {
        /// The driver program.
        #[serde(default)]
        target: Option<NodeRef>,
        /// Arguments before the child tests.
        #[serde(default)]
        options: Vec<Word>,
        /// Environment for the driver.
        #[serde(default)]
        env: IndexMap<String, Word>,
        /// Nested entries.
        #[serde(default)]
        children: Vec<TestDecl>,
    },
}

/// Inputs and extra outputs of the regeneration rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegenerateDecl {
    /// The description entry file; defaults to [`DESCRIPTION_FILE`] in the
    /// source directory.
    #[serde(default)]
    pub description: Option<PathRef>,
    /// The toolchain file.
    #[serde(default)]
    pub toolchain: Option<PathRef>,
    /// Package metadata consulted while configuring.
    #[serde(default)]
    pub package_metadata: Option<PathRef>,
    /// Other files the generator writes.
    #[serde(default)]
    pub outputs: Vec<PathRef>,
}

/// A complete build description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildDescription {
    /// Version of the description format.
    pub gantry_version: Version,
    /// The project name.
    pub project: String,
    /// File declarations that fix a node's type or language before any
    /// step refers to it.
    #[serde(default)]
    pub files: Vec<FileRef>,
    /// Build steps in registration order.
    #[serde(default)]
    pub edges: Vec<EdgeDecl>,
    /// Targets built by default.
    #[serde(default)]
    pub defaults: Vec<NodeRef>,
    /// Installed files and directories.
    #[serde(default)]
    pub install: Vec<InstallDecl>,
    /// The test tree.
    #[serde(default)]
    pub tests: Vec<TestDecl>,
    /// Extra prerequisites of `test`.
    #[serde(default)]
    pub test_deps: Vec<NodeRef>,
    /// Compiler options per language.
    #[serde(default)]
    pub global_options: IndexMap<String, Vec<Word>>,
    /// Options applied to every link.
    #[serde(default)]
    pub global_link_options: Vec<Word>,
    /// Directories scanned while configuring.
    #[serde(default)]
    pub find_dirs: Vec<PathRef>,
    /// Regeneration inputs.
    #[serde(default)]
    pub regenerate: RegenerateDecl,
}

impl BuildDescription {
    /// Parse a description from JSON text.
    ///
    /// # Errors
    ///
    /// Fails for malformed JSON or an unsupported format version.
    pub fn parse(text: &str) -> Result<Self, DescriptionError> {
        let description: Self = serde_json::from_str(text)?;
        if description.gantry_version.major != FORMAT_MAJOR {
            return Err(DescriptionError::UnsupportedVersion {
                found: description.gantry_version,
            });
        }
        Ok(description)
    }

    /// Read and parse a description file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or parsed.
    pub fn from_path(path: &Utf8Path) -> Result<Self, DescriptionError> {
        let text = std::fs::read_to_string(path).map_err(|source| DescriptionError::Io {
            path: path.to_owned(),
            source,
        })?;
        Self::parse(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn node_references_take_three_forms() {
        let refs: Vec<NodeRef> = serde_json::from_str(
            r#"["main.c", {"phony": "docs"}, {"path": "lib", "directory": true}]"#,
        )
        .expect("parse");
        assert_eq!(refs.first(), Some(&NodeRef::Name("main.c".to_owned())));
        assert_eq!(
            refs.get(1),
            Some(&NodeRef::Phony(PhonyRef {
                phony: "docs".to_owned()
            }))
        );
        let Some(NodeRef::File(file)) = refs.get(2) else {
            panic!("expected a file reference, got {refs:?}");
        };
        assert_eq!(file.root, Root::BuildDir);
        assert!(file.directory);
    }

    #[rstest]
    fn command_words_mix_text_and_paths() {
        let rule: RuleDecl = serde_json::from_str(
            r#"{"kind": "command", "commands": ["echo hi", ["touch", {"path": "stamp"}]]}"#,
        )
        .expect("parse");
        let RuleDecl::Command { commands, .. } = rule else {
            panic!("expected a command rule");
        };
        assert_eq!(commands.first(), Some(&CommandDecl::Raw("echo hi".to_owned())));
        let Some(CommandDecl::Args(words)) = commands.get(1) else {
            panic!("expected an argument list");
        };
        let second = words.get(1).expect("word").to_safe_str().expect("path");
        assert_eq!(second, SafeStr::from(Path::new("stamp", Root::BuildDir).expect("path")));
    }

    #[rstest]
    #[case(r#"{"gantry_version": "1.0.0", "project": "p", "bogus": 1}"#)]
    #[case(r#"{"gantry_version": "1.0.0", "project": "p",
               "edges": [{"outputs": ["x"], "rule": {"kind": "alias"}, "bogus": 1}]}"#)]
    #[case(r#"{"gantry_version": "1.0.0", "project": "p",
               "edges": [{"outputs": ["x"], "rule": {"kind": "frobnicate"}}]}"#)]
    #[case(r#"{"gantry_version": "1.0.0"}"#)]
    fn malformed_documents_are_rejected(#[case] json: &str) {
        assert!(matches!(
            BuildDescription::parse(json),
            Err(DescriptionError::Parse(_))
        ));
    }

    #[rstest]
    fn newer_major_version_is_rejected() {
        let err = BuildDescription::parse(r#"{"gantry_version": "2.0.0", "project": "p"}"#)
            .expect_err("version");
        assert!(matches!(
            err,
            DescriptionError::UnsupportedVersion { found } if found == Version::new(2, 0, 0)
        ));
    }

    #[rstest]
    fn escaping_paths_are_reported() {
        let path = PathRef {
            path: "../outside".to_owned(),
            root: Root::SrcDir,
        };
        assert!(matches!(
            path.to_path(),
            Err(DescriptionError::Path { path, .. }) if path == "../outside"
        ));
    }

    #[rstest]
    fn from_path_reports_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = Utf8PathBuf::from_path_buf(dir.path().join(DESCRIPTION_FILE)).expect("utf8");
        assert!(matches!(
            BuildDescription::from_path(&path),
            Err(DescriptionError::Io { .. })
        ));
    }
}
