//! Graph edges: the build steps that produce nodes.

use super::NodeId;
use crate::path::Path;
use crate::safe_str::SafeStr;
use crate::shell::CommandLine;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// What kind of binary a link step produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkMode {
    /// A program.
    Executable,
    /// A shared library.
    SharedLibrary,
    /// A module loaded at run time (`dlopen`).
    LoadableModule,
    /// A static archive.
    StaticLibrary,
}

impl LinkMode {
    /// Whether this step runs the archiver rather than the linker.
    #[must_use]
    pub const fn is_archive(self) -> bool {
        matches!(self, Self::StaticLibrary)
    }
}

/// What a compile step produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompileMode {
    /// An object file.
    #[default]
    Object,
    /// A precompiled header built from the step's source, which is the
    /// header itself.
    ///
    /// MSVC compiles `pch_source` (a file including the header) instead,
    /// and writes the precompiled header followed by that file's object.
    PrecompiledHeader {
        /// The file compiled in place of the header, if any.
        pch_source: Option<NodeId>,
    },
}

/// Compile one source file into an object file, or precompile a header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compile {
    /// The source file.
    pub source: NodeId,
    /// The source language (`c`, `c++`, ...).
    pub lang: String,
    /// Per-file compiler options.
    pub options: Vec<SafeStr>,
    /// Extra header search directories.
    pub includes: Vec<Path>,
    /// A precompiled header the source is compiled against.
    pub pch: Option<NodeId>,
    /// What the step produces.
    pub mode: CompileMode,
}

impl Compile {
    /// Compile `source` as `lang` with no extra options.
    #[must_use]
    pub fn new(source: NodeId, lang: impl Into<String>) -> Self {
        Self {
            source,
            lang: lang.into(),
            options: Vec::new(),
            includes: Vec::new(),
            pch: None,
            mode: CompileMode::Object,
        }
    }

    /// Whether the step precompiles a header.
    #[must_use]
    pub const fn is_precompile(&self) -> bool {
        matches!(self.mode, CompileMode::PrecompiledHeader { .. })
    }

    /// The file handed to the compiler: `pch_source` when set, otherwise
    /// the source.
    #[must_use]
    pub const fn input(&self) -> NodeId {
        match self.mode {
            CompileMode::PrecompiledHeader {
                pch_source: Some(id),
            } => id,
            _ => self.source,
        }
    }
}

/// Link object files into a binary, or archive them into a library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// The kind of output.
    pub mode: LinkMode,
    /// Object files to link.
    pub files: Vec<NodeId>,
    /// Libraries to link against.
    pub libs: Vec<NodeId>,
    /// Static libraries linked in their entirety.
    pub whole_archive: Vec<NodeId>,
    /// Linker (or archiver) options.
    pub options: Vec<SafeStr>,
    /// Library options placed after the inputs (`-lm`, ...).
    pub lib_options: Vec<SafeStr>,
    /// IDE project name; defaults to the output's base name.
    pub project_name: Option<String>,
}

/// Copy a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyFile {
    /// The file to copy.
    pub source: NodeId,
}

/// Create a symbolic link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symlink {
    /// The file the link points at.
    pub target: NodeId,
}

/// Run arbitrary commands.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Command {
    /// Commands run in order; a failure stops the sequence.
    pub commands: Vec<CommandLine>,
    /// Environment variables exported for every command.
    pub env: IndexMap<String, SafeStr>,
    /// Whether the commands need direct access to the terminal.
    pub console: bool,
}

/// Write a fixed list of lines to a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteFile {
    /// File contents, one entry per line.
    pub lines: Vec<String>,
}

/// Write a single line to a file with `echo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchoFile {
    /// The line to write.
    pub text: String,
}

/// The kind-specific payload of an edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeKind {
    /// See [`Compile`].
    Compile(Compile),
    /// See [`Link`].
    Link(Link),
    /// See [`CopyFile`].
    CopyFile(CopyFile),
    /// See [`Symlink`].
    Symlink(Symlink),
    /// See [`Command`].
    Command(Command),
    /// See [`WriteFile`].
    WriteFile(WriteFile),
    /// See [`EchoFile`].
    EchoFile(EchoFile),
    /// A phony grouping of its extra dependencies.
    Alias,
}

impl EdgeKind {
    /// A short lower-case name, used in logs and diagnostics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Compile(_) => "compile",
            Self::Link(_) => "link",
            Self::CopyFile(_) => "copy_file",
            Self::Symlink(_) => "symlink",
            Self::Command(_) => "command",
            Self::WriteFile(_) => "write_file",
            Self::EchoFile(_) => "echo_file",
            Self::Alias => "alias",
        }
    }

    /// Every node this edge reads, excluding extra dependencies.
    #[must_use]
    pub fn inputs(&self) -> Vec<NodeId> {
        match self {
            Self::Compile(c) => {
                let mut inputs = vec![c.source];
                if c.input() != c.source {
                    inputs.push(c.input());
                }
                inputs.extend(c.pch);
                inputs
            }
            Self::Link(l) => l
                .files
                .iter()
                .chain(&l.whole_archive)
                .chain(&l.libs)
                .copied()
                .collect(),
            Self::CopyFile(c) => vec![c.source],
            Self::Symlink(s) => vec![s.target],
            Self::Command(_) | Self::WriteFile(_) | Self::EchoFile(_) | Self::Alias => Vec::new(),
        }
    }
}

/// A build step.
///
/// The first output is the public one: it is what other steps, defaults and
/// IDE projects refer to. Further outputs (an import library, say) are
/// produced as side effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    /// Files produced, public output first.
    pub outputs: Vec<NodeId>,
    /// Additional prerequisites.
    pub extra_deps: Vec<NodeId>,
    /// Human-readable summary shown while building.
    pub description: Option<String>,
    /// Kind-specific details.
    pub kind: EdgeKind,
}

impl Edge {
    /// Create an edge with no extra dependencies.
    #[must_use]
    pub const fn new(kind: EdgeKind, outputs: Vec<NodeId>) -> Self {
        Self {
            outputs,
            extra_deps: Vec::new(),
            description: None,
            kind,
        }
    }

    /// Add prerequisites.
    #[must_use]
    pub fn with_extra_deps(mut self, deps: impl IntoIterator<Item = NodeId>) -> Self {
        self.extra_deps.extend(deps);
        self
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// The public output.
    #[must_use]
    pub fn output(&self) -> Option<NodeId> {
        self.outputs.first().copied()
    }
}
