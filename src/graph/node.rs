//! Graph nodes: files, directories and phony targets.

use super::{EdgeId, NodeId};
use crate::path::{Path, Root};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a file node holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    /// A compilable source file.
    Source,
    /// A header file.
    Header,
    /// An object file produced by a compile step.
    Object,
    /// A precompiled header.
    PrecompiledHeader,
    /// A linked program.
    Executable,
    /// A shared library or loadable module.
    SharedLibrary,
    /// The import library accompanying a Windows DLL.
    ImportLibrary,
    /// A static library archive.
    StaticLibrary,
    /// Anything else.
    Generic,
}

impl FileType {
    /// The install root used when none is requested explicitly.
    #[must_use]
    pub const fn default_install_root(self) -> Root {
        match self {
            Self::Executable => Root::BinDir,
            Self::SharedLibrary | Self::ImportLibrary | Self::StaticLibrary => Root::LibDir,
            Self::Header => Root::IncludeDir,
            Self::Source | Self::Object | Self::PrecompiledHeader | Self::Generic => Root::DataDir,
        }
    }

    /// Whether installed copies should be executable.
    #[must_use]
    pub const fn install_kind(self) -> InstallKind {
        match self {
            Self::Executable | Self::SharedLibrary => InstallKind::Program,
            _ => InstallKind::Data,
        }
    }
}

/// How an installed file is copied into place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstallKind {
    /// Installed with execute permission.
    Program,
    /// Installed read-only (mode 644).
    Data,
}

/// A file or directory on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileNode {
    /// Where the file lives.
    pub path: Path,
    /// What the file contains.
    pub file_type: FileType,
    /// Source language, for sources, headers and objects.
    pub lang: Option<String>,
}

/// The payload of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// A regular file.
    File(FileNode),
    /// A directory, installed recursively.
    Directory(FileNode),
    /// A named target with no file on disk.
    Phony(String),
}

/// A vertex of the build graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// The node's payload.
    pub kind: NodeKind,
    /// The edge that produces this node, if any.
    pub creator: Option<EdgeId>,
    /// Nodes installed whenever this one is.
    pub install_deps: Vec<NodeId>,
}

impl Node {
    /// The node's path, or `None` for phony targets.
    #[must_use]
    pub const fn path(&self) -> Option<&Path> {
        match &self.kind {
            NodeKind::File(file) | NodeKind::Directory(file) => Some(&file.path),
            NodeKind::Phony(_) => None,
        }
    }

    /// The node's file details, or `None` for phony targets.
    #[must_use]
    pub const fn file(&self) -> Option<&FileNode> {
        match &self.kind {
            NodeKind::File(file) | NodeKind::Directory(file) => Some(file),
            NodeKind::Phony(_) => None,
        }
    }

    /// Whether the node is a phony target.
    #[must_use]
    pub const fn is_phony(&self) -> bool {
        matches!(self.kind, NodeKind::Phony(_))
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            NodeKind::File(file) | NodeKind::Directory(file) => write!(f, "{}", file.path),
            NodeKind::Phony(name) => f.write_str(name),
        }
    }
}
