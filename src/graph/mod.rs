//! The build graph.
//!
//! A [`BuildGraph`] owns every node and edge of a build in two arenas
//! addressed by [`NodeId`] and [`EdgeId`], plus the aggregate state that
//! backends consult when writing: default targets, the install set, the test
//! tree, global options and the inputs of the regeneration rule.
//!
//! All registration goes through [`BuildGraph::add_edge`] so the graph's
//! invariants hold no matter how it was assembled.
//!
//! # Examples
//!
//! ```
//! use gantry::graph::{BuildGraph, Compile, Edge, EdgeKind, FileType};
//! use gantry::path::{Path, Root};
//!
//! let mut graph = BuildGraph::new("hello");
//! let src = graph.source_file(Path::new("hello.c", Root::SrcDir)?, Some("c"));
//! let obj = graph.file(Path::new("hello.o", Root::BuildDir)?, FileType::Object);
//! let compile = Compile::new(src, "c");
//! graph.add_edge(Edge::new(EdgeKind::Compile(compile), vec![obj]))?;
//! assert!(graph.node(obj)?.creator.is_some());
//! # Ok::<(), gantry::graph::GraphError>(())
//! ```

mod edge;
mod error;
mod from_description;
mod node;

#[cfg(test)]
mod tests;

pub use edge::{
    Command, Compile, CompileMode, CopyFile, EchoFile, Edge, EdgeKind, Link, LinkMode, Symlink,
    WriteFile,
};
pub use error::GraphError;
pub use node::{FileNode, FileType, InstallKind, Node, NodeKind};

use crate::path::{Path, Root};
use crate::safe_str::SafeStr;
use indexmap::{IndexMap, IndexSet};
use tracing::debug;

/// Identifies a node within one [`BuildGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Identifies an edge within one [`BuildGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(usize);

/// Identifies a test driver within one [`BuildGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DriverId(usize);

/// A reference to an extra dependency.
///
/// Names and paths that are not already nodes are resolved against the
/// source directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepRef {
    /// An existing node.
    Node(NodeId),
    /// A path relative to the source directory.
    Name(String),
    /// An explicit path.
    Path(Path),
}

impl From<NodeId> for DepRef {
    fn from(id: NodeId) -> Self {
        Self::Node(id)
    }
}

impl From<&str> for DepRef {
    fn from(name: &str) -> Self {
        Self::Name(name.to_owned())
    }
}

impl From<Path> for DepRef {
    fn from(path: Path) -> Self {
        Self::Path(path)
    }
}

/// An installed file or directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallEntry {
    /// The node to install.
    pub node: NodeId,
    /// The install root it is copied into.
    pub root: Root,
    /// How it is copied.
    pub kind: InstallKind,
}

/// The set of things `install` copies into place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallSet {
    /// Installed files, in registration order.
    pub files: Vec<InstallEntry>,
    /// Installed directories, in registration order.
    pub directories: Vec<InstallEntry>,
}

impl InstallSet {
    /// Whether nothing is installed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.directories.is_empty()
    }
}

/// A single test program invocation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TestCase {
    /// The program (or script) to run.
    pub target: Option<NodeId>,
    /// Arguments passed to it.
    pub options: Vec<SafeStr>,
    /// Environment variables set for this invocation only.
    pub env: IndexMap<String, SafeStr>,
}

/// A program that runs other tests, receiving each as one argument.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TestDriver {
    /// The driver program.
    pub target: Option<NodeId>,
    /// Arguments passed before the child tests.
    pub options: Vec<SafeStr>,
    /// Environment variables set for the driver.
    pub env: IndexMap<String, SafeStr>,
    /// Children in insertion order.
    pub children: Vec<TestEntry>,
}

/// An entry in the test tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestEntry {
    /// Index into [`TestSet::cases`].
    Case(usize),
    /// A nested driver.
    Driver(DriverId),
}

/// Everything `test` runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestSet {
    /// Top-level entries in insertion order.
    pub entries: Vec<TestEntry>,
    /// Every test case.
    pub cases: Vec<TestCase>,
    /// Every driver.
    pub drivers: Vec<TestDriver>,
    /// Programs built by the `tests` target.
    pub targets: IndexSet<NodeId>,
    /// Extra prerequisites of `test`.
    pub extra_deps: Vec<NodeId>,
}

impl TestSet {
    /// Whether no tests were declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up a driver.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownNode`] for a foreign identifier.
    pub fn driver(&self, id: DriverId) -> Result<&TestDriver, GraphError> {
        self.drivers.get(id.0).ok_or(GraphError::UnknownNode(id.0))
    }

    /// Look up a test case.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownNode`] for an out-of-range index.
    pub fn case(&self, index: usize) -> Result<&TestCase, GraphError> {
        self.cases.get(index).ok_or(GraphError::UnknownNode(index))
    }
}

/// Inputs and outputs of the rule that re-runs the generator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Regenerate {
    /// The build description the front-end evaluated.
    pub description: Option<Path>,
    /// The toolchain file, if one was used.
    pub toolchain: Option<Path>,
    /// Package metadata consulted during configuration.
    pub package_metadata: Option<Path>,
    /// Additional files the generator writes.
    pub outputs: Vec<Path>,
}

/// The complete description of a build.
#[derive(Debug, Clone, Default)]
pub struct BuildGraph {
    project: String,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    files: IndexMap<Path, NodeId>,
    phonies: IndexMap<String, NodeId>,
    explicit_defaults: IndexSet<NodeId>,
    fallback_default: Option<NodeId>,
    install: InstallSet,
    tests: TestSet,
    global_options: IndexMap<String, Vec<SafeStr>>,
    global_link_options: Vec<SafeStr>,
    find_dirs: IndexSet<Path>,
    regenerate: Regenerate,
}

impl BuildGraph {
    /// Create an empty graph for the named project.
    #[must_use]
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            ..Self::default()
        }
    }

    /// The project name.
    #[must_use]
    pub fn project_name(&self) -> &str {
        &self.project
    }

    fn intern_file(&mut self, kind: NodeKind, path: Path) -> NodeId {
        if let Some(&id) = self.files.get(&path) {
            return id;
        }
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind,
            creator: None,
            install_deps: Vec::new(),
        });
        self.files.insert(path, id);
        id
    }

    /// Intern a source file. Files with the same path share one node.
    pub fn source_file(&mut self, path: Path, lang: Option<&str>) -> NodeId {
        let node = FileNode {
            path: path.clone(),
            file_type: FileType::Source,
            lang: lang.map(str::to_owned),
        };
        self.intern_file(NodeKind::File(node), path)
    }

    /// Intern a file of the given type.
    pub fn file(&mut self, path: Path, file_type: FileType) -> NodeId {
        self.file_with_lang(path, file_type, None)
    }

    /// Intern a file of the given type and language.
    pub fn file_with_lang(
        &mut self,
        path: Path,
        file_type: FileType,
        lang: Option<&str>,
    ) -> NodeId {
        let node = FileNode {
            path: path.clone(),
            file_type,
            lang: lang.map(str::to_owned),
        };
        self.intern_file(NodeKind::File(node), path)
    }

    /// Intern a directory.
    pub fn directory(&mut self, path: Path) -> NodeId {
        let dir = path.as_directory();
        let node = FileNode {
            path: dir.clone(),
            file_type: FileType::Generic,
            lang: None,
        };
        self.intern_file(NodeKind::Directory(node), dir)
    }

    /// Intern a phony target.
    pub fn phony(&mut self, name: &str) -> NodeId {
        if let Some(&id) = self.phonies.get(name) {
            return id;
        }
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind: NodeKind::Phony(name.to_owned()),
            creator: None,
            install_deps: Vec::new(),
        });
        self.phonies.insert(name.to_owned(), id);
        id
    }

    /// Resolve an extra dependency to a node.
    ///
    /// Bare names and paths always become files rooted at the source
    /// directory; build artefacts must be passed as nodes.
    ///
    /// # Errors
    ///
    /// Fails if a name is not a valid path or a node is foreign.
    pub fn extra_dep(&mut self, dep: impl Into<DepRef>) -> Result<NodeId, GraphError> {
        match dep.into() {
            DepRef::Node(id) => {
                self.node(id)?;
                Ok(id)
            }
            DepRef::Name(name) => {
                let path = Path::new(&name, Root::SrcDir)?;
                Ok(self.file(path, FileType::Generic))
            }
            DepRef::Path(path) => {
                let source = if path.root() == Root::BuildDir {
                    path.reroot(Root::SrcDir)
                } else {
                    path
                };
                Ok(self.file(source, FileType::Generic))
            }
        }
    }

    /// Look up a node.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownNode`] if `id` is not from this graph.
    pub fn node(&self, id: NodeId) -> Result<&Node, GraphError> {
        self.nodes.get(id.0).ok_or(GraphError::UnknownNode(id.0))
    }

    /// Look up the path of a file or directory node.
    ///
    /// # Errors
    ///
    /// Fails for foreign or phony nodes.
    pub fn path_of(&self, id: NodeId) -> Result<&Path, GraphError> {
        let node = self.node(id)?;
        node.path().ok_or_else(|| GraphError::WrongNodeKind {
            node: node.to_string(),
            expected: "a file",
        })
    }

    /// Look up an edge.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownNode`] if `id` is not from this graph.
    pub fn edge(&self, id: EdgeId) -> Result<&Edge, GraphError> {
        self.edges.get(id.0).ok_or(GraphError::UnknownNode(id.0))
    }

    /// The edge that creates `id`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownNode`] for foreign identifiers.
    pub fn creator(&self, id: NodeId) -> Result<Option<&Edge>, GraphError> {
        match self.node(id)?.creator {
            Some(edge) => self.edge(edge).map(Some),
            None => Ok(None),
        }
    }

    /// All edges in registration order.
    pub fn edges(&self) -> impl Iterator<Item = (EdgeId, &Edge)> {
        self.edges.iter().enumerate().map(|(i, e)| (EdgeId(i), e))
    }

    fn check_node(&self, id: NodeId) -> Result<(), GraphError> {
        self.node(id).map(|_| ())
    }

    fn describe(&self, id: Option<NodeId>) -> String {
        id.and_then(|i| self.nodes.get(i.0))
            .map_or_else(|| "<unknown>".to_owned(), ToString::to_string)
    }

    fn validate_compile(&self, compile: &Compile, first: NodeId) -> Result<(), GraphError> {
        for id in [compile.source, compile.input()] {
            if self.node(id)?.is_phony() {
                return Err(GraphError::WrongNodeKind {
                    node: self.describe(Some(id)),
                    expected: "a source file",
                });
            }
        }
        let Some(pch) = compile.pch else {
            return Ok(());
        };
        if compile.is_precompile() {
            return Err(GraphError::IncompatibleOptions {
                output: self.describe(Some(first)),
                reason: "a precompiled header cannot itself use one".to_owned(),
            });
        }
        let made_by_precompile = match self.creator(pch)?.map(|edge| &edge.kind) {
            Some(EdgeKind::Compile(creator)) => creator.is_precompile(),
            Some(_) => false,
            None => !self.node(pch)?.is_phony(),
        };
        if made_by_precompile {
            Ok(())
        } else {
            Err(GraphError::WrongNodeKind {
                node: self.describe(Some(pch)),
                expected: "a precompiled header",
            })
        }
    }

    fn validate(&self, edge: &Edge) -> Result<(), GraphError> {
        let first = edge.output().ok_or(GraphError::NoOutputs)?;
        for &id in edge
            .outputs
            .iter()
            .chain(&edge.extra_deps)
            .chain(&edge.kind.inputs())
        {
            self.check_node(id)?;
        }
        let mut seen = IndexSet::new();
        for &id in &edge.outputs {
            if !seen.insert(id) || self.node(id)?.creator.is_some() {
                return Err(GraphError::DuplicateOutput {
                    output: self.describe(Some(id)),
                });
            }
        }
        match &edge.kind {
            EdgeKind::Link(link) => {
                if link.files.is_empty() && link.whole_archive.is_empty() {
                    return Err(GraphError::MissingInputs {
                        output: self.describe(Some(first)),
                    });
                }
                if link.mode.is_archive() && !link.lib_options.is_empty() {
                    return Err(GraphError::IncompatibleOptions {
                        output: self.describe(Some(first)),
                        reason: "link options are not valid for static libraries".to_owned(),
                    });
                }
            }
            EdgeKind::Compile(compile) => self.validate_compile(compile, first)?,
            EdgeKind::Alias => {
                if !self.node(first)?.is_phony() {
                    return Err(GraphError::WrongNodeKind {
                        node: self.describe(Some(first)),
                        expected: "a phony target",
                    });
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Register a build step.
    ///
    /// # Errors
    ///
    /// Fails if an output already has a creator, if the step has no outputs
    /// or (for link steps) no inputs, if options are incompatible with the
    /// step, or if any node is foreign.
    pub fn add_edge(&mut self, edge: Edge) -> Result<EdgeId, GraphError> {
        self.validate(&edge)?;
        let id = EdgeId(self.edges.len());
        for &out in &edge.outputs {
            if let Some(node) = self.nodes.get_mut(out.0) {
                node.creator = Some(id);
            }
        }
        if matches!(edge.kind, EdgeKind::Link(_)) {
            self.fallback_default = edge.output();
        }
        debug!(kind = edge.kind.name(), output = %self.describe(edge.output()), "added edge");
        self.edges.push(edge);
        Ok(id)
    }

    /// Mark a node as built by default.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownNode`] for foreign identifiers.
    pub fn mark_default(&mut self, id: NodeId) -> Result<(), GraphError> {
        self.check_node(id)?;
        self.explicit_defaults.insert(id);
        Ok(())
    }

    /// The targets built by default.
    ///
    /// Explicitly marked defaults win outright; otherwise the most recently
    /// linked binary is the sole default.
    #[must_use]
    pub fn default_targets(&self) -> Vec<NodeId> {
        if self.explicit_defaults.is_empty() {
            self.fallback_default.into_iter().collect()
        } else {
            self.explicit_defaults.iter().copied().collect()
        }
    }

    /// Install a file or directory, along with its install dependencies.
    ///
    /// The install root defaults to one appropriate for the file type; an
    /// explicit root applies to the node itself, while its dependencies use
    /// their own defaults.
    ///
    /// # Errors
    ///
    /// Fails for phony or foreign nodes.
    pub fn add_install(&mut self, id: NodeId, root: Option<Root>) -> Result<(), GraphError> {
        let node = self.node(id)?;
        let (file, is_dir) = match &node.kind {
            NodeKind::File(file) => (file, false),
            NodeKind::Directory(file) => (file, true),
            NodeKind::Phony(_) => {
                return Err(GraphError::WrongNodeKind {
                    node: node.to_string(),
                    expected: "a file or directory",
                });
            }
        };
        let entry = InstallEntry {
            node: id,
            root: root.unwrap_or_else(|| file.file_type.default_install_root()),
            kind: file.file_type.install_kind(),
        };
        let deps = node.install_deps.clone();
        let list = if is_dir {
            &mut self.install.directories
        } else {
            &mut self.install.files
        };
        if list.iter().any(|e| e.node == id) {
            return Ok(());
        }
        list.push(entry);
        for dep in deps {
            self.add_install(dep, None)?;
        }
        Ok(())
    }

    /// Record files that must be installed whenever `id` is, such as the
    /// real library behind a versioned symlink.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownNode`] for foreign identifiers.
    pub fn add_install_deps(
        &mut self,
        id: NodeId,
        deps: impl IntoIterator<Item = NodeId>,
    ) -> Result<(), GraphError> {
        let mut checked = Vec::new();
        for dep in deps {
            self.check_node(dep)?;
            checked.push(dep);
        }
        let node = self.nodes.get_mut(id.0).ok_or(GraphError::UnknownNode(id.0))?;
        for dep in checked {
            if dep != id && !node.install_deps.contains(&dep) {
                node.install_deps.push(dep);
            }
        }
        Ok(())
    }

    /// Everything `install` copies.
    #[must_use]
    pub const fn install(&self) -> &InstallSet {
        &self.install
    }

    fn attach_test(
        &mut self,
        entry: TestEntry,
        parent: Option<DriverId>,
    ) -> Result<(), GraphError> {
        match parent {
            None => self.tests.entries.push(entry),
            Some(DriverId(i)) => self
                .tests
                .drivers
                .get_mut(i)
                .ok_or(GraphError::UnknownNode(i))?
                .children
                .push(entry),
        }
        Ok(())
    }

    fn register_test_target(&mut self, target: Option<NodeId>) -> Result<(), GraphError> {
        if let Some(id) = target {
            self.check_node(id)?;
            self.tests.targets.insert(id);
            self.explicit_defaults.shift_remove(&id);
            if self.fallback_default == Some(id) {
                self.fallback_default = None;
            }
        }
        Ok(())
    }

    /// Declare a test, optionally run by a driver.
    ///
    /// Test programs are built by `tests` rather than by default.
    ///
    /// # Errors
    ///
    /// Fails if a test under a driver sets its own environment, or for
    /// foreign identifiers.
    pub fn add_test(&mut self, case: TestCase, driver: Option<DriverId>) -> Result<(), GraphError> {
        if driver.is_some() && !case.env.is_empty() {
            return Err(GraphError::InvalidTest(
                "tests run by a driver cannot set an environment".to_owned(),
            ));
        }
        if let Some(d) = driver {
            self.tests.driver(d)?;
        }
        self.register_test_target(case.target)?;
        let index = self.tests.cases.len();
        self.tests.cases.push(case);
        self.attach_test(TestEntry::Case(index), driver)
    }

    /// Declare a test driver, optionally nested in another driver.
    ///
    /// # Errors
    ///
    /// Fails if a nested driver sets its own environment, or for foreign
    /// identifiers.
    pub fn add_test_driver(
        &mut self,
        driver: TestDriver,
        parent: Option<DriverId>,
    ) -> Result<DriverId, GraphError> {
        if parent.is_some() && !driver.env.is_empty() {
            return Err(GraphError::InvalidTest(
                "nested drivers cannot set an environment".to_owned(),
            ));
        }
        if let Some(p) = parent {
            self.tests.driver(p)?;
        }
        if let Some(target) = driver.target {
            self.check_node(target)?;
        }
        let id = DriverId(self.tests.drivers.len());
        self.tests.drivers.push(driver);
        self.attach_test(TestEntry::Driver(id), parent)?;
        Ok(id)
    }

    /// Add prerequisites to `test`.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownNode`] for foreign identifiers.
    pub fn add_test_deps(
        &mut self,
        deps: impl IntoIterator<Item = NodeId>,
    ) -> Result<(), GraphError> {
        for id in deps {
            self.check_node(id)?;
            self.tests.extra_deps.push(id);
        }
        Ok(())
    }

    /// The test tree.
    #[must_use]
    pub const fn tests(&self) -> &TestSet {
        &self.tests
    }

    /// Append compiler options applied to every source of `lang`.
    pub fn add_global_options(&mut self, lang: &str, options: impl IntoIterator<Item = SafeStr>) {
        self.global_options
            .entry(lang.to_owned())
            .or_default()
            .extend(options);
    }

    /// Compiler options applied to every source of `lang`.
    #[must_use]
    pub fn global_options(&self, lang: &str) -> &[SafeStr] {
        self.global_options.get(lang).map_or(&[], Vec::as_slice)
    }

    /// Append options applied to every link step.
    pub fn add_global_link_options(&mut self, options: impl IntoIterator<Item = SafeStr>) {
        self.global_link_options.extend(options);
    }

    /// Options applied to every link step.
    #[must_use]
    pub fn global_link_options(&self) -> &[SafeStr] {
        &self.global_link_options
    }

    /// Record directories whose contents were scanned while configuring.
    pub fn add_find_dirs(&mut self, dirs: impl IntoIterator<Item = Path>) {
        self.find_dirs.extend(dirs);
    }

    /// Scanned directories in first-seen order.
    #[must_use]
    pub const fn find_dirs(&self) -> &IndexSet<Path> {
        &self.find_dirs
    }

    /// The regeneration rule's inputs and extra outputs.
    #[must_use]
    pub const fn regenerate(&self) -> &Regenerate {
        &self.regenerate
    }

    /// Mutable access to the regeneration inputs.
    pub const fn regenerate_mut(&mut self) -> &mut Regenerate {
        &mut self.regenerate
    }
}
