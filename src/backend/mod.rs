//! Build-file backends.
//!
//! Each backend turns a [`BuildGraph`] into the files its build tool reads.
//! Edges are dispatched through [`RuleEmitter`], which every backend
//! implements once; the built-in targets (`all`, `install`, `test`,
//! `clean` and the regeneration rule) are written by each backend's
//! `write` function around the edges.

mod error;
pub mod make;
pub mod msbuild;
pub mod ninja;
pub mod render;

pub use error::EmitError;

use crate::environment::Environment;
use crate::graph::{
    BuildGraph, Command, Compile, CopyFile, EchoFile, Edge, EdgeKind, GraphError, Link, NodeId,
    NodeKind, Symlink, TestEntry, WriteFile,
};
use crate::path::Path;
use crate::safe_str::SafeStr;
use crate::shell;
use crate::tools::Compiler;
use camino::Utf8PathBuf;
use clap::ValueEnum;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Name of the depfile listing directories scanned while configuring.
pub const FIND_DEPFILE: &str = ".gantry_find_deps";

/// The build tools gantry can generate files for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// A POSIX Makefile using GNU Make extensions.
    Make,
    /// A `build.ninja` file.
    Ninja,
    /// A Visual Studio solution with MSBuild projects.
    Msbuild,
}

impl Backend {
    /// The program that consumes the generated files.
    #[must_use]
    pub const fn tool_name(self) -> &'static str {
        match self {
            Self::Make => "make",
            Self::Ninja => "ninja",
            Self::Msbuild => "msbuild",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tool_name())
    }
}

/// A generated file, relative to the build directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    /// Where the file goes, relative to the build directory.
    pub path: Utf8PathBuf,
    /// The file's contents.
    pub contents: String,
}

impl OutputFile {
    /// Pair a build-directory-relative path with its contents.
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>, contents: String) -> Self {
        Self {
            path: path.into(),
            contents,
        }
    }
}

/// Per-backend handling of each edge kind.
pub trait RuleEmitter {
    /// Emit a compile step.
    ///
    /// # Errors
    ///
    /// Fails if the step cannot be represented in the backend.
    fn compile(&mut self, graph: &BuildGraph, edge: &Edge, step: &Compile) -> Result<(), EmitError>;

    /// Emit a link or archive step.
    ///
    /// # Errors
    ///
    /// As for [`RuleEmitter::compile`].
    fn link(&mut self, graph: &BuildGraph, edge: &Edge, step: &Link) -> Result<(), EmitError>;

    /// Emit a file copy.
    ///
    /// # Errors
    ///
    /// As for [`RuleEmitter::compile`].
    fn copy_file(
        &mut self,
        graph: &BuildGraph,
        edge: &Edge,
        step: &CopyFile,
    ) -> Result<(), EmitError>;

    /// Emit a symbolic link.
    ///
    /// # Errors
    ///
    /// As for [`RuleEmitter::compile`].
    fn symlink(&mut self, graph: &BuildGraph, edge: &Edge, step: &Symlink) -> Result<(), EmitError>;

    /// Emit a custom command.
    ///
    /// # Errors
    ///
    /// As for [`RuleEmitter::compile`].
    fn command(&mut self, graph: &BuildGraph, edge: &Edge, step: &Command) -> Result<(), EmitError>;

    /// Emit a step writing fixed lines to a file.
    ///
    /// # Errors
    ///
    /// As for [`RuleEmitter::compile`].
    fn write_file(
        &mut self,
        graph: &BuildGraph,
        edge: &Edge,
        step: &WriteFile,
    ) -> Result<(), EmitError>;

    /// Emit a step echoing one line into a file.
    ///
    /// # Errors
    ///
    /// As for [`RuleEmitter::compile`].
    fn echo_file(
        &mut self,
        graph: &BuildGraph,
        edge: &Edge,
        step: &EchoFile,
    ) -> Result<(), EmitError>;

    /// Emit a phony alias.
    ///
    /// # Errors
    ///
    /// As for [`RuleEmitter::compile`].
    fn alias(&mut self, graph: &BuildGraph, edge: &Edge) -> Result<(), EmitError>;
}

/// Dispatch `edge` to the matching [`RuleEmitter`] method.
///
/// # Errors
///
/// Propagates the emitter's error.
pub fn emit_edge<E: RuleEmitter + ?Sized>(
    emitter: &mut E,
    graph: &BuildGraph,
    edge: &Edge,
) -> Result<(), EmitError> {
    match &edge.kind {
        EdgeKind::Compile(step) => emitter.compile(graph, edge, step),
        EdgeKind::Link(step) => emitter.link(graph, edge, step),
        EdgeKind::CopyFile(step) => emitter.copy_file(graph, edge, step),
        EdgeKind::Symlink(step) => emitter.symlink(graph, edge, step),
        EdgeKind::Command(step) => emitter.command(graph, edge, step),
        EdgeKind::WriteFile(step) => emitter.write_file(graph, edge, step),
        EdgeKind::EchoFile(step) => emitter.echo_file(graph, edge, step),
        EdgeKind::Alias => emitter.alias(graph, edge),
    }
}

/// Emit every edge of `graph` in registration order.
///
/// # Errors
///
/// Stops at the first edge the emitter rejects.
pub fn emit_all<E: RuleEmitter + ?Sized>(
    emitter: &mut E,
    graph: &BuildGraph,
) -> Result<(), EmitError> {
    for (_, edge) in graph.edges() {
        emit_edge(emitter, graph, edge)?;
    }
    Ok(())
}

/// How a node is referred to in a build file: its path, or its name for
/// phony targets.
///
/// # Errors
///
/// Returns an error for foreign node identifiers.
pub fn node_value(graph: &BuildGraph, id: NodeId) -> Result<SafeStr, EmitError> {
    Ok(match &graph.node(id)?.kind {
        NodeKind::File(file) | NodeKind::Directory(file) => SafeStr::from(&file.path),
        NodeKind::Phony(name) => SafeStr::text(name),
    })
}

/// [`node_value`] for each of `ids`.
///
/// # Errors
///
/// As for [`node_value`].
pub fn node_values<'a>(
    graph: &BuildGraph,
    ids: impl IntoIterator<Item = &'a NodeId>,
) -> Result<Vec<SafeStr>, EmitError> {
    ids.into_iter().map(|&id| node_value(graph, id)).collect()
}

/// The file paths among `ids`, skipping phony targets.
///
/// # Errors
///
/// As for [`node_value`].
pub fn file_paths<'a>(
    graph: &BuildGraph,
    ids: impl IntoIterator<Item = &'a NodeId>,
) -> Result<Vec<Path>, EmitError> {
    let mut paths = Vec::new();
    for &id in ids {
        if let Some(path) = graph.node(id)?.path() {
            paths.push(path.clone());
        }
    }
    Ok(paths)
}

/// The languages of the object files a link step consumes, in first-seen
/// order.
///
/// # Errors
///
/// As for [`node_value`].
pub fn link_langs(graph: &BuildGraph, link: &Link) -> Result<Vec<String>, EmitError> {
    let mut langs: Vec<String> = Vec::new();
    for &id in &link.files {
        let lang = match graph.creator(id)?.map(|edge| &edge.kind) {
            Some(EdgeKind::Compile(compile)) => Some(compile.lang.clone()),
            _ => graph.node(id)?.file().and_then(|file| file.lang.clone()),
        };
        if let Some(lang) = lang
            && !langs.contains(&lang)
        {
            langs.push(lang);
        }
    }
    Ok(langs)
}

/// The header a precompiled header was built from: the source of the step
/// that precompiled it, or the file itself without its extension when
/// nothing in the graph builds it.
///
/// # Errors
///
/// As for [`node_value`].
pub fn pch_header(graph: &BuildGraph, pch: NodeId) -> Result<Path, EmitError> {
    if let Some(EdgeKind::Compile(creator)) = graph.creator(pch)?.map(|edge| &edge.kind) {
        return Ok(graph.path_of(creator.source)?.clone());
    }
    Ok(graph.path_of(pch)?.strip_ext(None))
}

/// The arguments a compile step adds to the global flags: include
/// directories, precompiled-header options, then the step's own options.
///
/// # Errors
///
/// As for [`node_value`].
pub fn compile_args(
    graph: &BuildGraph,
    edge: &Edge,
    step: &Compile,
    compiler: &Compiler,
) -> Result<Vec<SafeStr>, EmitError> {
    let mut args = Vec::new();
    for dir in &step.includes {
        args.extend(compiler.include_dir(dir));
    }
    if step.is_precompile() {
        let primary = edge.output().ok_or(GraphError::NoOutputs)?;
        args.extend(compiler.create_pch(
            &step.lang,
            graph.path_of(step.source)?,
            graph.path_of(primary)?,
        ));
    } else if let Some(pch) = step.pch {
        args.extend(compiler.use_pch(graph.path_of(pch)?, &pch_header(graph, pch)?));
    }
    args.extend(step.options.iter().cloned());
    Ok(args)
}

/// Collapses a child test's words into the single argument its driver
/// receives.
pub type Collapse<'a> = dyn Fn(&[SafeStr]) -> Result<SafeStr, EmitError> + 'a;

fn invocation(
    graph: &BuildGraph,
    target: Option<NodeId>,
    env: &IndexMap<String, SafeStr>,
    options: &[SafeStr],
) -> Result<Vec<SafeStr>, EmitError> {
    let mut words = shell::local_env(env.iter().map(|(k, v)| (k.as_str(), v)));
    if let Some(id) = target {
        words.push(node_value(graph, id)?);
    }
    words.extend(options.iter().cloned());
    Ok(words)
}

fn linearize(
    graph: &BuildGraph,
    entries: &[TestEntry],
    collapse: &Collapse<'_>,
    deps: &mut Vec<NodeId>,
) -> Result<Vec<Vec<SafeStr>>, EmitError> {
    let tests = graph.tests();
    let mut commands = Vec::new();
    for entry in entries {
        match *entry {
            TestEntry::Case(index) => {
                let case = tests.case(index)?;
                commands.push(invocation(graph, case.target, &case.env, &case.options)?);
            }
            TestEntry::Driver(id) => {
                let driver = tests.driver(id)?;
                deps.extend(driver.target);
                let children = linearize(graph, &driver.children, collapse, deps)?;
                let mut words = invocation(graph, driver.target, &driver.env, &driver.options)?;
                for child in &children {
                    words.push(collapse(child)?);
                }
                commands.push(words);
            }
        }
    }
    Ok(commands)
}

/// Flatten the test tree into one command per top-level entry.
///
/// A driver's children are rendered in insertion order and each passed to
/// it as one argument via `collapse`. Returns the commands and the driver
/// programs they need.
///
/// # Errors
///
/// Fails for dangling test entries or if `collapse` fails.
pub fn test_commands(
    graph: &BuildGraph,
    collapse: &Collapse<'_>,
) -> Result<(Vec<Vec<SafeStr>>, Vec<NodeId>), EmitError> {
    let mut deps = Vec::new();
    let commands = linearize(graph, &graph.tests().entries, collapse, &mut deps)?;
    Ok((commands, deps))
}

/// Every file output of every edge, for `clean`.
///
/// # Errors
///
/// As for [`node_value`].
pub fn all_file_outputs(graph: &BuildGraph) -> Result<Vec<Path>, EmitError> {
    let mut paths = Vec::new();
    for (_, edge) in graph.edges() {
        for &id in &edge.outputs {
            if let NodeKind::File(file) = &graph.node(id)?.kind {
                paths.push(file.path.clone());
            }
        }
    }
    Ok(paths)
}

/// Write the depfile naming every directory scanned while configuring.
///
/// `target` is the file the regeneration rule produces. With `stubs`, an
/// empty rule is added for each directory so Make tolerates deleting one.
///
/// # Errors
///
/// Fails if a directory cannot be resolved or contains a newline.
pub fn find_depfile(
    graph: &BuildGraph,
    env: &Environment,
    target: &str,
    stubs: bool,
) -> Result<Option<OutputFile>, EmitError> {
    use make::syntax::{Syntax, Writer};
    use render::Quoting;

    if graph.find_dirs().is_empty() {
        return Ok(None);
    }
    let bases = env.base_dirs()?;
    let mut dirs = Vec::new();
    for dir in graph.find_dirs() {
        dirs.push(SafeStr::text(dir.string(&bases)?.into_string()));
    }
    let vars = crate::path::PathVars::new();
    let mut out = Writer::new(&vars);
    out.write(&SafeStr::text(target), Syntax::Target, Quoting::Quote)?;
    out.literal(":");
    out.write_each(&dirs, Syntax::Dependency, " ")?;
    out.literal("\n");
    if stubs {
        for dir in &dirs {
            out.write(dir, Syntax::Target, Quoting::Quote)?;
            out.literal(":\n");
        }
    }
    debug!(dirs = dirs.len(), "writing find depfile");
    Ok(Some(OutputFile::new(FIND_DEPFILE, out.finish())))
}

/// Generate every file `backend` needs for `graph`.
///
/// # Errors
///
/// Fails if the graph cannot be represented in the backend.
pub fn generate(
    backend: Backend,
    graph: &BuildGraph,
    env: &Environment,
) -> Result<Vec<OutputFile>, EmitError> {
    debug!(%backend, project = graph.project_name(), "generating build files");
    match backend {
        Backend::Make => make::write(graph, env),
        Backend::Ninja => ninja::write(graph, env),
        Backend::Msbuild => msbuild::write(graph, env),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::Root;
    use rstest::rstest;

    #[rstest]
    fn find_depfile_lists_directories() {
        let mut graph = BuildGraph::new("demo");
        graph.add_find_dirs([
            Path::directory("src", Root::SrcDir).expect("path"),
            Path::directory("my dir", Root::SrcDir).expect("path"),
        ]);
        let env = Environment::new("/home/me/proj", "/home/me/proj/build");
        let file = find_depfile(&graph, &env, "Makefile", true)
            .expect("depfile")
            .expect("some directories");
        assert_eq!(file.path, Utf8PathBuf::from(FIND_DEPFILE));
        assert_eq!(
            file.contents,
            "Makefile: /home/me/proj/src /home/me/proj/my\\ dir\n\
             /home/me/proj/src:\n\
             /home/me/proj/my\\ dir:\n"
        );
    }

    #[rstest]
    fn find_depfile_is_skipped_without_scans() {
        let graph = BuildGraph::new("demo");
        let env = Environment::new("/src", "/build");
        assert!(find_depfile(&graph, &env, "build.ninja", false).expect("depfile").is_none());
    }

    #[rstest]
    fn node_values_name_phony_targets() {
        let mut graph = BuildGraph::new("demo");
        let phony = graph.phony("check");
        let file = graph.file(
            Path::new("a.o", Root::BuildDir).expect("path"),
            crate::graph::FileType::Object,
        );
        assert_eq!(
            node_values(&graph, &[phony, file]).expect("values"),
            vec![
                SafeStr::text("check"),
                SafeStr::from(Path::new("a.o", Root::BuildDir).expect("path")),
            ]
        );
    }
}
