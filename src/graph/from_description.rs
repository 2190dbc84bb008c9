//! Description-to-graph conversion.

use super::{
    BuildGraph, Command, Compile, CompileMode, CopyFile, DriverId, EchoFile, Edge, EdgeKind,
    FileType, Link, LinkMode, NodeId, Symlink, TestCase, TestDriver, WriteFile,
};
use crate::description::{
    BuildDescription, CommandDecl, DESCRIPTION_FILE, DescriptionError, EdgeDecl, FileRef, NodeRef,
    PathRef, RuleDecl, TestDecl, Word,
};
use crate::path::{Path, Root};
use crate::safe_str::SafeStr;
use crate::shell::CommandLine;
use indexmap::IndexMap;
use tracing::debug;

/// The type a node gets when its reference does not say.
#[derive(Clone, Copy)]
struct Hint<'a> {
    file_type: FileType,
    lang: Option<&'a str>,
}

impl Hint<'_> {
    const GENERIC: Self = Self {
        file_type: FileType::Generic,
        lang: None,
    };

    const fn of(file_type: FileType) -> Self {
        Self {
            file_type,
            lang: None,
        }
    }
}

const fn link_output_type(mode: LinkMode, primary: bool) -> FileType {
    match (mode, primary) {
        (LinkMode::Executable, true) => FileType::Executable,
        (LinkMode::SharedLibrary | LinkMode::LoadableModule, true) => FileType::SharedLibrary,
        (LinkMode::SharedLibrary | LinkMode::LoadableModule, false) => FileType::ImportLibrary,
        (LinkMode::StaticLibrary, true) => FileType::StaticLibrary,
        (LinkMode::Executable | LinkMode::StaticLibrary, false) => FileType::Generic,
    }
}

fn file_node(
    graph: &mut BuildGraph,
    file: &FileRef,
    hint: Hint<'_>,
) -> Result<NodeId, DescriptionError> {
    let reference = PathRef {
        path: file.path.clone(),
        root: file.root,
    };
    if file.directory {
        return Ok(graph.directory(reference.to_directory()?));
    }
    let path = reference.to_path()?;
    let lang = file.lang.as_deref().or(hint.lang);
    Ok(match file.file_type.unwrap_or(hint.file_type) {
        FileType::Source => graph.source_file(path, lang),
        other => graph.file_with_lang(path, other, lang),
    })
}

fn node(
    graph: &mut BuildGraph,
    reference: &NodeRef,
    hint: Hint<'_>,
) -> Result<NodeId, DescriptionError> {
    match reference {
        NodeRef::Name(name) => {
            let file = FileRef {
                path: name.clone(),
                root: Root::SrcDir,
                file_type: None,
                lang: None,
                directory: false,
            };
            file_node(graph, &file, hint)
        }
        NodeRef::Phony(phony) => Ok(graph.phony(&phony.phony)),
        NodeRef::File(file) => file_node(graph, file, hint),
    }
}

fn nodes(
    graph: &mut BuildGraph,
    references: &[NodeRef],
    hint: Hint<'_>,
) -> Result<Vec<NodeId>, DescriptionError> {
    references.iter().map(|r| node(graph, r, hint)).collect()
}

fn words(values: &[Word]) -> Result<Vec<SafeStr>, DescriptionError> {
    values.iter().map(Word::to_safe_str).collect()
}

fn env(values: &IndexMap<String, Word>) -> Result<IndexMap<String, SafeStr>, DescriptionError> {
    values
        .iter()
        .map(|(name, value)| Ok((name.clone(), value.to_safe_str()?)))
        .collect()
}

fn optional_path(value: Option<&PathRef>) -> Result<Option<Path>, DescriptionError> {
    value.map(PathRef::to_path).transpose()
}

/// Resolve a step's outputs and kind together: the output types depend on
/// the rule, and the rule's inputs are interned after its outputs so an
/// object referenced by a later link finds the compile's node.
fn step(graph: &mut BuildGraph, decl: &EdgeDecl) -> Result<Edge, DescriptionError> {
    let (outputs, kind) = match &decl.rule {
        RuleDecl::Compile {
            source,
            lang,
            options,
            includes,
            pch,
            precompile,
            pch_source,
        } => {
            let lang_hint = |file_type| Hint {
                file_type,
                lang: Some(lang.as_str()),
            };
            let mut outputs = Vec::with_capacity(decl.outputs.len());
            for (i, output) in decl.outputs.iter().enumerate() {
                let file_type = match (*precompile, i) {
                    (true, 0) => FileType::PrecompiledHeader,
                    _ => FileType::Object,
                };
                outputs.push(node(graph, output, lang_hint(file_type))?);
            }
            let source_type = if *precompile {
                FileType::Header
            } else {
                FileType::Source
            };
            let mode = match (*precompile, pch_source) {
                (true, pch_source) => CompileMode::PrecompiledHeader {
                    pch_source: pch_source
                        .as_ref()
                        .map(|r| node(graph, r, lang_hint(FileType::Source)))
                        .transpose()?,
                },
                (false, None) => CompileMode::Object,
                (false, Some(_)) => {
                    return Err(DescriptionError::Invalid(
                        "'pch_source' requires 'precompile'".to_owned(),
                    ));
                }
            };
            let compile = Compile {
                source: node(graph, source, lang_hint(source_type))?,
                lang: lang.clone(),
                options: words(options)?,
                includes: includes
                    .iter()
                    .map(PathRef::to_directory)
                    .collect::<Result<Vec<_>, _>>()?,
                pch: pch
                    .as_ref()
                    .map(|r| node(graph, r, lang_hint(FileType::PrecompiledHeader)))
                    .transpose()?,
                mode,
            };
            (outputs, EdgeKind::Compile(compile))
        }
        RuleDecl::Link {
            mode,
            files,
            libs,
            whole_archive,
            options,
            lib_options,
            project_name,
        } => {
            let mut outputs = Vec::with_capacity(decl.outputs.len());
            for (i, output) in decl.outputs.iter().enumerate() {
                let hint = Hint::of(link_output_type(*mode, i == 0));
                outputs.push(node(graph, output, hint)?);
            }
            let link = Link {
                mode: *mode,
                files: nodes(graph, files, Hint::of(FileType::Object))?,
                libs: nodes(graph, libs, Hint::GENERIC)?,
                whole_archive: nodes(graph, whole_archive, Hint::of(FileType::StaticLibrary))?,
                options: words(options)?,
                lib_options: words(lib_options)?,
                project_name: project_name.clone(),
            };
            (outputs, EdgeKind::Link(link))
        }
        RuleDecl::CopyFile { source } => {
            let outputs = nodes(graph, &decl.outputs, Hint::GENERIC)?;
            let copy = CopyFile {
                source: node(graph, source, Hint::GENERIC)?,
            };
            (outputs, EdgeKind::CopyFile(copy))
        }
        RuleDecl::Symlink { target } => {
            let outputs = nodes(graph, &decl.outputs, Hint::GENERIC)?;
            let link = Symlink {
                target: node(graph, target, Hint::GENERIC)?,
            };
            (outputs, EdgeKind::Symlink(link))
        }
        RuleDecl::Command {
            commands,
            env: vars,
            console,
        } => {
            let outputs = nodes(graph, &decl.outputs, Hint::GENERIC)?;
            let lines = commands
                .iter()
                .map(|command| {
                    Ok(match command {
                        CommandDecl::Raw(text) => CommandLine::raw(SafeStr::text(text)),
                        CommandDecl::Args(args) => CommandLine::Args(words(args)?),
                    })
                })
                .collect::<Result<Vec<_>, DescriptionError>>()?;
            let command = Command {
                commands: lines,
                env: env(vars)?,
                console: *console,
            };
            (outputs, EdgeKind::Command(command))
        }
        RuleDecl::WriteFile { lines } => (
            nodes(graph, &decl.outputs, Hint::GENERIC)?,
            EdgeKind::WriteFile(WriteFile {
                lines: lines.clone(),
            }),
        ),
        RuleDecl::EchoFile { text } => (
            nodes(graph, &decl.outputs, Hint::GENERIC)?,
            EdgeKind::EchoFile(EchoFile { text: text.clone() }),
        ),
        RuleDecl::Alias => (nodes(graph, &decl.outputs, Hint::GENERIC)?, EdgeKind::Alias),
    };
    let extra_deps = nodes(graph, &decl.extra_deps, Hint::GENERIC)?;
    let mut edge = Edge::new(kind, outputs).with_extra_deps(extra_deps);
    edge.description.clone_from(&decl.description);
    Ok(edge)
}

fn add_tests(
    graph: &mut BuildGraph,
    entries: &[TestDecl],
    parent: Option<DriverId>,
) -> Result<(), DescriptionError> {
    let program = Hint::of(FileType::Executable);
    for entry in entries {
        match entry {
            TestDecl::Case {
                target,
                options,
                env: vars,
            } => {
                let case = TestCase {
                    target: target.as_ref().map(|t| node(graph, t, program)).transpose()?,
                    options: words(options)?,
                    env: env(vars)?,
                };
                graph.add_test(case, parent)?;
            }
            TestDecl::Driver {
                target,
                options,
                env: vars,
                children,
            } => {
                let driver = TestDriver {
                    target: target.as_ref().map(|t| node(graph, t, program)).transpose()?,
                    options: words(options)?,
                    env: env(vars)?,
                    children: Vec::new(),
                };
                let id = graph.add_test_driver(driver, parent)?;
                add_tests(graph, children, Some(id))?;
            }
        }
    }
    Ok(())
}

impl BuildGraph {
    /// Build a graph from a front-end's description.
    ///
    /// Every step is registered through [`BuildGraph::add_edge`], so a
    /// description that violates the graph's invariants is rejected with the
    /// same errors as direct registration.
    ///
    /// # Errors
    ///
    /// Returns [`DescriptionError`] for invalid paths, an empty project name
    /// or any step the graph rejects.
    pub fn from_description(description: &BuildDescription) -> Result<Self, DescriptionError> {
        if description.project.trim().is_empty() {
            return Err(DescriptionError::Invalid(
                "the project name must not be empty".to_owned(),
            ));
        }
        let mut graph = Self::new(description.project.clone());

        for file in &description.files {
            file_node(&mut graph, file, Hint::GENERIC)?;
        }
        for decl in &description.edges {
            let edge = step(&mut graph, decl)?;
            let primary = edge.outputs.first().copied();
            graph.add_edge(edge)?;
            if let Some(id) = primary
                && !decl.install_deps.is_empty()
            {
                let deps = nodes(&mut graph, &decl.install_deps, Hint::GENERIC)?;
                graph.add_install_deps(id, deps)?;
            }
        }
        for default in &description.defaults {
            let id = node(&mut graph, default, Hint::GENERIC)?;
            graph.mark_default(id)?;
        }
        for install in &description.install {
            let id = node(&mut graph, &install.target, Hint::GENERIC)?;
            graph.add_install(id, install.root)?;
        }
        add_tests(&mut graph, &description.tests, None)?;
        let test_deps = nodes(&mut graph, &description.test_deps, Hint::GENERIC)?;
        graph.add_test_deps(test_deps)?;

        for (lang, options) in &description.global_options {
            graph.add_global_options(lang, words(options)?);
        }
        graph.add_global_link_options(words(&description.global_link_options)?);
        let find_dirs = description
            .find_dirs
            .iter()
            .map(PathRef::to_directory)
            .collect::<Result<Vec<_>, _>>()?;
        graph.add_find_dirs(find_dirs);

        let regen = &description.regenerate;
        let entry = match &regen.description {
            Some(path) => path.to_path()?,
            None => Path::new(DESCRIPTION_FILE, Root::SrcDir).map_err(|source| {
                DescriptionError::Path {
                    path: DESCRIPTION_FILE.to_owned(),
                    source,
                }
            })?,
        };
        let target = graph.regenerate_mut();
        target.description = Some(entry);
        target.toolchain = optional_path(regen.toolchain.as_ref())?;
        target.package_metadata = optional_path(regen.package_metadata.as_ref())?;
        target.outputs = regen
            .outputs
            .iter()
            .map(PathRef::to_path)
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            project = graph.project_name(),
            edges = description.edges.len(),
            "converted build description"
        );
        Ok(graph)
    }
}
