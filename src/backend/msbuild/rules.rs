//! MSBuild projects for each edge kind.
//!
//! Every edge except a compile step becomes one project. Compile steps are
//! folded into the Visual C++ project of the link that consumes their
//! object files.

use super::project::{
    ClCompile, ClOptions, PchMode, PchSettings, Project, ProjectKind, Settings, Task, TaskProject,
    VcxProject,
};
use super::solution::Solution;
use super::uuid_map::UuidMap;
use crate::backend::{EmitError, RuleEmitter, file_paths, link_langs, node_value, pch_header};
use crate::environment::Environment;
use crate::graph::{
    BuildGraph, Command, Compile, CopyFile, EchoFile, Edge, EdgeKind, GraphError, Link, LinkMode,
    NodeId, NodeKind, Symlink, WriteFile,
};
use crate::path::{Path, PathError, commonprefix};
use crate::safe_str::{SafeStr, concat};
use crate::shell::{self, CommandLine};
use crate::tools::Tool;
use indexmap::IndexMap;
use itertools::Itertools;
use uuid::Uuid;

/// Accumulates a [`Solution`] while edges are emitted.
pub struct MsBuildEmitter<'a> {
    pub(super) env: &'a Environment,
    pub(super) settings: Settings,
    pub(super) uuids: UuidMap,
    pub(super) solution: Solution,
    owners: IndexMap<NodeId, Uuid>,
}

impl<'a> MsBuildEmitter<'a> {
    /// Start an empty solution, reusing GUIDs from `uuids`.
    #[must_use]
    pub fn new(env: &'a Environment, mut uuids: UuidMap) -> Self {
        let settings = Settings::new(env.vs_version(), env.platform(), env.srcdir.as_str());
        let solution = Solution::new(uuids.get(""), settings.config());
        Self {
            env,
            settings,
            uuids,
            solution,
            owners: IndexMap::new(),
        }
    }

    /// The solution built so far.
    #[must_use]
    pub const fn solution(&self) -> &Solution {
        &self.solution
    }

    /// The project that builds `id`, if any.
    #[must_use]
    pub fn owner(&self, id: NodeId) -> Option<Uuid> {
        self.owners.get(&id).copied()
    }

    /// Collect the projects that must be built before anything reading
    /// `id`.
    ///
    /// Files nobody builds need no project; files made by a compile step
    /// depend on whatever builds that step's inputs.
    pub(super) fn dependencies(
        &self,
        graph: &BuildGraph,
        id: NodeId,
        out: &mut Vec<Uuid>,
    ) -> Result<(), EmitError> {
        let Some(creator) = graph.creator(id)? else {
            return Ok(());
        };
        if matches!(creator.kind, EdgeKind::Compile(_)) {
            for &dep in creator.kind.inputs().iter().chain(&creator.extra_deps) {
                self.dependencies(graph, dep, out)?;
            }
            return Ok(());
        }
        let Some(uuid) = self.owner(id) else {
            return Err(EmitError::UnknownDependency(graph.node(id)?.to_string()));
        };
        if !out.contains(&uuid) {
            out.push(uuid);
        }
        Ok(())
    }

    /// Add a project named `name` for `kind`, depending on the creators of
    /// `deps` and owning `outputs`.
    ///
    /// # Errors
    ///
    /// Fails if the name is taken or a dependency has no project.
    pub(super) fn add_project<'d>(
        &mut self,
        graph: &BuildGraph,
        name: &str,
        kind: ProjectKind,
        deps: impl IntoIterator<Item = &'d NodeId>,
        outputs: &[NodeId],
    ) -> Result<Uuid, EmitError> {
        if self.solution.project(name).is_some() {
            return Err(EmitError::DuplicateBuild(name.to_owned()));
        }
        let mut uuids = Vec::new();
        for &dep in deps {
            self.dependencies(graph, dep, &mut uuids)?;
        }
        let uuid = self.uuids.get(name);
        let mut project = Project::new(name, uuid, &self.settings, kind);
        for dep in uuids {
            project.depend_on(dep);
        }
        self.solution.push(project);
        for &id in outputs {
            self.owners.insert(id, uuid);
        }
        Ok(uuid)
    }

    fn task_project(
        &mut self,
        graph: &BuildGraph,
        edge: &Edge,
        inputs: &[NodeId],
        tasks: Vec<Task>,
    ) -> Result<(), EmitError> {
        let outputs = file_paths(graph, &edge.outputs)?;
        let mut directories = Vec::new();
        for path in &outputs {
            let dir = path.parent()?;
            if !dir.suffix().is_empty() {
                directories.push(SafeStr::from(dir));
            }
        }
        let project = TaskProject {
            inputs: file_paths(graph, inputs.iter().chain(&edge.extra_deps))?
                .into_iter()
                .map(SafeStr::from)
                .collect(),
            outputs: outputs.into_iter().map(SafeStr::from).collect(),
            directories: directories.into_iter().unique().collect(),
            tasks,
        };
        let name = project_name(graph, edge)?;
        self.add_project(
            graph,
            &name,
            ProjectKind::Tasks(project),
            inputs.iter().chain(&edge.extra_deps),
            &edge.outputs,
        )?;
        Ok(())
    }

    /// A helper tool's command followed by `args`, as one command line.
    pub(super) fn tool_command(
        &self,
        name: &str,
        args: impl IntoIterator<Item = SafeStr>,
    ) -> Result<SafeStr, EmitError> {
        let Tool { command, .. } = self.env.tool(name)?;
        let mut words: Vec<SafeStr> = command.into_iter().map(SafeStr::Text).collect();
        words.extend(args);
        Ok(shell::flatten(&CommandLine::Args(words)))
    }
}

/// The project name for an edge: the link's explicit name, otherwise the
/// base name of its public output (without extension for binaries).
fn project_name(graph: &BuildGraph, edge: &Edge) -> Result<String, EmitError> {
    if let EdgeKind::Link(Link {
        project_name: Some(name),
        ..
    }) = &edge.kind
    {
        return Ok(name.clone());
    }
    let primary = edge.output().ok_or(GraphError::NoOutputs)?;
    Ok(match &graph.node(primary)?.kind {
        NodeKind::Phony(name) => name.clone(),
        NodeKind::File(file) | NodeKind::Directory(file) => match edge.kind {
            EdgeKind::Link(_) => file.path.strip_ext(None).basename().to_owned(),
            _ => file.path.basename().to_owned(),
        },
    })
}

/// How the step compiling one of a project's sources takes part in
/// precompiling a header, if at all.
fn pch_settings_of(
    graph: &BuildGraph,
    edge: &Edge,
    compile: &Compile,
) -> Result<Option<PchSettings>, EmitError> {
    let (mode, header, output) = if compile.is_precompile() {
        let primary = edge.output().ok_or(GraphError::NoOutputs)?;
        (PchMode::Create, graph.path_of(compile.source)?.clone(), primary)
    } else if let Some(pch) = compile.pch {
        (PchMode::Use, pch_header(graph, pch)?, pch)
    } else {
        return Ok(None);
    };
    Ok(Some(PchSettings {
        mode,
        header: header.basename().to_owned(),
        output: node_value(graph, output)?,
    }))
}

fn object_key(path: &Path) -> String {
    path.strip_ext(None).basename().to_lowercase()
}

/// Where the object file of `source` goes when another source in the same
/// project shares its base name: its path below the sources' common
/// directory, under `$(IntDir)`.
fn object_names(sources: &[&Path]) -> Result<Vec<Option<SafeStr>>, EmitError> {
    let mut names = Vec::with_capacity(sources.len());
    for source in sources {
        let clashes: Vec<Path> = sources
            .iter()
            .filter(|other| object_key(other) == object_key(source))
            .map(|other| other.parent())
            .collect::<Result<_, _>>()?;
        if clashes.len() < 2 {
            names.push(None);
            continue;
        }
        let Some(prefix) = commonprefix(&clashes) else {
            names.push(None);
            continue;
        };
        let rel = match source.relpath(&prefix, "") {
            Ok(rel) => rel,
            Err(PathError::RootMismatch { .. }) => {
                names.push(None);
                continue;
            }
            Err(err) => return Err(err.into()),
        };
        let stem = rel.rsplit_once('.').map_or(rel.as_str(), |(head, _)| head);
        names.push(Some(concat(
            SafeStr::literal("$(IntDir)"),
            format!("{}.obj", stem.replace('/', "\\")),
        )));
    }
    Ok(names)
}

impl RuleEmitter for MsBuildEmitter<'_> {
    fn compile(&mut self, _: &BuildGraph, _: &Edge, _: &Compile) -> Result<(), EmitError> {
        Ok(())
    }

    fn link(&mut self, graph: &BuildGraph, edge: &Edge, step: &Link) -> Result<(), EmitError> {
        let lang_names = link_langs(graph, step)?;
        let langs: Vec<&str> = lang_names.iter().map(String::as_str).collect();
        let linker = self.env.linker(step.mode, &langs)?;

        let mut sources = Vec::new();
        let mut per_file = Vec::new();
        let mut pch_settings = Vec::new();
        let mut libs = Vec::new();
        for &id in &step.files {
            let Some(creator) = graph.creator(id)? else {
                libs.push(node_value(graph, id)?);
                continue;
            };
            let EdgeKind::Compile(compile) = &creator.kind else {
                libs.push(node_value(graph, id)?);
                continue;
            };
            let compiler = self.env.compiler(&compile.lang)?;
            let mut options = compiler.global_args.clone();
            options.extend(graph.global_options(&compile.lang).iter().cloned());
            options.extend(compile.options.iter().cloned());
            sources.push(graph.path_of(compile.input())?);
            per_file.push(ClOptions {
                includes: compile.includes.iter().map(SafeStr::from).collect(),
                options,
            });
            pch_settings.push(pch_settings_of(graph, creator, compile)?);
        }

        let shared = per_file.iter().all_equal_value().ok().cloned();
        let compile = shared.clone().unwrap_or_default();
        let files = sources
            .iter()
            .zip(object_names(&sources)?)
            .zip(per_file)
            .zip(pch_settings)
            .map(|(((source, object), options), pch)| ClCompile {
                source: SafeStr::from(*source),
                object,
                options: if shared.is_some() { ClOptions::default() } else { options },
                pch,
            })
            .collect();

        let mut link_options = linker.global_args.clone();
        if !step.mode.is_archive() {
            link_options.extend(graph.global_link_options().iter().cloned());
        }
        link_options.extend(step.options.iter().cloned());
        for path in file_paths(graph, &step.whole_archive)? {
            link_options.extend(linker.whole_archive(&path));
        }
        libs.extend(
            file_paths(graph, &step.libs)?
                .into_iter()
                .map(SafeStr::from),
        );
        libs.extend(step.lib_options.iter().cloned());
        libs.extend(linker.global_libs.iter().cloned());

        let primary = edge.output().ok_or(GraphError::NoOutputs)?;
        let import_lib = match (step.mode, edge.outputs.get(1)) {
            (LinkMode::SharedLibrary | LinkMode::LoadableModule, Some(&lib)) => {
                Some(node_value(graph, lib)?)
            }
            _ => None,
        };
        let project = VcxProject {
            mode: step.mode,
            output: node_value(graph, primary)?,
            import_lib,
            files,
            compile,
            link_options,
            libs,
        };
        let name = project_name(graph, edge)?;
        let deps: Vec<NodeId> = edge.kind.inputs();
        self.add_project(
            graph,
            &name,
            ProjectKind::Vcx(project),
            deps.iter().chain(&edge.extra_deps),
            &edge.outputs,
        )?;
        Ok(())
    }

    fn copy_file(
        &mut self,
        graph: &BuildGraph,
        edge: &Edge,
        step: &CopyFile,
    ) -> Result<(), EmitError> {
        let primary = edge.output().ok_or(GraphError::NoOutputs)?;
        let task = Task::Copy {
            source: node_value(graph, step.source)?,
            destination: node_value(graph, primary)?,
        };
        self.task_project(graph, edge, &[step.source], vec![task])
    }

    fn symlink(
        &mut self,
        graph: &BuildGraph,
        edge: &Edge,
        step: &Symlink,
    ) -> Result<(), EmitError> {
        let primary = edge.output().ok_or(GraphError::NoOutputs)?;
        let link_dir = graph.path_of(primary)?.parent()?;
        let target = graph.path_of(step.target)?;
        let text = match target.relpath(&link_dir, "") {
            Ok(rel) => SafeStr::text(rel),
            Err(PathError::RootMismatch { .. }) => SafeStr::from(target),
            Err(err) => return Err(err.into()),
        };
        let command = self.tool_command("symlink", [text, node_value(graph, primary)?])?;
        let task = Task::Exec {
            command,
            env: Vec::new(),
        };
        self.task_project(graph, edge, &[step.target], vec![task])
    }

    fn command(
        &mut self,
        graph: &BuildGraph,
        edge: &Edge,
        step: &Command,
    ) -> Result<(), EmitError> {
        let env: Vec<(String, SafeStr)> = step
            .env
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        let tasks = step
            .commands
            .iter()
            .map(|line| Task::Exec {
                command: shell::flatten(line),
                env: env.clone(),
            })
            .collect();
        self.task_project(graph, edge, &[], tasks)
    }

    fn write_file(
        &mut self,
        graph: &BuildGraph,
        edge: &Edge,
        step: &WriteFile,
    ) -> Result<(), EmitError> {
        let primary = edge.output().ok_or(GraphError::NoOutputs)?;
        let task = Task::WriteLines {
            file: node_value(graph, primary)?,
            lines: step.lines.clone(),
        };
        self.task_project(graph, edge, &[], vec![task])
    }

    fn echo_file(
        &mut self,
        graph: &BuildGraph,
        edge: &Edge,
        step: &EchoFile,
    ) -> Result<(), EmitError> {
        let primary = edge.output().ok_or(GraphError::NoOutputs)?;
        let task = Task::WriteLines {
            file: node_value(graph, primary)?,
            lines: vec![step.text.clone()],
        };
        self.task_project(graph, edge, &[], vec![task])
    }

    fn alias(&mut self, graph: &BuildGraph, edge: &Edge) -> Result<(), EmitError> {
        self.task_project(graph, edge, &[], Vec::new())
    }
}
