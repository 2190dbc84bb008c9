//! Projects every solution gets besides the edges: `test` and the
//! regeneration project.

use super::project::{ProjectKind, Task, TaskProject};
use super::rules::MsBuildEmitter;
use super::syntax::{MsBuild, Syntax, textify_each};
use crate::backend::render::Dialect;
use crate::backend::{EmitError, test_commands};
use crate::graph::BuildGraph;
use crate::path::{Path, Root};
use crate::safe_str::SafeStr;
use crate::shell::{self, CommandLine};

impl MsBuildEmitter<'_> {
    pub(super) fn test_project(&mut self, graph: &BuildGraph) -> Result<(), EmitError> {
        let tests = graph.tests();
        if tests.is_empty() {
            return Ok(());
        }
        let vars = super::syntax::path_vars();
        let collapse = |words: &[SafeStr]| -> Result<SafeStr, EmitError> {
            let line = textify_each(&vars, words, Syntax::Command, " ")?;
            Ok(SafeStr::literal(MsBuild::quote(&line).0))
        };
        let (commands, drivers) = test_commands(graph, &collapse)?;
        let tasks = commands
            .into_iter()
            .map(|words| Task::Exec {
                command: shell::flatten(&CommandLine::Args(words)),
                env: Vec::new(),
            })
            .collect();
        let deps: Vec<_> = tests
            .targets
            .iter()
            .chain(&tests.extra_deps)
            .chain(&drivers)
            .copied()
            .collect();
        let project = TaskProject {
            tasks,
            ..TaskProject::default()
        };
        self.add_project(graph, "test", ProjectKind::Tasks(project), &deps, &[])?;
        Ok(())
    }

    pub(super) fn regenerate_project(
        &mut self,
        graph: &BuildGraph,
        solution: &str,
    ) -> Result<(), EmitError> {
        let regen = graph.regenerate();
        let mut outputs = vec![SafeStr::from(Path::new(solution, Root::BuildDir)?)];
        outputs.extend(regen.outputs.iter().map(SafeStr::from));
        let inputs = [&regen.description, &regen.toolchain, &regen.package_metadata]
            .into_iter()
            .flatten()
            .map(SafeStr::from)
            .collect();
        let command =
            self.tool_command("gantry", [SafeStr::text("regenerate"), SafeStr::text(".")])?;
        let project = TaskProject {
            inputs,
            outputs,
            directories: Vec::new(),
            tasks: vec![Task::Exec {
                command,
                env: Vec::new(),
            }],
        };
        self.add_project(graph, "regenerate", ProjectKind::Tasks(project), [], &[])?;
        Ok(())
    }

    /// Make the project building the first default target the startup
    /// project.
    pub(super) fn default_project(&mut self, graph: &BuildGraph) {
        let Some(uuid) = graph
            .default_targets()
            .into_iter()
            .find_map(|id| self.owner(id))
        else {
            return;
        };
        let name = self
            .solution
            .projects()
            .iter()
            .find(|p| p.uuid == uuid)
            .map(|p| p.name.clone());
        if let Some(default) = name {
            self.solution.set_default(&default);
        }
    }
}
