//! Make recipes for each edge kind.

use super::syntax::{Makefile, Recipe, Rule, Section, Var, call, qvar, silent, var};
use crate::backend::{
    EmitError, RuleEmitter, compile_args, file_paths, link_langs, node_value, node_values,
};
use crate::environment::Environment;
use crate::graph::{
    BuildGraph, Command, Compile, CopyFile, EchoFile, Edge, GraphError, Link, LinkMode, NodeId,
    Symlink, WriteFile,
};
use crate::path::{Path, PathError, Root};
use crate::safe_str::{SafeStr, concat};
use crate::shell::{self, CommandLine};
use crate::tools::{DepsFlavor, Tool};
use indexmap::IndexSet;

/// Marker file whose existence stands in for its directory.
pub const DIR_SENTINEL: &str = ".dir";

/// Appends the header names of a GCC depfile as empty rules so deleting a
/// header does not break the next build.
const DEPFIXER: &str = "sed -e 's/^[^:]*: *//' -e 's/ *\\\\$$//' -e '/^ *$$/d' -e 's/$$/:/' \
                        '$@.d' > '$@.d.tmp' && cat '$@.d.tmp' >> '$@.d' && rm -f '$@.d.tmp'";

/// Accumulates a [`Makefile`] while edges are emitted.
pub struct MakeEmitter<'a> {
    pub(super) env: &'a Environment,
    pub(super) makefile: Makefile,
    pub(super) sentinels: bool,
}

impl<'a> MakeEmitter<'a> {
    /// Start an empty Makefile for `env`.
    #[must_use]
    pub fn new(env: &'a Environment) -> Self {
        Self {
            env,
            makefile: Makefile::new(env.supports_destdir()),
            sentinels: false,
        }
    }

    /// The Makefile built so far.
    #[must_use]
    pub const fn makefile(&self) -> &Makefile {
        &self.makefile
    }

    /// Define (once) the variable holding a tool's command.
    pub(super) fn cmd_var(&mut self, name: &str, command: &[String]) -> Result<Var, EmitError> {
        self.makefile.variable(
            &name.to_uppercase(),
            CommandLine::args(command),
            Section::Command,
            true,
        )
    }

    pub(super) fn tool_var(&mut self, name: &str) -> Result<Var, EmitError> {
        let Tool {
            command_var,
            command,
            ..
        } = self.env.tool(name)?;
        self.cmd_var(&command_var, &command)
    }

    /// Define `GLOBAL_<NAME>` and the pattern variable `<NAME>` that
    /// defaults to it, returning both.
    fn flags_vars(&mut self, name: &str, global: Vec<SafeStr>) -> Result<(Var, Var), EmitError> {
        let upper = name.to_uppercase();
        let global_var = self.makefile.variable(
            &format!("GLOBAL_{upper}"),
            CommandLine::Args(global),
            Section::Flags,
            true,
        )?;
        let flags = self
            .makefile
            .target_variable(&upper, CommandLine::Raw(global_var.reference()), true)?;
        Ok((global_var, flags))
    }

    /// Order-only sentinels for the directories holding `outputs`.
    fn dir_sentinels(&mut self, outputs: &[Path]) -> Result<Vec<SafeStr>, EmitError> {
        let mut dirs = IndexSet::new();
        for path in outputs {
            if path.root() != Root::BuildDir {
                continue;
            }
            match path.parent() {
                Ok(dir) if !dir.suffix().is_empty() => {
                    dirs.insert(dir);
                }
                Ok(_) | Err(PathError::AtRoot) => {}
                Err(err) => return Err(err.into()),
            }
        }
        let mut sentinels = Vec::new();
        for dir in dirs {
            sentinels.push(SafeStr::from(dir.append(DIR_SENTINEL)?));
        }
        if !sentinels.is_empty() {
            self.sentinels = true;
        }
        Ok(sentinels)
    }

    fn deps(graph: &BuildGraph, inputs: &[NodeId], edge: &Edge) -> Result<Vec<SafeStr>, EmitError> {
        node_values(graph, inputs.iter().chain(&edge.extra_deps))
    }

    /// A file-producing rule with sentinels for its output directories.
    fn simple_rule(
        &mut self,
        graph: &BuildGraph,
        edge: &Edge,
        deps: Vec<SafeStr>,
        recipe: Recipe,
        variables: Vec<(Var, CommandLine)>,
    ) -> Result<(), EmitError> {
        let outputs = file_paths(graph, &edge.outputs)?;
        let order_only = self.dir_sentinels(&outputs)?;
        self.makefile.rule(Rule {
            targets: node_values(graph, &edge.outputs)?,
            deps,
            order_only,
            recipe,
            variables,
            ..Rule::default()
        })
    }

    /// A rule running `invocation` once for all of `edge`'s outputs.
    ///
    /// Several outputs hang off a `.stamp` file named after the first, which
    /// the recipe touches after running. Returns the target the recipe is
    /// attached to.
    fn stamped_rule(
        &mut self,
        graph: &BuildGraph,
        edge: &Edge,
        deps: Vec<SafeStr>,
        invocation: SafeStr,
        variables: Vec<(Var, CommandLine)>,
    ) -> Result<Path, EmitError> {
        let primary = edge.output().ok_or(GraphError::NoOutputs)?;
        let primary_path = graph.path_of(primary)?.clone();
        let outputs = file_paths(graph, &edge.outputs)?;
        let order_only = self.dir_sentinels(&outputs)?;
        if edge.outputs.len() < 2 {
            self.makefile.rule(Rule {
                targets: node_values(graph, &edge.outputs)?,
                deps,
                order_only,
                recipe: Recipe::Call(invocation),
                variables,
                ..Rule::default()
            })?;
            return Ok(primary_path);
        }

        let stamp = primary_path.add_ext(".stamp");
        self.makefile.rule(Rule {
            targets: node_values(graph, &edge.outputs)?,
            deps: vec![SafeStr::from(&stamp)],
            ..Rule::default()
        })?;
        let touch = self.tool_var("touch")?;
        self.makefile.rule(Rule {
            targets: vec![SafeStr::from(&stamp)],
            deps,
            order_only,
            recipe: Recipe::Lines(vec![
                CommandLine::raw(invocation),
                silent(Tool::invoke(touch.reference(), [qvar("@")])),
            ]),
            variables,
            ..Rule::default()
        })?;
        Ok(stamp)
    }

    /// Define the recipe `name` unless an earlier edge already did.
    fn shared_recipe(
        &mut self,
        name: &str,
        make_lines: impl FnOnce(&mut Self) -> Result<Vec<CommandLine>, EmitError>,
    ) -> Result<Var, EmitError> {
        if self.makefile.has_variable(name) {
            return Ok(Var::new(name));
        }
        let lines = make_lines(self)?;
        self.makefile.define(name, lines, false)
    }
}

impl RuleEmitter for MakeEmitter<'_> {
    fn compile(
        &mut self,
        graph: &BuildGraph,
        edge: &Edge,
        step: &Compile,
    ) -> Result<(), EmitError> {
        let compiler = self.env.compiler(&step.lang)?;
        let mut global = compiler.global_args.clone();
        global.extend(graph.global_options(&step.lang).iter().cloned());
        let (global_flags, flags) = self.flags_vars(&compiler.flags_var, global)?;
        let gcc_deps = compiler.deps_flavor == DepsFlavor::Gcc;
        let precompile = step.is_precompile();

        let rule_name = if precompile {
            format!("RULE_{}_PCH", compiler.rule_name.to_uppercase())
        } else {
            format!("RULE_{}", compiler.rule_name.to_uppercase())
        };
        let recipe = self.shared_recipe(&rule_name, |this| {
            let cmd = this.cmd_var(&compiler.command_var, &compiler.command)?;
            let depfile = gcc_deps.then(|| concat(qvar("@"), ".d"));
            let (input, output) = if precompile {
                (var("1"), var("2"))
            } else {
                (qvar("<"), qvar("@"))
            };
            let mut lines = vec![compiler.command(
                cmd.reference(),
                input,
                output,
                flags.reference(),
                depfile,
            )];
            if gcc_deps {
                lines.push(silent(CommandLine::raw(SafeStr::literal(DEPFIXER))));
            }
            Ok(lines)
        })?;

        let mut variables = Vec::new();
        let args = compile_args(graph, edge, step, &compiler)?;
        if !args.is_empty() {
            let mut value = vec![global_flags.reference()];
            value.extend(args);
            variables.push((flags, CommandLine::Args(value)));
        }

        let mut inputs = vec![step.input()];
        inputs.extend(step.pch);
        let deps = Self::deps(graph, &inputs, edge)?;
        if !precompile {
            self.simple_rule(graph, edge, deps, Recipe::Call(recipe.reference()), variables)?;
            if gcc_deps {
                for output in file_paths(graph, &edge.outputs)? {
                    self.makefile.include(output.add_ext(".d"), true);
                }
            }
            return Ok(());
        }

        // The compiler writes the object when there is one (MSVC), and the
        // precompiled header otherwise.
        let primary = edge.output().ok_or(GraphError::NoOutputs)?;
        let written = edge.outputs.get(1).copied().unwrap_or(primary);
        let invocation = call(
            &recipe,
            &[
                vec![node_value(graph, step.input())?],
                vec![node_value(graph, written)?],
            ],
            self.makefile.path_vars(),
        )?;
        let target = self.stamped_rule(graph, edge, deps, invocation, variables)?;
        if gcc_deps {
            self.makefile.include(target.add_ext(".d"), true);
        }
        Ok(())
    }

    fn link(&mut self, graph: &BuildGraph, edge: &Edge, step: &Link) -> Result<(), EmitError> {
        let lang_names = link_langs(graph, step)?;
        let langs: Vec<&str> = lang_names.iter().map(String::as_str).collect();
        let linker = self.env.linker(step.mode, &langs)?;

        let mut global = linker.global_args.clone();
        if !step.mode.is_archive() {
            global.extend(graph.global_link_options().iter().cloned());
        }
        let (global_flags, flags) = self.flags_vars(&linker.flags_var, global)?;
        let libs_vars = match &linker.libs_var {
            Some(name) => Some(self.flags_vars(name, linker.global_libs.clone())?),
            None => None,
        };

        let rule_name = format!("RULE_{}", linker.rule_name.to_uppercase());
        let recipe = self.shared_recipe(&rule_name, |this| {
            let cmd = this.cmd_var(&linker.command_var, &linker.command)?;
            Ok(vec![linker.command(
                cmd.reference(),
                var("1"),
                var("2"),
                flags.reference(),
                libs_vars.as_ref().map(|(_, libs)| libs.reference()),
            )])
        })?;

        let mut variables = Vec::new();
        let mut flag_values = linker.mode_args.clone();
        if step.mode == LinkMode::SharedLibrary
            && let Some(&import) = edge.outputs.get(1)
        {
            flag_values.extend(linker.import_lib(graph.path_of(import)?));
        }
        flag_values.extend(step.options.iter().cloned());
        if !flag_values.is_empty() {
            let mut value = vec![global_flags.reference()];
            value.extend(flag_values);
            variables.push((flags, CommandLine::Args(value)));
        }
        if let Some((global_libs, libs)) = libs_vars {
            let mut lib_values = Vec::new();
            for &lib in &step.whole_archive {
                lib_values.extend(linker.whole_archive(graph.path_of(lib)?));
            }
            lib_values.extend(node_values(graph, &step.libs)?);
            lib_values.extend(step.lib_options.iter().cloned());
            if !lib_values.is_empty() {
                let mut value = vec![global_libs.reference()];
                value.extend(lib_values);
                variables.push((libs, CommandLine::Args(value)));
            }
        }

        let primary = edge.output().ok_or(GraphError::NoOutputs)?;
        let invocation = call(
            &recipe,
            &[node_values(graph, &step.files)?, vec![node_value(graph, primary)?]],
            self.makefile.path_vars(),
        )?;

        let mut inputs = step.files.clone();
        inputs.extend(&step.whole_archive);
        inputs.extend(&step.libs);
        let deps = Self::deps(graph, &inputs, edge)?;
        self.stamped_rule(graph, edge, deps, invocation, variables)?;
        Ok(())
    }

    fn copy_file(
        &mut self,
        graph: &BuildGraph,
        edge: &Edge,
        step: &CopyFile,
    ) -> Result<(), EmitError> {
        let recipe = self.shared_recipe("RULE_CP", |this| {
            let cp = this.tool_var("cp")?;
            Ok(vec![Tool::invoke(cp.reference(), [qvar("<"), qvar("@")])])
        })?;
        let deps = Self::deps(graph, &[step.source], edge)?;
        self.simple_rule(graph, edge, deps, Recipe::Call(recipe.reference()), Vec::new())
    }

    fn symlink(
        &mut self,
        graph: &BuildGraph,
        edge: &Edge,
        step: &Symlink,
    ) -> Result<(), EmitError> {
        let recipe = self.shared_recipe("RULE_SYMLINK", |this| {
            let ln = this.tool_var("symlink")?;
            Ok(vec![Tool::invoke(ln.reference(), [var("1"), qvar("@")])])
        })?;
        let primary = edge.output().ok_or(GraphError::NoOutputs)?;
        let link_dir = graph.path_of(primary)?.parent()?;
        let target = graph.path_of(step.target)?;
        let text = match target.relpath(&link_dir, "") {
            Ok(rel) => SafeStr::text(rel),
            Err(PathError::RootMismatch { .. }) => SafeStr::from(target),
            Err(err) => return Err(err.into()),
        };
        let invocation = call(&recipe, &[vec![text]], self.makefile.path_vars())?;
        let deps = Self::deps(graph, &[step.target], edge)?;
        self.simple_rule(graph, edge, deps, Recipe::Call(invocation), Vec::new())
    }

    fn command(
        &mut self,
        graph: &BuildGraph,
        edge: &Edge,
        step: &Command,
    ) -> Result<(), EmitError> {
        let mut lines = shell::global_env(step.env.iter().map(|(k, v)| (k.as_str(), v)));
        lines.extend(step.commands.iter().cloned());
        let recipe = if lines.is_empty() {
            Recipe::None
        } else {
            Recipe::Lines(vec![shell::join_lines(&lines)])
        };
        let primary = edge.output().ok_or(GraphError::NoOutputs)?;
        let phony = graph.node(primary)?.is_phony();
        let outputs = file_paths(graph, &edge.outputs)?;
        let order_only = self.dir_sentinels(&outputs)?;
        self.makefile.rule(Rule {
            targets: node_values(graph, &edge.outputs)?,
            deps: node_values(graph, &edge.extra_deps)?,
            order_only,
            recipe,
            variables: Vec::new(),
            phony,
            ..Rule::default()
        })
    }

    fn write_file(
        &mut self,
        graph: &BuildGraph,
        edge: &Edge,
        step: &WriteFile,
    ) -> Result<(), EmitError> {
        let recipe = self.shared_recipe("RULE_PRINTF", |this| {
            let printf = this.tool_var("printf")?;
            Ok(vec![Tool::invoke(
                printf.reference(),
                [
                    SafeStr::text("%s\\n"),
                    var("1"),
                    SafeStr::shell_literal(">"),
                    qvar("@"),
                ],
            )])
        })?;
        let lines = step.lines.iter().map(SafeStr::text).collect();
        let invocation = call(&recipe, &[lines], self.makefile.path_vars())?;
        let deps = Self::deps(graph, &[], edge)?;
        self.simple_rule(graph, edge, deps, Recipe::Call(invocation), Vec::new())
    }

    fn echo_file(
        &mut self,
        graph: &BuildGraph,
        edge: &Edge,
        step: &EchoFile,
    ) -> Result<(), EmitError> {
        let recipe = self.shared_recipe("RULE_ECHO", |this| {
            let echo = this.tool_var("echo")?;
            Ok(vec![Tool::invoke(
                echo.reference(),
                [var("1"), SafeStr::shell_literal(">"), qvar("@")],
            )])
        })?;
        let invocation = call(
            &recipe,
            &[vec![SafeStr::text(&step.text)]],
            self.makefile.path_vars(),
        )?;
        let deps = Self::deps(graph, &[], edge)?;
        self.simple_rule(graph, edge, deps, Recipe::Call(invocation), Vec::new())
    }

    fn alias(&mut self, graph: &BuildGraph, edge: &Edge) -> Result<(), EmitError> {
        self.makefile.rule(Rule {
            targets: node_values(graph, &edge.outputs)?,
            deps: node_values(graph, &edge.extra_deps)?,
            phony: true,
            ..Rule::default()
        })
    }
}
