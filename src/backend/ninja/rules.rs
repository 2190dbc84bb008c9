//! Ninja rules and build statements for each edge kind.

use super::syntax::{Build, Feature, NinjaFile, PHONY, Rule, Section, Var, var};
use crate::backend::{
    EmitError, RuleEmitter, compile_args, link_langs, node_value, node_values,
};
use crate::environment::Environment;
use crate::graph::{
    BuildGraph, Command, Compile, CopyFile, EchoFile, Edge, GraphError, Link, LinkMode, Symlink,
    WriteFile,
};
use crate::path::PathError;
use crate::safe_str::{SafeStr, concat};
use crate::shell::{self, CommandLine};
use crate::tools::{DepsFlavor, Tool};
use indexmap::IndexMap;

/// A custom command to run as one build statement.
#[derive(Debug, Default)]
pub(super) struct CommandBuild {
    pub(super) outputs: Vec<SafeStr>,
    pub(super) inputs: Vec<SafeStr>,
    pub(super) commands: Vec<CommandLine>,
    pub(super) env: IndexMap<String, SafeStr>,
    pub(super) console: bool,
    pub(super) phony: bool,
    pub(super) description: Option<String>,
}

/// Accumulates a [`NinjaFile`] while edges are emitted.
pub struct NinjaEmitter<'a> {
    pub(super) env: &'a Environment,
    pub(super) file: NinjaFile,
}

impl<'a> NinjaEmitter<'a> {
    /// Start an empty file for `env`.
    #[must_use]
    pub fn new(env: &'a Environment) -> Self {
        Self {
            env,
            file: NinjaFile::new(env.supports_destdir()),
        }
    }

    /// The file built so far.
    #[must_use]
    pub const fn file(&self) -> &NinjaFile {
        &self.file
    }

    fn cmd_var(&mut self, name: &str, command: &[String]) -> Result<Var, EmitError> {
        self.file
            .variable(name, CommandLine::args(command), Section::Command, true)
    }

    pub(super) fn tool_var(&mut self, name: &str) -> Result<Var, EmitError> {
        let Tool {
            command_var,
            command,
            ..
        } = self.env.tool(name)?;
        self.cmd_var(&command_var, &command)
    }

    /// Define `global_<name>` and `<name>` (defaulting to it), returning
    /// both.
    fn flags_vars(&mut self, name: &str, global: Vec<SafeStr>) -> Result<(Var, Var), EmitError> {
        let global_var = self.file.variable(
            &format!("global_{name}"),
            CommandLine::Args(global),
            Section::Flags,
            true,
        )?;
        let flags = self.file.variable(
            name,
            CommandLine::raw(global_var.reference()),
            Section::Other,
            true,
        )?;
        Ok((global_var, flags))
    }

    /// Define the rule `name` unless an earlier edge already did.
    fn shared_rule(
        &mut self,
        name: &str,
        make_rule: impl FnOnce(&mut Self) -> Result<Rule, EmitError>,
    ) -> Result<(), EmitError> {
        if self.file.has_rule(name) {
            return Ok(());
        }
        let rule = make_rule(self)?;
        self.file.rule(name, rule)
    }

    /// Run shell commands through the generic `command` rule, or
    /// `console_command` when the commands need the terminal.
    pub(super) fn command_build(&mut self, build: CommandBuild) -> Result<(), EmitError> {
        let mut implicit = Vec::new();
        if build.phony {
            let phony = SafeStr::text("PHONY");
            if !self.file.has_build(&phony) {
                self.file.build(Build::new(PHONY, vec![phony.clone()]))?;
            }
            implicit.push(phony);
        }

        let console = build.console
            && Feature::ConsolePool.supported(self.env.backend_version.as_ref());
        let rule_name = if console { "console_command" } else { "command" };
        self.shared_rule(rule_name, |_| {
            let mut rule = Rule::new(CommandLine::raw(var("cmd")));
            if console {
                rule.pool = Some("console".to_owned());
            }
            Ok(rule)
        })?;

        let env_words = shell::local_env(build.env.iter().map(|(k, v)| (k.as_str(), v)));
        let lines: Vec<CommandLine> = build
            .commands
            .iter()
            .map(|line| {
                let mut words = env_words.clone();
                match line {
                    CommandLine::Args(args) => words.extend(args.iter().cloned()),
                    CommandLine::Raw(raw) => words.push(shell::unquoted(raw)),
                }
                CommandLine::Args(words)
            })
            .collect();

        let mut variables = vec![(Var::new("cmd"), shell::join_lines(&lines))];
        if let Some(description) = build.description {
            variables.push((Var::new("description"), CommandLine::raw(description)));
        }
        self.file.build(Build {
            outputs: build.outputs,
            rule: rule_name.to_owned(),
            inputs: build.inputs,
            implicit,
            variables,
            ..Build::default()
        })
    }

    fn describe(edge: &Edge, variables: &mut Vec<(Var, CommandLine)>) {
        if let Some(description) = &edge.description {
            variables.push((Var::new("description"), CommandLine::raw(description)));
        }
    }

    /// A statement for a single-rule edge whose extra outputs are implicit.
    fn simple_build(
        &mut self,
        graph: &BuildGraph,
        edge: &Edge,
        rule: &str,
        inputs: Vec<SafeStr>,
        mut variables: Vec<(Var, CommandLine)>,
    ) -> Result<(), EmitError> {
        let mut outputs = node_values(graph, &edge.outputs)?;
        let implicit_outputs = outputs.split_off(1.min(outputs.len()));
        Self::describe(edge, &mut variables);
        self.file.build(Build {
            outputs,
            implicit_outputs,
            rule: rule.to_owned(),
            inputs,
            implicit: node_values(graph, &edge.extra_deps)?,
            variables,
            ..Build::default()
        })
    }
}

impl RuleEmitter for NinjaEmitter<'_> {
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

        // Older Ninja still reads the depfile, it just cannot log it.
        let deps_log = Feature::Deps.supported(self.env.backend_version.as_ref());
        let gcc_deps = compiler.deps_flavor == DepsFlavor::Gcc;
        let deps = match compiler.deps_flavor {
            DepsFlavor::Gcc => Some("gcc"),
            DepsFlavor::Msvc => Some("msvc"),
            DepsFlavor::None => None,
        }
        .filter(|_| deps_log);

        let precompile = step.is_precompile();
        let rule_name = if precompile {
            format!("{}_pch", compiler.rule_name)
        } else {
            compiler.rule_name.clone()
        };
        self.shared_rule(&rule_name, |this| {
            let cmd = this.cmd_var(&compiler.command_var, &compiler.command)?;
            let depfile = gcc_deps.then(|| concat(var("out"), ".d"));
            let deps_arg = match (&depfile, deps) {
                (Some(depfile), _) => Some(depfile.clone()),
                (None, Some(_)) => Some(SafeStr::text("")),
                (None, None) => None,
            };
            let output = if precompile { var("output") } else { var("out") };
            let mut rule = Rule::new(compiler.command(
                cmd.reference(),
                var("in"),
                output,
                flags.reference(),
                deps_arg,
            ));
            rule.depfile = depfile;
            rule.deps = deps.map(str::to_owned);
            Ok(rule)
        })?;

        let mut variables = Vec::new();
        if precompile {
            let primary = edge.output().ok_or(GraphError::NoOutputs)?;
            let written = edge.outputs.get(1).copied().unwrap_or(primary);
            variables.push((
                Var::new("output"),
                CommandLine::Args(vec![node_value(graph, written)?]),
            ));
        }
        let args = compile_args(graph, edge, step, &compiler)?;
        if !args.is_empty() {
            let mut value = vec![global_flags.reference()];
            value.extend(args);
            variables.push((flags, CommandLine::Args(value)));
        }

        let inputs = vec![node_value(graph, step.input())?];
        let mut implicit = node_values(graph, &step.pch)?;
        implicit.extend(node_values(graph, &edge.extra_deps)?);
        Self::describe(edge, &mut variables);
        let mut outputs = node_values(graph, &edge.outputs)?;
        let extra = outputs.split_off(1.min(outputs.len()));
        if deps.is_none() {
            return self.file.build(Build {
                outputs,
                implicit_outputs: extra,
                rule: rule_name,
                inputs,
                implicit,
                variables,
                ..Build::default()
            });
        }

        // The deps log records one output per statement; the rest become
        // phony aliases of the first.
        let primary = outputs.first().cloned().ok_or(GraphError::NoOutputs)?;
        self.file.build(Build {
            outputs,
            rule: rule_name,
            inputs,
            implicit,
            variables,
            ..Build::default()
        })?;
        for output in extra {
            let mut alias = Build::new(PHONY, vec![output]);
            alias.inputs.push(primary.clone());
            self.file.build(alias)?;
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

        self.shared_rule(&linker.rule_name, |this| {
            let cmd = this.cmd_var(&linker.command_var, &linker.command)?;
            Ok(Rule::new(linker.command(
                cmd.reference(),
                var("in"),
                var("output"),
                flags.reference(),
                libs_vars.as_ref().map(|(_, libs)| libs.reference()),
            )))
        })?;

        let primary = edge.output().ok_or(GraphError::NoOutputs)?;
        let mut variables = vec![(
            Var::new("output"),
            CommandLine::Args(vec![node_value(graph, primary)?]),
        )];

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

        let mut implicit = node_values(graph, step.whole_archive.iter().chain(&step.libs))?;
        implicit.extend(node_values(graph, &edge.extra_deps)?);
        Self::describe(edge, &mut variables);
        self.file.build(Build {
            outputs: node_values(graph, &edge.outputs)?,
            rule: linker.rule_name.clone(),
            inputs: node_values(graph, &step.files)?,
            implicit,
            variables,
            ..Build::default()
        })
    }

    fn copy_file(
        &mut self,
        graph: &BuildGraph,
        edge: &Edge,
        step: &CopyFile,
    ) -> Result<(), EmitError> {
        self.shared_rule("cp", |this| {
            let cp = this.tool_var("cp")?;
            Ok(Rule::new(Tool::invoke(cp.reference(), [var("in"), var("out")])))
        })?;
        let inputs = vec![node_value(graph, step.source)?];
        self.simple_build(graph, edge, "cp", inputs, Vec::new())
    }

    fn symlink(
        &mut self,
        graph: &BuildGraph,
        edge: &Edge,
        step: &Symlink,
    ) -> Result<(), EmitError> {
        self.shared_rule("symlink", |this| {
            let ln = this.tool_var("symlink")?;
            Ok(Rule::new(Tool::invoke(ln.reference(), [var("target"), var("out")])))
        })?;
        let primary = edge.output().ok_or(GraphError::NoOutputs)?;
        let link_dir = graph.path_of(primary)?.parent()?;
        let target = graph.path_of(step.target)?;
        let text = match target.relpath(&link_dir, "") {
            Ok(rel) => SafeStr::text(rel),
            Err(PathError::RootMismatch { .. }) => SafeStr::from(target),
            Err(err) => return Err(err.into()),
        };
        let variables = vec![(Var::new("target"), CommandLine::Args(vec![text]))];
        let inputs = vec![node_value(graph, step.target)?];
        self.simple_build(graph, edge, "symlink", inputs, variables)
    }

    fn command(
        &mut self,
        graph: &BuildGraph,
        edge: &Edge,
        step: &Command,
    ) -> Result<(), EmitError> {
        let primary = edge.output().ok_or(GraphError::NoOutputs)?;
        self.command_build(CommandBuild {
            outputs: node_values(graph, &edge.outputs)?,
            inputs: node_values(graph, &edge.extra_deps)?,
            commands: step.commands.clone(),
            env: step.env.clone(),
            console: step.console,
            phony: graph.node(primary)?.is_phony(),
            description: edge.description.clone(),
        })
    }

    fn write_file(
        &mut self,
        graph: &BuildGraph,
        edge: &Edge,
        step: &WriteFile,
    ) -> Result<(), EmitError> {
        self.shared_rule("printf", |this| {
            let printf = this.tool_var("printf")?;
            Ok(Rule::new(Tool::invoke(
                printf.reference(),
                [
                    SafeStr::text("%s\\n"),
                    var("lines"),
                    SafeStr::shell_literal(">"),
                    var("out"),
                ],
            )))
        })?;
        let lines = step.lines.iter().map(SafeStr::text).collect();
        let variables = vec![(Var::new("lines"), CommandLine::Args(lines))];
        self.simple_build(graph, edge, "printf", Vec::new(), variables)
    }

    fn echo_file(
        &mut self,
        graph: &BuildGraph,
        edge: &Edge,
        step: &EchoFile,
    ) -> Result<(), EmitError> {
        self.shared_rule("echo_file", |this| {
            let echo = this.tool_var("echo")?;
            Ok(Rule::new(Tool::invoke(
                echo.reference(),
                [var("text"), SafeStr::shell_literal(">"), var("out")],
            )))
        })?;
        let variables = vec![(
            Var::new("text"),
            CommandLine::Args(vec![SafeStr::text(&step.text)]),
        )];
        self.simple_build(graph, edge, "echo_file", Vec::new(), variables)
    }

    fn alias(&mut self, graph: &BuildGraph, edge: &Edge) -> Result<(), EmitError> {
        let mut build = Build::new(PHONY, node_values(graph, &edge.outputs)?);
        build.inputs = node_values(graph, &edge.extra_deps)?;
        self.file.build(build)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::emit_all;
    use crate::graph::{EdgeKind, FileType, NodeId, TestCase, TestDriver};
    use crate::path::{Path, Root};
    use rstest::rstest;
    use semver::Version;

    fn path(raw: &str, root: Root) -> Path {
        Path::new(raw, root).expect("path")
    }

    fn compile(graph: &mut BuildGraph, src: &str, outputs: &[&str]) -> Vec<NodeId> {
        let source = graph.source_file(path(src, Root::SrcDir), Some("c"));
        let ids: Vec<NodeId> = outputs
            .iter()
            .map(|out| graph.file(path(out, Root::BuildDir), FileType::Object))
            .collect();
        graph
            .add_edge(Edge::new(
                EdgeKind::Compile(Compile::new(source, "c")),
                ids.clone(),
            ))
            .expect("compile");
        ids
    }

    fn environment(version: Option<(u64, u64)>) -> Environment {
        let mut env = Environment::new("/src", "/build");
        env.backend_version = version.map(|(major, minor)| Version::new(major, minor, 0));
        env
    }

    fn render(env: &Environment, graph: &BuildGraph) -> String {
        let mut emitter = NinjaEmitter::new(env);
        emit_all(&mut emitter, graph).expect("emit");
        emitter.file().write().expect("write")
    }

    #[rstest]
    fn compiles_share_one_rule() {
        let mut graph = BuildGraph::new("demo");
        compile(&mut graph, "a.c", &["a.o"]);
        compile(&mut graph, "b.c", &["b.o"]);
        let text = render(&environment(None), &graph);
        assert_eq!(text.matches("rule cc\n").count(), 1, "{text}");
        assert!(text.contains("build a.o: cc $srcdir/a.c\n"), "{text}");
        assert!(text.contains("build b.o: cc $srcdir/b.c\n"), "{text}");
    }

    #[rstest]
    fn logged_deps_alias_extra_outputs() {
        let mut graph = BuildGraph::new("demo");
        compile(&mut graph, "a.c", &["a.o", "a.extra"]);
        let text = render(&environment(None), &graph);
        assert!(text.contains("  deps = gcc\n"), "{text}");
        assert!(text.contains("build a.o: cc $srcdir/a.c\n"), "{text}");
        assert!(text.contains("build a.extra: phony a.o\n"), "{text}");
    }

    #[rstest]
    #[case((1, 2), false)]
    #[case((1, 3), true)]
    fn deps_log_needs_ninja_1_3(#[case] version: (u64, u64), #[case] logged: bool) {
        let mut graph = BuildGraph::new("demo");
        compile(&mut graph, "a.c", &["a.o", "a.extra"]);
        let text = render(&environment(Some(version)), &graph);
        assert!(text.contains("  depfile = $out.d\n"), "{text}");
        assert_eq!(text.contains("  deps = gcc\n"), logged, "{text}");
        assert_eq!(text.contains("build a.o | a.extra: cc $srcdir/a.c\n"), !logged, "{text}");
        assert_eq!(text.contains("build a.extra: phony a.o\n"), logged, "{text}");
    }

    fn driven_tests(graph: &mut BuildGraph) {
        let runner = graph.file(path("run-tests", Root::BuildDir), FileType::Executable);
        let first = graph.file(path("t1", Root::BuildDir), FileType::Executable);
        let second = graph.file(path("t2", Root::BuildDir), FileType::Executable);
        let driver = graph
            .add_test_driver(
                TestDriver {
                    target: Some(runner),
                    options: vec![SafeStr::text("--verbose")],
                    ..TestDriver::default()
                },
                None,
            )
            .expect("driver");
        for (target, options) in [(first, vec![SafeStr::text("--fast")]), (second, Vec::new())] {
            graph
                .add_test(
                    TestCase {
                        target: Some(target),
                        options,
                        ..TestCase::default()
                    },
                    Some(driver),
                )
                .expect("case");
        }
    }

    #[rstest]
    #[case((1, 4), "command")]
    #[case((1, 5), "console_command")]
    fn test_driver_runs_on_the_console(#[case] version: (u64, u64), #[case] rule: &str) {
        let mut graph = BuildGraph::new("demo");
        driven_tests(&mut graph);
        let env = environment(Some(version));
        let mut emitter = NinjaEmitter::new(&env);
        emitter.test_rule(&graph).expect("test rule");
        let text = emitter.file().write().expect("write");
        assert!(
            text.contains(&format!(
                "build test: {rule} tests run-tests | PHONY\n  \
                 cmd = run-tests --verbose 't1 --fast' t2\n"
            )),
            "{text}"
        );
        assert_eq!(text.contains("  pool = console\n"), rule == "console_command", "{text}");
    }
}
