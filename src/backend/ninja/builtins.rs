//! Statements every `build.ninja` gets: `all`, `install`, `test`, `clean`
//! and the regeneration rule.

use super::NINJAFILE;
use super::rules::{CommandBuild, NinjaEmitter};
use super::syntax::{Build, PHONY, Rule, Section, Syntax, Var, Writer};
use crate::backend::{EmitError, FIND_DEPFILE, node_values, test_commands};
use crate::graph::{BuildGraph, InstallKind};
use crate::path::{Path, Root, install_path};
use crate::safe_str::{SafeStr, concat_all};
use crate::shell::{self, CommandLine};
use crate::tools::Tool;

fn phony(name: &str) -> SafeStr {
    SafeStr::text(name)
}

impl NinjaEmitter<'_> {
    pub(super) fn path_variables(&mut self, graph: &BuildGraph) -> Result<(), EmitError> {
        self.file.variable(
            "srcdir",
            CommandLine::raw(self.env.srcdir.as_str()),
            Section::Path,
            false,
        )?;
        if let Some(description) = &graph.regenerate().description {
            self.file.variable(
                "gantryfile",
                CommandLine::Args(vec![SafeStr::from(description)]),
                Section::Path,
                false,
            )?;
        }
        if graph.install().is_empty() {
            return Ok(());
        }
        for root in Root::INSTALL {
            if let Some(dir) = self.env.install_dirs.path(root)? {
                self.file
                    .variable(root.name(), CommandLine::raw(dir), Section::Path, false)?;
            }
        }
        Ok(())
    }

    pub(super) fn all_rule(&mut self, graph: &BuildGraph) -> Result<(), EmitError> {
        let mut all = Build::new(PHONY, vec![phony("all")]);
        all.inputs = node_values(graph, &graph.default_targets())?;
        self.file.build(all)?;
        self.file.default([phony("all")]);
        Ok(())
    }

    pub(super) fn install_rule(&mut self, graph: &BuildGraph) -> Result<(), EmitError> {
        let install = graph.install();
        if install.is_empty() {
            return Ok(());
        }
        let install_var = self.tool_var("install")?;
        let program = self.file.variable(
            "install_program",
            CommandLine::raw(install_var.reference()),
            Section::Command,
            true,
        )?;
        let data = self.file.variable(
            "install_data",
            CommandLine::Args(vec![
                install_var.reference(),
                SafeStr::text("-m"),
                SafeStr::text("644"),
            ]),
            Section::Command,
            true,
        )?;

        let mut commands = Vec::new();
        for entry in &install.files {
            let src = graph.path_of(entry.node)?;
            let dst = install_path(src, entry.root)?;
            let cmd = match entry.kind {
                InstallKind::Program => &program,
                InstallKind::Data => &data,
            };
            commands.push(CommandLine::Args(vec![
                cmd.reference(),
                SafeStr::text("-D"),
                SafeStr::from(src),
                SafeStr::from(dst),
            ]));
        }
        if !install.directories.is_empty() {
            let mkdir = self.tool_var("mkdir_p")?;
            let cp = self.tool_var("cp")?;
            for entry in &install.directories {
                let src = graph.path_of(entry.node)?;
                let dst = SafeStr::from(install_path(src, entry.root)?);
                commands.push(CommandLine::Raw(concat_all([
                    mkdir.reference(),
                    SafeStr::shell_literal(" "),
                    dst.clone(),
                    SafeStr::shell_literal(" && "),
                    cp.reference(),
                    SafeStr::shell_literal(" -r "),
                    SafeStr::from(src),
                    SafeStr::shell_literal("/* "),
                    dst,
                ])));
            }
        }

        self.command_build(CommandBuild {
            outputs: vec![phony("install")],
            inputs: vec![phony("all")],
            commands,
            phony: true,
            ..CommandBuild::default()
        })
    }

    pub(super) fn test_rule(&mut self, graph: &BuildGraph) -> Result<(), EmitError> {
        let tests = graph.tests();
        if tests.is_empty() {
            return Ok(());
        }
        let mut inputs = Vec::new();
        if !tests.targets.is_empty() {
            let mut group = Build::new(PHONY, vec![phony("tests")]);
            group.inputs = node_values(graph, &tests.targets)?;
            self.file.build(group)?;
            inputs.push(phony("tests"));
        }

        let vars = self.file.path_vars().clone();
        let collapse = |words: &[SafeStr]| -> Result<SafeStr, EmitError> {
            let mut out = Writer::new(&vars);
            out.write_each(words, Syntax::Shell, "")?;
            Ok(SafeStr::literal(shell::quote(&out.finish())))
        };
        let (commands, drivers) = test_commands(graph, &collapse)?;

        inputs.extend(node_values(graph, &tests.extra_deps)?);
        inputs.extend(node_values(graph, &drivers)?);
        self.command_build(CommandBuild {
            outputs: vec![phony("test")],
            inputs,
            commands: commands.into_iter().map(CommandLine::Args).collect(),
            console: true,
            phony: true,
            ..CommandBuild::default()
        })
    }

    pub(super) fn clean_rule(&mut self) -> Result<(), EmitError> {
        let ninja = self.tool_var("ninja")?;
        self.command_build(CommandBuild {
            outputs: vec![phony("clean")],
            commands: vec![Tool::invoke(
                ninja.reference(),
                [SafeStr::text("-t"), SafeStr::text("clean")],
            )],
            phony: true,
            ..CommandBuild::default()
        })
    }

    pub(super) fn regenerate_rule(
        &mut self,
        graph: &BuildGraph,
        find_deps: bool,
    ) -> Result<(), EmitError> {
        let gantry = self.tool_var("gantry")?;
        let mut rule = Rule::new(Tool::invoke(
            gantry.reference(),
            [SafeStr::text("regenerate"), SafeStr::text(".")],
        ));
        rule.generator = true;
        if find_deps {
            rule.depfile = Some(SafeStr::text(FIND_DEPFILE));
        }
        self.file.rule("regenerate", rule)?;

        let regen = graph.regenerate();
        let mut outputs = vec![SafeStr::from(Path::new(NINJAFILE, Root::BuildDir)?)];
        outputs.extend(regen.outputs.iter().map(SafeStr::from));
        let mut implicit = Vec::new();
        if regen.description.is_some() {
            implicit.push(Var::new("gantryfile").reference());
        }
        implicit.extend(
            [&regen.toolchain, &regen.package_metadata]
                .into_iter()
                .flatten()
                .map(SafeStr::from),
        );
        self.file.build(Build {
            outputs,
            rule: "regenerate".to_owned(),
            implicit,
            ..Build::default()
        })
    }
}
