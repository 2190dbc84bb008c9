//! Targets every Makefile gets: `all`, `install`, `test`, `clean`, the
//! directory sentinel rule and the regeneration rule.

use super::MAKEFILE;
use super::rules::{DIR_SENTINEL, MakeEmitter};
use super::syntax::{
    Pattern, Recipe, Rule, Section, Syntax, Writer, function, qvar, silent, var,
};
use crate::backend::{EmitError, FIND_DEPFILE, all_file_outputs, node_values, test_commands};
use crate::graph::{BuildGraph, InstallKind};
use crate::path::{Path, Root, install_path};
use crate::safe_str::{SafeStr, concat_all};
use crate::shell::{self, CommandLine};
use crate::tools::Tool;

fn phony(name: &str) -> SafeStr {
    SafeStr::text(name)
}

impl MakeEmitter<'_> {
    pub(super) fn path_variables(&mut self, graph: &BuildGraph) -> Result<(), EmitError> {
        self.makefile.variable(
            "srcdir",
            CommandLine::raw(self.env.srcdir.as_str()),
            Section::Path,
            false,
        )?;
        if graph.install().is_empty() {
            return Ok(());
        }
        for root in Root::INSTALL {
            if let Some(dir) = self.env.install_dirs.path(root)? {
                self.makefile
                    .variable(root.name(), CommandLine::raw(dir), Section::Path, false)?;
            }
        }
        Ok(())
    }

    pub(super) fn all_rule(&mut self, graph: &BuildGraph) -> Result<(), EmitError> {
        self.makefile.rule(Rule {
            targets: vec![phony("all")],
            deps: node_values(graph, &graph.default_targets())?,
            phony: true,
            ..Rule::default()
        })
    }

    pub(super) fn install_rule(&mut self, graph: &BuildGraph) -> Result<(), EmitError> {
        let install = graph.install();
        if install.is_empty() {
            return Ok(());
        }
        let install_var = self.tool_var("install")?;
        let program = self.makefile.variable(
            "INSTALL_PROGRAM",
            CommandLine::raw(install_var.reference()),
            Section::Command,
            true,
        )?;
        let data = self.makefile.variable(
            "INSTALL_DATA",
            CommandLine::Args(vec![
                install_var.reference(),
                SafeStr::text("-m"),
                SafeStr::text("644"),
            ]),
            Section::Command,
            true,
        )?;

        let mut recipe = Vec::new();
        for entry in &install.files {
            let src = graph.path_of(entry.node)?;
            let dst = install_path(src, entry.root)?;
            let cmd = match entry.kind {
                InstallKind::Program => &program,
                InstallKind::Data => &data,
            };
            recipe.push(CommandLine::Args(vec![
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
                recipe.push(CommandLine::Raw(concat_all([
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

        self.makefile.rule(Rule {
            targets: vec![phony("install")],
            deps: vec![phony("all")],
            recipe: Recipe::Lines(recipe),
            phony: true,
            ..Rule::default()
        })
    }

    pub(super) fn test_rule(&mut self, graph: &BuildGraph) -> Result<(), EmitError> {
        let tests = graph.tests();
        if tests.is_empty() {
            return Ok(());
        }
        self.makefile.rule(Rule {
            targets: vec![phony("tests")],
            deps: node_values(graph, &tests.targets)?,
            phony: true,
            ..Rule::default()
        })?;

        let vars = self.makefile.path_vars().clone();
        let collapse = |words: &[SafeStr]| -> Result<SafeStr, EmitError> {
            let mut out = Writer::new(&vars);
            out.write_each(words, Syntax::Shell, "")?;
            Ok(SafeStr::literal(shell::quote(&out.finish())))
        };
        let (commands, drivers) = test_commands(graph, &collapse)?;

        let mut deps = vec![phony("tests")];
        deps.extend(node_values(graph, &tests.extra_deps)?);
        deps.extend(node_values(graph, &drivers)?);
        self.makefile.rule(Rule {
            targets: vec![phony("test")],
            deps,
            recipe: Recipe::Lines(commands.into_iter().map(CommandLine::Args).collect()),
            phony: true,
            ..Rule::default()
        })
    }

    pub(super) fn directory_rule(&mut self) -> Result<(), EmitError> {
        if !self.sentinels {
            return Ok(());
        }
        let mkdir = self.tool_var("mkdir_p")?;
        let touch = self.tool_var("touch")?;
        let pattern = Pattern::new(&format!("%/{DIR_SENTINEL}"))?;
        let stem = Pattern::new("%")?;
        let dir = function(
            "patsubst",
            &[vec![pattern.value()], vec![stem.value()], vec![var("@")]],
            self.makefile.path_vars(),
        )?;
        self.makefile.rule(Rule {
            targets: vec![pattern.value()],
            recipe: Recipe::Lines(vec![
                silent(Tool::invoke(mkdir.reference(), [dir])),
                silent(Tool::invoke(touch.reference(), [qvar("@")])),
            ]),
            ..Rule::default()
        })
    }

    pub(super) fn clean_rule(&mut self, graph: &BuildGraph) -> Result<(), EmitError> {
        let outputs = all_file_outputs(graph)?;
        if outputs.is_empty() {
            return Ok(());
        }
        let rm = self.tool_var("rm")?;
        self.makefile.rule(Rule {
            targets: vec![phony("clean")],
            recipe: Recipe::Lines(vec![Tool::invoke(
                rm.reference(),
                outputs.into_iter().map(SafeStr::from),
            )]),
            phony: true,
            ..Rule::default()
        })
    }

    pub(super) fn regenerate_rule(
        &mut self,
        graph: &BuildGraph,
        find_deps: bool,
    ) -> Result<(), EmitError> {
        let regen = graph.regenerate();
        let mut targets = vec![SafeStr::from(Path::new(MAKEFILE, Root::BuildDir)?)];
        targets.extend(regen.outputs.iter().map(SafeStr::from));
        let deps = [&regen.description, &regen.toolchain, &regen.package_metadata]
            .into_iter()
            .flatten()
            .map(SafeStr::from)
            .collect();
        let gantry = self.tool_var("gantry")?;
        self.makefile.rule(Rule {
            targets,
            deps,
            recipe: Recipe::Lines(vec![Tool::invoke(
                gantry.reference(),
                [SafeStr::text("regenerate"), SafeStr::text(".")],
            )]),
            grouped: true,
            ..Rule::default()
        })?;
        if find_deps {
            self.makefile.include(FIND_DEPFILE, true);
        }
        Ok(())
    }
}
