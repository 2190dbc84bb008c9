//! The `build.ninja` document model and its escaping rules.

use crate::backend::EmitError;
use crate::backend::render::{Dialect, Renderer, SECTIONS};
pub use crate::backend::render::{Quoting, Section};
use crate::path::{PathVars, Root};
use crate::safe_str::SafeStr;
use crate::shell::CommandLine;
use indexmap::{IndexMap, IndexSet};
use semver::Version;

/// Where in a Ninja file a value is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syntax {
    /// An output of a build statement.
    Output,
    /// An input of a build statement or a `default` target.
    Input,
    /// A variable value that is not a command.
    Variable,
    /// A command, shell-quoted as needed.
    Shell,
}

/// Ninja's escaping rules.
pub struct Ninja;

fn escape_with_dollar(text: &str, special: impl Fn(char) -> bool) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if special(c) {
            out.push('$');
        }
        out.push(c);
    }
    out
}

impl Dialect for Ninja {
    type Syntax = Syntax;

    fn escape(text: &str, syntax: Syntax) -> String {
        match syntax {
            Syntax::Output => escape_with_dollar(text, |c| matches!(c, '$' | ':' | ' ')),
            Syntax::Input => escape_with_dollar(text, |c| matches!(c, '$' | ' ')),
            Syntax::Variable | Syntax::Shell => text.replace('$', "$$"),
        }
    }

    fn is_shell(syntax: Syntax) -> bool {
        syntax == Syntax::Shell
    }
}

/// A renderer producing Ninja text.
pub type Writer<'a> = Renderer<'a, Ninja>;

/// How roots are spelled in a Ninja file.
///
/// Ninja has no `DESTDIR` convention of its own, so installed paths read it
/// from the shell environment.
#[must_use]
pub fn path_vars(destdir: bool) -> PathVars {
    let mut vars = PathVars::new().with_root(Root::SrcDir, Var::new("srcdir").reference());
    for root in Root::INSTALL {
        vars = vars.with_root(root, Var::new(root.name()).reference());
    }
    if destdir {
        vars = vars.with_destdir(SafeStr::literal("$${DESTDIR}"));
    }
    vars
}

/// A Ninja variable name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Var(String);

impl Var {
    /// Name a variable; characters other than letters, digits and `_`
    /// become `_`.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self(
            name.chars()
                .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
                .collect(),
        )
    }

    /// The sanitised name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }

    /// A reference to the variable (`$name`).
    #[must_use]
    pub fn reference(&self) -> SafeStr {
        SafeStr::literal(format!("${}", self.0))
    }
}

/// Shorthand for a reference to `name`, e.g. `var("in")`.
#[must_use]
pub fn var(name: &str) -> SafeStr {
    Var::new(name).reference()
}

/// Capabilities that need a minimum Ninja version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    /// `deps = gcc|msvc` header tracking.
    Deps,
    /// The built-in `console` pool.
    ConsolePool,
}

impl Feature {
    /// The first Ninja release supporting this feature.
    #[must_use]
    pub const fn min_version(self) -> Version {
        match self {
            Self::Deps => Version::new(1, 3, 0),
            Self::ConsolePool => Version::new(1, 5, 0),
        }
    }

    /// Whether `version` supports this feature. An unknown version is
    /// assumed to be recent.
    #[must_use]
    pub fn supported(self, version: Option<&Version>) -> bool {
        version.is_none_or(|v| *v >= self.min_version())
    }
}

/// A `rule` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    /// The command to run.
    pub command: CommandLine,
    /// Text shown while the rule runs.
    pub description: Option<SafeStr>,
    /// Where the command writes a Make-style depfile.
    pub depfile: Option<SafeStr>,
    /// Header dependency style (`gcc` or `msvc`).
    pub deps: Option<String>,
    /// Whether the rule re-runs the generator.
    pub generator: bool,
    /// The pool the rule runs in.
    pub pool: Option<String>,
    /// Whether to re-stat outputs after running.
    pub restat: bool,
}

impl Rule {
    /// A rule running `command` with no other settings.
    #[must_use]
    pub const fn new(command: CommandLine) -> Self {
        Self {
            command,
            description: None,
            depfile: None,
            deps: None,
            generator: false,
            pool: None,
            restat: false,
        }
    }
}

/// The name of Ninja's built-in phony rule.
pub const PHONY: &str = "phony";

/// A `build` statement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Build {
    /// Explicit outputs.
    pub outputs: Vec<SafeStr>,
    /// Outputs produced as side effects.
    pub implicit_outputs: Vec<SafeStr>,
    /// The rule to run.
    pub rule: String,
    /// Explicit inputs (`$in`).
    pub inputs: Vec<SafeStr>,
    /// Inputs that trigger a rebuild but are not passed to the command.
    pub implicit: Vec<SafeStr>,
    /// Inputs that must exist first but never trigger a rebuild.
    pub order_only: Vec<SafeStr>,
    /// Statement-scoped variables.
    pub variables: Vec<(Var, CommandLine)>,
}

impl Build {
    /// A statement producing `outputs` with `rule`.
    #[must_use]
    pub fn new(rule: &str, outputs: Vec<SafeStr>) -> Self {
        Self {
            outputs,
            rule: rule.to_owned(),
            ..Self::default()
        }
    }
}

/// An in-memory `build.ninja`.
#[derive(Debug, Clone)]
pub struct NinjaFile {
    vars: PathVars,
    variables: IndexMap<Var, (Section, CommandLine)>,
    rules: IndexMap<String, Rule>,
    builds: Vec<Build>,
    outputs: IndexSet<SafeStr>,
    defaults: Vec<SafeStr>,
    required: Option<Version>,
}

impl NinjaFile {
    /// An empty file; `destdir` enables `$DESTDIR` on install paths.
    #[must_use]
    pub fn new(destdir: bool) -> Self {
        Self {
            vars: path_vars(destdir),
            variables: IndexMap::new(),
            rules: IndexMap::new(),
            builds: Vec::new(),
            outputs: IndexSet::new(),
            defaults: Vec::new(),
            required: None,
        }
    }

    /// The root spellings used by this file.
    #[must_use]
    pub const fn path_vars(&self) -> &PathVars {
        &self.vars
    }

    /// Record that the file uses `feature`.
    pub fn require(&mut self, feature: Feature) {
        let version = feature.min_version();
        if self.required.as_ref().is_none_or(|v| *v < version) {
            self.required = Some(version);
        }
    }

    /// The minimum Ninja version the file needs, if any feature demands one.
    #[must_use]
    pub const fn required_version(&self) -> Option<&Version> {
        self.required.as_ref()
    }

    /// Whether a global variable named `name` exists.
    #[must_use]
    pub fn has_variable(&self, name: &str) -> bool {
        self.variables.contains_key(&Var::new(name))
    }

    /// Define a global variable.
    ///
    /// # Errors
    ///
    /// Returns [`EmitError::DuplicateVariable`] if the name is taken and
    /// `exist_ok` is false.
    pub fn variable(
        &mut self,
        name: &str,
        value: CommandLine,
        section: Section,
        exist_ok: bool,
    ) -> Result<Var, EmitError> {
        let var = Var::new(name);
        if self.variables.contains_key(&var) {
            if exist_ok {
                return Ok(var);
            }
            return Err(EmitError::DuplicateVariable(var.0));
        }
        self.variables.insert(var.clone(), (section, value));
        Ok(var)
    }

    /// Whether a rule named `name` exists.
    #[must_use]
    pub fn has_rule(&self, name: &str) -> bool {
        self.rules.contains_key(name)
    }

    /// Define a rule.
    ///
    /// # Errors
    ///
    /// Returns [`EmitError::InvalidRuleName`] for names with characters
    /// other than letters, digits and `_`, and [`EmitError::DuplicateRule`]
    /// if the name is taken.
    pub fn rule(&mut self, name: &str, rule: Rule) -> Result<(), EmitError> {
        if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
            return Err(EmitError::InvalidRuleName(name.to_owned()));
        }
        if self.has_rule(name) {
            return Err(EmitError::DuplicateRule(name.to_owned()));
        }
        if rule.deps.is_some() {
            self.require(Feature::Deps);
        }
        if rule.pool.as_deref() == Some("console") {
            self.require(Feature::ConsolePool);
        }
        self.rules.insert(name.to_owned(), rule);
        Ok(())
    }

    /// Whether some statement already builds `output`.
    #[must_use]
    pub fn has_build(&self, output: &SafeStr) -> bool {
        self.outputs.contains(output)
    }

    /// Add a build statement.
    ///
    /// # Errors
    ///
    /// Returns [`EmitError::UnknownRule`] if the rule is neither `phony`
    /// nor defined, and [`EmitError::DuplicateBuild`] if an output is
    /// already built.
    pub fn build(&mut self, build: Build) -> Result<(), EmitError> {
        if build.rule != PHONY && !self.has_rule(&build.rule) {
            return Err(EmitError::UnknownRule(build.rule));
        }
        for output in build.outputs.iter().chain(&build.implicit_outputs) {
            if !self.outputs.insert(output.clone()) {
                return Err(EmitError::DuplicateBuild(self.render_output(output)));
            }
        }
        self.builds.push(build);
        Ok(())
    }

    /// Add targets to the `default` statement.
    pub fn default(&mut self, targets: impl IntoIterator<Item = SafeStr>) {
        self.defaults.extend(targets);
    }

    fn render_output(&self, output: &SafeStr) -> String {
        let mut out = Writer::new(&self.vars);
        match out.write(output, Syntax::Output, Quoting::Quote) {
            Ok(_) => out.finish(),
            Err(_) => format!("{output:?}"),
        }
    }

    fn write_variable(
        out: &mut Writer<'_>,
        name: &str,
        value: &CommandLine,
        syntax: Syntax,
        indent: bool,
    ) -> Result<(), EmitError> {
        if indent {
            out.literal("  ");
        }
        out.literal(name);
        out.literal(" = ");
        out.write_command(value, syntax)?;
        out.literal("\n");
        Ok(())
    }

    fn write_setting(
        out: &mut Writer<'_>,
        name: &str,
        value: Option<&SafeStr>,
    ) -> Result<(), EmitError> {
        if let Some(value) = value {
            out.literal("  ");
            out.literal(name);
            out.literal(" = ");
            out.write(value, Syntax::Variable, Quoting::Off)?;
            out.literal("\n");
        }
        Ok(())
    }

    fn write_rule(out: &mut Writer<'_>, name: &str, rule: &Rule) -> Result<(), EmitError> {
        out.literal("rule ");
        out.literal(name);
        out.literal("\n");
        Self::write_variable(out, "command", &rule.command, Syntax::Shell, true)?;
        Self::write_setting(out, "description", rule.description.as_ref())?;
        Self::write_setting(out, "depfile", rule.depfile.as_ref())?;
        Self::write_setting(out, "deps", rule.deps.clone().map(SafeStr::text).as_ref())?;
        if rule.generator {
            out.literal("  generator = 1\n");
        }
        Self::write_setting(out, "pool", rule.pool.clone().map(SafeStr::text).as_ref())?;
        if rule.restat {
            out.literal("  restat = 1\n");
        }
        out.literal("\n");
        Ok(())
    }

    fn write_build(out: &mut Writer<'_>, build: &Build) -> Result<(), EmitError> {
        out.write_each(&build.outputs, Syntax::Output, "build ")?;
        out.write_each(&build.implicit_outputs, Syntax::Output, " | ")?;
        out.literal(": ");
        out.literal(&build.rule);
        out.write_each(&build.inputs, Syntax::Input, " ")?;
        out.write_each(&build.implicit, Syntax::Input, " | ")?;
        out.write_each(&build.order_only, Syntax::Input, " || ")?;
        out.literal("\n");
        for (name, value) in &build.variables {
            Self::write_variable(out, name.name(), value, Syntax::Shell, true)?;
        }
        out.literal("\n");
        Ok(())
    }

    /// Serialise the file.
    ///
    /// # Errors
    ///
    /// Fails if any value contains a newline.
    pub fn write(&self) -> Result<String, EmitError> {
        let mut out = Writer::new(&self.vars);
        if let Some(version) = &self.required {
            out.literal(&format!(
                "ninja_required_version = {}.{}\n\n",
                version.major, version.minor
            ));
        }

        for section in SECTIONS {
            let syntax = if section == Section::Path {
                Syntax::Variable
            } else {
                Syntax::Shell
            };
            for (name, (_, value)) in self.variables.iter().filter(|(_, (s, _))| *s == section)
            {
                Self::write_variable(&mut out, name.name(), value, syntax, false)?;
            }
        }
        if !self.variables.is_empty() {
            out.literal("\n");
        }

        for (name, rule) in &self.rules {
            Self::write_rule(&mut out, name, rule)?;
        }

        for build in &self.builds {
            Self::write_build(&mut out, build)?;
        }

        out.write_each(&self.defaults, Syntax::Input, "default ")?;
        if !self.defaults.is_empty() {
            out.literal("\n");
        }
        Ok(out.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::Path;
    use crate::safe_str::concat;
    use rstest::rstest;

    fn render(value: &SafeStr, syntax: Syntax) -> String {
        let vars = path_vars(true);
        let mut out = Writer::new(&vars);
        out.write(value, syntax, Quoting::Quote).expect("render");
        out.finish()
    }

    #[rstest]
    #[case(Syntax::Output, "a b:c$d", "a$ b$:c$$d")]
    #[case(Syntax::Input, "a b:c$d", "a$ b:c$$d")]
    #[case(Syntax::Variable, "a b:c$d", "a b:c$$d")]
    #[case(Syntax::Shell, "a b", "'a b'")]
    #[case(Syntax::Shell, "$HOME", "'$$HOME'")]
    fn text_escaping(#[case] syntax: Syntax, #[case] input: &str, #[case] expected: &str) {
        assert_eq!(render(&SafeStr::text(input), syntax), expected);
    }

    #[rstest]
    #[case(Syntax::Output, "a$ b$out")]
    #[case(Syntax::Shell, "'a b'$out")]
    fn mixed_concatenation(#[case] syntax: Syntax, #[case] expected: &str) {
        let value = concat("a b", SafeStr::literal("$out"));
        assert_eq!(render(&value, syntax), expected);
    }

    #[rstest]
    fn literals_pass_through() {
        assert_eq!(render(&SafeStr::literal("$in"), Syntax::Shell), "$in");
        assert_eq!(render(&concat(var("out"), ".d"), Syntax::Variable), "$out.d");
    }

    #[rstest]
    fn paths_use_root_variables() {
        let src = Path::new("my file.c", Root::SrcDir).expect("path");
        assert_eq!(render(&SafeStr::from(&src), Syntax::Input), "$srcdir/my$ file.c");
        assert_eq!(render(&SafeStr::from(&src), Syntax::Shell), "'$srcdir/my file.c'");
        let prog = Path::new("prog", Root::BuildDir).expect("path");
        assert_eq!(render(&SafeStr::from(&prog), Syntax::Shell), "./prog");
        assert_eq!(render(&SafeStr::from(&prog), Syntax::Output), "prog");
    }

    #[rstest]
    fn variable_names_are_sanitised() {
        assert_eq!(Var::new("c++flags").name(), "c__flags");
        assert_eq!(var("in"), SafeStr::literal("$in"));
    }

    #[rstest]
    fn duplicate_variables_are_rejected() {
        let mut file = NinjaFile::new(false);
        file.variable("cc", CommandLine::args(["cc"]), Section::Command, false)
            .expect("first");
        assert!(file.variable("cc", CommandLine::args(["gcc"]), Section::Command, true).is_ok());
        assert!(matches!(
            file.variable("cc", CommandLine::args(["gcc"]), Section::Command, false),
            Err(EmitError::DuplicateVariable(name)) if name == "cc"
        ));
    }

    #[rstest]
    #[case("cc-link")]
    #[case("")]
    fn rule_names_must_be_words(#[case] name: &str) {
        let mut file = NinjaFile::new(false);
        assert!(matches!(
            file.rule(name, Rule::new(CommandLine::args(["true"]))),
            Err(EmitError::InvalidRuleName(_))
        ));
    }

    #[rstest]
    fn builds_need_known_rules_and_unique_outputs() {
        let mut file = NinjaFile::new(false);
        assert!(matches!(
            file.build(Build::new("cc", vec![SafeStr::text("a.o")])),
            Err(EmitError::UnknownRule(rule)) if rule == "cc"
        ));
        file.build(Build::new(PHONY, vec![SafeStr::text("all")])).expect("phony");
        assert!(matches!(
            file.build(Build::new(PHONY, vec![SafeStr::text("all")])),
            Err(EmitError::DuplicateBuild(out)) if out == "all"
        ));
        file.rule("cc", Rule::new(CommandLine::args(["cc"]))).expect("rule");
        assert!(matches!(
            file.rule("cc", Rule::new(CommandLine::args(["cc"]))),
            Err(EmitError::DuplicateRule(_))
        ));
    }

    #[rstest]
    #[case(None, true)]
    #[case(Some(Version::new(1, 4, 0)), false)]
    #[case(Some(Version::new(1, 5, 0)), true)]
    fn console_pool_needs_ninja_1_5(#[case] version: Option<Version>, #[case] expected: bool) {
        assert_eq!(Feature::ConsolePool.supported(version.as_ref()), expected);
    }

    #[rstest]
    fn write_orders_sections() {
        let mut file = NinjaFile::new(false);
        file.variable("cflags", CommandLine::raw(var("global_cflags")), Section::Other, false)
            .expect("var");
        file.variable("global_cflags", CommandLine::args(["-O2"]), Section::Flags, false)
            .expect("var");
        file.variable("cc", CommandLine::args(["cc"]), Section::Command, false)
            .expect("var");
        file.variable("srcdir", CommandLine::raw("/src dir"), Section::Path, false)
            .expect("var");
        let mut rule = Rule::new(CommandLine::Args(vec![
            var("cc"),
            var("cflags"),
            SafeStr::text("-c"),
            var("in"),
            SafeStr::text("-o"),
            var("out"),
        ]));
        rule.depfile = Some(concat(var("out"), ".d"));
        rule.deps = Some("gcc".to_owned());
        file.rule("cc", rule).expect("rule");
        let mut build = Build::new("cc", vec![SafeStr::text("a.o")]);
        build.inputs.push(SafeStr::from(Path::new("a.c", Root::SrcDir).expect("path")));
        build.order_only.push(SafeStr::text("gen"));
        build.variables.push((
            Var::new("cflags"),
            CommandLine::Args(vec![var("global_cflags"), SafeStr::text("-g")]),
        ));
        file.build(build).expect("build");
        file.default([SafeStr::text("a.o")]);

        let expected = concat!(
            "ninja_required_version = 1.3\n\n",
            "srcdir = /src dir\n",
            "cc = cc\n",
            "global_cflags = -O2\n",
            "cflags = $global_cflags\n\n",
            "rule cc\n",
            "  command = $cc $cflags -c $in -o $out\n",
            "  depfile = $out.d\n",
            "  deps = gcc\n\n",
            "build a.o: cc $srcdir/a.c || gen\n",
            "  cflags = $global_cflags -g\n\n",
            "default a.o\n",
        );
        assert_eq!(file.write().expect("write"), expected);
    }
}
