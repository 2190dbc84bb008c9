//! The Makefile document model and its escaping rules.

use crate::backend::EmitError;
use crate::backend::render::{Dialect, Renderer, SECTIONS};
pub use crate::backend::render::{Quoting, Section};
use crate::path::{PathVars, Root};
use crate::safe_str::{SafeStr, concat_all};
use crate::shell::{self, CommandLine};
use indexmap::IndexSet;

/// Where in a Makefile a value is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syntax {
    /// A rule target.
    Target,
    /// A prerequisite.
    Dependency,
    /// An argument to a Make function such as `$(call ...)`.
    Function,
    /// A recipe or variable value, shell-quoted as needed.
    Shell,
    /// A value that only needs `$` escaped.
    Clean,
}

/// Make's escaping rules.
pub struct Make;

fn escape_chars(text: &str, special: impl Fn(char) -> bool) -> String {
    let mut out = String::with_capacity(text.len());
    let mut backslashes = 0_usize;
    for c in text.chars() {
        if c == '\\' {
            backslashes += 1;
            continue;
        }
        let run = "\\".repeat(backslashes);
        out.push_str(&run);
        if special(c) {
            out.push_str(&run);
            out.push('\\');
        }
        out.push(c);
        backslashes = 0;
    }
    out.push_str(&"\\".repeat(backslashes));
    out
}

fn is_target_special(c: char) -> bool {
    c.is_whitespace() || "#?*[]~%:".contains(c)
}

impl Dialect for Make {
    type Syntax = Syntax;

    fn escape(text: &str, syntax: Syntax) -> String {
        let doubled = text.replace('$', "$$");
        match syntax {
            Syntax::Target => escape_chars(&doubled, is_target_special),
            Syntax::Dependency => escape_chars(&doubled, |c| c == '|' || is_target_special(c)),
            Syntax::Function => doubled.replace(',', "$,"),
            Syntax::Shell | Syntax::Clean => doubled,
        }
    }

    fn is_shell(syntax: Syntax) -> bool {
        matches!(syntax, Syntax::Function | Syntax::Shell)
    }
}

/// A renderer producing Makefile text.
pub type Writer<'a> = Renderer<'a, Make>;

/// How roots are spelled in a Makefile.
#[must_use]
pub fn path_vars(destdir: bool) -> PathVars {
    let mut vars = PathVars::new().with_root(Root::SrcDir, Var::new("srcdir").reference());
    for root in Root::INSTALL {
        vars = vars.with_root(root, Var::new(root.name()).reference());
    }
    if destdir {
        vars = vars.with_destdir(Var::new("DESTDIR").reference());
    }
    vars
}

/// A Make variable name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Var(String);

impl Var {
    /// Name a variable; whitespace, `:`, `#` and `=` become `_`.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self(
            name.chars()
                .map(|c| if c.is_whitespace() || ":#=".contains(c) { '_' } else { c })
                .collect(),
        )
    }

    /// The sanitised name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }

    /// A reference: `$X` for one-character names, `$(NAME)` otherwise.
    #[must_use]
    pub fn reference(&self) -> SafeStr {
        if self.0.chars().count() == 1 {
            SafeStr::literal(format!("${}", self.0))
        } else {
            SafeStr::literal(format!("$({})", self.0))
        }
    }

    /// A reference wrapped in single quotes, for use in recipes.
    #[must_use]
    pub fn quoted(&self) -> SafeStr {
        match self.reference() {
            SafeStr::Literal(text) => SafeStr::literal(shell::quote_escaped(&text)),
            other => other,
        }
    }
}

/// A reference to the variable `name`.
#[must_use]
pub fn var(name: &str) -> SafeStr {
    Var::new(name).reference()
}

/// A single-quoted reference to the variable `name`.
#[must_use]
pub fn qvar(name: &str) -> SafeStr {
    Var::new(name).quoted()
}

/// A target pattern containing exactly one `%`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    raw: String,
    stem: usize,
}

impl Pattern {
    /// Validate a pattern.
    ///
    /// # Errors
    ///
    /// Returns [`EmitError::InvalidPattern`] unless exactly one `%` is not
    /// escaped by a backslash.
    pub fn new(pattern: &str) -> Result<Self, EmitError> {
        let mut backslashes = 0_usize;
        let mut stems = Vec::new();
        for (i, c) in pattern.char_indices() {
            match c {
                '\\' => backslashes += 1,
                '%' if backslashes % 2 == 0 => {
                    stems.push(i);
                    backslashes = 0;
                }
                _ => backslashes = 0,
            }
        }
        match stems.as_slice() {
            [stem] => Ok(Self {
                raw: pattern.to_owned(),
                stem: *stem,
            }),
            _ => Err(EmitError::InvalidPattern(pattern.to_owned())),
        }
    }

    /// The pattern as a value: text pieces around a literal `%`.
    #[must_use]
    pub fn value(&self) -> SafeStr {
        let (head, tail) = self.raw.split_at(self.stem);
        concat_all([
            SafeStr::text(head),
            SafeStr::literal("%"),
            SafeStr::text(tail.get(1..).unwrap_or_default()),
        ])
    }
}

/// Render a function call such as `$(patsubst a,b,c)`.
///
/// Each argument is a list of words; words are separated by spaces and
/// arguments by commas.
///
/// # Errors
///
/// Fails if an argument contains a newline.
pub fn function(name: &str, args: &[Vec<SafeStr>], vars: &PathVars) -> Result<SafeStr, EmitError> {
    let mut out = Writer::new(vars);
    out.literal("$(");
    out.literal(name);
    for (i, arg) in args.iter().enumerate() {
        out.literal(if i == 0 { " " } else { "," });
        out.write_each(arg, Syntax::Function, "")?;
    }
    out.literal(")");
    Ok(SafeStr::literal(out.finish()))
}

/// Render `$(call NAME,args...)`.
///
/// # Errors
///
/// Fails if an argument contains a newline.
pub fn call(func: &Var, args: &[Vec<SafeStr>], vars: &PathVars) -> Result<SafeStr, EmitError> {
    let mut all = vec![vec![SafeStr::text(func.name())]];
    all.extend(args.iter().cloned());
    function("call", &all, vars)
}

/// Prefix a command with `@` so Make does not echo it.
#[must_use]
pub fn silent(line: CommandLine) -> CommandLine {
    match line {
        CommandLine::Args(mut words) => {
            if let Some(first) = words.first_mut() {
                *first = concat_all([SafeStr::literal("@"), first.clone()]);
            }
            CommandLine::Args(words)
        }
        CommandLine::Raw(raw) => CommandLine::Raw(concat_all([SafeStr::literal("@"), raw])),
    }
}

/// A rule's recipe.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Recipe {
    /// No recipe.
    #[default]
    None,
    /// A single variable or function reference, written after ` ; `.
    Call(SafeStr),
    /// Tab-indented command lines.
    Lines(Vec<CommandLine>),
}

/// A Make rule.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Rule {
    /// Targets; at least one.
    pub targets: Vec<SafeStr>,
    /// Normal prerequisites.
    pub deps: Vec<SafeStr>,
    /// Order-only prerequisites.
    pub order_only: Vec<SafeStr>,
    /// The recipe.
    pub recipe: Recipe,
    /// Target-specific variables.
    pub variables: Vec<(Var, CommandLine)>,
    /// Whether the targets are declared `.PHONY`.
    pub phony: bool,
    /// Whether one run of the recipe makes every target (`&:`).
    pub grouped: bool,
}

#[derive(Debug, Clone)]
struct Include {
    name: SafeStr,
    optional: bool,
}

/// An in-memory Makefile.
#[derive(Debug, Clone)]
pub struct Makefile {
    vars: PathVars,
    names: IndexSet<Var>,
    globals: Vec<(Section, Var, CommandLine)>,
    target_vars: Vec<(Var, CommandLine)>,
    defines: Vec<(Var, Vec<CommandLine>)>,
    rules: Vec<Rule>,
    targets: IndexSet<String>,
    includes: Vec<Include>,
}

impl Makefile {
    /// An empty Makefile; `destdir` enables `$(DESTDIR)` on install paths.
    #[must_use]
    pub fn new(destdir: bool) -> Self {
        Self {
            vars: path_vars(destdir),
            names: IndexSet::new(),
            globals: Vec::new(),
            target_vars: Vec::new(),
            defines: Vec::new(),
            rules: Vec::new(),
            targets: IndexSet::new(),
            includes: Vec::new(),
        }
    }

    /// The root spellings used by this Makefile.
    #[must_use]
    pub const fn path_vars(&self) -> &PathVars {
        &self.vars
    }

    fn claim(&mut self, name: &str, exist_ok: bool) -> Result<(Var, bool), EmitError> {
        let var = Var::new(name);
        let exists = !self.names.insert(var.clone());
        if exists && !exist_ok {
            return Err(EmitError::DuplicateVariable(var.0));
        }
        Ok((var, exists))
    }

    /// Whether a variable, target variable or define named `name` exists.
    #[must_use]
    pub fn has_variable(&self, name: &str) -> bool {
        self.names.contains(&Var::new(name))
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
        let (var, exists) = self.claim(name, exist_ok)?;
        if !exists {
            self.globals.push((section, var.clone(), value));
        }
        Ok(var)
    }

    /// Define a variable for every target (`%: NAME := value`).
    ///
    /// # Errors
    ///
    /// As for [`Makefile::variable`].
    pub fn target_variable(
        &mut self,
        name: &str,
        value: CommandLine,
        exist_ok: bool,
    ) -> Result<Var, EmitError> {
        let (var, exists) = self.claim(name, exist_ok)?;
        if !exists {
            self.target_vars.push((var.clone(), value));
        }
        Ok(var)
    }

    /// Define a multi-line recipe variable.
    ///
    /// # Errors
    ///
    /// As for [`Makefile::variable`].
    pub fn define(
        &mut self,
        name: &str,
        lines: Vec<CommandLine>,
        exist_ok: bool,
    ) -> Result<Var, EmitError> {
        let (var, exists) = self.claim(name, exist_ok)?;
        if !exists {
            self.defines.push((var.clone(), lines));
        }
        Ok(var)
    }

    /// Add an `include` line.
    pub fn include(&mut self, name: impl Into<SafeStr>, optional: bool) {
        self.includes.push(Include {
            name: name.into(),
            optional,
        });
    }

    /// Whether some rule already builds `target`.
    #[must_use]
    pub fn has_rule(&self, target: &SafeStr) -> bool {
        self.render_target(target)
            .is_ok_and(|text| self.targets.contains(&text))
    }

    /// Register a rule.
    ///
    /// Targets are compared as written, so a path and text that render
    /// alike are the same target.
    ///
    /// # Errors
    ///
    /// Returns [`EmitError::NoTargets`] for an empty target list,
    /// [`EmitError::DuplicateRule`] if a target already has a rule, and
    /// fails if a target cannot be rendered.
    pub fn rule(&mut self, rule: Rule) -> Result<(), EmitError> {
        if rule.targets.is_empty() {
            return Err(EmitError::NoTargets);
        }
        let mut rendered = IndexSet::new();
        for target in &rule.targets {
            let text = self.render_target(target)?;
            if self.targets.contains(&text) || !rendered.insert(text.clone()) {
                return Err(EmitError::DuplicateRule(text));
            }
        }
        self.targets.extend(rendered);
        self.rules.push(rule);
        Ok(())
    }

    fn render_target(&self, target: &SafeStr) -> Result<String, EmitError> {
        let mut out = Writer::new(&self.vars);
        out.write(target, Syntax::Target, Quoting::Quote)?;
        Ok(out.finish())
    }

    fn write_variable(
        out: &mut Writer<'_>,
        name: &Var,
        value: &CommandLine,
        clean: bool,
        target: Option<&SafeStr>,
    ) -> Result<(), EmitError> {
        if let Some(target) = target {
            out.write(target, Syntax::Target, Quoting::Quote)?;
            out.literal(": ");
        }
        out.literal(name.name());
        out.literal(" := ");
        let syntax = if clean { Syntax::Clean } else { Syntax::Shell };
        out.write_command(value, syntax)?;
        out.literal("\n");
        Ok(())
    }

    fn write_rule(out: &mut Writer<'_>, rule: &Rule) -> Result<(), EmitError> {
        for target in &rule.targets {
            for (name, value) in &rule.variables {
                Self::write_variable(out, name, value, false, Some(target))?;
            }
        }
        if rule.phony {
            out.write_each(&rule.targets, Syntax::Dependency, ".PHONY: ")?;
            out.literal("\n");
        }
        out.write_each(&rule.targets, Syntax::Target, "")?;
        out.literal(if rule.grouped && rule.targets.len() > 1 {
            " &:"
        } else {
            ":"
        });
        out.write_each(&rule.deps, Syntax::Dependency, " ")?;
        out.write_each(&rule.order_only, Syntax::Dependency, " | ")?;
        match &rule.recipe {
            Recipe::None => {}
            Recipe::Call(value) => {
                out.literal(" ; ");
                out.write(value, Syntax::Shell, Quoting::Off)?;
            }
            Recipe::Lines(lines) => {
                for line in lines {
                    out.literal("\n\t");
                    out.write_command(line, Syntax::Shell)?;
                }
            }
        }
        out.literal("\n\n");
        Ok(())
    }

    /// Serialise the Makefile.
    ///
    /// # Errors
    ///
    /// Fails if any value contains a newline.
    pub fn write(&self) -> Result<String, EmitError> {
        let mut out = Writer::new(&self.vars);
        out.literal(".SUFFIXES:\n");
        Self::write_variable(&mut out, &Var::new(","), &CommandLine::raw(","), false, None)?;
        out.literal("\n");

        for section in SECTIONS {
            let mut any = false;
            for (_, name, value) in self.globals.iter().filter(|(s, _, _)| *s == section) {
                Self::write_variable(&mut out, name, value, section == Section::Path, None)?;
                any = true;
            }
            if any {
                out.literal("\n");
            }
        }

        let all = Pattern::new("%")?.value();
        for (name, value) in &self.target_vars {
            Self::write_variable(&mut out, name, value, false, Some(&all))?;
        }
        if !self.target_vars.is_empty() {
            out.literal("\n");
        }

        for (name, lines) in &self.defines {
            out.literal("define ");
            out.literal(name.name());
            out.literal("\n");
            for line in lines {
                out.write_command(line, Syntax::Shell)?;
                out.literal("\n");
            }
            out.literal("endef\n\n");
        }

        for rule in &self.rules {
            Self::write_rule(&mut out, rule)?;
        }

        for include in &self.includes {
            out.literal(if include.optional { "-include " } else { "include " });
            out.write(&include.name, Syntax::Target, Quoting::Quote)?;
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

    const SAMPLE: &str = "foo: $bar|baz,quux";

    fn render(value: &SafeStr, syntax: Syntax) -> String {
        let vars = path_vars(false);
        let mut out = Writer::new(&vars);
        out.write(value, syntax, Quoting::Quote).expect("render");
        out.finish()
    }

    #[rstest]
    #[case(Syntax::Target, r"foo\:\ $$bar|baz,quux")]
    #[case(Syntax::Dependency, r"foo\:\ $$bar\|baz,quux")]
    #[case(Syntax::Function, "'foo: $$bar|baz$,quux'")]
    #[case(Syntax::Shell, "'foo: $$bar|baz,quux'")]
    #[case(Syntax::Clean, "foo: $$bar|baz,quux")]
    fn text_escaping(#[case] syntax: Syntax, #[case] expected: &str) {
        assert_eq!(render(&SafeStr::text(SAMPLE), syntax), expected);
    }

    #[rstest]
    #[case(Syntax::Target, r"foo\:\ $$bar|baz,quux")]
    #[case(Syntax::Function, "foo: $$bar|baz$,quux")]
    #[case(Syntax::Shell, "foo: $$bar|baz,quux")]
    fn shell_literals_are_never_quoted(#[case] syntax: Syntax, #[case] expected: &str) {
        assert_eq!(render(&SafeStr::shell_literal(SAMPLE), syntax), expected);
    }

    #[rstest]
    #[case(Syntax::Target)]
    #[case(Syntax::Shell)]
    #[case(Syntax::Clean)]
    fn literals_are_verbatim(#[case] syntax: Syntax) {
        assert_eq!(render(&SafeStr::literal(SAMPLE), syntax), SAMPLE);
    }

    #[rstest]
    #[case(r"~foo", r"\~foo")]
    #[case(r"foo~bar ~ baz", r"foo~bar\ ~\ baz")]
    #[case(r"a\ b", r"a\\\ b")]
    fn target_escapes_double_preceding_backslashes(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(render(&SafeStr::text(raw), Syntax::Target), expected);
    }

    #[rstest]
    #[case(Syntax::Target, "$$foo$bar")]
    #[case(Syntax::Function, "'$$foo'$bar")]
    #[case(Syntax::Shell, "'$$foo'$bar")]
    fn mixed_concatenation(#[case] syntax: Syntax, #[case] expected: &str) {
        let value = concat("$foo", SafeStr::literal("$bar"));
        assert_eq!(render(&value, syntax), expected);
    }

    #[rstest]
    #[case(Syntax::Target, "$(srcdir)/foo")]
    #[case(Syntax::Function, "'$(srcdir)/foo'")]
    #[case(Syntax::Shell, "'$(srcdir)/foo'")]
    #[case(Syntax::Clean, "$(srcdir)/foo")]
    fn paths_quote_as_a_whole(#[case] syntax: Syntax, #[case] expected: &str) {
        let path = Path::new("foo", Root::SrcDir).expect("path");
        assert_eq!(render(&SafeStr::from(path), syntax), expected);
    }

    #[rstest]
    fn newline_is_rejected() {
        let vars = path_vars(false);
        let mut out = Writer::new(&vars);
        let err = out
            .write(&SafeStr::text("foo\nbar"), Syntax::Target, Quoting::Quote)
            .expect_err("newline");
        assert!(matches!(err, EmitError::IllegalNewline(_)));
    }

    #[rstest]
    fn variable_references() {
        assert_eq!(var("@"), SafeStr::literal("$@"));
        assert_eq!(var("CC"), SafeStr::literal("$(CC)"));
        assert_eq!(qvar("<"), SafeStr::literal("'$<'"));
        assert_eq!(Var::new("a b:c#d=e").name(), "a_b_c_d_e");
    }

    #[rstest]
    #[case("%", true)]
    #[case("%/.dir", true)]
    #[case("%\\%.c", true)]
    #[case("foo", false)]
    #[case("%%", false)]
    fn patterns(#[case] raw: &str, #[case] valid: bool) {
        assert_eq!(Pattern::new(raw).is_ok(), valid);
    }

    #[rstest]
    fn functions_escape_commas() {
        let vars = path_vars(false);
        let call = function(
            "fn",
            &[
                vec![SafeStr::text("a"), SafeStr::text("b")],
                vec![SafeStr::text("1,2")],
            ],
            &vars,
        )
        .expect("function");
        assert_eq!(call, SafeStr::literal("$(fn a b,1$,2)"));
    }

    #[rstest]
    fn destdir_paths_are_quoted() {
        let mut makefile = Makefile::new(true);
        let path = crate::path::install_path(
            &Path::new("foo", Root::BuildDir).expect("path"),
            Root::BinDir,
        )
        .expect("install");
        makefile
            .variable("name", CommandLine::raw(path), Section::Other, false)
            .expect("variable");
        let text = makefile.write().expect("write");
        assert!(text.contains("name := '$(DESTDIR)$(bindir)/foo'\n"));
    }

    #[rstest]
    fn duplicate_names_are_rejected_across_namespaces() {
        let mut makefile = Makefile::new(false);
        makefile
            .variable("name", CommandLine::raw("value"), Section::Other, false)
            .expect("first");
        assert!(
            makefile
                .variable("name", CommandLine::raw("other"), Section::Other, true)
                .is_ok()
        );
        assert!(matches!(
            makefile.target_variable("name", CommandLine::raw("v"), false),
            Err(EmitError::DuplicateVariable(_))
        ));
        assert!(matches!(
            makefile.define("name", Vec::new(), false),
            Err(EmitError::DuplicateVariable(_))
        ));
    }

    #[rstest]
    fn rules_reject_duplicates_and_empty_targets() {
        let mut makefile = Makefile::new(false);
        let rule = Rule {
            targets: vec![SafeStr::text("target")],
            ..Rule::default()
        };
        makefile.rule(rule.clone()).expect("first");
        assert!(matches!(makefile.rule(rule), Err(EmitError::DuplicateRule(_))));
        assert!(matches!(makefile.rule(Rule::default()), Err(EmitError::NoTargets)));
    }

    #[rstest]
    fn rules_compare_targets_as_written() {
        let mut makefile = Makefile::new(false);
        let obj = Path::new("a.o", Root::BuildDir).expect("path");
        makefile
            .rule(Rule {
                targets: vec![SafeStr::text("a.o")],
                ..Rule::default()
            })
            .expect("first");
        assert!(makefile.has_rule(&SafeStr::from(&obj)));
        let err = makefile
            .rule(Rule {
                targets: vec![SafeStr::from(obj)],
                ..Rule::default()
            })
            .expect_err("same target spelled as a path");
        assert!(matches!(err, EmitError::DuplicateRule(ref name) if name == "a.o"));
    }

    #[rstest]
    fn rejected_rule_claims_no_targets() {
        let mut makefile = Makefile::new(false);
        makefile
            .rule(Rule {
                targets: vec![SafeStr::text("b")],
                ..Rule::default()
            })
            .expect("first");
        assert!(
            makefile
                .rule(Rule {
                    targets: vec![SafeStr::text("a"), SafeStr::text("b")],
                    ..Rule::default()
                })
                .is_err()
        );
        assert!(!makefile.has_rule(&SafeStr::text("a")));
    }

    #[rstest]
    fn write_orders_sections() {
        let mut makefile = Makefile::new(false);
        makefile
            .variable("var", CommandLine::raw("foo"), Section::Other, false)
            .expect("var");
        makefile
            .variable("srcdir", CommandLine::raw("/src dir"), Section::Path, false)
            .expect("srcdir");
        makefile
            .target_variable("tvar", CommandLine::raw("bar"), false)
            .expect("tvar");
        makefile
            .define("dvar", vec![CommandLine::raw("baz")], false)
            .expect("dvar");
        makefile
            .rule(Rule {
                targets: vec![SafeStr::text("target")],
                variables: vec![(Var::new("name"), CommandLine::raw("value"))],
                recipe: Recipe::Lines(vec![silent(CommandLine::args(["cmd", "a b"]))]),
                ..Rule::default()
            })
            .expect("rule");
        makefile
            .rule(Rule {
                targets: vec![SafeStr::text("call-target")],
                recipe: Recipe::Call(SafeStr::literal("$(call fn,1,2)")),
                phony: true,
                ..Rule::default()
            })
            .expect("rule");
        makefile.include("inc1", false);
        makefile.include("inc2", true);
        assert_eq!(
            makefile.write().expect("write"),
            ".SUFFIXES:\n\
             , := ,\n\n\
             srcdir := /src dir\n\n\
             var := foo\n\n\
             %: tvar := bar\n\n\
             define dvar\n\
             baz\n\
             endef\n\n\
             target: name := value\n\
             target:\n\
             \t@cmd 'a b'\n\n\
             .PHONY: call-target\n\
             call-target: ; $(call fn,1,2)\n\n\
             include inc1\n\
             -include inc2\n"
        );
    }
}
