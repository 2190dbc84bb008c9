//! MSBuild escaping rules and a minimal XML document model.

use crate::backend::EmitError;
use crate::backend::render::{Dialect, Quoting, Renderer};
use crate::path::{PathVars, Root};
use crate::safe_str::{SafeStr, concat_all};

/// Where in a project file a value is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syntax {
    /// An item spec, property value or task parameter; never quoted.
    Item,
    /// Compiler or linker options, quoted the way the MSVC runtime splits
    /// its command line.
    Options,
    /// A command run by the `Exec` task through `cmd.exe`.
    Command,
}

/// MSBuild's escaping rules.
pub struct MsBuild;

fn needs_quotes(c: char) -> bool {
    c.is_whitespace() || matches!(c, '"' | '&' | '|' | '<' | '>' | '^' | '(' | ')')
}

/// Percent-encode the characters MSBuild treats specially.
#[must_use]
pub fn escape_msbuild(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '%' => out.push_str("%25"),
            '$' => out.push_str("%24"),
            '@' => out.push_str("%40"),
            ';' => out.push_str("%3B"),
            '*' => out.push_str("%2A"),
            '?' => out.push_str("%3F"),
            '\'' => out.push_str("%27"),
            other => out.push(other),
        }
    }
    out
}

impl Dialect for MsBuild {
    type Syntax = Syntax;

    fn escape(text: &str, syntax: Syntax) -> String {
        match syntax {
            Syntax::Command => escape_msbuild(&text.replace('%', "%%")),
            Syntax::Item | Syntax::Options => escape_msbuild(text),
        }
    }

    fn is_shell(syntax: Syntax) -> bool {
        syntax != Syntax::Item
    }

    fn quote(text: &str) -> (String, bool) {
        let (escaped, needed) = Self::escape_quotes(text);
        if needed {
            (Self::wrap(&escaped), true)
        } else {
            (escaped, false)
        }
    }

    fn escape_quotes(text: &str) -> (String, bool) {
        if text.is_empty() {
            return (String::new(), true);
        }
        (text.replace('"', "\\\""), text.chars().any(needs_quotes))
    }

    fn wrap(text: &str) -> String {
        format!("\"{text}\"")
    }

    fn path(value: SafeStr) -> SafeStr {
        match value {
            SafeStr::Text(text) => SafeStr::Text(text.replace('/', "\\")),
            SafeStr::Concat(parts) => concat_all(parts.into_iter().map(Self::path)),
            other => other,
        }
    }
}

/// A renderer producing MSBuild text.
pub type Writer<'a> = Renderer<'a, MsBuild>;

/// How roots are spelled in a project file.
///
/// Generated files land in `$(OutDir)`, which every project points at the
/// solution directory.
#[must_use]
pub fn path_vars() -> PathVars {
    PathVars::new()
        .with_root(Root::SrcDir, SafeStr::literal("$(SourceDir)"))
        .with_root(Root::BuildDir, SafeStr::literal("$(OutDir)"))
}

/// Render `value` as a single string.
///
/// # Errors
///
/// Returns [`EmitError::IllegalNewline`] if text contains a newline.
pub fn textify(vars: &PathVars, value: &SafeStr, syntax: Syntax) -> Result<String, EmitError> {
    let mut out = Writer::new(vars);
    out.write(value, syntax, Quoting::Quote)?;
    Ok(out.finish())
}

/// Render `values` separated by `delim`.
///
/// # Errors
///
/// As for [`textify`].
pub fn textify_each(
    vars: &PathVars,
    values: &[SafeStr],
    syntax: Syntax,
    delim: &str,
) -> Result<String, EmitError> {
    let mut parts = Vec::with_capacity(values.len());
    for value in values {
        parts.push(textify(vars, value, syntax)?);
    }
    Ok(parts.join(delim))
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\n' => out.push_str("&#10;"),
            other => out.push(other),
        }
    }
    out
}

/// An XML element with attributes and either text or child elements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    name: String,
    attrs: Vec<(String, String)>,
    text: Option<String>,
    children: Vec<Element>,
}

impl Element {
    /// An empty element.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            text: None,
            children: Vec::new(),
        }
    }

    /// An element holding only `text`.
    #[must_use]
    pub fn text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::new(name)
        }
    }

    /// Add an attribute.
    #[must_use]
    pub fn attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.attrs.push((name.to_owned(), value.into()));
        self
    }

    /// Add a child element.
    #[must_use]
    pub fn child(mut self, child: Self) -> Self {
        self.children.push(child);
        self
    }

    /// Add a child element in place.
    pub fn push(&mut self, child: Self) {
        self.children.push(child);
    }

    /// Whether the element has neither text nor children.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.children.is_empty()
    }

    fn write(&self, out: &mut String, depth: usize) {
        let indent = "  ".repeat(depth);
        out.push_str(&indent);
        out.push('<');
        out.push_str(&self.name);
        for (name, value) in &self.attrs {
            out.push_str(&format!(" {name}=\"{}\"", escape_xml(value)));
        }
        match &self.text {
            Some(text) => {
                out.push_str(&format!(">{}</{}>\n", escape_xml(text), self.name));
            }
            None if self.children.is_empty() => out.push_str(" />\n"),
            None => {
                out.push_str(">\n");
                for child in &self.children {
                    child.write(out, depth + 1);
                }
                out.push_str(&format!("{indent}</{}>\n", self.name));
            }
        }
    }

    /// Serialise as a complete document with an XML declaration.
    #[must_use]
    pub fn document(&self) -> String {
        let mut out = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
        self.write(&mut out, 0);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::Path;
    use rstest::rstest;

    fn render(value: &SafeStr, syntax: Syntax) -> String {
        textify(&path_vars(), value, syntax).expect("render")
    }

    #[rstest]
    #[case(Syntax::Item, "50% $x;y", "50%25 %24x%3By")]
    #[case(Syntax::Options, "a b", "\"a b\"")]
    #[case(Syntax::Options, "say \"hi\"", "\"say \\\"hi\\\"\"")]
    #[case(Syntax::Options, "/DX=1", "/DX=1")]
    #[case(Syntax::Command, "100%", "100%25%25")]
    #[case(Syntax::Command, "a&b", "\"a&b\"")]
    fn text_escaping(#[case] syntax: Syntax, #[case] text: &str, #[case] expected: &str) {
        assert_eq!(render(&SafeStr::text(text), syntax), expected);
    }

    #[rstest]
    fn paths_use_backslashes() {
        let src = Path::new("sub/main.c", Root::SrcDir).expect("path");
        let out = Path::new("my prog.exe", Root::BuildDir).expect("path");
        assert_eq!(render(&SafeStr::from(&src), Syntax::Item), "$(SourceDir)\\sub\\main.c");
        assert_eq!(
            render(&SafeStr::from(&out), Syntax::Command),
            "\"$(OutDir)\\my prog.exe\""
        );
    }

    #[rstest]
    fn literals_pass_through() {
        assert_eq!(render(&SafeStr::literal("$(TargetPath)"), Syntax::Item), "$(TargetPath)");
    }

    #[rstest]
    fn elements_serialise_with_indentation() {
        let doc = Element::new("Project")
            .attr("DefaultTargets", "Build")
            .child(Element::text("Name", "a<b"))
            .child(Element::new("Import").attr("Project", "x\"y"));
        assert_eq!(
            doc.document(),
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
             <Project DefaultTargets=\"Build\">\n\
             \x20 <Name>a&lt;b</Name>\n\
             \x20 <Import Project=\"x&quot;y\" />\n\
             </Project>\n"
        );
    }
}
