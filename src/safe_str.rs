//! Safe-string value model.
//!
//! Every string that ends up in a generated build file is carried as a
//! [`SafeStr`]. Raw text is escaped exactly once, when a backend writer
//! serialises it in a particular syntax; literal fragments are written
//! verbatim and paths are resolved through the backend's root table.
//!
//! # Examples
//!
//! ```
//! use gantry::safe_str::{SafeStr, concat};
//!
//! let arg = concat(SafeStr::literal("$(CFLAGS)"), SafeStr::text(" -O2"));
//! assert_eq!(arg.parts().len(), 2);
//! ```

use crate::path::Path;

/// A string value tagged with how it must be escaped.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SafeStr {
    /// Raw text that must be escaped for the destination syntax.
    Text(String),
    /// Pre-escaped text emitted verbatim in every syntax.
    Literal(String),
    /// Text that is never shell-quoted (operators such as `&&` or `>`) but
    /// is still escaped for the backend's own metacharacters.
    ShellLiteral(String),
    /// An ordered concatenation of parts.
    Concat(Vec<SafeStr>),
    /// A root-relative path resolved by the backend at write time.
    Path(Path),
}

impl SafeStr {
    /// Wrap raw text.
    #[must_use]
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    /// Wrap already-escaped text.
    #[must_use]
    pub fn literal(s: impl Into<String>) -> Self {
        Self::Literal(s.into())
    }

    /// Wrap a shell operator or other text that must not be quoted.
    #[must_use]
    pub fn shell_literal(s: impl Into<String>) -> Self {
        Self::ShellLiteral(s.into())
    }

    /// Return the flattened parts of this value.
    ///
    /// A non-concatenated value yields a single part.
    #[must_use]
    pub fn parts(&self) -> Vec<&Self> {
        match self {
            Self::Concat(parts) => parts.iter().flat_map(Self::parts).collect(),
            other => vec![other],
        }
    }

    /// Whether the value renders to the empty string in every syntax.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(s) | Self::Literal(s) | Self::ShellLiteral(s) => s.is_empty(),
            Self::Concat(parts) => parts.iter().all(Self::is_empty),
            Self::Path(_) => false,
        }
    }
}

impl From<&str> for SafeStr {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<String> for SafeStr {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&String> for SafeStr {
    fn from(s: &String) -> Self {
        Self::Text(s.clone())
    }
}

impl From<Path> for SafeStr {
    fn from(p: Path) -> Self {
        Self::Path(p)
    }
}

impl From<&Path> for SafeStr {
    fn from(p: &Path) -> Self {
        Self::Path(p.clone())
    }
}

/// Concatenate two values, flattening nested concatenations.
#[must_use]
pub fn concat(lhs: impl Into<SafeStr>, rhs: impl Into<SafeStr>) -> SafeStr {
    concat_all([lhs.into(), rhs.into()])
}

/// Concatenate any number of values, flattening nested concatenations and
/// dropping empty text fragments.
#[must_use]
pub fn concat_all(items: impl IntoIterator<Item = SafeStr>) -> SafeStr {
    let mut parts = Vec::new();
    for item in items {
        match item {
            SafeStr::Concat(inner) => {
                if let SafeStr::Concat(flat) = concat_all(inner) {
                    parts.extend(flat);
                }
            }
            SafeStr::Text(ref s) | SafeStr::Literal(ref s) | SafeStr::ShellLiteral(ref s)
                if s.is_empty() => {}
            other => parts.push(other),
        }
    }
    SafeStr::Concat(parts)
}

/// Join values with a literal delimiter.
///
/// The delimiter is treated as raw text, so a `" "` delimiter separates shell
/// words rather than being quoted into them.
#[must_use]
pub fn join(items: impl IntoIterator<Item = SafeStr>, delim: &str) -> SafeStr {
    let mut parts = Vec::new();
    for (i, item) in items.into_iter().enumerate() {
        if i > 0 {
            parts.push(SafeStr::shell_literal(delim));
        }
        parts.push(item);
    }
    concat_all(parts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::Root;
    use rstest::rstest;

    #[rstest]
    fn concat_flattens_nested_values() {
        let inner = concat("a", SafeStr::literal("$b"));
        let outer = concat(inner, "c");
        assert_eq!(
            outer,
            SafeStr::Concat(vec![
                SafeStr::text("a"),
                SafeStr::literal("$b"),
                SafeStr::text("c"),
            ])
        );
    }

    #[rstest]
    fn concat_drops_empty_fragments() {
        let value = concat("", SafeStr::literal("x"));
        assert_eq!(value, SafeStr::Concat(vec![SafeStr::literal("x")]));
    }

    #[rstest]
    fn join_inserts_unquoted_delimiters() {
        let value = join([SafeStr::text("a"), SafeStr::text("b")], " ");
        assert_eq!(
            value.parts(),
            vec![
                &SafeStr::text("a"),
                &SafeStr::shell_literal(" "),
                &SafeStr::text("b"),
            ]
        );
    }

    #[rstest]
    #[case(SafeStr::text(""), true)]
    #[case(SafeStr::Concat(vec![]), true)]
    #[case(SafeStr::literal("x"), false)]
    fn emptiness(#[case] value: SafeStr, #[case] expected: bool) {
        assert_eq!(value.is_empty(), expected);
    }

    #[rstest]
    fn paths_are_never_empty() {
        let value = SafeStr::from(Path::new("", Root::BuildDir).unwrap_or_else(|e| panic!("{e}")));
        assert!(!value.is_empty());
    }
}
