//! POSIX shell quoting helpers.
//!
//! Commands written into recipes are executed by `/bin/sh`. Words that
//! contain characters outside a conservative safe set are wrapped in single
//! quotes; embedded single quotes are closed, emitted inside double quotes,
//! and reopened.

use crate::safe_str::{SafeStr, concat_all, join};
use thiserror::Error;

/// Errors raised while splitting a command string into words.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShellError {
    /// The command has an unterminated quote or trailing escape.
    #[error("unable to split shell command: {0}")]
    Unbalanced(String),
}

fn is_safe(c: char) -> bool {
    c.is_alphanumeric() || "_@%+:,./-".contains(c)
}

/// Escape `s` so it can be placed inside single quotes.
///
/// Returns the escaped text and whether quoting is required.
#[must_use]
pub fn escape(s: &str) -> (String, bool) {
    if s.is_empty() {
        return (String::new(), true);
    }
    if s.chars().all(is_safe) {
        return (s.to_owned(), false);
    }
    (s.replace('\'', r#"'"'"'"#), true)
}

/// Wrap already-escaped text in single quotes.
#[must_use]
pub fn quote_escaped(s: &str) -> String {
    format!("'{s}'")
}

/// Quote `s` as a single shell word, returning whether quoting was applied.
#[must_use]
pub fn quote_info(s: &str) -> (String, bool) {
    let (escaped, needs_quote) = escape(s);
    if needs_quote {
        (quote_escaped(&escaped), true)
    } else {
        (escaped, false)
    }
}

/// Quote `s` as a single shell word.
#[must_use]
pub fn quote(s: &str) -> String {
    quote_info(s).0
}

/// Split a command string into words using POSIX rules.
///
/// # Errors
///
/// Returns [`ShellError::Unbalanced`] if the string has unterminated quotes.
pub fn split(s: &str) -> Result<Vec<String>, ShellError> {
    shlex::split(s).ok_or_else(|| ShellError::Unbalanced(s.to_owned()))
}

/// A single recipe command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandLine {
    /// A list of words; each word is quoted individually.
    Args(Vec<SafeStr>),
    /// A command string passed through to the shell without quoting.
    Raw(SafeStr),
}

impl CommandLine {
    /// Build a command from string words.
    #[must_use]
    pub fn args<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SafeStr>,
    {
        Self::Args(words.into_iter().map(Into::into).collect())
    }

    /// Build an unquoted command string.
    #[must_use]
    pub fn raw(s: impl Into<SafeStr>) -> Self {
        Self::Raw(s.into())
    }
}

/// Prefix words that set environment variables for a single command.
#[must_use]
pub fn local_env<'a>(env: impl IntoIterator<Item = (&'a str, &'a SafeStr)>) -> Vec<SafeStr> {
    env.into_iter()
        .map(|(name, value)| {
            concat_all([SafeStr::shell_literal(format!("{name}=")), value.clone()])
        })
        .collect()
}

/// Lines that export environment variables for the rest of a recipe.
#[must_use]
pub fn global_env<'a>(env: impl IntoIterator<Item = (&'a str, &'a SafeStr)>) -> Vec<CommandLine> {
    env.into_iter()
        .map(|(name, value)| {
            CommandLine::Args(vec![
                SafeStr::shell_literal("export"),
                concat_all([SafeStr::shell_literal(format!("{name}=")), value.clone()]),
            ])
        })
        .collect()
}

/// Join several commands into one shell line separated by `&&`.
///
/// Argument lists are flattened with single spaces between words; raw
/// commands are embedded as-is.
#[must_use]
pub fn join_lines(lines: &[CommandLine]) -> CommandLine {
    let mut words = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            words.push(SafeStr::shell_literal("&&"));
        }
        match line {
            CommandLine::Args(args) => words.extend(args.iter().cloned()),
            CommandLine::Raw(raw) => words.push(unquoted(raw)),
        }
    }
    CommandLine::Args(words)
}

/// Mark every text fragment of `value` as exempt from shell quoting.
///
/// Paths keep their own handling so they still resolve through the
/// backend's root table.
#[must_use]
pub fn unquoted(value: &SafeStr) -> SafeStr {
    match value {
        SafeStr::Text(s) => SafeStr::ShellLiteral(s.clone()),
        SafeStr::Concat(parts) => concat_all(parts.iter().map(unquoted)),
        other => other.clone(),
    }
}

/// Render a command line as a single value with space-separated words.
#[must_use]
pub fn flatten(line: &CommandLine) -> SafeStr {
    match line {
        CommandLine::Args(args) => join(args.iter().cloned(), " "),
        CommandLine::Raw(raw) => unquoted(raw),
    }
}
