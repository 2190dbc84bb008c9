//! Rendering of [`SafeStr`] values into backend text.
//!
//! Every backend shares one algorithm and differs only in its escaping
//! tables, its shell quoting and which syntaxes count as shell context. A
//! [`Dialect`] supplies those differences; [`Renderer`] does the rest.

use super::EmitError;
use crate::path::PathVars;
use crate::safe_str::SafeStr;
use crate::shell::{self, CommandLine};
use std::marker::PhantomData;

/// How plain text is treated in shell context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quoting {
    /// Quote words that need it.
    Quote,
    /// Escape embedded quotes but leave wrapping to the caller.
    EscapeOnly,
    /// Pass text through unquoted.
    Off,
}

/// Groups of global variables, written in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    /// Directory variables; written without shell quoting.
    Path,
    /// Tool commands.
    Command,
    /// Global flags.
    Flags,
    /// Everything else.
    Other,
}

/// Every [`Section`] in output order.
pub const SECTIONS: [Section; 4] =
    [Section::Path, Section::Command, Section::Flags, Section::Other];

/// Escaping rules of one backend.
pub trait Dialect {
    /// The contexts a value can be written in.
    type Syntax: Copy + PartialEq;

    /// Escape `text` for `syntax`. `text` never contains a newline.
    fn escape(text: &str, syntax: Self::Syntax) -> String;

    /// Whether `syntax` is interpreted by a shell.
    fn is_shell(syntax: Self::Syntax) -> bool;

    /// Quote one shell word, reporting whether it needed quoting.
    fn quote(text: &str) -> (String, bool) {
        shell::quote_info(text)
    }

    /// Escape embedded quotes, reporting whether the word needs wrapping.
    fn escape_quotes(text: &str) -> (String, bool) {
        shell::escape(text)
    }

    /// Wrap a word whose quotes were escaped by [`Dialect::escape_quotes`].
    fn wrap(text: &str) -> String {
        shell::quote_escaped(text)
    }

    /// Adjust a resolved path before it is written.
    fn path(value: SafeStr) -> SafeStr {
        value
    }
}

/// Accumulates rendered text.
pub struct Renderer<'a, D: Dialect> {
    out: String,
    vars: &'a PathVars,
    dialect: PhantomData<D>,
}

impl<'a, D: Dialect> Renderer<'a, D> {
    /// Start an empty buffer that resolves paths through `vars`.
    #[must_use]
    pub const fn new(vars: &'a PathVars) -> Self {
        Self {
            out: String::new(),
            vars,
            dialect: PhantomData,
        }
    }

    /// Append pre-rendered text.
    pub fn literal(&mut self, text: &str) {
        self.out.push_str(text);
    }

    /// Write `value` in `syntax`.
    ///
    /// Returns whether any part was quoted or is a literal, so enclosing
    /// values know to quote themselves.
    ///
    /// # Errors
    ///
    /// Returns [`EmitError::IllegalNewline`] if text contains a newline.
    pub fn write(
        &mut self,
        value: &SafeStr,
        syntax: D::Syntax,
        quoting: Quoting,
    ) -> Result<bool, EmitError> {
        let shelly = D::is_shell(syntax);
        match value {
            SafeStr::Literal(text) => {
                self.out.push_str(text);
                Ok(true)
            }
            SafeStr::Text(text) => {
                check_newline(text)?;
                let (text, escaped) = match quoting {
                    Quoting::Quote if shelly => D::quote(text),
                    Quoting::EscapeOnly if shelly => D::escape_quotes(text),
                    _ => (text.clone(), false),
                };
                self.out.push_str(&D::escape(&text, syntax));
                Ok(escaped)
            }
            SafeStr::ShellLiteral(text) => {
                check_newline(text)?;
                self.out.push_str(&D::escape(text, syntax));
                Ok(false)
            }
            SafeStr::Concat(parts) => {
                let mut escaped = false;
                for part in parts {
                    escaped |= self.write(part, syntax, quoting)?;
                }
                Ok(escaped)
            }
            SafeStr::Path(path) => {
                let realized = D::path(path.realize(self.vars, shelly));
                let mut inner = Renderer::<D>::new(self.vars);
                let escaped = inner.write(&realized, syntax, Quoting::EscapeOnly)?;
                let text = inner.finish();
                if shelly && escaped {
                    self.out.push_str(&D::wrap(&text));
                } else {
                    self.out.push_str(&text);
                }
                Ok(escaped)
            }
        }
    }

    /// Write each value separated by spaces, preceded by `prefix` if there
    /// is at least one value.
    ///
    /// # Errors
    ///
    /// As for [`Renderer::write`].
    pub fn write_each<'v>(
        &mut self,
        values: impl IntoIterator<Item = &'v SafeStr>,
        syntax: D::Syntax,
        prefix: &str,
    ) -> Result<(), EmitError> {
        for (i, value) in values.into_iter().enumerate() {
            self.out.push_str(if i == 0 { prefix } else { " " });
            self.write(value, syntax, Quoting::Quote)?;
        }
        Ok(())
    }

    /// Write a command line: argument lists word by word with quoting, raw
    /// commands unquoted.
    ///
    /// # Errors
    ///
    /// As for [`Renderer::write`].
    pub fn write_command(
        &mut self,
        line: &CommandLine,
        syntax: D::Syntax,
    ) -> Result<(), EmitError> {
        match line {
            CommandLine::Args(words) => self.write_each(words, syntax, ""),
            CommandLine::Raw(raw) => self.write(raw, syntax, Quoting::Off).map(|_| ()),
        }
    }

    /// The rendered text.
    #[must_use]
    pub fn finish(self) -> String {
        self.out
    }
}

fn check_newline(text: &str) -> Result<(), EmitError> {
    if text.contains('\n') {
        Err(EmitError::IllegalNewline(text.to_owned()))
    } else {
        Ok(())
    }
}
