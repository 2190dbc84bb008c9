//! Path resolution helpers for the runner module.
//!
//! Centralises directory handling so the main runner module stays focused on
//! command dispatch.

use crate::cli::Cli;
use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use std::borrow::Cow;
use std::path::Path;

use super::RunnerError;

/// Resolve a path relative to the CLI working directory.
///
/// The `-C/--directory` option behaves like a working directory change for
/// any filesystem paths supplied on the command line. When `path` is relative
/// and a directory has been configured, the returned path is
/// `directory/path`.
#[must_use]
pub(super) fn resolve_cli_path<'a>(cli: &Cli, path: &'a Path) -> Cow<'a, Path> {
    if path.is_relative() {
        cli.directory
            .as_ref()
            .map_or_else(|| Cow::Borrowed(path), |dir| Cow::Owned(dir.join(path)))
    } else {
        Cow::Borrowed(path)
    }
}

/// Canonicalise an existing directory into an absolute UTF-8 path.
///
/// # Errors
///
/// Fails if the directory does not exist or its path is not UTF-8.
pub(super) fn absolute_dir(path: &Path) -> Result<Utf8PathBuf> {
    let resolved = std::fs::canonicalize(path)
        .with_context(|| format!("resolving directory {}", path.display()))?;
    Utf8PathBuf::from_path_buf(resolved)
        .map_err(|bad| RunnerError::NonUtf8Path { path: bad }.into())
}
