//! Root-relative paths.
//!
//! A [`Path`] names a file relative to one of a fixed set of roots: the
//! source directory, the build directory, the filesystem root, or one of the
//! install directories. Backends decide how each root is spelled (a Make
//! variable, a bare relative path, an MSBuild property) so paths never embed
//! backend syntax themselves.

use crate::safe_str::{SafeStr, concat};
use camino::Utf8PathBuf;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use thiserror::Error;

/// The base directory a [`Path`] is relative to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Root {
    /// The project's source directory.
    #[serde(rename = "srcdir")]
    SrcDir,
    /// The build directory (the backend's working directory).
    #[serde(rename = "builddir")]
    BuildDir,
    /// An absolute filesystem path.
    #[serde(rename = "absolute")]
    Absolute,
    /// The install prefix.
    #[serde(rename = "prefix")]
    Prefix,
    /// The architecture-dependent install prefix.
    #[serde(rename = "exec_prefix")]
    ExecPrefix,
    /// The directory for installed programs.
    #[serde(rename = "bindir")]
    BinDir,
    /// The directory for installed libraries.
    #[serde(rename = "libdir")]
    LibDir,
    /// The directory for installed headers.
    #[serde(rename = "includedir")]
    IncludeDir,
    /// The directory for installed data files.
    #[serde(rename = "datadir")]
    DataDir,
    /// The directory for installed man pages.
    #[serde(rename = "mandir")]
    ManDir,
}

impl Root {
    /// All install roots, in the order their variables are emitted.
    pub const INSTALL: [Self; 7] = [
        Self::Prefix,
        Self::ExecPrefix,
        Self::BinDir,
        Self::LibDir,
        Self::IncludeDir,
        Self::DataDir,
        Self::ManDir,
    ];

    /// The conventional lower-case name of this root.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::SrcDir => "srcdir",
            Self::BuildDir => "builddir",
            Self::Absolute => "absolute",
            Self::Prefix => "prefix",
            Self::ExecPrefix => "exec_prefix",
            Self::BinDir => "bindir",
            Self::LibDir => "libdir",
            Self::IncludeDir => "includedir",
            Self::DataDir => "datadir",
            Self::ManDir => "mandir",
        }
    }

    /// Whether this is one of the install roots.
    #[must_use]
    pub const fn is_install(self) -> bool {
        !matches!(self, Self::SrcDir | Self::BuildDir | Self::Absolute)
    }
}

impl fmt::Display for Root {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors raised while constructing or resolving paths.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    /// A path with [`Root::Absolute`] was not absolute.
    #[error("'{0}' is not absolute")]
    NotAbsolute(String),
    /// The path climbs above its root with `..`.
    #[error("too many '..' in '{0}': path cannot escape its root")]
    EscapesRoot(String),
    /// A drive letter was used with a relative path.
    #[error("relative paths with drives are not supported: '{0}'")]
    RelativeDrive(String),
    /// `parent()` was called on a root.
    #[error("path is already at its root")]
    AtRoot,
    /// Two paths relative to different roots were compared.
    #[error("cannot relate {path} to {start}: roots differ")]
    RootMismatch {
        /// The path being made relative.
        path: String,
        /// The base path.
        start: String,
    },
    /// `destdir` was requested for a path that is not installed.
    #[error("destdir only applies to absolute or install paths")]
    DestDirRoot,
    /// An absolute path cannot be mapped into an install root.
    #[error("cannot install absolute path '{0}'")]
    AbsoluteInstall(String),
    /// No concrete directory was supplied for a root.
    #[error("no directory known for root {0}")]
    UnknownBase(Root),
}

/// How each root is spelled by a backend.
///
/// Roots without an entry resolve to a bare relative path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathVars {
    roots: IndexMap<Root, SafeStr>,
    destdir: Option<SafeStr>,
}

impl PathVars {
    /// An empty table: every root is spelled as a bare path.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Spell `root` as `value`.
    #[must_use]
    pub fn with_root(mut self, root: Root, value: SafeStr) -> Self {
        self.roots.insert(root, value);
        self
    }

    /// Spell the staging directory prefix as `value`.
    #[must_use]
    pub fn with_destdir(mut self, value: SafeStr) -> Self {
        self.destdir = Some(value);
        self
    }

    /// The spelling of `root`, if the backend defines one.
    #[must_use]
    pub fn get(&self, root: Root) -> Option<&SafeStr> {
        self.roots.get(&root)
    }

    /// The spelling of the staging directory prefix, if any.
    #[must_use]
    pub const fn destdir(&self) -> Option<&SafeStr> {
        self.destdir.as_ref()
    }
}

/// Concrete directories for each root, used when the generator itself has
/// to touch the filesystem.
pub type BaseDirs = IndexMap<Root, Utf8PathBuf>;

/// A normalised path relative to a [`Root`].
#[derive(Debug, Clone)]
pub struct Path {
    suffix: String,
    root: Root,
    destdir: bool,
    directory: bool,
}

struct Normalized {
    drive: String,
    path: String,
    is_dir: bool,
}

fn split_drive(raw: &str) -> (&str, &str) {
    let mut chars = raw.chars();
    match (chars.next(), chars.next()) {
        (Some(letter), Some(':')) if letter.is_ascii_alphabetic() => raw.split_at(2),
        _ => ("", raw),
    }
}

fn normpath(raw: &str) -> (String, bool) {
    let unified = raw.replace('\\', "/");
    let leaf = unified.rsplit('/').next().unwrap_or_default();
    let is_dir = matches!(leaf, "" | "." | "..");
    let absolute = unified.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for part in unified.split('/') {
        match part {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&last) if last != ".." => {
                    parts.pop();
                }
                _ if absolute => {}
                _ => parts.push(".."),
            },
            other => parts.push(other),
        }
    }
    let joined = parts.join("/");
    let path = if absolute { format!("/{joined}") } else { joined };
    (path, is_dir)
}

fn normalize(raw: &str) -> Result<Normalized, PathError> {
    let (drive, rest) = split_drive(raw);
    let (path, is_dir) = normpath(rest);
    if !drive.is_empty() && !path.starts_with('/') {
        return Err(PathError::RelativeDrive(raw.to_owned()));
    }
    Ok(Normalized {
        drive: drive.to_owned(),
        path,
        is_dir,
    })
}

fn splitext(name: &str) -> (&str, &str) {
    let leaf_start = name.rfind('/').map_or(0, |i| i + 1);
    let leaf = name.get(leaf_start..).unwrap_or_default();
    let stem_len = leaf.len() - leaf.trim_start_matches('.').len();
    match leaf.rfind('.') {
        Some(dot) if dot > stem_len => {
            name.split_at(leaf_start + dot)
        }
        _ => (name, ""),
    }
}

impl Path {
    /// Create a path relative to `root`.
    ///
    /// Absolute inputs are always rooted at [`Root::Absolute`].
    ///
    /// # Errors
    ///
    /// Fails if the path escapes its root, if `root` is
    /// [`Root::Absolute`] but the path is relative, or if a drive letter is
    /// attached to a relative path.
    pub fn new(raw: &str, root: Root) -> Result<Self, PathError> {
        Self::build(raw, root, false, None)
    }

    /// Create a path that names a directory.
    ///
    /// # Errors
    ///
    /// As for [`Path::new`].
    pub fn directory(raw: &str, root: Root) -> Result<Self, PathError> {
        Self::build(raw, root, false, Some(true))
    }

    fn build(
        raw: &str,
        requested: Root,
        destdir: bool,
        directory: Option<bool>,
    ) -> Result<Self, PathError> {
        if destdir && !requested.is_install() && requested != Root::Absolute {
            return Err(PathError::DestDirRoot);
        }
        let Normalized {
            drive,
            path,
            is_dir,
        } = normalize(raw)?;
        let root = if path.starts_with('/') {
            Root::Absolute
        } else if requested == Root::Absolute {
            return Err(PathError::NotAbsolute(raw.to_owned()));
        } else {
            requested
        };
        if path == ".." || path.starts_with("../") {
            return Err(PathError::EscapesRoot(raw.to_owned()));
        }
        let directory = directory.unwrap_or(false) || is_dir || path.is_empty();
        Ok(Self {
            suffix: format!("{drive}{path}"),
            root,
            destdir,
            directory,
        })
    }

    /// The normalised path text after the root.
    #[must_use]
    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// The root this path is relative to.
    #[must_use]
    pub const fn root(&self) -> Root {
        self.root
    }

    /// Whether the path is prefixed by the staging directory when installed.
    #[must_use]
    pub const fn has_destdir(&self) -> bool {
        self.destdir
    }

    /// Whether the path names a directory.
    #[must_use]
    pub const fn is_directory(&self) -> bool {
        self.directory
    }

    /// Return the same path marked as a directory.
    #[must_use]
    pub fn as_directory(&self) -> Self {
        Self {
            directory: true,
            ..self.clone()
        }
    }

    /// The containing directory.
    ///
    /// # Errors
    ///
    /// Returns [`PathError::AtRoot`] for an empty suffix.
    pub fn parent(&self) -> Result<Self, PathError> {
        if self.suffix.is_empty() {
            return Err(PathError::AtRoot);
        }
        let dir = self.suffix.rfind('/').map_or("", |i| {
            let head = self.suffix.get(..i).unwrap_or_default();
            if head.is_empty() { "/" } else { head }
        });
        Ok(Self {
            suffix: dir.to_owned(),
            root: self.root,
            destdir: self.destdir,
            directory: true,
        })
    }

    /// Append a relative (or absolute) path.
    ///
    /// # Errors
    ///
    /// Fails if the result escapes the root.
    pub fn append(&self, segment: &str) -> Result<Self, PathError> {
        let joined = if segment.starts_with('/') || !split_drive(segment).0.is_empty() {
            segment.to_owned()
        } else if self.suffix.is_empty() {
            segment.to_owned()
        } else {
            format!("{}/{segment}", self.suffix)
        };
        let normal = normalize(&joined)?;
        if normal.path == ".." || normal.path.starts_with("../") {
            return Err(PathError::EscapesRoot(joined));
        }
        let root = if normal.path.starts_with('/') {
            Root::Absolute
        } else {
            self.root
        };
        Ok(Self {
            suffix: format!("{}{}", normal.drive, normal.path),
            root,
            destdir: self.destdir,
            directory: normal.is_dir || normal.path.is_empty(),
        })
    }

    /// The extension of the final component, including the dot.
    #[must_use]
    pub fn ext(&self) -> &str {
        splitext(&self.suffix).1
    }

    /// Append `ext` to the final component.
    #[must_use]
    pub fn add_ext(&self, ext: &str) -> Self {
        Self {
            suffix: format!("{}{ext}", self.suffix),
            ..self.clone()
        }
    }

    /// Remove the extension, optionally replacing it.
    #[must_use]
    pub fn strip_ext(&self, replacement: Option<&str>) -> Self {
        let stem = splitext(&self.suffix).0;
        Self {
            suffix: format!("{stem}{}", replacement.unwrap_or_default()),
            ..self.clone()
        }
    }

    /// The final component.
    #[must_use]
    pub fn basename(&self) -> &str {
        self.suffix.rsplit('/').next().unwrap_or_default()
    }

    /// The components of the suffix.
    #[must_use]
    pub fn split(&self) -> Vec<&str> {
        if self.suffix.is_empty() {
            Vec::new()
        } else {
            self.suffix.split('/').collect()
        }
    }

    /// The same suffix relative to a different root.
    #[must_use]
    pub fn reroot(&self, root: Root) -> Self {
        Self {
            root,
            ..self.clone()
        }
    }

    /// Express this path relative to `start`, prefixed by `prefix`.
    ///
    /// Absolute paths are returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`PathError::RootMismatch`] when the roots differ.
    pub fn relpath(&self, start: &Self, prefix: &str) -> Result<String, PathError> {
        if self.root == Root::Absolute {
            return Ok(self.suffix.clone());
        }
        if self.root != start.root {
            return Err(PathError::RootMismatch {
                path: self.to_string(),
                start: start.to_string(),
            });
        }
        let ours = self.split();
        let theirs = start.split();
        let common = ours
            .iter()
            .zip(theirs.iter())
            .take_while(|(a, b)| a == b)
            .count();
        let mut parts: Vec<&str> = theirs.iter().skip(common).map(|_| "..").collect();
        parts.extend(ours.iter().skip(common));
        let rel = if parts.is_empty() {
            ".".to_owned()
        } else {
            parts.join("/")
        };
        Ok(match (prefix.is_empty(), rel.as_str()) {
            (true, _) => rel,
            (false, ".") => prefix.to_owned(),
            (false, _) => format!("{}/{rel}", prefix.trim_end_matches('/')),
        })
    }

    /// Resolve this path using a backend's root spellings.
    ///
    /// Roots without a spelling produce a bare relative path (`.` when the
    /// suffix is empty). When `executable` is set, a bare program name in the
    /// current directory is prefixed with `./` so the shell does not search
    /// `PATH` for it.
    #[must_use]
    pub fn realize(&self, vars: &PathVars, executable: bool) -> SafeStr {
        let (mut base, separate) = if self.root == Root::Absolute {
            (None, false)
        } else {
            (vars.get(self.root).cloned(), true)
        };
        if executable && base.is_none() && !self.suffix.contains('/') {
            base = Some(SafeStr::text("."));
        }
        if self.destdir
            && let Some(destdir) = vars.destdir()
        {
            base = Some(match base {
                None => destdir.clone(),
                Some(root) => concat(destdir.clone(), root),
            });
        }
        match base {
            None if self.suffix.is_empty() => SafeStr::text("."),
            None => SafeStr::text(self.suffix.clone()),
            Some(root) if self.suffix.is_empty() => root,
            Some(root) if separate => concat(root, format!("/{}", self.suffix)),
            Some(root) => concat(root, self.suffix.clone()),
        }
    }

    /// Resolve this path against concrete directories.
    ///
    /// # Errors
    ///
    /// Returns [`PathError::UnknownBase`] if `bases` lacks this path's root.
    pub fn string(&self, bases: &BaseDirs) -> Result<Utf8PathBuf, PathError> {
        if self.root == Root::Absolute {
            return Ok(Utf8PathBuf::from(&self.suffix));
        }
        let base = bases
            .get(&self.root)
            .ok_or(PathError::UnknownBase(self.root))?;
        Ok(if self.suffix.is_empty() {
            base.clone()
        } else {
            base.join(&self.suffix)
        })
    }

    fn key(&self) -> (Root, &str, bool) {
        (self.root, self.suffix.as_str(), self.destdir)
    }
}

impl PartialEq for Path {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Path {}

impl Hash for Path {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl PartialOrd for Path {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Path {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.destdir {
            f.write_str("$(DESTDIR)")?;
        }
        match self.root {
            Root::Absolute => f.write_str(&self.suffix),
            Root::BuildDir if self.suffix.is_empty() => f.write_str("."),
            Root::BuildDir => f.write_str(&self.suffix),
            root if self.suffix.is_empty() => write!(f, "$({root})"),
            root => write!(f, "$({root})/{}", self.suffix),
        }
    }
}

/// Map a built or source file to its installed location under `root`.
///
/// Source files keep only their file name; build files keep their path
/// relative to the build directory.
///
/// # Errors
///
/// Returns [`PathError::AbsoluteInstall`] for absolute paths.
pub fn install_path(path: &Path, root: Root) -> Result<Path, PathError> {
    if path.root == Root::Absolute {
        return Err(PathError::AbsoluteInstall(path.suffix.clone()));
    }
    let suffix = match path.root {
        Root::SrcDir if path.directory => "",
        Root::SrcDir => path.basename(),
        _ => path.suffix.as_str(),
    };
    Path::build(suffix, root, true, Some(path.directory))
}

/// The longest common directory prefix of `paths`, if they share a root.
#[must_use]
pub fn commonprefix(paths: &[Path]) -> Option<Path> {
    let first = paths.first()?;
    if paths.iter().any(|p| p.root != first.root) {
        return None;
    }
    let split: Vec<Vec<&str>> = paths.iter().map(Path::split).collect();
    let lo = split.iter().min()?;
    let hi = split.iter().max()?;
    let common = lo.iter().zip(hi.iter()).take_while(|(a, b)| a == b).count();
    let prefix = lo.iter().take(common).copied().collect::<Vec<_>>().join("/");
    Some(Path {
        suffix: prefix,
        root: first.root,
        destdir: false,
        directory: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn path(raw: &str, root: Root) -> Path {
        Path::new(raw, root).expect("valid path")
    }

    #[rstest]
    #[case("foo/./bar/../baz", "foo/baz")]
    #[case("foo\\bar", "foo/bar")]
    #[case(".", "")]
    #[case("foo/", "foo")]
    fn normalises_suffix(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(path(raw, Root::SrcDir).suffix(), expected);
    }

    #[rstest]
    fn absolute_input_forces_absolute_root() {
        let p = path("/usr/include", Root::SrcDir);
        assert_eq!(p.root(), Root::Absolute);
        assert_eq!(
            Path::new("usr", Root::Absolute),
            Err(PathError::NotAbsolute("usr".to_owned()))
        );
    }

    #[rstest]
    fn drive_letters_are_absolute() {
        let p = path("C:\\Windows", Root::BuildDir);
        assert_eq!(p.root(), Root::Absolute);
        assert_eq!(p.suffix(), "C:/Windows");
        assert!(Path::new("C:foo", Root::BuildDir).is_err());
    }

    #[rstest]
    fn cannot_escape_root() {
        assert!(matches!(
            Path::new("../foo", Root::SrcDir),
            Err(PathError::EscapesRoot(_))
        ));
    }

    #[rstest]
    fn parent_and_append() {
        let p = path("a/b/c.txt", Root::BuildDir);
        let parent = p.parent().expect("parent");
        assert_eq!(parent.suffix(), "a/b");
        assert!(parent.is_directory());
        assert_eq!(parent.append("d").expect("append").suffix(), "a/b/d");
        assert_eq!(path("", Root::BuildDir).parent(), Err(PathError::AtRoot));
    }

    #[rstest]
    #[case("foo.c", ".c")]
    #[case("dir.d/foo", "")]
    #[case(".hidden", "")]
    #[case("lib.tar.gz", ".gz")]
    fn extensions(#[case] raw: &str, #[case] ext: &str) {
        assert_eq!(path(raw, Root::SrcDir).ext(), ext);
    }

    #[rstest]
    fn strip_and_add_ext() {
        let p = path("src/foo.c", Root::SrcDir);
        assert_eq!(p.strip_ext(Some(".o")).suffix(), "src/foo.o");
        assert_eq!(p.strip_ext(None).add_ext(".d").suffix(), "src/foo.d");
    }

    #[rstest]
    fn relpath_between_siblings() {
        let p = path("a/b/c", Root::BuildDir);
        let start = path("a/d", Root::BuildDir);
        assert_eq!(p.relpath(&start, "").expect("relpath"), "../b/c");
        assert_eq!(
            path("a", Root::BuildDir).relpath(&path("a", Root::BuildDir), "x"),
            Ok("x".to_owned())
        );
        assert!(matches!(
            p.relpath(&path("a", Root::SrcDir), ""),
            Err(PathError::RootMismatch { .. })
        ));
    }

    #[rstest]
    fn realize_with_variables() {
        let vars = PathVars::new()
            .with_root(Root::SrcDir, SafeStr::literal("$(srcdir)"))
            .with_destdir(SafeStr::literal("$(DESTDIR)"))
            .with_root(Root::BinDir, SafeStr::literal("$(bindir)"));
        assert_eq!(
            path("foo.c", Root::SrcDir).realize(&vars, false),
            concat(SafeStr::literal("$(srcdir)"), "/foo.c")
        );
        assert_eq!(
            path("foo.o", Root::BuildDir).realize(&vars, false),
            SafeStr::text("foo.o")
        );
        assert_eq!(
            path("", Root::BuildDir).realize(&vars, false),
            SafeStr::text(".")
        );
        assert_eq!(
            path("prog", Root::BuildDir).realize(&vars, true),
            concat(".", "/prog")
        );
        let installed = install_path(&path("prog", Root::BuildDir), Root::BinDir).expect("install");
        assert_eq!(
            installed.realize(&vars, false),
            concat(
                concat(SafeStr::literal("$(DESTDIR)"), SafeStr::literal("$(bindir)")),
                "/prog"
            )
        );
    }

    #[rstest]
    fn install_path_of_source_keeps_basename() {
        let p = install_path(&path("include/foo.h", Root::SrcDir), Root::IncludeDir)
            .expect("install");
        assert_eq!(p.suffix(), "foo.h");
        assert_eq!(p.root(), Root::IncludeDir);
        assert!(p.has_destdir());
    }

    #[rstest]
    fn string_uses_base_dirs() {
        let mut bases = BaseDirs::new();
        bases.insert(Root::BuildDir, Utf8PathBuf::from("/tmp/build"));
        assert_eq!(
            path("a/b", Root::BuildDir).string(&bases),
            Ok(Utf8PathBuf::from("/tmp/build/a/b"))
        );
        assert_eq!(
            path("a", Root::SrcDir).string(&bases),
            Err(PathError::UnknownBase(Root::SrcDir))
        );
    }

    #[rstest]
    fn common_prefix() {
        let paths = [path("a/b/c", Root::SrcDir), path("a/b/d", Root::SrcDir)];
        assert_eq!(commonprefix(&paths).map(|p| p.suffix().to_owned()), Some("a/b".to_owned()));
        assert_eq!(commonprefix(&[]), None);
    }
}
