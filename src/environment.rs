//! The configuration a build is generated for.
//!
//! An [`Environment`] records the directories, install layout, toolchain
//! and tool overrides chosen at configure time. It is saved next to the
//! generated files so `gantry regenerate` reproduces the same output.

// miette/thiserror derive expansion trips `unused_assignments` on some
// toolchains; `expect` would fail where the lint does not fire.
// FIXME(rust-lang/rust#130021): remove once upstream is fixed.
#![allow(
    clippy::allow_attributes,
    clippy::allow_attributes_without_reason,
    unused_assignments
)]

use crate::graph::LinkMode;
use crate::path::{BaseDirs, Path, PathError, Root};
use crate::safe_str::SafeStr;
use crate::shell::{self, ShellError};
use crate::tools::{Compiler, DepsFlavor, Flavor, Linker, Tool};
use camino::Utf8PathBuf;
use indexmap::IndexMap;
use miette::Diagnostic;
use semver::Version;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variables captured at configure time.
pub const VARIABLES: [&str; 17] = [
    "CC",
    "CXX",
    "AR",
    "LD",
    "CPPFLAGS",
    "CFLAGS",
    "CXXFLAGS",
    "LDFLAGS",
    "LDLIBS",
    "ARFLAGS",
    "LIBFLAGS",
    "MAKE",
    "NINJA",
    "MSBUILD",
    "PLATFORM",
    "VISUALSTUDIOVERSION",
    "GANTRY",
];

/// Errors raised while looking up tools.
#[derive(Debug, Error, Diagnostic, PartialEq, Eq)]
pub enum EnvError {
    /// No helper tool has this name.
    #[error("unknown tool '{0}'")]
    #[diagnostic(code(gantry::env::unknown_tool))]
    UnknownTool(String),
    /// No compiler is known for this language.
    #[error("no compiler for language '{0}'")]
    #[diagnostic(
        code(gantry::env::unknown_language),
        help("supported languages are 'c' and 'c++'")
    )]
    UnknownLanguage(String),
    /// An override variable could not be split into words.
    #[error("invalid value for ${name}")]
    #[diagnostic(code(gantry::env::invalid_variable))]
    InvalidVariable {
        /// The variable name.
        name: String,
        /// The underlying parse failure.
        #[source]
        source: ShellError,
    },
}

/// The install layout.
///
/// `prefix` is absolute; every other directory is relative to the root it
/// is nested under (`bindir` under `exec_prefix`, `includedir` under
/// `prefix`, and so on) unless it is itself absolute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstallDirs {
    /// The install prefix.
    pub prefix: Utf8PathBuf,
    /// Architecture-dependent prefix, relative to `prefix`.
    pub exec_prefix: String,
    /// Programs, relative to `exec_prefix`.
    pub bindir: String,
    /// Libraries, relative to `exec_prefix`.
    pub libdir: String,
    /// Headers, relative to `prefix`.
    pub includedir: String,
    /// Data files, relative to `prefix`.
    pub datadir: String,
    /// Man pages, relative to `prefix`.
    pub mandir: String,
}

impl Default for InstallDirs {
    fn default() -> Self {
        Self {
            prefix: Utf8PathBuf::from("/usr/local"),
            exec_prefix: String::new(),
            bindir: "bin".to_owned(),
            libdir: "lib".to_owned(),
            includedir: "include".to_owned(),
            datadir: "share".to_owned(),
            mandir: "share/man".to_owned(),
        }
    }
}

impl InstallDirs {
    /// The value of an install root, expressed relative to its parent root.
    ///
    /// # Errors
    ///
    /// Fails if a configured directory escapes its parent or `prefix` is
    /// not absolute.
    pub fn path(&self, root: Root) -> Result<Option<Path>, PathError> {
        let (raw, parent) = match root {
            Root::Prefix => return Path::directory(self.prefix.as_str(), Root::Absolute).map(Some),
            Root::ExecPrefix => (&self.exec_prefix, Root::Prefix),
            Root::BinDir => (&self.bindir, Root::ExecPrefix),
            Root::LibDir => (&self.libdir, Root::ExecPrefix),
            Root::IncludeDir => (&self.includedir, Root::Prefix),
            Root::DataDir => (&self.datadir, Root::Prefix),
            Root::ManDir => (&self.mandir, Root::Prefix),
            Root::SrcDir | Root::BuildDir | Root::Absolute => return Ok(None),
        };
        Path::directory(raw, parent).map(Some)
    }
}

/// Everything a backend needs to know about the machine it targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Environment {
    /// The source directory.
    pub srcdir: Utf8PathBuf,
    /// The build directory.
    pub builddir: Utf8PathBuf,
    /// Where `install` copies files.
    #[serde(default)]
    pub install_dirs: InstallDirs,
    /// The command that re-runs the generator.
    pub generator: Vec<String>,
    /// The compiler family.
    #[serde(default)]
    pub toolchain: Flavor,
    /// The backend tool's version, when it could be determined.
    #[serde(default)]
    pub backend_version: Option<Version>,
    /// Captured environment variables (see [`VARIABLES`]).
    #[serde(default)]
    pub variables: IndexMap<String, String>,
}

impl Environment {
    /// An environment with default install directories and no overrides.
    #[must_use]
    pub fn new(srcdir: impl Into<Utf8PathBuf>, builddir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            srcdir: srcdir.into(),
            builddir: builddir.into(),
            install_dirs: InstallDirs::default(),
            generator: vec!["gantry".to_owned()],
            toolchain: Flavor::Cc,
            backend_version: None,
            variables: IndexMap::new(),
        }
    }

    /// Capture the variables in [`VARIABLES`] through `lookup`.
    #[must_use]
    pub fn with_variables(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        for name in VARIABLES {
            if let Some(value) = lookup(name) {
                self.variables.insert(name.to_owned(), value);
            }
        }
        self
    }

    /// A captured variable.
    #[must_use]
    pub fn getvar(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }

    fn words(&self, name: &str, default: &[&str]) -> Result<Vec<String>, EnvError> {
        match self.getvar(name) {
            Some(value) => shell::split(value).map_err(|source| EnvError::InvalidVariable {
                name: name.to_owned(),
                source,
            }),
            None => Ok(default.iter().map(|s| (*s).to_owned()).collect()),
        }
    }

    fn args(&self, names: &[&str], default: &[&str]) -> Result<Vec<SafeStr>, EnvError> {
        let mut out = Vec::new();
        for name in names {
            out.extend(self.words(name, &[])?.into_iter().map(SafeStr::Text));
        }
        if out.is_empty() && names.iter().all(|n| self.getvar(n).is_none()) {
            out.extend(default.iter().map(|s| SafeStr::text(*s)));
        }
        Ok(out)
    }

    /// The MSBuild platform name.
    #[must_use]
    pub fn platform(&self) -> &str {
        self.getvar("PLATFORM").unwrap_or("Win32")
    }

    /// The Visual Studio version projects are written for.
    #[must_use]
    pub fn vs_version(&self) -> &str {
        self.getvar("VISUALSTUDIOVERSION").unwrap_or("14.0")
    }

    /// Whether installed paths may be prefixed with `$(DESTDIR)`.
    #[must_use]
    pub fn supports_destdir(&self) -> bool {
        self.toolchain == Flavor::Cc
    }

    /// Concrete directories for every root.
    ///
    /// # Errors
    ///
    /// Fails if the install layout is invalid.
    pub fn base_dirs(&self) -> Result<BaseDirs, PathError> {
        let mut bases = BaseDirs::new();
        bases.insert(Root::SrcDir, self.srcdir.clone());
        bases.insert(Root::BuildDir, self.builddir.clone());
        for root in Root::INSTALL {
            if let Some(path) = self.install_dirs.path(root)? {
                let dir = path.string(&bases)?;
                bases.insert(root, dir);
            }
        }
        Ok(bases)
    }

    /// The compiler for `lang`.
    ///
    /// # Errors
    ///
    /// Fails for unsupported languages or malformed overrides.
    pub fn compiler(&self, lang: &str) -> Result<Compiler, EnvError> {
        let msvc = self.toolchain == Flavor::Msvc;
        let (name, var, default, flags) = match lang {
            "c" => ("cc", "CC", if msvc { "cl" } else { "cc" }, "CFLAGS"),
            "c++" => ("cxx", "CXX", if msvc { "cl" } else { "c++" }, "CXXFLAGS"),
            other => return Err(EnvError::UnknownLanguage(other.to_owned())),
        };
        Ok(Compiler {
            rule_name: name.to_owned(),
            command_var: name.to_owned(),
            command: self.words(var, &[default])?,
            flags_var: flags.to_lowercase(),
            global_args: self.args(&["CPPFLAGS", flags], &[])?,
            flavor: self.toolchain,
            deps_flavor: if msvc { DepsFlavor::Msvc } else { DepsFlavor::Gcc },
        })
    }

    /// The linker for `mode`, given the languages of its inputs.
    ///
    /// C++ inputs select the C++ driver; static libraries use the archiver.
    ///
    /// # Errors
    ///
    /// Fails for unsupported languages or malformed overrides.
    pub fn linker(&self, mode: LinkMode, langs: &[&str]) -> Result<Linker, EnvError> {
        if mode.is_archive() {
            return self.archiver();
        }
        let lang = if langs.contains(&"c++") { "c++" } else { "c" };
        let compiler = self.compiler(lang)?;
        let mode_args = match (self.toolchain, mode) {
            (Flavor::Cc, LinkMode::SharedLibrary | LinkMode::LoadableModule) => {
                vec![SafeStr::text("-shared")]
            }
            (Flavor::Msvc, LinkMode::SharedLibrary | LinkMode::LoadableModule) => {
                vec![SafeStr::text("/DLL")]
            }
            _ => Vec::new(),
        };
        let (rule_name, command_var, command) = match self.toolchain {
            Flavor::Cc => {
                let ld = self.words("LD", &[])?;
                if ld.is_empty() {
                    (
                        format!("{}_link", compiler.rule_name),
                        compiler.command_var,
                        compiler.command,
                    )
                } else {
                    ("ld_link".to_owned(), "ld".to_owned(), ld)
                }
            }
            Flavor::Msvc => ("link".to_owned(), "link".to_owned(), self.words("LD", &["link"])?),
        };
        Ok(Linker {
            rule_name,
            command_var,
            command,
            flags_var: "ldflags".to_owned(),
            libs_var: Some("ldlibs".to_owned()),
            mode,
            mode_args,
            global_args: self.args(&["LDFLAGS"], &[])?,
            global_libs: self.args(&["LDLIBS"], &[])?,
            flavor: self.toolchain,
        })
    }

    /// The static-library archiver.
    ///
    /// # Errors
    ///
    /// Fails for malformed overrides.
    pub fn archiver(&self) -> Result<Linker, EnvError> {
        let (name, flags_var, command, global_args) = match self.toolchain {
            Flavor::Cc => (
                "ar",
                "arflags",
                self.words("AR", &["ar"])?,
                self.args(&["ARFLAGS"], &["cr"])?,
            ),
            Flavor::Msvc => (
                "lib",
                "libflags",
                self.words("AR", &["lib"])?,
                self.args(&["LIBFLAGS"], &[])?,
            ),
        };
        Ok(Linker {
            rule_name: name.to_owned(),
            command_var: name.to_owned(),
            command,
            flags_var: flags_var.to_owned(),
            libs_var: None,
            mode: LinkMode::StaticLibrary,
            mode_args: Vec::new(),
            global_args,
            global_libs: Vec::new(),
            flavor: self.toolchain,
        })
    }

    /// A helper program by name.
    ///
    /// # Errors
    ///
    /// Returns [`EnvError::UnknownTool`] for unknown names.
    pub fn tool(&self, name: &str) -> Result<Tool, EnvError> {
        let command = match name {
            "mkdir_p" => vec!["mkdir".to_owned(), "-p".to_owned()],
            "touch" | "printf" | "echo" | "install" => vec![name.to_owned()],
            "cp" => vec!["cp".to_owned(), "-f".to_owned()],
            "symlink" => vec!["ln".to_owned(), "-sf".to_owned()],
            "rm" => vec!["rm".to_owned(), "-f".to_owned()],
            "make" => self.words("MAKE", &["make"])?,
            "ninja" => self.words("NINJA", &["ninja"])?,
            "msbuild" => self.words("MSBUILD", &["msbuild"])?,
            "gantry" => match self.getvar("GANTRY") {
                Some(_) => self.words("GANTRY", &[])?,
                None => self.generator.clone(),
            },
            other => return Err(EnvError::UnknownTool(other.to_owned())),
        };
        Ok(Tool {
            name: name.to_owned(),
            command_var: name.to_owned(),
            command,
        })
    }
}
