//! Toolchain capabilities.
//!
//! Compilers, linkers and helper programs are described by plain structs.
//! Backends read their fields (rule names, variable names, dependency-file
//! flavour) and ask them to build command lines from backend-specific
//! placeholders such as `$<` or `$in`.

use crate::graph::LinkMode;
use crate::path::Path;
use crate::safe_str::{SafeStr, concat};
use crate::shell::CommandLine;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// The compiler family a toolchain belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Flavor {
    /// GCC, Clang and compatible drivers.
    #[default]
    Cc,
    /// Microsoft Visual C++.
    Msvc,
}

/// How a compiler reports header dependencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepsFlavor {
    /// No dependency information.
    None,
    /// A Make-syntax depfile written next to the object (`-MMD -MF`).
    Gcc,
    /// `/showIncludes` lines on standard output.
    Msvc,
}

/// A compiler for one language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compiler {
    /// Name of the shared build rule (`cc`, `cxx`).
    pub rule_name: String,
    /// Name of the variable holding the command (`cc`).
    pub command_var: String,
    /// The command and any fixed leading arguments.
    pub command: Vec<String>,
    /// Name of the flags variable (`cflags`).
    pub flags_var: String,
    /// Options applied to every compile.
    pub global_args: Vec<SafeStr>,
    /// Compiler family.
    pub flavor: Flavor,
    /// Dependency reporting style.
    pub deps_flavor: DepsFlavor,
}

impl Compiler {
    /// Arguments that add `dir` to the header search path.
    #[must_use]
    pub fn include_dir(&self, dir: &Path) -> Vec<SafeStr> {
        let flag = match self.flavor {
            Flavor::Cc => "-I",
            Flavor::Msvc => "/I",
        };
        vec![concat(flag, dir)]
    }

    /// Arguments that compile against the precompiled header `pch`, built
    /// from `header`.
    ///
    /// GCC-style drivers find `pch` by stripping its extension, so it must
    /// sit next to where `header` would be looked up.
    #[must_use]
    pub fn use_pch(&self, pch: &Path, header: &Path) -> Vec<SafeStr> {
        match self.flavor {
            Flavor::Cc => vec![SafeStr::text("-include"), SafeStr::from(pch.strip_ext(None))],
            Flavor::Msvc => vec![concat("/Yu", header.basename()), concat("/Fp", pch)],
        }
    }

    /// Arguments that precompile `header` (written in `lang`) into `pch`.
    #[must_use]
    pub fn create_pch(&self, lang: &str, header: &Path, pch: &Path) -> Vec<SafeStr> {
        match self.flavor {
            Flavor::Cc => vec![SafeStr::text("-x"), SafeStr::text(format!("{lang}-header"))],
            Flavor::Msvc => vec![concat("/Yc", header.basename()), concat("/Fp", pch)],
        }
    }

    /// Build the compile command.
    ///
    /// `deps` names the depfile for GCC-style compilers; for MSVC any value
    /// requests `/showIncludes` output.
    #[must_use]
    pub fn command(
        &self,
        cmd: SafeStr,
        input: SafeStr,
        output: SafeStr,
        args: SafeStr,
        deps: Option<SafeStr>,
    ) -> CommandLine {
        let mut words = vec![cmd];
        match self.flavor {
            Flavor::Cc => {
                words.push(args);
                if let Some(depfile) = deps {
                    words.extend([SafeStr::text("-MMD"), SafeStr::text("-MF"), depfile]);
                }
                words.extend([SafeStr::text("-c"), input, SafeStr::text("-o"), output]);
            }
            Flavor::Msvc => {
                words.extend([SafeStr::text("/nologo"), args]);
                if deps.is_some() {
                    words.push(SafeStr::text("/showIncludes"));
                }
                words.extend([SafeStr::text("/c"), input, concat("/Fo", output)]);
            }
        }
        CommandLine::Args(words)
    }
}

/// A linker, or an archiver for static libraries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Linker {
    /// Name of the shared build rule (`cc_link`, `ar`).
    pub rule_name: String,
    /// Name of the variable holding the command.
    pub command_var: String,
    /// The command and any fixed leading arguments.
    pub command: Vec<String>,
    /// Name of the flags variable (`ldflags`, `arflags`).
    pub flags_var: String,
    /// Name of the libraries variable; archivers have none.
    pub libs_var: Option<String>,
    /// The kind of output.
    pub mode: LinkMode,
    /// Options implied by the mode (`-shared`).
    pub mode_args: Vec<SafeStr>,
    /// Options applied to every link.
    pub global_args: Vec<SafeStr>,
    /// Libraries linked into everything.
    pub global_libs: Vec<SafeStr>,
    /// Toolchain family.
    pub flavor: Flavor,
}

impl Linker {
    /// Build the link (or archive) command.
    #[must_use]
    pub fn command(
        &self,
        cmd: SafeStr,
        input: SafeStr,
        output: SafeStr,
        args: SafeStr,
        libs: Option<SafeStr>,
    ) -> CommandLine {
        let words = match (self.flavor, self.mode.is_archive()) {
            (Flavor::Cc, true) => vec![cmd, args, output, input],
            (Flavor::Msvc, true) => vec![
                cmd,
                SafeStr::text("/nologo"),
                args,
                concat("/OUT:", output),
                input,
            ],
            (Flavor::Cc, false) => {
                let mut words = vec![cmd, args, input];
                words.extend(libs);
                words.extend([SafeStr::text("-o"), output]);
                words
            }
            (Flavor::Msvc, false) => {
                let mut words = vec![cmd, SafeStr::text("/nologo"), args, input];
                words.extend(libs);
                words.push(concat("/OUT:", output));
                words
            }
        };
        CommandLine::Args(words)
    }

    /// Arguments that link `lib` in its entirety.
    #[must_use]
    pub fn whole_archive(&self, lib: &Path) -> Vec<SafeStr> {
        match self.flavor {
            Flavor::Cc => vec![
                SafeStr::text("-Wl,--whole-archive"),
                SafeStr::from(lib),
                SafeStr::text("-Wl,--no-whole-archive"),
            ],
            Flavor::Msvc => vec![concat("/WHOLEARCHIVE:", lib)],
        }
    }

    /// Arguments that name the import library of a DLL.
    #[must_use]
    pub fn import_lib(&self, lib: &Path) -> Vec<SafeStr> {
        match self.flavor {
            Flavor::Cc => vec![concat("-Wl,--out-implib=", lib)],
            Flavor::Msvc => vec![concat("/IMPLIB:", lib)],
        }
    }
}

/// A helper program used by generated recipes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tool {
    /// The tool's name (`mkdir_p`).
    pub name: String,
    /// Name of the variable holding the command.
    pub command_var: String,
    /// The command and any fixed leading arguments.
    pub command: Vec<String>,
}

impl Tool {
    /// Prefix `args` with a reference to this tool's command.
    #[must_use]
    pub fn invoke(cmd: SafeStr, args: impl IntoIterator<Item = SafeStr>) -> CommandLine {
        let mut words = vec![cmd];
        words.extend(args);
        CommandLine::Args(words)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::Root;
    use rstest::rstest;

    fn gcc() -> Compiler {
        Compiler {
            rule_name: "cc".into(),
            command_var: "cc".into(),
            command: vec!["cc".into()],
            flags_var: "cflags".into(),
            global_args: Vec::new(),
            flavor: Flavor::Cc,
            deps_flavor: DepsFlavor::Gcc,
        }
    }

    #[rstest]
    fn gcc_compile_writes_depfile() {
        let line = gcc().command(
            SafeStr::literal("$cc"),
            SafeStr::literal("$in"),
            SafeStr::literal("$out"),
            SafeStr::literal("$cflags"),
            Some(concat(SafeStr::literal("$out"), ".d")),
        );
        let CommandLine::Args(words) = line else {
            panic!("expected argument list");
        };
        assert_eq!(words.len(), 9);
        assert_eq!(words.get(2), Some(&SafeStr::text("-MMD")));
    }

    #[rstest]
    fn msvc_compile_uses_show_includes() {
        let compiler = Compiler {
            flavor: Flavor::Msvc,
            deps_flavor: DepsFlavor::Msvc,
            ..gcc()
        };
        let CommandLine::Args(words) = compiler.command(
            SafeStr::literal("$cxx"),
            SafeStr::literal("$in"),
            SafeStr::literal("$out"),
            SafeStr::literal("$cxxflags"),
            Some(SafeStr::text("")),
        ) else {
            panic!("expected argument list");
        };
        assert!(words.contains(&SafeStr::text("/showIncludes")));
        assert_eq!(
            words.last(),
            Some(&concat("/Fo", SafeStr::literal("$out")))
        );
    }

    #[rstest]
    fn gcc_pch_is_included_by_stem() {
        let header = Path::new("include/pch.hpp", Root::SrcDir).expect("path");
        let pch = Path::new("pch.hpp.gch", Root::BuildDir).expect("path");
        let stem = Path::new("pch.hpp", Root::BuildDir).expect("path");
        assert_eq!(
            gcc().use_pch(&pch, &header),
            vec![SafeStr::text("-include"), SafeStr::from(stem)]
        );
        assert_eq!(
            gcc().create_pch("c++", &header, &pch),
            vec![SafeStr::text("-x"), SafeStr::text("c++-header")]
        );
    }

    #[rstest]
    fn msvc_pch_names_header_and_output() {
        let compiler = Compiler {
            flavor: Flavor::Msvc,
            deps_flavor: DepsFlavor::Msvc,
            ..gcc()
        };
        let header = Path::new("include/pch.hpp", Root::SrcDir).expect("path");
        let pch = Path::new("pch.pch", Root::BuildDir).expect("path");
        assert_eq!(
            compiler.use_pch(&pch, &header),
            vec![concat("/Yu", "pch.hpp"), concat("/Fp", &pch)]
        );
        assert_eq!(
            compiler.create_pch("c++", &header, &pch),
            vec![concat("/Yc", "pch.hpp"), concat("/Fp", &pch)]
        );
    }

    #[rstest]
    fn include_dirs_are_prefixed() {
        let dir = Path::new("include", Root::SrcDir).expect("path");
        assert_eq!(gcc().include_dir(&dir), vec![concat("-I", &dir)]);
    }
}
