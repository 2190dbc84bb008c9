//! MSBuild project files.
//!
//! Linked binaries become Visual C++ projects (`.vcxproj`) that let the
//! Microsoft.Cpp targets drive `cl` and `link`. Everything else becomes a
//! plain `.proj` whose `Build` target runs a list of MSBuild tasks.

use super::syntax::{Element, Syntax, path_vars, textify, textify_each};
use super::uuid_map::braced;
use crate::backend::EmitError;
use crate::graph::LinkMode;
use crate::path::PathVars;
use crate::safe_str::SafeStr;
use camino::Utf8PathBuf;
use uuid::Uuid;

const XMLNS: &str = "http://schemas.microsoft.com/developer/msbuild/2003";
const CONFIGURATION: &str = "Debug";

/// Solution-wide settings shared by every project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    version: String,
    platform: String,
    srcdir: String,
}

impl Settings {
    /// Settings for Visual Studio `version` building for `platform`.
    #[must_use]
    pub fn new(version: &str, platform: &str, srcdir: &str) -> Self {
        Self {
            version: version.to_owned(),
            platform: platform.to_owned(),
            srcdir: srcdir.to_owned(),
        }
    }

    /// The solution configuration, e.g. `Debug|Win32`.
    #[must_use]
    pub fn config(&self) -> String {
        format!("{CONFIGURATION}|{}", self.platform)
    }

    /// The C++ toolset matching the Visual Studio version (`14.0` is
    /// `v140`).
    #[must_use]
    pub fn toolset(&self) -> String {
        format!("v{}", self.version.replace('.', ""))
    }
}

/// Options for one `ClCompile` item, or for all of them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClOptions {
    /// Header search directories.
    pub includes: Vec<SafeStr>,
    /// Other compiler options.
    pub options: Vec<SafeStr>,
}

impl ClOptions {
    fn elements(&self, vars: &PathVars, target: &mut Element) -> Result<(), EmitError> {
        if !self.includes.is_empty() {
            let dirs = textify_each(vars, &self.includes, Syntax::Item, ";")?;
            target.push(Element::text(
                "AdditionalIncludeDirectories",
                format!("{dirs};%(AdditionalIncludeDirectories)"),
            ));
        }
        if !self.options.is_empty() {
            let opts = textify_each(vars, &self.options, Syntax::Options, " ")?;
            target.push(Element::text(
                "AdditionalOptions",
                format!("{opts} %(AdditionalOptions)"),
            ));
        }
        Ok(())
    }
}

/// Whether a source creates or uses a precompiled header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PchMode {
    /// `/Yc`: compiling the source writes the precompiled header.
    Create,
    /// `/Yu`: the source is compiled against it.
    Use,
}

/// Precompiled-header settings of one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PchSettings {
    /// Create or use.
    pub mode: PchMode,
    /// The header's name as the sources include it.
    pub header: String,
    /// The precompiled header file.
    pub output: SafeStr,
}

impl PchSettings {
    fn elements(&self, vars: &PathVars, target: &mut Element) -> Result<(), EmitError> {
        let mode = match self.mode {
            PchMode::Create => "Create",
            PchMode::Use => "Use",
        };
        target.push(Element::text("PrecompiledHeader", mode));
        target.push(Element::text("PrecompiledHeaderFile", self.header.as_str()));
        target.push(Element::text(
            "PrecompiledHeaderOutputFile",
            textify(vars, &self.output, Syntax::Item)?,
        ));
        Ok(())
    }
}

/// A source file compiled by a Visual C++ project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClCompile {
    /// The source file.
    pub source: SafeStr,
    /// Where the object file goes, when the default would collide with
    /// another source's.
    pub object: Option<SafeStr>,
    /// Per-file options.
    pub options: ClOptions,
    /// Precompiled-header settings.
    pub pch: Option<PchSettings>,
}

/// A Visual C++ project for one linked binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VcxProject {
    /// What the project produces.
    pub mode: LinkMode,
    /// The binary.
    pub output: SafeStr,
    /// The import library of a DLL.
    pub import_lib: Option<SafeStr>,
    /// Sources to compile.
    pub files: Vec<ClCompile>,
    /// Options shared by every source.
    pub compile: ClOptions,
    /// Linker or librarian options.
    pub link_options: Vec<SafeStr>,
    /// Libraries and prebuilt objects to link.
    pub libs: Vec<SafeStr>,
}

impl VcxProject {
    const fn configuration_type(&self) -> &'static str {
        match self.mode {
            LinkMode::Executable => "Application",
            LinkMode::SharedLibrary | LinkMode::LoadableModule => "DynamicLibrary",
            LinkMode::StaticLibrary => "StaticLibrary",
        }
    }

    fn write(&self, settings: &Settings, root: &mut Element) -> Result<(), EmitError> {
        let vars = path_vars();
        root.push(cpp_import("Microsoft.Cpp.default.props"));
        root.push(
            Element::new("PropertyGroup")
                .attr("Label", "Configuration")
                .child(Element::text("ConfigurationType", self.configuration_type()))
                .child(Element::text("UseDebugLibraries", "true"))
                .child(Element::text("PlatformToolset", settings.toolset()))
                .child(Element::text("CharacterSet", "MultiByte")),
        );
        root.push(cpp_import("Microsoft.Cpp.props"));

        let target = textify(&vars, &self.output, Syntax::Item)?;
        let leaf = target.rsplit('\\').next().unwrap_or_default();
        let stem = leaf.rsplit_once('.').map_or(leaf, |(head, _)| head).to_owned();
        root.push(
            Element::new("PropertyGroup")
                .child(Element::text("OutDir", "$(SolutionDir)"))
                .child(Element::text("TargetName", stem))
                .child(Element::text("TargetPath", target)),
        );

        let mut definitions = Element::new("ItemDefinitionGroup");
        let mut cl = Element::new("ClCompile");
        self.compile.elements(&vars, &mut cl)?;
        if !cl.is_empty() {
            definitions.push(cl);
        }
        let mut link = Element::new(if self.mode.is_archive() { "Lib" } else { "Link" })
            .child(Element::text("OutputFile", "$(TargetPath)"));
        if let Some(import_lib) = &self.import_lib {
            link.push(Element::text(
                "ImportLibrary",
                textify(&vars, import_lib, Syntax::Item)?,
            ));
        }
        if !self.link_options.is_empty() {
            let opts = textify_each(&vars, &self.link_options, Syntax::Options, " ")?;
            link.push(Element::text(
                "AdditionalOptions",
                format!("{opts} %(AdditionalOptions)"),
            ));
        }
        if !self.libs.is_empty() {
            let libs = textify_each(&vars, &self.libs, Syntax::Item, ";")?;
            link.push(Element::text(
                "AdditionalDependencies",
                format!("{libs};%(AdditionalDependencies)"),
            ));
        }
        definitions.push(link);
        root.push(definitions);

        let mut sources = Element::new("ItemGroup");
        for file in &self.files {
            let source = textify(&vars, &file.source, Syntax::Item)?;
            let mut item = Element::new("ClCompile").attr("Include", source);
            if let Some(object) = &file.object {
                item.push(Element::text(
                    "ObjectFileName",
                    textify(&vars, object, Syntax::Item)?,
                ));
            }
            file.options.elements(&vars, &mut item)?;
            if let Some(pch) = &file.pch {
                pch.elements(&vars, &mut item)?;
            }
            sources.push(item);
        }
        root.push(sources);
        root.push(cpp_import("Microsoft.Cpp.Targets"));
        Ok(())
    }
}

fn cpp_import(name: &str) -> Element {
    Element::new("Import").attr("Project", format!("$(VCTargetsPath)\\{name}"))
}

/// One step of a task project's `Build` target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    /// Run a command through `cmd.exe` in the output directory.
    Exec {
        /// The command line.
        command: SafeStr,
        /// Environment variables set for the command.
        env: Vec<(String, SafeStr)>,
    },
    /// Copy one file.
    Copy {
        /// The file to copy.
        source: SafeStr,
        /// Where to copy it.
        destination: SafeStr,
    },
    /// Replace a file's contents with the given lines.
    WriteLines {
        /// The file to write.
        file: SafeStr,
        /// One entry per line.
        lines: Vec<String>,
    },
}

impl Task {
    fn element(&self, vars: &PathVars) -> Result<Element, EmitError> {
        Ok(match self {
            Self::Exec { command, env } => {
                let mut exec = Element::new("Exec")
                    .attr("Command", textify(vars, command, Syntax::Command)?)
                    .attr("WorkingDirectory", "$(OutDir)");
                if !env.is_empty() {
                    let mut pairs = Vec::with_capacity(env.len());
                    for (name, value) in env {
                        pairs.push(format!("{name}={}", textify(vars, value, Syntax::Item)?));
                    }
                    exec = exec.attr("EnvironmentVariables", pairs.join(";"));
                }
                exec
            }
            Self::Copy {
                source,
                destination,
            } => Element::new("Copy")
                .attr("SourceFiles", textify(vars, source, Syntax::Item)?)
                .attr("DestinationFiles", textify(vars, destination, Syntax::Item)?),
            Self::WriteLines { file, lines } => {
                let escaped: Vec<String> = lines
                    .iter()
                    .map(|line| textify(vars, &SafeStr::text(line.as_str()), Syntax::Item))
                    .collect::<Result<_, _>>()?;
                Element::new("WriteLinesToFile")
                    .attr("File", textify(vars, file, Syntax::Item)?)
                    .attr("Lines", escaped.join(";"))
                    .attr("Overwrite", "true")
            }
        })
    }
}

/// A project whose `Build` target runs MSBuild tasks.
///
/// With no tasks it only carries dependencies, grouping other projects.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TaskProject {
    /// Files the tasks read; with `outputs`, lets MSBuild skip up-to-date
    /// targets.
    pub inputs: Vec<SafeStr>,
    /// Files the tasks produce.
    pub outputs: Vec<SafeStr>,
    /// Directories created before the tasks run.
    pub directories: Vec<SafeStr>,
    /// The tasks, run in order.
    pub tasks: Vec<Task>,
}

impl TaskProject {
    fn write(&self, root: &mut Element) -> Result<(), EmitError> {
        let vars = path_vars();
        root.push(Element::new("PropertyGroup").child(Element::text("OutDir", "$(SolutionDir)")));
        let mut target = Element::new("Target").attr("Name", "Build");
        if !self.inputs.is_empty() && !self.outputs.is_empty() {
            target = target
                .attr("Inputs", textify_each(&vars, &self.inputs, Syntax::Item, ";")?)
                .attr("Outputs", textify_each(&vars, &self.outputs, Syntax::Item, ";")?);
        }
        if !self.tasks.is_empty() {
            let mut dirs = vec![SafeStr::literal("$(OutDir)")];
            dirs.extend(self.directories.iter().cloned());
            target.push(
                Element::new("MakeDir")
                    .attr("Directories", textify_each(&vars, &dirs, Syntax::Item, ";")?),
            );
        }
        for task in &self.tasks {
            target.push(task.element(&vars)?);
        }
        root.push(target);
        Ok(())
    }
}

/// What a project builds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectKind {
    /// See [`VcxProject`].
    Vcx(VcxProject),
    /// See [`TaskProject`].
    Tasks(TaskProject),
}

/// A project in the solution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    /// The project name, unique within the solution.
    pub name: String,
    /// The project GUID.
    pub uuid: Uuid,
    /// GUIDs of projects that must be built first.
    pub dependencies: Vec<Uuid>,
    /// What the project builds.
    pub kind: ProjectKind,
    settings: Settings,
}

impl Project {
    /// A project with no dependencies.
    #[must_use]
    pub fn new(name: &str, uuid: Uuid, settings: &Settings, kind: ProjectKind) -> Self {
        Self {
            name: name.to_owned(),
            uuid,
            dependencies: Vec::new(),
            kind,
            settings: settings.clone(),
        }
    }

    /// Record a dependency once.
    pub fn depend_on(&mut self, uuid: Uuid) {
        if uuid != self.uuid && !self.dependencies.contains(&uuid) {
            self.dependencies.push(uuid);
        }
    }

    /// The project file, relative to the solution directory.
    #[must_use]
    pub fn path(&self) -> Utf8PathBuf {
        let ext = match self.kind {
            ProjectKind::Vcx(_) => "vcxproj",
            ProjectKind::Tasks(_) => "proj",
        };
        Utf8PathBuf::from(&self.name).join(format!("{}.{ext}", self.name))
    }

    fn real_platform(&self) -> &str {
        match (&self.kind, self.settings.platform.as_str()) {
            (ProjectKind::Vcx(_), "x86") => "Win32",
            (_, platform) => platform,
        }
    }

    /// The project configuration the solution configuration maps to.
    #[must_use]
    pub fn real_config(&self) -> String {
        format!("{CONFIGURATION}|{}", self.real_platform())
    }

    /// Render the project file.
    ///
    /// # Errors
    ///
    /// Fails if a value cannot be represented in MSBuild syntax.
    pub fn write(&self) -> Result<String, EmitError> {
        let platform = self.real_platform().to_owned();
        let mut root = Element::new("Project")
            .attr("DefaultTargets", "Build")
            .attr("ToolsVersion", self.settings.version.as_str())
            .attr("xmlns", XMLNS)
            .child(
                Element::new("ItemGroup").attr("Label", "ProjectConfigurations").child(
                    Element::new("ProjectConfiguration")
                        .attr("Include", self.real_config())
                        .child(Element::text("Configuration", CONFIGURATION))
                        .child(Element::text("Platform", platform.as_str())),
                ),
            );
        let srcdir = textify(
            &path_vars(),
            &SafeStr::text(self.settings.srcdir.replace('/', "\\")),
            Syntax::Item,
        )?;
        root.push(
            Element::new("PropertyGroup")
                .attr("Label", "Globals")
                .child(Element::text("ProjectGuid", braced(self.uuid)))
                .child(Element::text("RootNamespace", self.name.as_str()))
                .child(Element::text("Platform", platform))
                .child(Element::text("SourceDir", srcdir)),
        );
        match &self.kind {
            ProjectKind::Vcx(vcx) => vcx.write(&self.settings, &mut root)?,
            ProjectKind::Tasks(tasks) => tasks.write(&mut root)?,
        }
        Ok(root.document())
    }
}
