//! The Visual Studio `.sln` file.
//!
//! A solution is a flat list of projects with their build-order
//! dependencies, followed by a `Global` block mapping every project onto
//! the single configuration gantry generates.

use super::project::Project;
use super::uuid_map::braced;
use uuid::Uuid;

/// One nested `Name(arg) = value` block of a solution, closed by
/// `EndName`.
struct Block {
    name: &'static str,
    arg: Option<String>,
    value: Option<String>,
    lines: Vec<String>,
    children: Vec<Block>,
}

impl Block {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            arg: None,
            value: None,
            lines: Vec::new(),
            children: Vec::new(),
        }
    }

    fn section(name: &'static str, arg: &str, when: &str) -> Self {
        Self {
            arg: Some(arg.to_owned()),
            value: Some(when.to_owned()),
            ..Self::new(name)
        }
    }

    fn write(&self, out: &mut String, depth: usize) {
        let indent = "\t".repeat(depth);
        out.push_str(&indent);
        out.push_str(self.name);
        if let Some(arg) = &self.arg {
            out.push_str(&format!("({arg})"));
        }
        if let Some(value) = &self.value {
            out.push_str(&format!(" = {value}"));
        }
        out.push('\n');
        for line in &self.lines {
            out.push_str(&format!("{indent}\t{line}\n"));
        }
        for child in &self.children {
            child.write(out, depth + 1);
        }
        out.push_str(&format!("{indent}End{}\n", self.name));
    }
}

/// A solution: the projects it builds, default project first.
#[derive(Debug)]
pub struct Solution {
    uuid: Uuid,
    projects: Vec<Project>,
    config: String,
}

impl Solution {
    /// An empty solution identified by `uuid`.
    #[must_use]
    pub fn new(uuid: Uuid, config: impl Into<String>) -> Self {
        Self {
            uuid,
            projects: Vec::new(),
            config: config.into(),
        }
    }

    /// Add a project.
    pub fn push(&mut self, project: Project) {
        self.projects.push(project);
    }

    /// The project named `name`.
    #[must_use]
    pub fn project(&self, name: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.name == name)
    }

    /// The project named `name`, for adding dependencies.
    pub fn project_mut(&mut self, name: &str) -> Option<&mut Project> {
        self.projects.iter_mut().find(|p| p.name == name)
    }

    /// Every project, in solution order.
    #[must_use]
    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    /// Move the project named `name` to the front, making it the startup
    /// project in Visual Studio.
    pub fn set_default(&mut self, name: &str) {
        if let Some(pos) = self.projects.iter().position(|p| p.name == name) {
            let project = self.projects.remove(pos);
            self.projects.insert(0, project);
        }
    }

    /// Render the `.sln` file.
    #[must_use]
    pub fn write(&self) -> String {
        let mut out = String::from(concat!(
            "Microsoft Visual Studio Solution File, Format Version 12.00\n",
            "# Visual Studio 14\n",
            "VisualStudioVersion = 14.0.22609.0\n",
            "MinimumVisualStudioVersion = 10.0.40219.1\n",
        ));
        let sln_uuid = braced(self.uuid);
        for project in &self.projects {
            let mut block = Block::new("Project");
            block.arg = Some(format!("\"{sln_uuid}\""));
            block.value = Some(format!(
                "\"{}\", \"{}\", \"{}\"",
                project.name,
                project.path().as_str().replace('/', "\\"),
                braced(project.uuid),
            ));
            if !project.dependencies.is_empty() {
                let mut deps =
                    Block::section("ProjectSection", "ProjectDependencies", "postProject");
                deps.lines = project
                    .dependencies
                    .iter()
                    .map(|&dep| format!("{0} = {0}", braced(dep)))
                    .collect();
                block.children.push(deps);
            }
            block.write(&mut out, 0);
        }

        let mut global = Block::new("Global");
        let mut configs =
            Block::section("GlobalSection", "SolutionConfigurationPlatforms", "preSolution");
        configs.lines.push(format!("{0} = {0}", self.config));
        global.children.push(configs);

        let mut project_configs =
            Block::section("GlobalSection", "ProjectConfigurationPlatforms", "postSolution");
        for project in &self.projects {
            let id = braced(project.uuid);
            let real = project.real_config();
            project_configs.lines.extend([
                format!("{id}.{}.ActiveCfg = {real}", self.config),
                format!("{id}.{}.Build.0 = {real}", self.config),
            ]);
        }
        global.children.push(project_configs);

        let mut properties = Block::section("GlobalSection", "SolutionProperties", "preSolution");
        properties.lines.push("HideSolutionNode = FALSE".to_owned());
        global.children.push(properties);
        global.write(&mut out, 0);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::msbuild::project::{ProjectKind, Settings, TaskProject};
    use rstest::rstest;

    fn uuid(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    fn noop(name: &str, id: u128, settings: &Settings) -> Project {
        Project::new(name, uuid(id), settings, ProjectKind::Tasks(TaskProject::default()))
    }

    #[rstest]
    fn writes_projects_and_configurations() {
        let settings = Settings::new("14.0", "Win32", "/src");
        let mut sln = Solution::new(uuid(1), settings.config());
        let mut app = noop("app", 2, &settings);
        app.dependencies.push(uuid(3));
        sln.push(app);
        sln.push(noop("lib", 3, &settings));
        sln.set_default("lib");

        let text = sln.write();
        let sln_id = braced(uuid(1));
        let app_id = braced(uuid(2));
        let lib_id = braced(uuid(3));
        let expected = format!(
            "Microsoft Visual Studio Solution File, Format Version 12.00\n\
             # Visual Studio 14\n\
             VisualStudioVersion = 14.0.22609.0\n\
             MinimumVisualStudioVersion = 10.0.40219.1\n\
             Project(\"{sln_id}\") = \"lib\", \"lib\\lib.proj\", \"{lib_id}\"\n\
             EndProject\n\
             Project(\"{sln_id}\") = \"app\", \"app\\app.proj\", \"{app_id}\"\n\
             \tProjectSection(ProjectDependencies) = postProject\n\
             \t\t{lib_id} = {lib_id}\n\
             \tEndProjectSection\n\
             EndProject\n\
             Global\n\
             \tGlobalSection(SolutionConfigurationPlatforms) = preSolution\n\
             \t\tDebug|Win32 = Debug|Win32\n\
             \tEndGlobalSection\n\
             \tGlobalSection(ProjectConfigurationPlatforms) = postSolution\n\
             \t\t{lib_id}.Debug|Win32.ActiveCfg = Debug|Win32\n\
             \t\t{lib_id}.Debug|Win32.Build.0 = Debug|Win32\n\
             \t\t{app_id}.Debug|Win32.ActiveCfg = Debug|Win32\n\
             \t\t{app_id}.Debug|Win32.Build.0 = Debug|Win32\n\
             \tEndGlobalSection\n\
             \tGlobalSection(SolutionProperties) = preSolution\n\
             \t\tHideSolutionNode = FALSE\n\
             \tEndGlobalSection\n\
             EndGlobal\n"
        );
        assert_eq!(text, expected);
    }

    #[rstest]
    fn set_default_ignores_unknown_names() {
        let settings = Settings::new("14.0", "x64", "/src");
        let mut sln = Solution::new(uuid(1), settings.config());
        sln.push(noop("a", 2, &settings));
        sln.set_default("missing");
        assert_eq!(sln.projects().len(), 1);
        assert!(sln.project("a").is_some());
    }
}
