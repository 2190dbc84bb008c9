//! Runs of generated files with the real build tools.
//!
//! The sample project is generated into a temporary build directory next to
//! real source files, then handed to `make` or `ninja`: first as a dry run,
//! then as a real build whose program is executed. Each test is skipped when
//! a tool it needs is not installed.

mod common;

use anyhow::{Context, Result, ensure};
use common::{contents, environment, graph_from_data};
use gantry::backend::{self, Backend};
use rstest::rstest;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::{TempDir, tempdir};

const SOURCES: [(&str, &str); 5] = [
    (
        "src/main.c",
        "#include <stdio.h>\n#include \"hello.h\"\n\
         int main(void) { puts(GREETING); return greet(); }\n",
    ),
    ("src/util.c", "int greet(void) { return 0; }\n"),
    ("include/hello.h", "int greet(void);\n"),
    ("tests/run.sh", "#!/bin/sh\nexit 0\n"),
    ("build.gantry.json", ""),
];

fn tool_available(program: &str) -> bool {
    Command::new(program)
        .arg("--version")
        .output()
        .is_ok_and(|out| out.status.success())
}

fn utf8(path: &Path) -> Result<&str> {
    path.to_str().context("temporary path is not UTF-8")
}

/// Lay out a source tree and generate `backend`'s file into its build
/// directory, returning the tree and the build directory.
fn generated_tree(backend: Backend, file: &str) -> Result<(TempDir, PathBuf)> {
    let root = tempdir().context("create temp dir")?;
    let srcdir = root.path().join("src");
    let builddir = root.path().join("build");
    let description = fs::read_to_string(
        Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/data/hello.json"),
    )
    .context("read sample description")?;
    for (name, text) in SOURCES {
        let path = srcdir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        let body = if text.is_empty() { description.as_str() } else { text };
        fs::write(&path, body).with_context(|| format!("write {}", path.display()))?;
    }
    fs::create_dir_all(&builddir).context("create build directory")?;

    let graph = graph_from_data("hello.json")?;
    let env = environment(utf8(&srcdir)?, utf8(&builddir)?);
    let files = backend::generate(backend, &graph, &env)?;
    let target = builddir.join(file);
    fs::write(&target, contents(&files, file)?)
        .with_context(|| format!("write {}", target.display()))?;
    Ok((root, builddir))
}

fn run_tool(program: &str, args: &[&str], dir: &Path) -> Result<String> {
    let out = Command::new(program)
        .args(args)
        .current_dir(dir)
        .output()
        .with_context(|| format!("spawn {program}"))?;
    ensure!(
        out.status.success(),
        "{program} failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8(out.stdout).context("stdout is not UTF-8")
}

#[rstest]
fn make_accepts_generated_makefile() -> Result<()> {
    if !tool_available("make") {
        eprintln!("skipping test: make must be installed for integration tests");
        return Ok(());
    }
    let (_root, builddir) = generated_tree(Backend::Make, "Makefile")?;
    let plan = run_tool("make", &["-n", "all"], &builddir)?;
    ensure!(plan.contains("obj/main.o"), "unexpected plan:\n{plan}");
    ensure!(plan.contains("-o 'hello'") || plan.contains("-o hello"), "{plan}");
    Ok(())
}

#[rstest]
fn ninja_accepts_generated_file() -> Result<()> {
    if !tool_available("ninja") {
        eprintln!("skipping test: ninja must be installed for integration tests");
        return Ok(());
    }
    let (_root, builddir) = generated_tree(Backend::Ninja, "build.ninja")?;
    let targets = run_tool("ninja", &["-t", "targets", "all"], &builddir)?;
    ensure!(targets.contains("hello: cc_link"), "unexpected targets:\n{targets}");
    let plan = run_tool("ninja", &["-n", "all"], &builddir)?;
    ensure!(plan.contains("hello"), "unexpected plan:\n{plan}");
    Ok(())
}

/// Names the first of `programs` that is not installed.
fn missing_tool<'a>(programs: &[&'a str]) -> Option<&'a str> {
    programs.iter().copied().find(|program| !tool_available(program))
}

#[rstest]
#[case(Backend::Make, "Makefile", "make")]
#[case(Backend::Ninja, "build.ninja", "ninja")]
fn generated_build_produces_working_program(
    #[case] backend: Backend,
    #[case] file: &str,
    #[case] program: &str,
) -> Result<()> {
    if let Some(missing) = missing_tool(&[program, "cc", "ar"]) {
        eprintln!("skipping test: {missing} must be installed for integration tests");
        return Ok(());
    }
    let (_root, builddir) = generated_tree(backend, file)?;
    run_tool(program, &["all"], &builddir)?;

    let out = Command::new(builddir.join("hello"))
        .output()
        .context("run built program")?;
    ensure!(
        out.status.success(),
        "hello failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    let stdout = String::from_utf8(out.stdout).context("stdout is not UTF-8")?;
    ensure!(stdout == "hi there\n", "unexpected output: {stdout:?}");
    Ok(())
}
