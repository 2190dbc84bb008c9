//! Integration tests for CLI execution using `assert_cmd`.
//!
//! These tests invoke the compiled binary against a copy of the sample
//! description and check the files `configure` and `regenerate` leave in the
//! build directory.

use anyhow::{Context, Result, ensure};
use assert_cmd::Command;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use tempfile::{TempDir, tempdir};

/// A temporary tree whose `src` directory holds the sample description.
fn source_tree() -> Result<TempDir> {
    let temp = tempdir().context("create temp dir")?;
    let srcdir = temp.path().join("src");
    fs::create_dir_all(&srcdir).context("create source directory")?;
    fs::copy("tests/data/hello.json", srcdir.join("build.gantry.json"))
        .context("copy sample description")?;
    Ok(temp)
}

#[rstest]
#[case("make", "Makefile")]
#[case("ninja", "build.ninja")]
#[case("msbuild", "project.sln")]
fn configure_writes_backend_files(#[case] backend: &str, #[case] expected: &str) -> Result<()> {
    let temp = source_tree()?;
    let mut cmd = Command::cargo_bin("gantry").context("locate gantry binary")?;
    cmd.current_dir(temp.path())
        .env("PATH", "")
        .args(["configure", "--backend", backend, "src", "build"])
        .assert()
        .success();
    let builddir = temp.path().join("build");
    ensure!(
        builddir.join(expected).is_file(),
        "configure should write {expected}"
    );
    ensure!(
        builddir.join(".gantry_config.json").is_file(),
        "configure should save its configuration"
    );
    Ok(())
}

#[rstest]
fn regenerate_rewrites_deleted_files() -> Result<()> {
    let temp = source_tree()?;
    Command::cargo_bin("gantry")
        .context("locate gantry binary")?
        .current_dir(temp.path())
        .args(["configure", "--backend", "ninja", "src", "build"])
        .assert()
        .success();
    let ninja = temp.path().join("build/build.ninja");
    fs::remove_file(&ninja).context("remove build.ninja")?;

    Command::cargo_bin("gantry")
        .context("locate gantry binary")?
        .current_dir(temp.path())
        .args(["-C", "build", "regenerate", "."])
        .assert()
        .success();
    let text = fs::read_to_string(&ninja).context("read regenerated build.ninja")?;
    ensure!(
        text.contains("build hello: cc_link"),
        "regenerated file should link hello, got:\n{text}"
    );
    Ok(())
}

#[rstest]
#[case("make", "Makefile")]
#[case("ninja", "build.ninja")]
fn regenerate_reproduces_configured_output(
    #[case] backend: &str,
    #[case] file: &str,
) -> Result<()> {
    let temp = source_tree()?;
    Command::cargo_bin("gantry")
        .context("locate gantry binary")?
        .current_dir(temp.path())
        .args(["configure", "--backend", backend, "src", "build"])
        .assert()
        .success();
    let path = temp.path().join("build").join(file);
    let configured = fs::read(&path).with_context(|| format!("read configured {file}"))?;

    Command::cargo_bin("gantry")
        .context("locate gantry binary")?
        .current_dir(temp.path())
        .args(["-C", "build", "regenerate", "."])
        .assert()
        .success();
    let regenerated = fs::read(&path).with_context(|| format!("read regenerated {file}"))?;
    ensure!(
        configured == regenerated,
        "regenerating changed {file}:\n--- configured\n{}\n--- regenerated\n{}",
        String::from_utf8_lossy(&configured),
        String::from_utf8_lossy(&regenerated),
    );
    Ok(())
}

#[rstest]
fn configure_fails_without_description() -> Result<()> {
    let temp = tempdir().context("create temp dir")?;
    fs::create_dir_all(temp.path().join("src")).context("create source directory")?;
    Command::cargo_bin("gantry")
        .context("locate gantry binary")?
        .current_dir(temp.path())
        .args(["configure", "src", "build"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("build.gantry.json"));
    Ok(())
}

#[rstest]
fn regenerate_fails_in_unconfigured_directory() -> Result<()> {
    let temp = tempdir().context("create temp dir")?;
    Command::cargo_bin("gantry")
        .context("locate gantry binary")?
        .current_dir(temp.path())
        .args(["regenerate", "."])
        .assert()
        .failure()
        .stderr(predicate::str::contains("runner failed"));
    Ok(())
}

#[rstest]
fn relative_prefix_is_rejected() -> Result<()> {
    let temp = source_tree()?;
    Command::cargo_bin("gantry")
        .context("locate gantry binary")?
        .current_dir(temp.path())
        .args(["configure", "--prefix", "usr", "src", "build"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("absolute"));
    Ok(())
}
