//! Unit tests for the runner's path handling and file output.

use super::*;
use camino::Utf8PathBuf;
use rstest::{fixture, rstest};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const HELLO: &str = r#"{
    "gantry_version": "1.0.0",
    "project": "hello",
    "edges": [
        {
            "outputs": [{"path": "hello.o"}],
            "rule": {"kind": "compile", "source": "hello.c", "lang": "c"}
        },
        {
            "outputs": [{"path": "hello"}],
            "rule": {"kind": "link", "mode": "executable", "files": [{"path": "hello.o"}]}
        }
    ]
}"#;

fn cli(directory: Option<&str>, command: Commands) -> Cli {
    Cli {
        directory: directory.map(PathBuf::from),
        verbose: false,
        command,
    }
}

fn configure_command(backend: Backend, srcdir: &Path, builddir: &Path) -> Commands {
    Commands::Configure(ConfigureArgs {
        backend,
        toolchain: crate::tools::Flavor::Cc,
        prefix: None,
        srcdir: srcdir.to_path_buf(),
        builddir: builddir.to_path_buf(),
    })
}

#[fixture]
fn source_tree() -> TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join(DESCRIPTION_FILE), HELLO).expect("write description");
    dir
}

#[rstest]
#[case(None, "out", "out")]
#[case(Some("work"), "out", "work/out")]
#[case(Some("work"), "/tmp/out", "/tmp/out")]
fn resolve_cli_path_respects_directory(
    #[case] directory: Option<&str>,
    #[case] input: &str,
    #[case] expected: &str,
) {
    let cli = cli(
        directory,
        Commands::Regenerate {
            builddir: PathBuf::from(input),
        },
    );
    let resolved = resolve_cli_path(&cli, Path::new(input));
    assert_eq!(resolved.as_ref(), Path::new(expected));
}

#[rstest]
fn write_output_creates_parents_and_replaces() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8");
    let file = OutputFile::new("app/app.vcxproj", "first".to_owned());
    write_output(&root, &file).expect("write");
    let second = OutputFile::new("app/app.vcxproj", "second".to_owned());
    write_output(&root, &second).expect("rewrite");
    let contents = std::fs::read_to_string(root.join("app/app.vcxproj")).expect("read");
    assert_eq!(contents, "second");
}

#[rstest]
fn regenerate_requires_saved_configuration() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8");
    let err = regenerate(&root).expect_err("not configured");
    assert!(matches!(
        err.downcast_ref::<RunnerError>(),
        Some(RunnerError::NotConfigured { .. })
    ));
}

#[rstest]
fn configure_writes_files_and_configuration(source_tree: TempDir) {
    let build = tempfile::tempdir().expect("tempdir");
    let command = configure_command(Backend::Ninja, source_tree.path(), build.path());
    run(&cli(None, command)).expect("configure");

    let ninja = std::fs::read_to_string(build.path().join("build.ninja")).expect("build.ninja");
    assert!(ninja.contains("build hello.o: cc "), "{ninja}");
    let saved = std::fs::read_to_string(build.path().join(CONFIG_FILE)).expect("config");
    let config: SavedConfig = serde_json::from_str(&saved).expect("parse config");
    assert_eq!(config.backend, Backend::Ninja);

    std::fs::remove_file(build.path().join("build.ninja")).expect("remove");
    let regen = cli(
        None,
        Commands::Regenerate {
            builddir: build.path().to_path_buf(),
        },
    );
    run(&regen).expect("regenerate");
    assert!(build.path().join("build.ninja").is_file());
}

#[rstest]
fn configure_rejects_matching_directories(source_tree: TempDir) {
    let command = configure_command(Backend::Make, source_tree.path(), source_tree.path());
    let err = run(&cli(None, command)).expect_err("same directory");
    assert!(matches!(
        err.downcast_ref::<RunnerError>(),
        Some(RunnerError::SameDirectory { .. })
    ));
}

#[rstest]
fn configure_reports_missing_description() {
    let src = tempfile::tempdir().expect("tempdir");
    let build = tempfile::tempdir().expect("tempdir");
    let command = configure_command(Backend::Make, src.path(), build.path());
    let err = run(&cli(None, command)).expect_err("no description");
    assert!(matches!(
        err.downcast_ref::<RunnerError>(),
        Some(RunnerError::DescriptionNotFound { .. })
    ));
}
