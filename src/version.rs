//! Detecting the version of the build tool a backend targets.
//!
//! Probes are best effort: a missing tool or unexpected output logs a
//! warning and yields `None`, in which case every version-gated feature is
//! assumed available.

use crate::backend::Backend;
use crate::environment::Environment;
use semver::Version;
use std::process::Command;
use tracing::{debug, warn};

/// Parse a version leniently: missing minor or patch components default to
/// zero and anything after the leading `major.minor.patch` is ignored.
///
/// # Examples
///
/// ```
/// use gantry::version::parse_lenient;
/// use semver::Version;
///
/// assert_eq!(parse_lenient("4.3"), Some(Version::new(4, 3, 0)));
/// assert_eq!(parse_lenient("1.10.2.git"), Some(Version::new(1, 10, 2)));
/// assert_eq!(parse_lenient("unknown"), None);
/// ```
#[must_use]
pub fn parse_lenient(text: &str) -> Option<Version> {
    let mut parts = [0_u64; 3];
    let mut found = 0;
    for (slot, piece) in parts.iter_mut().zip(text.trim().split('.')) {
        let digits: String = piece.chars().take_while(char::is_ascii_digit).collect();
        if digits.is_empty() {
            break;
        }
        *slot = digits.parse().ok()?;
        found += 1;
        if digits.len() != piece.len() {
            break;
        }
    }
    if found == 0 {
        return None;
    }
    let [major, minor, patch] = parts;
    Some(Version::new(major, minor, patch))
}

/// The version reported by `make --version`, which must be GNU Make.
#[must_use]
pub fn parse_make(output: &str) -> Option<Version> {
    output
        .lines()
        .next()?
        .trim()
        .strip_prefix("GNU Make ")
        .and_then(parse_lenient)
}

/// The version reported by `ninja --version`.
#[must_use]
pub fn parse_ninja(output: &str) -> Option<Version> {
    output.lines().next().and_then(parse_lenient)
}

/// The version reported by `msbuild /version`: the last word of the last
/// non-empty line, after the copyright banner.
#[must_use]
pub fn parse_msbuild(output: &str) -> Option<Version> {
    output
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())?
        .split_whitespace()
        .last()
        .and_then(parse_lenient)
}

/// Run the backend's tool and parse its version.
///
/// Failures are logged and reported as `None`.
#[must_use]
pub fn probe(backend: Backend, env: &Environment) -> Option<Version> {
    let tool = match env.tool(backend.tool_name()) {
        Ok(tool) => tool,
        Err(err) => {
            warn!(%backend, error = %err, "cannot determine build tool");
            return None;
        }
    };
    let (program, fixed) = tool.command.split_first()?;
    let flag = match backend {
        Backend::Make | Backend::Ninja => "--version",
        Backend::Msbuild => "/version",
    };
    let output = match Command::new(program).args(fixed).arg(flag).output() {
        Ok(output) if output.status.success() => output,
        Ok(output) => {
            warn!(%backend, status = %output.status, "version probe failed");
            return None;
        }
        Err(err) => {
            warn!(%backend, program = %program, error = %err, "version probe failed to start");
            return None;
        }
    };
    let text = String::from_utf8_lossy(&output.stdout);
    let version = match backend {
        Backend::Make => parse_make(&text),
        Backend::Ninja => parse_ninja(&text),
        Backend::Msbuild => parse_msbuild(&text),
    };
    match &version {
        Some(found) => debug!(%backend, version = %found, "detected build tool"),
        None => warn!(%backend, "unrecognised version output"),
    }
    version
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("1", Some(Version::new(1, 0, 0)))]
    #[case("1.11.1\n", Some(Version::new(1, 11, 1)))]
    #[case("4.2.1-rc3", Some(Version::new(4, 2, 1)))]
    #[case("14.0.25420.1", Some(Version::new(14, 0, 25420)))]
    #[case("", None)]
    #[case("v1.2", None)]
    fn lenient_parsing(#[case] text: &str, #[case] expected: Option<Version>) {
        assert_eq!(parse_lenient(text), expected);
    }

    #[rstest]
    #[case("GNU Make 4.3\nBuilt for x86_64-pc-linux-gnu\n", Some(Version::new(4, 3, 0)))]
    #[case("GNU Make 3.81\n", Some(Version::new(3, 81, 0)))]
    #[case("make: unknown option\n", None)]
    fn make_output(#[case] output: &str, #[case] expected: Option<Version>) {
        assert_eq!(parse_make(output), expected);
    }

    #[rstest]
    fn ninja_output() {
        assert_eq!(parse_ninja("1.10.1\n"), Some(Version::new(1, 10, 1)));
    }

    #[rstest]
    fn msbuild_output() {
        let output = "Microsoft (R) Build Engine version 14.0.25420.1\n\
                      Copyright (C) Microsoft Corporation. All rights reserved.\n\
                      \n\
                      14.0.25420.1\n";
        assert_eq!(parse_msbuild(output), Some(Version::new(14, 0, 25420)));
    }

    #[rstest]
    fn missing_tool_yields_none() {
        let env = Environment::new("/src", "/build")
            .with_variables(|name| (name == "NINJA").then(|| "gantry-no-such-ninja".to_owned()));
        assert_eq!(probe(Backend::Ninja, &env), None);
    }
}
