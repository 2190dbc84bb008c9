//! Stable project GUIDs.
//!
//! Visual Studio keys solutions and projects by GUID, so a project must keep
//! its GUID across regenerations. The map is stored as JSON in the build
//! directory; GUIDs for new keys are derived from the project name, so a
//! fresh build directory reproduces the same solution.

use crate::backend::{EmitError, OutputFile};
use camino::Utf8Path;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use tracing::debug;
use uuid::Uuid;

/// File name of the saved map, relative to the build directory.
pub const UUID_FILE: &str = ".gantry_uuid";

/// The map format written by this version.
pub const UUID_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Stored {
    version: u32,
    map: IndexMap<String, String>,
}

/// GUIDs keyed by project name; the solution itself uses the empty key.
#[derive(Debug, Clone)]
pub struct UuidMap {
    project: String,
    saved: IndexMap<String, Uuid>,
    seen: IndexMap<String, Uuid>,
}

impl UuidMap {
    /// An empty map for `project`.
    #[must_use]
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            saved: IndexMap::new(),
            seen: IndexMap::new(),
        }
    }

    /// Read the map saved in `builddir`; a missing file yields an empty map.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or parsed, holds an invalid GUID, or
    /// was written by a newer version.
    pub fn load(project: &str, builddir: &Utf8Path) -> Result<Self, EmitError> {
        let path = builddir.join(UUID_FILE);
        match std::fs::read_to_string(&path) {
            Ok(text) => Self::parse(project, &text),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Self::new(project)),
            Err(source) => Err(EmitError::Io {
                path: path.into_string(),
                source,
            }),
        }
    }

    /// Parse a saved map.
    ///
    /// # Errors
    ///
    /// As for [`UuidMap::load`], except for IO failures.
    pub fn parse(project: &str, text: &str) -> Result<Self, EmitError> {
        let stored: Stored = serde_json::from_str(text)?;
        if stored.version > UUID_VERSION {
            return Err(EmitError::UuidVersion {
                found: stored.version,
                supported: UUID_VERSION,
            });
        }
        let mut saved = IndexMap::new();
        for (key, value) in stored.map {
            let id = Uuid::parse_str(&value).map_err(|_| EmitError::InvalidUuid {
                key: key.clone(),
                value: value.clone(),
            })?;
            saved.insert(key, id);
        }
        debug!(entries = saved.len(), "loaded UUID map");
        Ok(Self {
            project: project.to_owned(),
            saved,
            seen: IndexMap::new(),
        })
    }

    /// The GUID for `key`, reusing a saved one when present.
    pub fn get(&mut self, key: &str) -> Uuid {
        if let Some(id) = self.seen.get(key) {
            return *id;
        }
        let id = self.saved.get(key).copied().unwrap_or_else(|| {
            Uuid::new_v5(
                &Uuid::NAMESPACE_URL,
                format!("gantry:{}/{key}", self.project).as_bytes(),
            )
        });
        self.seen.insert(key.to_owned(), id);
        id
    }

    /// Serialise the GUIDs requested since loading.
    ///
    /// # Errors
    ///
    /// Fails only if JSON serialisation fails.
    pub fn save(&self) -> Result<OutputFile, EmitError> {
        let stored = Stored {
            version: UUID_VERSION,
            map: self
                .seen
                .iter()
                .map(|(key, id)| (key.clone(), id.simple().to_string()))
                .collect(),
        };
        Ok(OutputFile::new(UUID_FILE, serde_json::to_string(&stored)?))
    }
}

/// Spell a GUID the way solution and project files expect.
#[must_use]
pub fn braced(id: Uuid) -> String {
    format!("{{{}}}", id.hyphenated()).to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use rstest::rstest;

    #[rstest]
    fn new_keys_are_deterministic() {
        let mut first = UuidMap::new("demo");
        let mut second = UuidMap::new("demo");
        assert_eq!(first.get("prog"), second.get("prog"));
        assert_ne!(first.get("prog"), first.get("lib"));
        assert_ne!(first.get("prog"), UuidMap::new("other").get("prog"));
    }

    #[rstest]
    fn saved_keys_are_reused() {
        let text = r#"{"version":1,"map":{"prog":"0123456789abcdef0123456789abcdef"}}"#;
        let mut map = UuidMap::parse("demo", text).expect("parse");
        assert_eq!(
            braced(map.get("prog")),
            "{01234567-89AB-CDEF-0123-456789ABCDEF}"
        );
    }

    #[rstest]
    fn only_requested_keys_are_saved() {
        let text = r#"{"version":1,"map":{"old":"0123456789abcdef0123456789abcdef"}}"#;
        let mut map = UuidMap::parse("demo", text).expect("parse");
        let id = map.get("new");
        let saved = map.save().expect("save");
        assert_eq!(saved.path, Utf8PathBuf::from(UUID_FILE));
        assert_eq!(
            saved.contents,
            format!(r#"{{"version":1,"map":{{"new":"{}"}}}}"#, id.simple())
        );
    }

    #[rstest]
    fn newer_version_is_rejected() {
        let err = UuidMap::parse("demo", r#"{"version":2,"map":{}}"#).expect_err("newer");
        assert!(matches!(
            err,
            EmitError::UuidVersion {
                found: 2,
                supported: 1
            }
        ));
    }

    #[rstest]
    fn invalid_guid_is_rejected() {
        let err = UuidMap::parse("demo", r#"{"version":1,"map":{"a":"xyz"}}"#).expect_err("bad");
        assert!(matches!(err, EmitError::InvalidUuid { ref key, .. } if key == "a"));
    }

    #[rstest]
    fn load_round_trips_through_build_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let builddir = Utf8Path::from_path(dir.path()).expect("utf-8 path");
        let mut map = UuidMap::load("demo", builddir).expect("missing file is empty");
        let id = map.get("");
        let saved = map.save().expect("save");
        std::fs::write(builddir.join(&saved.path), saved.contents).expect("write");
        let mut reloaded = UuidMap::load("other", builddir).expect("load");
        assert_eq!(reloaded.get(""), id);
    }
}
