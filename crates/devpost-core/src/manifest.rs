//! package.json reading and mutation.
//!
//! The manifest is held as a full JSON document so unrelated fields
//! (name, scripts, engines, ...) survive a rewrite untouched. Writes
//! always end with a newline.

use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

pub const MANIFEST_FILE: &str = "package.json";
pub const LOCKFILE: &str = "package-lock.json";

const DEPENDENCY_SECTIONS: [&str; 2] = ["dependencies", "devDependencies"];

/// An in-memory package.json.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    path: PathBuf,
    document: Value,
}

impl Manifest {
    /// Read and parse the manifest at `root/package.json`.
    pub fn read(root: &Path) -> Result<Self> {
        let path = root.join(MANIFEST_FILE);
        let text = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read manifest '{}'", path.display()))?;
        Self::parse(&path, &text)
    }

    pub fn parse(path: &Path, text: &str) -> Result<Self> {
        let document: Value = serde_json::from_str(text)
            .with_context(|| format!("Malformed manifest '{}'", path.display()))?;
        if !document.is_object() {
            return Err(anyhow!(
                "Malformed manifest '{}': top level is not an object",
                path.display()
            ));
        }
        Ok(Self {
            path: path.to_path_buf(),
            document,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The version range recorded for `name`, from either dependency section.
    pub fn version_range(&self, name: &str) -> Option<&str> {
        for section in DEPENDENCY_SECTIONS {
            if let Some(range) = self
                .document
                .get(section)
                .and_then(|deps| deps.get(name))
                .and_then(Value::as_str)
            {
                return Some(range);
            }
        }
        None
    }

    /// All declared dependency names, runtime first.
    pub fn dependency_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for section in DEPENDENCY_SECTIONS {
            if let Some(deps) = self.document.get(section).and_then(Value::as_object) {
                names.extend(deps.keys().cloned());
            }
        }
        names
    }

    /// Overwrite the version range of `name` in whichever section holds
    /// it. Returns false when the package is not declared.
    pub fn set_version_range(&mut self, name: &str, range: &str) -> bool {
        for section in DEPENDENCY_SECTIONS {
            let holds = self
                .document
                .get(section)
                .and_then(|deps| deps.get(name))
                .is_some();
            if holds {
                if let Some(deps) = self
                    .document
                    .get_mut(section)
                    .and_then(Value::as_object_mut)
                {
                    deps.insert(name.to_string(), Value::String(range.to_string()));
                    return true;
                }
            }
        }
        false
    }

    /// Serialize back to disk, preserving the terminal newline.
    pub fn write(&self) -> Result<()> {
        fs::write(&self.path, self.to_text()?)
            .with_context(|| format!("Failed to write manifest '{}'", self.path.display()))
    }

    pub fn to_text(&self) -> Result<String> {
        let mut text = serde_json::to_string_pretty(&self.document)
            .context("Failed to serialize manifest")?;
        text.push('\n');
        Ok(text)
    }
}

/// Restore raw manifest text, e.g. from a rollback buffer.
pub fn write_raw(root: &Path, text: &str) -> Result<()> {
    let path = root.join(MANIFEST_FILE);
    fs::write(&path, text)
        .with_context(|| format!("Failed to restore manifest '{}'", path.display()))
}

/// Read the raw manifest text, for rollback buffering.
pub fn read_raw(root: &Path) -> Result<String> {
    let path = root.join(MANIFEST_FILE);
    fs::read_to_string(&path)
        .with_context(|| format!("Failed to read manifest '{}'", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const SAMPLE: &str = r#"{
  "name": "demo",
  "version": "1.0.0",
  "dependencies": {
    "chalk": "^4.0.0",
    "react": "^17.0.2"
  },
  "devDependencies": {
    "typescript": "~4.5.4"
  }
}
"#;

    #[test]
    fn test_read_write_round_trip() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE), SAMPLE).unwrap();

        let manifest = Manifest::read(dir.path()).unwrap();
        manifest.write().unwrap();
        let reread = Manifest::read(dir.path()).unwrap();
        assert_eq!(reread, manifest);

        let text = std::fs::read_to_string(dir.path().join(MANIFEST_FILE)).unwrap();
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn test_version_range_lookup_spans_sections() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE), SAMPLE).unwrap();
        let manifest = Manifest::read(dir.path()).unwrap();

        assert_eq!(manifest.version_range("chalk"), Some("^4.0.0"));
        assert_eq!(manifest.version_range("typescript"), Some("~4.5.4"));
        assert_eq!(manifest.version_range("left-pad"), None);
    }

    #[test]
    fn test_set_version_range_updates_owning_section() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE), SAMPLE).unwrap();
        let mut manifest = Manifest::read(dir.path()).unwrap();

        assert!(manifest.set_version_range("typescript", "^5.7.2"));
        assert_eq!(manifest.version_range("typescript"), Some("^5.7.2"));
        // Runtime section untouched.
        assert_eq!(manifest.version_range("chalk"), Some("^4.0.0"));

        assert!(!manifest.set_version_range("left-pad", "^1.0.0"));
    }

    #[test]
    fn test_preserves_unrelated_fields() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE), SAMPLE).unwrap();
        let mut manifest = Manifest::read(dir.path()).unwrap();
        manifest.set_version_range("chalk", "^5.3.0");
        manifest.write().unwrap();

        let text = std::fs::read_to_string(dir.path().join(MANIFEST_FILE)).unwrap();
        assert!(text.contains("\"name\": \"demo\""));
        assert!(text.contains("\"version\": \"1.0.0\""));
        assert!(text.contains("\"chalk\": \"^5.3.0\""));
    }

    #[test]
    fn test_malformed_manifest_is_fatal() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE), "{ not json").unwrap();
        assert!(Manifest::read(dir.path()).is_err());

        std::fs::write(dir.path().join(MANIFEST_FILE), "[1, 2]").unwrap();
        let err = Manifest::read(dir.path()).unwrap_err().to_string();
        assert!(err.contains("not an object"));
    }

    #[test]
    fn test_dependency_names_runtime_first() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE), SAMPLE).unwrap();
        let manifest = Manifest::read(dir.path()).unwrap();
        let names = manifest.dependency_names();
        assert_eq!(names, vec!["chalk", "react", "typescript"]);
    }
}
