//! Shell-out facade over the npm CLI.
//!
//! The upgrader only needs three facilities: "what is outdated",
//! "install what the manifest says", and a registry metadata probe so
//! doc search can find a package's source forge.

use crate::util::{capture_command, debug_log, truncate, CommandCapture};
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;

/// One row of `npm outdated --json`.
#[derive(Debug, Clone, Deserialize)]
pub struct OutdatedEntry {
    #[serde(default)]
    pub current: Option<String>,
    #[serde(default)]
    pub wanted: Option<String>,
    pub latest: String,
}

/// Registry facts used to locate migration documentation.
#[derive(Debug, Clone, Default)]
pub struct PackageMeta {
    pub homepage: Option<String>,
    pub repository: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PackageManager {
    root: PathBuf,
}

impl PackageManager {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    fn npm(&self, args: &[&str]) -> Result<CommandCapture> {
        let mut cmd = Command::new("npm");
        cmd.args(args).current_dir(&self.root);
        capture_command(&mut cmd).map_err(|e| anyhow!("Failed to run npm {}: {}", args.join(" "), e))
    }

    /// Fatal when the npm binary cannot be executed at all.
    pub fn ensure_available(&self) -> Result<()> {
        let capture = self
            .npm(&["--version"])
            .context("Package manager (npm) is not available on PATH")?;
        if !capture.success() {
            return Err(anyhow!(
                "Package manager (npm) is not usable: {}",
                truncate(capture.stderr.trim(), 200)
            ));
        }
        debug_log(format!("npm version {}", capture.stdout.trim()));
        Ok(())
    }

    /// List outdated direct dependencies.
    ///
    /// npm exits non-zero when anything is outdated, so the exit code is
    /// ignored as long as stdout parses; an empty stdout means
    /// everything is current.
    pub fn outdated(&self) -> Result<BTreeMap<String, OutdatedEntry>> {
        let capture = self.npm(&["outdated", "--json"])?;
        let stdout = capture.stdout.trim();
        if stdout.is_empty() || stdout == "{}" {
            return Ok(BTreeMap::new());
        }
        let raw: BTreeMap<String, Value> = serde_json::from_str(stdout).with_context(|| {
            format!(
                "Failed to parse `npm outdated --json` output: {}",
                truncate(stdout, 200)
            )
        })?;
        Ok(coerce_outdated(raw))
    }

    /// Run `npm install`, reporting failure as a value.
    pub fn install(&self) -> Result<CommandCapture> {
        self.npm(&["install"])
    }

    /// Best-effort registry metadata; any failure yields an empty probe.
    pub fn metadata(&self, name: &str) -> PackageMeta {
        let capture = match self.npm(&["view", name, "homepage", "repository.url", "--json"]) {
            Ok(c) if c.success() => c,
            _ => return PackageMeta::default(),
        };
        parse_view_output(capture.stdout.trim())
    }
}

/// Coerce the raw `npm outdated` document into typed rows. Workspace
/// projects report a row per workspace as an array; the first entry
/// carries the versions we care about. Unparseable rows are skipped.
fn coerce_outdated(raw: BTreeMap<String, Value>) -> BTreeMap<String, OutdatedEntry> {
    let mut entries = BTreeMap::new();
    for (name, value) in raw {
        let value = match value {
            Value::Array(items) => match items.into_iter().next() {
                Some(first) => first,
                None => continue,
            },
            other => other,
        };
        match serde_json::from_value::<OutdatedEntry>(value) {
            Ok(entry) => {
                entries.insert(name, entry);
            }
            Err(err) => {
                debug_log(format!("skipping unparseable outdated row {}: {}", name, err));
            }
        }
    }
    entries
}

/// `npm view a b --json` emits either a bare string (one field present)
/// or an object keyed by field name.
fn parse_view_output(stdout: &str) -> PackageMeta {
    if stdout.is_empty() {
        return PackageMeta::default();
    }
    let value: Value = match serde_json::from_str(stdout) {
        Ok(v) => v,
        Err(_) => return PackageMeta::default(),
    };
    match value {
        Value::String(s) => PackageMeta {
            homepage: Some(clean_repo_url(&s)),
            repository: None,
        },
        Value::Object(map) => PackageMeta {
            homepage: map
                .get("homepage")
                .and_then(Value::as_str)
                .map(clean_repo_url),
            repository: map
                .get("repository.url")
                .and_then(Value::as_str)
                .map(clean_repo_url),
        },
        _ => PackageMeta::default(),
    }
}

/// Normalize registry repository URLs (`git+https://...git`) to plain https.
fn clean_repo_url(url: &str) -> String {
    let mut cleaned = url.trim();
    if let Some(rest) = cleaned.strip_prefix("git+") {
        cleaned = rest;
    }
    let mut cleaned = cleaned.to_string();
    if let Some(rest) = cleaned.strip_suffix(".git") {
        cleaned = rest.to_string();
    }
    if let Some(rest) = cleaned.strip_prefix("git://") {
        cleaned = format!("https://{}", rest);
    }
    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_view_object() {
        let meta = parse_view_output(
            r#"{"homepage":"https://github.com/chalk/chalk#readme","repository.url":"git+https://github.com/chalk/chalk.git"}"#,
        );
        assert_eq!(
            meta.homepage.as_deref(),
            Some("https://github.com/chalk/chalk#readme")
        );
        assert_eq!(
            meta.repository.as_deref(),
            Some("https://github.com/chalk/chalk")
        );
    }

    #[test]
    fn test_parse_view_bare_string() {
        let meta = parse_view_output(r#""https://react.dev""#);
        assert_eq!(meta.homepage.as_deref(), Some("https://react.dev"));
        assert!(meta.repository.is_none());
    }

    #[test]
    fn test_parse_view_garbage_is_empty() {
        let meta = parse_view_output("not json");
        assert!(meta.homepage.is_none() && meta.repository.is_none());
    }

    #[test]
    fn test_clean_repo_url() {
        assert_eq!(
            clean_repo_url("git+https://github.com/facebook/react.git"),
            "https://github.com/facebook/react"
        );
        assert_eq!(
            clean_repo_url("git://github.com/a/b.git"),
            "https://github.com/a/b"
        );
        assert_eq!(clean_repo_url("https://react.dev"), "https://react.dev");
    }

    #[test]
    fn test_coerce_outdated_plain_rows() {
        let json = r#"{
            "chalk": {"current": "4.0.0", "wanted": "4.1.2", "latest": "5.3.0", "location": "node_modules/chalk"},
            "react": {"wanted": "17.0.2", "latest": "18.3.1"}
        }"#;
        let raw: BTreeMap<String, Value> = serde_json::from_str(json).unwrap();
        let parsed = coerce_outdated(raw);
        assert_eq!(parsed["chalk"].current.as_deref(), Some("4.0.0"));
        assert_eq!(parsed["chalk"].latest, "5.3.0");
        assert!(parsed["react"].current.is_none());
    }

    #[test]
    fn test_coerce_outdated_workspace_arrays_and_bad_rows() {
        let json = r#"{
            "chalk": [{"current": "4.0.0", "latest": "5.3.0"}, {"current": "4.1.0", "latest": "5.3.0"}],
            "broken": {"current": "1.0.0"},
            "empty": []
        }"#;
        let raw: BTreeMap<String, Value> = serde_json::from_str(json).unwrap();
        let parsed = coerce_outdated(raw);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed["chalk"].latest, "5.3.0");
        assert_eq!(parsed["chalk"].current.as_deref(), Some("4.0.0"));
    }
}
