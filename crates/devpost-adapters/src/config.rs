//! Run configuration: optional project config file plus CLI overrides.
//!
//! The file lives at the project root as `.devpost-upgrade.json`. CLI
//! flags win over file values; `migrationDocs` from both sources are
//! merged, with CLI-provided URLs appended after file-provided ones.

use crate::util::debug_log;
use anyhow::{Context, Result};
use devpost_core::RunConfig;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

pub const CONFIG_FILE: &str = ".devpost-upgrade.json";

/// `migrationDocs` values may be a single URL or a list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum DocUrls {
    One(String),
    Many(Vec<String>),
}

impl DocUrls {
    fn into_vec(self) -> Vec<String> {
        match self {
            DocUrls::One(url) => vec![url],
            DocUrls::Many(urls) => urls,
        }
    }
}

/// The on-disk config shape: every key optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ConfigFile {
    build_command: Option<String>,
    test_command: Option<String>,
    max_retries: Option<u32>,
    create_commits: Option<bool>,
    model_name: Option<String>,
    dry_run: Option<bool>,
    interactive: Option<bool>,
    migration_docs: Option<HashMap<String, DocUrls>>,
}

/// Values supplied on the command line; `None` means "not given".
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub build_command: Option<String>,
    pub test_command: Option<String>,
    pub max_retries: Option<u32>,
    pub no_commit: bool,
    pub dry_run: bool,
    pub interactive: bool,
    /// Parsed `--migration-doc pkg=url` pairs, in flag order.
    pub migration_docs: Vec<(String, String)>,
}

/// Resolve the effective configuration for a run.
pub fn resolve(root: &Path, overrides: &CliOverrides) -> Result<RunConfig> {
    let file = load_file(root)?;
    let mut config = RunConfig::default();

    if let Some(value) = file.build_command {
        config.build_command = value;
    }
    if let Some(value) = file.test_command {
        config.test_command = value;
    }
    if let Some(value) = file.max_retries {
        config.max_retries = value;
    }
    if let Some(value) = file.create_commits {
        config.create_commits = value;
    }
    if let Some(value) = file.model_name {
        config.model_name = value;
    }
    if let Some(value) = file.dry_run {
        config.dry_run = value;
    }
    if let Some(value) = file.interactive {
        config.interactive = value;
    }
    if let Some(docs) = file.migration_docs {
        for (pkg, urls) in docs {
            config
                .migration_docs
                .entry(pkg)
                .or_default()
                .extend(urls.into_vec());
        }
    }

    apply_cli(&mut config, overrides);
    Ok(config)
}

/// Apply explicit CLI flags on top of a config. Also used on resume,
/// where the base is the checkpointed config rather than the file.
pub fn apply_cli(config: &mut RunConfig, overrides: &CliOverrides) {
    if let Some(value) = overrides.build_command.clone() {
        config.build_command = value;
    }
    if let Some(value) = overrides.test_command.clone() {
        config.test_command = value;
    }
    if let Some(value) = overrides.max_retries {
        config.max_retries = value;
    }
    if overrides.no_commit {
        config.create_commits = false;
    }
    if overrides.dry_run {
        config.dry_run = true;
    }
    if overrides.interactive {
        config.interactive = true;
    }
    for (pkg, url) in &overrides.migration_docs {
        config
            .migration_docs
            .entry(pkg.clone())
            .or_default()
            .push(url.clone());
    }
}

/// Parse one `--migration-doc pkg=url` argument.
pub fn parse_migration_doc_flag(value: &str) -> Result<(String, String)> {
    let (pkg, url) = value
        .split_once('=')
        .with_context(|| format!("Expected pkg=url, got '{}'", value))?;
    let pkg = pkg.trim();
    let url = url.trim();
    if pkg.is_empty() || url.is_empty() {
        anyhow::bail!("Expected pkg=url, got '{}'", value);
    }
    Ok((pkg.to_string(), url.to_string()))
}

fn load_file(root: &Path) -> Result<ConfigFile> {
    let path = root.join(CONFIG_FILE);
    let Ok(text) = fs::read_to_string(&path) else {
        return Ok(ConfigFile::default());
    };
    debug_log(format!("loaded config file '{}'", path.display()));
    serde_json::from_str(&text)
        .with_context(|| format!("Malformed config file '{}'", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_without_file() {
        let dir = tempdir().unwrap();
        let config = resolve(dir.path(), &CliOverrides::default()).unwrap();
        assert_eq!(config, RunConfig::default());
    }

    #[test]
    fn test_file_values_applied() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{
                "buildCommand": "yarn build",
                "maxRetries": 5,
                "createCommits": false,
                "migrationDocs": {
                    "react": "https://react.dev/blog/upgrade",
                    "eslint": ["https://eslint.org/a", "https://eslint.org/b"]
                }
            }"#,
        )
        .unwrap();

        let config = resolve(dir.path(), &CliOverrides::default()).unwrap();
        assert_eq!(config.build_command, "yarn build");
        assert_eq!(config.test_command, "npm test");
        assert_eq!(config.max_retries, 5);
        assert!(!config.create_commits);
        assert_eq!(
            config.migration_docs["react"],
            vec!["https://react.dev/blog/upgrade"]
        );
        assert_eq!(config.migration_docs["eslint"].len(), 2);
    }

    #[test]
    fn test_cli_overrides_file_and_merges_docs() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{"maxRetries": 5, "migrationDocs": {"react": "https://file.example/react"}}"#,
        )
        .unwrap();

        let overrides = CliOverrides {
            max_retries: Some(1),
            dry_run: true,
            migration_docs: vec![(
                "react".to_string(),
                "https://cli.example/react".to_string(),
            )],
            ..CliOverrides::default()
        };
        let config = resolve(dir.path(), &overrides).unwrap();
        assert_eq!(config.max_retries, 1);
        assert!(config.dry_run);
        // CLI-provided URLs append after file-provided ones.
        assert_eq!(
            config.migration_docs["react"],
            vec!["https://file.example/react", "https://cli.example/react"]
        );
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "{ nope").unwrap();
        assert!(resolve(dir.path(), &CliOverrides::default()).is_err());
    }

    #[test]
    fn test_parse_migration_doc_flag() {
        assert_eq!(
            parse_migration_doc_flag("react=https://react.dev").unwrap(),
            ("react".to_string(), "https://react.dev".to_string())
        );
        assert!(parse_migration_doc_flag("react").is_err());
        assert!(parse_migration_doc_flag("=https://react.dev").is_err());
    }
}
