//! Discover outdated dependencies.

use anyhow::{Context, Result};
use devpost_adapters::npm::PackageManager;
use devpost_adapters::util::debug_log;
use devpost_core::manifest::Manifest;
use devpost_core::package::{clean_version, PackageRef};
use std::path::Path;

pub struct Analyzer<'a> {
    root: &'a Path,
    pm: &'a PackageManager,
}

impl<'a> Analyzer<'a> {
    pub fn new(root: &'a Path, pm: &'a PackageManager) -> Self {
        Self { root, pm }
    }

    /// Enumerate `{name, current, latest}` for every dependency whose
    /// installed version differs from its latest.
    ///
    /// A missing or malformed manifest and an unusable package manager
    /// are fatal; an empty result is a valid "nothing to do".
    pub fn analyze(&self) -> Result<Vec<PackageRef>> {
        let manifest = Manifest::read(self.root).context("Cannot analyze project")?;
        self.pm.ensure_available()?;

        let outdated = self.pm.outdated()?;
        let mut refs = Vec::new();

        for (name, entry) in outdated {
            // Not every outdated row is a direct dependency of this
            // manifest; skip the ones the project does not declare.
            let Some(declared_range) = manifest.version_range(&name) else {
                debug_log(format!("skipping transitive outdated package {}", name));
                continue;
            };

            let current = entry
                .current
                .as_deref()
                .map(clean_version)
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| clean_version(declared_range));
            let latest = clean_version(&entry.latest);
            if current.is_empty() || latest.is_empty() || current == latest {
                continue;
            }

            let meta = self.pm.metadata(&name);
            let homepage = meta.repository.or(meta.homepage);
            let pkg = PackageRef::new(name, &current, &latest).with_homepage(homepage);
            debug_log(format!(
                "outdated: {} {} -> {} ({})",
                pkg.name,
                pkg.current_version,
                pkg.latest_version,
                pkg.bump()
            ));
            refs.push(pkg);
        }

        Ok(refs)
    }
}
