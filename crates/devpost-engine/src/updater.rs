//! Mutate the manifest to target versions and install.
//!
//! Before the first write of a group, the original manifest text is
//! retained as an in-memory rollback buffer. On any failure the
//! manifest is restored and install re-runs to resynchronize the lock
//! state. Only the orchestrator clears the buffer, after a successful
//! commit.

use anyhow::{anyhow, Context, Result};
use devpost_adapters::npm::PackageManager;
use devpost_adapters::util::{debug_log, truncate};
use devpost_core::group::PackageGroup;
use devpost_core::manifest::{self, Manifest, LOCKFILE, MANIFEST_FILE};
use std::path::{Path, PathBuf};

pub struct Updater<'a> {
    root: &'a Path,
    pm: &'a PackageManager,
    backup: Option<String>,
}

impl<'a> Updater<'a> {
    pub fn new(root: &'a Path, pm: &'a PackageManager) -> Self {
        Self {
            root,
            pm,
            backup: None,
        }
    }

    /// Write each member's caret range into the manifest and install.
    pub fn apply_group(&mut self, group: &PackageGroup) -> Result<()> {
        let original = manifest::read_raw(self.root)?;
        if self.backup.is_none() {
            self.backup = Some(original.clone());
        }

        let result = self.mutate_and_install(group);
        if result.is_err() {
            self.rollback();
        }
        result
    }

    fn mutate_and_install(&mut self, group: &PackageGroup) -> Result<()> {
        let mut manifest = Manifest::read(self.root)?;
        for pkg in &group.members {
            let range = format!("^{}", pkg.latest_version);
            if !manifest.set_version_range(&pkg.name, &range) {
                return Err(anyhow!(
                    "Package '{}' is not declared in the manifest",
                    pkg.name
                ));
            }
            debug_log(format!("manifest: {} -> {}", pkg.name, range));
        }
        manifest.write()?;

        let capture = self.pm.install().context("Install failed to start")?;
        if !capture.success() {
            return Err(anyhow!(
                "Install failed (exit {}): {}",
                capture.exit_code(),
                truncate(capture.stderr.trim(), 400)
            ));
        }
        Ok(())
    }

    /// Restore the manifest from the rollback buffer and re-install.
    /// Best-effort: failures are logged, never raised.
    pub fn rollback(&mut self) {
        let Some(original) = self.backup.clone() else {
            return;
        };
        // Nothing was written yet: no restore, no lock resync needed.
        if manifest::read_raw(self.root).ok().as_deref() == Some(original.as_str()) {
            debug_log("manifest unchanged; skipping rollback install");
            self.backup = None;
            return;
        }
        if let Err(err) = manifest::write_raw(self.root, &original) {
            eprintln!("  ! Manifest rollback failed: {}", err);
            return;
        }
        match self.pm.install() {
            Ok(capture) if capture.success() => {
                debug_log("rollback install completed");
            }
            Ok(capture) => {
                eprintln!(
                    "  ! Rollback install failed (exit {}): {}",
                    capture.exit_code(),
                    truncate(capture.stderr.trim(), 200)
                );
            }
            Err(err) => {
                eprintln!("  ! Rollback install failed: {}", err);
            }
        }
        self.backup = None;
    }

    /// Forget the rollback buffer; called after a successful commit.
    pub fn clear_backup(&mut self) {
        self.backup = None;
    }

    pub fn has_backup(&self) -> bool {
        self.backup.is_some()
    }

    /// The files a commit should stage on behalf of the updater.
    pub fn touched_paths(&self) -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(MANIFEST_FILE)];
        if self.root.join(LOCKFILE).exists() {
            paths.push(PathBuf::from(LOCKFILE));
        }
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devpost_core::package::PackageRef;
    use tempfile::tempdir;

    const SAMPLE: &str = r#"{
  "name": "demo",
  "dependencies": {
    "chalk": "^4.0.0"
  }
}
"#;

    #[test]
    fn test_apply_group_unknown_package_restores_manifest() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE), SAMPLE).unwrap();
        let pm = PackageManager::new(dir.path());
        let mut updater = Updater::new(dir.path(), &pm);

        let group = PackageGroup::new(
            vec![PackageRef::new("left-pad", "1.0.0", "1.3.0")],
            "missing",
            1,
        );
        assert!(updater.apply_group(&group).is_err());

        // The mutation never reached disk, so rollback leaves the
        // manifest byte-identical without re-running install.
        let text = std::fs::read_to_string(dir.path().join(MANIFEST_FILE)).unwrap();
        assert_eq!(text, SAMPLE);
        assert!(!updater.has_backup());
    }

    #[test]
    fn test_touched_paths_includes_lockfile_when_present() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE), SAMPLE).unwrap();
        let pm = PackageManager::new(dir.path());
        let updater = Updater::new(dir.path(), &pm);
        assert_eq!(updater.touched_paths(), vec![PathBuf::from(MANIFEST_FILE)]);

        std::fs::write(dir.path().join(LOCKFILE), "{}\n").unwrap();
        assert_eq!(
            updater.touched_paths(),
            vec![PathBuf::from(MANIFEST_FILE), PathBuf::from(LOCKFILE)]
        );
    }

    #[test]
    fn test_clear_backup() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE), SAMPLE).unwrap();
        let pm = PackageManager::new(dir.path());
        let mut updater = Updater::new(dir.path(), &pm);

        let group = PackageGroup::new(
            vec![PackageRef::new("left-pad", "1.0.0", "1.3.0")],
            "missing",
            1,
        );
        let _ = updater.apply_group(&group);
        updater.clear_backup();
        assert!(!updater.has_backup());
    }
}
