//! Git facade: staging, commits, and per-path restore.
//!
//! Only the orchestrator talks to this module; the edit engine and
//! updater hand it paths to stage or revert.

use anyhow::{anyhow, Context, Result};
use git2::build::CheckoutBuilder;
use git2::{Repository, Signature, StatusOptions};
use std::path::{Path, PathBuf};

const FALLBACK_NAME: &str = "devpost-upgrade";
const FALLBACK_EMAIL: &str = "devpost-upgrade@localhost";

pub struct GitFacade {
    repo: Repository,
    root: PathBuf,
}

impl GitFacade {
    /// Open the repository containing `root`, if any.
    pub fn discover(root: &Path) -> Option<Self> {
        let repo = Repository::discover(root).ok()?;
        Some(Self {
            repo,
            root: root.to_path_buf(),
        })
    }

    /// Translate a project-root-relative path into a workdir-relative
    /// one, which is what the git index expects.
    fn workdir_relative(&self, path: &Path) -> Result<PathBuf> {
        let workdir = self
            .repo
            .workdir()
            .ok_or_else(|| anyhow!("Repository has no working directory"))?;
        let absolute = self.root.join(path);
        absolute
            .strip_prefix(workdir)
            .map(|p| p.to_path_buf())
            .with_context(|| format!("Path escapes repository: {}", path.display()))
    }

    /// Stage the given paths (adds edits, records deletions).
    pub fn stage(&self, paths: &[PathBuf]) -> Result<()> {
        let mut index = self.repo.index().context("Failed to open git index")?;
        for path in paths {
            let rel = self.workdir_relative(path)?;
            if self.root.join(path).exists() {
                index
                    .add_path(&rel)
                    .with_context(|| format!("Failed to stage '{}'", rel.display()))?;
            } else {
                index
                    .remove_path(&rel)
                    .with_context(|| format!("Failed to stage removal of '{}'", rel.display()))?;
            }
        }
        index.write().context("Failed to write git index")?;
        Ok(())
    }

    /// Commit whatever is currently staged. Returns the short commit id.
    pub fn commit(&self, message: &str) -> Result<String> {
        let mut index = self.repo.index()?;
        let tree_id = index.write_tree().context("Failed to write tree")?;
        let tree = self.repo.find_tree(tree_id)?;

        let signature = self
            .repo
            .signature()
            .or_else(|_| Signature::now(FALLBACK_NAME, FALLBACK_EMAIL))
            .context("Failed to build commit signature")?;

        let parent = match self.repo.head() {
            Ok(head) => Some(head.peel_to_commit()?),
            Err(_) => None,
        };
        let parents: Vec<&git2::Commit> = parent.iter().collect();

        let oid = self
            .repo
            .commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)
            .context("Failed to create commit")?;
        Ok(oid.to_string().chars().take(8).collect())
    }

    /// Revert the given paths to their HEAD state, discarding both
    /// staged and unstaged changes (the `git checkout -- <paths>`
    /// rollback contract).
    pub fn restore_paths(&self, paths: &[PathBuf]) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }
        let head = self
            .repo
            .revparse_single("HEAD")
            .context("Failed to resolve HEAD for restore")?;

        let mut checkout = CheckoutBuilder::new();
        checkout.force();
        checkout.remove_untracked(true);
        for path in paths {
            checkout.path(self.workdir_relative(path)?);
        }
        self.repo
            .checkout_tree(&head, Some(&mut checkout))
            .context("Failed to restore files from HEAD")?;

        // Re-sync the index so a later stage/commit sees clean state.
        let mut index = self.repo.index()?;
        for path in paths {
            let rel = self.workdir_relative(path)?;
            if self.root.join(path).exists() {
                let _ = index.add_path(&rel);
            } else {
                let _ = index.remove_path(&rel);
            }
        }
        index.write().context("Failed to write git index after restore")?;
        Ok(())
    }

    /// Whether the working tree has any local modifications.
    pub fn is_dirty(&self) -> Result<bool> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(false)
            .include_ignored(false)
            .exclude_submodules(true);
        let statuses = self.repo.statuses(Some(&mut opts))?;
        Ok(!statuses.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn init_repo(root: &Path) -> Repository {
        let repo = Repository::init(root).unwrap();
        {
            let mut config = repo.config().unwrap();
            config.set_str("user.name", "Upgrade Test").unwrap();
            config.set_str("user.email", "upgrade@test.local").unwrap();
        }
        repo
    }

    fn facade_with_initial_commit(root: &Path) -> GitFacade {
        init_repo(root);
        fs::write(root.join("a.txt"), "original\n").unwrap();
        let facade = GitFacade::discover(root).unwrap();
        facade.stage(&[PathBuf::from("a.txt")]).unwrap();
        facade.commit("init").unwrap();
        facade
    }

    #[test]
    fn test_discover_none_outside_repo() {
        // An isolated tempdir has no enclosing repository unless the
        // test runner itself lives in one above /tmp, which it does not.
        let dir = tempdir().unwrap();
        assert!(GitFacade::discover(dir.path()).is_none());
    }

    #[test]
    fn test_stage_commit_and_dirty() {
        let dir = tempdir().unwrap();
        let facade = facade_with_initial_commit(dir.path());
        assert!(!facade.is_dirty().unwrap());

        fs::write(dir.path().join("a.txt"), "changed\n").unwrap();
        assert!(facade.is_dirty().unwrap());

        facade.stage(&[PathBuf::from("a.txt")]).unwrap();
        let id = facade.commit("update a").unwrap();
        assert_eq!(id.len(), 8);
        assert!(!facade.is_dirty().unwrap());
    }

    #[test]
    fn test_restore_paths_discards_changes() {
        let dir = tempdir().unwrap();
        let facade = facade_with_initial_commit(dir.path());

        fs::write(dir.path().join("a.txt"), "broken edit\n").unwrap();
        facade.restore_paths(&[PathBuf::from("a.txt")]).unwrap();

        let content = fs::read_to_string(dir.path().join("a.txt")).unwrap();
        assert_eq!(content, "original\n");
        assert!(!facade.is_dirty().unwrap());
    }

    #[test]
    fn test_restore_paths_only_touches_named_files() {
        let dir = tempdir().unwrap();
        let facade = facade_with_initial_commit(dir.path());

        fs::write(dir.path().join("b.txt"), "new file\n").unwrap();
        facade.stage(&[PathBuf::from("b.txt")]).unwrap();
        facade.commit("add b").unwrap();

        fs::write(dir.path().join("a.txt"), "edit a\n").unwrap();
        fs::write(dir.path().join("b.txt"), "edit b\n").unwrap();
        facade.restore_paths(&[PathBuf::from("a.txt")]).unwrap();

        assert_eq!(
            fs::read_to_string(dir.path().join("a.txt")).unwrap(),
            "original\n"
        );
        assert_eq!(
            fs::read_to_string(dir.path().join("b.txt")).unwrap(),
            "edit b\n"
        );
    }
}
