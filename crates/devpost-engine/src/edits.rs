//! Apply uniquely-matching search/replace edits with rollback.
//!
//! Uniqueness is a safety property: an ambiguous match would silently
//! corrupt other sites of the same text fragment, so zero and multiple
//! matches both reject the edit. Rejections are per-edit; a batch
//! keeps going and reports counts.

use anyhow::{anyhow, Result};
use devpost_adapters::util::{debug_log, resolve_repo_path, truncate};
use devpost_adapters::vcs::GitFacade;
use devpost_core::Edit;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Preview truncation width for search/replace bodies.
const PREVIEW_CHARS: usize = 200;

/// Outcome of an edit batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub applied: usize,
    pub failed: usize,
    pub failures: Vec<String>,
}

impl ApplyReport {
    pub fn batch_succeeded(&self) -> bool {
        self.failed == 0
    }
}

/// Applies edits for the current group and remembers what it touched.
pub struct EditEngine<'a> {
    root: PathBuf,
    vcs: Option<&'a GitFacade>,
    /// Edits applied since the last clear, in order.
    history: Vec<Edit>,
    /// Pre-edit file contents, for rollback without version control.
    snapshots: HashMap<PathBuf, String>,
}

impl<'a> EditEngine<'a> {
    pub fn new(root: &Path, vcs: Option<&'a GitFacade>) -> Self {
        Self {
            root: root.to_path_buf(),
            vcs,
            history: Vec::new(),
            snapshots: HashMap::new(),
        }
    }

    /// Apply one edit. The search text must match the file exactly
    /// once; when the file uses CRLF endings and the search text is LF,
    /// both sides are normalized to CRLF first.
    pub fn apply_edit(&mut self, edit: &Edit) -> Result<()> {
        let absolute =
            resolve_repo_path(&self.root, &edit.file).map_err(|reason| anyhow!(reason))?;
        let content = fs::read_to_string(&absolute)
            .map_err(|e| anyhow!("Cannot read '{}': {}", edit.file.display(), e))?;

        let (search, replace) = normalize_line_endings(&content, &edit.search, &edit.replace);

        let occurrences = content.matches(search.as_str()).count();
        if occurrences == 0 {
            return Err(anyhow!(
                "search text not found in '{}': {:?}",
                edit.file.display(),
                truncate(&edit.search, 80)
            ));
        }
        if occurrences > 1 {
            return Err(anyhow!(
                "search text matches {} times in '{}' (must be unique): {:?}",
                occurrences,
                edit.file.display(),
                truncate(&edit.search, 80)
            ));
        }

        self.snapshots
            .entry(edit.file.clone())
            .or_insert_with(|| content.clone());

        let updated = content.replacen(search.as_str(), replace.as_str(), 1);
        fs::write(&absolute, updated)
            .map_err(|e| anyhow!("Cannot write '{}': {}", edit.file.display(), e))?;

        debug_log(format!(
            "applied edit to {}: {}",
            edit.file.display(),
            truncate(&edit.description, 80)
        ));
        self.history.push(edit.clone());
        Ok(())
    }

    /// Apply a batch in order. Failures are per-edit and do not abort
    /// the batch.
    pub fn apply_edits(&mut self, edits: &[Edit]) -> ApplyReport {
        let mut report = ApplyReport::default();
        for edit in edits {
            match self.apply_edit(edit) {
                Ok(()) => report.applied += 1,
                Err(err) => {
                    report.failed += 1;
                    report.failures.push(err.to_string());
                }
            }
        }
        report
    }

    /// Apply edits grouped by file, staging each file in version
    /// control as soon as all of its edits have landed. This gives
    /// per-file checkpoints within one fix attempt.
    pub fn apply_edits_with_validation(&mut self, edits: &[Edit]) -> ApplyReport {
        let mut report = ApplyReport::default();

        let mut order: Vec<&PathBuf> = Vec::new();
        let mut by_file: HashMap<&PathBuf, Vec<&Edit>> = HashMap::new();
        for edit in edits {
            if !by_file.contains_key(&edit.file) {
                order.push(&edit.file);
            }
            by_file.entry(&edit.file).or_default().push(edit);
        }

        for file in order {
            let mut file_applied = 0;
            for edit in &by_file[file] {
                match self.apply_edit(edit) {
                    Ok(()) => {
                        report.applied += 1;
                        file_applied += 1;
                    }
                    Err(err) => {
                        report.failed += 1;
                        report.failures.push(err.to_string());
                    }
                }
            }
            if file_applied > 0 {
                if let Some(vcs) = self.vcs {
                    if let Err(err) = vcs.stage(&[file.clone()]) {
                        debug_log(format!("staging {} failed: {}", file.display(), err));
                    }
                }
            }
        }

        report
    }

    /// Pretty-print a batch without touching disk.
    pub fn preview_edits(edits: &[Edit]) {
        for (idx, edit) in edits.iter().enumerate() {
            println!("  edit {} - {}", idx + 1, edit.file.display());
            if !edit.description.is_empty() {
                println!("    {}", edit.description);
            }
            println!("    search:  {:?}", truncate(&edit.search, PREVIEW_CHARS));
            println!("    replace: {:?}", truncate(&edit.replace, PREVIEW_CHARS));
        }
    }

    /// Files touched since the last clear, deduplicated, in first-touch
    /// order.
    pub fn touched_files(&self) -> Vec<PathBuf> {
        let mut seen = std::collections::HashSet::new();
        self.history
            .iter()
            .map(|e| e.file.clone())
            .filter(|f| seen.insert(f.clone()))
            .collect()
    }

    /// Revert every touched file: `checkout -- <files>` when versioned,
    /// snapshot restore otherwise. Clears history on success.
    pub fn rollback(&mut self) -> Result<()> {
        let files = self.touched_files();
        if files.is_empty() {
            return Ok(());
        }

        if let Some(vcs) = self.vcs {
            vcs.restore_paths(&files)?;
        } else {
            for file in &files {
                let Some(original) = self.snapshots.get(file) else {
                    continue;
                };
                let absolute =
                    resolve_repo_path(&self.root, file).map_err(|reason| anyhow!(reason))?;
                fs::write(&absolute, original)
                    .map_err(|e| anyhow!("Cannot restore '{}': {}", file.display(), e))?;
            }
        }

        debug_log(format!("rolled back {} edited file(s)", files.len()));
        self.clear_history();
        Ok(())
    }

    /// Forget applied edits and snapshots; called after a commit.
    pub fn clear_history(&mut self) {
        self.history.clear();
        self.snapshots.clear();
    }
}

/// When the file body is CRLF and the search text is LF, convert both
/// sides so the file's native endings survive the replacement.
fn normalize_line_endings(content: &str, search: &str, replace: &str) -> (String, String) {
    let file_is_crlf = content.contains("\r\n");
    let search_is_lf = search.contains('\n') && !search.contains("\r\n");
    if file_is_crlf && search_is_lf {
        (
            search.replace('\n', "\r\n"),
            replace.replace('\n', "\r\n"),
        )
    } else {
        (search.to_string(), replace.to_string())
    }
}
