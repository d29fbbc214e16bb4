//! Surgical search/replace edits proposed by the fixer.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A single search/replace edit against one file.
///
/// `search` must occur exactly once in the file at apply time; the edit
/// engine rejects zero or multiple matches. Both `search` and `replace`
/// preserve the file's native line endings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edit {
    pub file: PathBuf,
    #[serde(default)]
    pub description: String,
    pub search: String,
    pub replace: String,
}

impl Edit {
    pub fn new(
        file: impl Into<PathBuf>,
        description: impl Into<String>,
        search: impl Into<String>,
        replace: impl Into<String>,
    ) -> Self {
        Self {
            file: file.into(),
            description: description.into(),
            search: search.into(),
            replace: replace.into(),
        }
    }
}
