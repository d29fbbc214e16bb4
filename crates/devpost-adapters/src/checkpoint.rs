//! Checkpoint persistence for resumable runs.
//!
//! The run state is written to `.devpost-upgrade-state.json` in the
//! project root after every orchestrator transition. The file holds a
//! list of records keyed by thread id so concurrent runs in the same
//! directory would not clobber each other; saving overwrites older
//! records for the same thread.
//!
//! Checkpoint I/O is best-effort from the orchestrator's point of
//! view: a failed save disables resume but must not corrupt the run.

use crate::util::debug_log;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use devpost_core::{Phase, RunState};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const STATE_FILE: &str = ".devpost-upgrade-state.json";

/// One persisted snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointRecord {
    pub thread_id: String,
    pub phase: Phase,
    pub state: RunState,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Checkpointer {
    path: PathBuf,
}

impl Checkpointer {
    pub fn new(root: &Path) -> Self {
        Self {
            path: root.join(STATE_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Does any checkpoint exist?
    pub fn has(&self) -> bool {
        self.path.exists()
    }

    /// Load the record for a specific thread.
    pub fn load(&self, thread_id: &str) -> Option<RunState> {
        self.records()
            .into_iter()
            .find(|r| r.thread_id == thread_id)
            .map(|r| r.state)
    }

    /// Load the most recently written record, for `--resume`.
    pub fn load_latest(&self) -> Option<CheckpointRecord> {
        self.records()
            .into_iter()
            .max_by_key(|r| r.timestamp)
    }

    /// Persist `state` for `thread_id`, replacing that thread's older
    /// record. Atomic: write to a temp file, then rename.
    pub fn save(&self, thread_id: &str, state: &RunState) -> Result<()> {
        let mut records: Vec<CheckpointRecord> = self
            .records()
            .into_iter()
            .filter(|r| r.thread_id != thread_id)
            .collect();
        records.push(CheckpointRecord {
            thread_id: thread_id.to_string(),
            phase: state.phase,
            state: state.clone(),
            timestamp: Utc::now(),
        });

        let text =
            serde_json::to_string_pretty(&records).context("Failed to serialize checkpoint")?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, text)
            .with_context(|| format!("Failed to write checkpoint '{}'", tmp_path.display()))?;
        if let Err(err) = fs::rename(&tmp_path, &self.path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(err).with_context(|| {
                format!("Failed to move checkpoint into place '{}'", self.path.display())
            });
        }
        debug_log(format!(
            "checkpoint saved: thread={} phase={}",
            thread_id, state.phase
        ));
        Ok(())
    }

    /// Delete the checkpoint file.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| {
                format!("Failed to delete checkpoint '{}'", self.path.display())
            }),
        }
    }

    fn records(&self) -> Vec<CheckpointRecord> {
        let Ok(text) = fs::read_to_string(&self.path) else {
            return Vec::new();
        };
        match serde_json::from_str(&text) {
            Ok(records) => records,
            Err(err) => {
                debug_log(format!("ignoring unreadable checkpoint file: {}", err));
                Vec::new()
            }
        }
    }
}
