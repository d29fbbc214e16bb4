//! Durable run state for the orchestrator.

use crate::group::UpgradePlan;
use crate::outcome::TestOutcome;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The nine phases of the upgrade state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Analyze,
    Group,
    Update,
    Reproduce,
    Localize,
    Fix,
    Validate,
    Commit,
    Complete,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Analyze => "analyze",
            Phase::Group => "group",
            Phase::Update => "update",
            Phase::Reproduce => "reproduce",
            Phase::Localize => "localize",
            Phase::Fix => "fix",
            Phase::Validate => "validate",
            Phase::Commit => "commit",
            Phase::Complete => "complete",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Resolved configuration for one run: config file values with CLI
/// overrides already applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunConfig {
    pub build_command: String,
    pub test_command: String,
    pub max_retries: u32,
    pub create_commits: bool,
    pub model_name: String,
    pub dry_run: bool,
    pub interactive: bool,
    /// Extra migration-doc URLs per package, highest-relevance source.
    #[serde(default)]
    pub migration_docs: HashMap<String, Vec<String>>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            build_command: "npm run build".to_string(),
            test_command: "npm test".to_string(),
            max_retries: 3,
            create_commits: true,
            model_name: "gemini-2.0-flash".to_string(),
            dry_run: false,
            interactive: false,
            migration_docs: HashMap::new(),
        }
    }
}

/// Environment facts probed once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunFlags {
    pub is_versioned: bool,
    pub model_enabled: bool,
}

/// A group the run has finished with, for the final summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedGroup {
    pub label: String,
    pub committed: bool,
    /// Fix attempts spent before the group went green.
    pub fix_attempts: u32,
}

/// The durable snapshot persisted after every transition.
///
/// Owned exclusively by the orchestrator; all other components receive
/// pieces of it by value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunState {
    pub phase: Phase,
    pub plan: UpgradePlan,
    /// Index of the group in progress.
    pub cursor: usize,
    /// Fix attempts within the current group.
    pub retry_count: u32,
    pub completed_groups: Vec<CompletedGroup>,
    pub last_outcome: Option<TestOutcome>,
    pub error: Option<String>,
    pub config: RunConfig,
    pub flags: RunFlags,
}

impl RunState {
    pub fn new(config: RunConfig, flags: RunFlags) -> Self {
        Self {
            phase: Phase::Analyze,
            plan: UpgradePlan::default(),
            cursor: 0,
            retry_count: 0,
            completed_groups: Vec::new(),
            last_outcome: None,
            error: None,
            config,
            flags,
        }
    }

    pub fn current_group_label(&self) -> String {
        self.plan
            .groups
            .get(self.cursor)
            .map(|g| g.label())
            .unwrap_or_else(|| "(no group)".to_string())
    }
}
