//! Captured results of build and test subprocesses.

use serde::{Deserialize, Serialize};

/// Exit code used for outcomes that never ran a process (spawn failure,
/// skipped test run).
pub const SYNTHETIC_EXIT_CODE: i32 = -1;

/// The result of one build or test command.
///
/// A non-zero exit is a reported outcome, not a fault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl TestOutcome {
    pub fn passed(stdout: String, stderr: String) -> Self {
        Self {
            success: true,
            stdout,
            stderr,
            exit_code: 0,
        }
    }

    pub fn failed(stdout: String, stderr: String, exit_code: i32) -> Self {
        Self {
            success: false,
            stdout,
            stderr,
            exit_code,
        }
    }

    /// Outcome for a command that could not be spawned at all.
    pub fn spawn_failure(error: impl std::fmt::Display) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: error.to_string(),
            exit_code: SYNTHETIC_EXIT_CODE,
        }
    }

    /// Synthetic outcome for a run that was skipped (e.g. tests after a
    /// failed build).
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: format!("skipped: {}", reason.into()),
            exit_code: SYNTHETIC_EXIT_CODE,
        }
    }

    /// Stdout and stderr joined, the form the output heuristics consume.
    pub fn combined_output(&self) -> String {
        if self.stdout.is_empty() {
            return self.stderr.clone();
        }
        if self.stderr.is_empty() {
            return self.stdout.clone();
        }
        format!("{}\n{}", self.stdout, self.stderr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skipped_outcome_is_synthetic() {
        let outcome = TestOutcome::skipped("build failed");
        assert!(!outcome.success);
        assert_eq!(outcome.exit_code, SYNTHETIC_EXIT_CODE);
        assert_eq!(outcome.stderr, "skipped: build failed");
    }

    #[test]
    fn test_combined_output_joins_streams() {
        let outcome = TestOutcome::failed("out".into(), "err".into(), 1);
        assert_eq!(outcome.combined_output(), "out\nerr");
        let only_err = TestOutcome::failed(String::new(), "err".into(), 1);
        assert_eq!(only_err.combined_output(), "err");
    }
}
