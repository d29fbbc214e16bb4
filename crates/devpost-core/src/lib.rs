//! Core data model for devpost-upgrade.
//!
//! Everything here is deterministic and side-effect free except for
//! manifest file access: package references, upgrade plans, edits,
//! test outcomes, the run-state snapshot, and the error-output
//! heuristic tables shared by the localizer and fixer.

pub mod diagnostics;
pub mod edit;
pub mod group;
pub mod manifest;
pub mod outcome;
pub mod package;
pub mod state;

pub use edit::Edit;
pub use group::{PackageGroup, UpgradePlan};
pub use outcome::TestOutcome;
pub use package::{BumpKind, PackageRef};
pub use state::{Phase, RunConfig, RunFlags, RunState};
