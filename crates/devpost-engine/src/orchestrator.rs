//! The upgrade state machine.
//!
//! Nine phases: Analyze, Group, Update, Reproduce, Localize, Fix,
//! Validate, Commit, Complete. Each transition is computed from the
//! current state plus collaborator output, and the resulting state is
//! checkpointed before the next phase executes, so a resume always
//! enters at the successor of the last completed phase.
//!
//! A terminal error transition skips the checkpoint write on purpose:
//! the last durable snapshot stays at the failed group's retry
//! boundary, which is what `--resume` (optionally with a larger
//! `--max-retries`) wants to re-enter.

use crate::analyzer::Analyzer;
use crate::docsearch::DocSearch;
use crate::edits::EditEngine;
use crate::fixer::{load_candidate_files, Fixer};
use crate::grouper::Grouper;
use crate::localizer::Localizer;
use crate::llm::ModelClient;
use crate::updater::Updater;
use anyhow::Result;
use devpost_adapters::checkpoint::Checkpointer;
use devpost_adapters::index::RepoIndex;
use devpost_adapters::npm::PackageManager;
use devpost_adapters::runner::CommandRunner;
use devpost_adapters::util::debug_log;
use devpost_adapters::vcs::GitFacade;
use devpost_core::state::CompletedGroup;
use devpost_core::{Phase, RunState, TestOutcome};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Everything the state machine talks to, constructed once per run.
pub struct Collaborators {
    pub pm: PackageManager,
    pub runner: CommandRunner,
    pub vcs: Option<GitFacade>,
    pub checkpointer: Checkpointer,
    pub client: Option<ModelClient>,
    pub docs: DocSearch,
}

/// What a finished run looked like.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub success: bool,
    pub error: Option<String>,
    pub completed_groups: Vec<CompletedGroup>,
}

pub struct Orchestrator {
    root: PathBuf,
    collab: Collaborators,
    thread_id: String,
}

impl Orchestrator {
    pub fn new(root: &Path, collab: Collaborators, thread_id: String) -> Self {
        Self {
            root: root.to_path_buf(),
            collab,
            thread_id,
        }
    }

    /// Drive the machine from `state` (fresh or resumed) to COMPLETE.
    pub async fn run(&self, mut state: RunState) -> Result<RunSummary> {
        let mut updater = Updater::new(&self.root, &self.collab.pm);
        let mut edit_engine = EditEngine::new(&self.root, self.collab.vcs.as_ref());
        let mut index = RepoIndex::new(&self.root);

        loop {
            self.checkpoint(&state);
            println!("  phase: {}", state.phase);

            let next = match state.phase {
                Phase::Analyze => self.phase_analyze(&mut state)?,
                Phase::Group => self.phase_group(&mut state).await,
                Phase::Update => self.phase_update(&mut state, &mut updater),
                Phase::Reproduce => self.phase_reproduce(&mut state),
                Phase::Localize => self.phase_localize(&mut state),
                Phase::Fix => {
                    self.phase_fix(&mut state, &mut index, &mut edit_engine)
                        .await
                }
                Phase::Validate => self.phase_validate(&mut state),
                Phase::Commit => self.phase_commit(&mut state, &mut updater, &mut edit_engine),
                Phase::Complete => {
                    return Ok(self.finish(&state, &mut updater, &mut edit_engine));
                }
            };
            state.phase = next;
        }
    }

    /// Persist the state about to execute. Skipped for a terminal error
    /// so the last durable snapshot stays resumable; failures are
    /// logged and the run continues.
    fn checkpoint(&self, state: &RunState) {
        if state.phase == Phase::Complete && state.error.is_some() {
            return;
        }
        if let Err(err) = self.collab.checkpointer.save(&self.thread_id, state) {
            eprintln!("  ! Checkpoint write failed (resume disabled): {}", err);
        }
    }

    fn phase_analyze(&self, state: &mut RunState) -> Result<Phase> {
        let analyzer = Analyzer::new(&self.root, &self.collab.pm);
        let packages = analyzer.analyze()?;

        if packages.is_empty() {
            println!("  All dependencies are up to date.");
            return Ok(Phase::Complete);
        }
        println!("  {} outdated package(s):", packages.len());
        for pkg in &packages {
            println!(
                "    {} {} -> {} ({})",
                pkg.name,
                pkg.current_version,
                pkg.latest_version,
                pkg.bump()
            );
        }
        state.plan.packages = packages;
        Ok(Phase::Group)
    }

    async fn phase_group(&self, state: &mut RunState) -> Phase {
        let client = if state.flags.model_enabled {
            self.collab.client.as_ref()
        } else {
            None
        };
        state.plan.groups = Grouper::new(client).group(&state.plan.packages).await;

        println!("  Upgrade plan ({} group(s)):", state.plan.groups.len());
        for (idx, group) in state.plan.groups.iter().enumerate() {
            println!(
                "    {}. [priority {}] {} - {}",
                idx + 1,
                group.priority,
                group.label(),
                group.reasoning
            );
        }

        if state.config.dry_run {
            println!("  Dry run: no changes made.");
            return Phase::Complete;
        }
        if state.config.interactive && !confirm_plan() {
            println!("  Plan declined; nothing changed.");
            return Phase::Complete;
        }

        state.cursor = 0;
        Phase::Update
    }

    fn phase_update(&self, state: &mut RunState, updater: &mut Updater) -> Phase {
        let Some(group) = state.plan.groups.get(state.cursor).cloned() else {
            state.error = Some(format!("group cursor {} out of range", state.cursor));
            return Phase::Complete;
        };
        println!(
            "  [{}/{}] Upgrading {}",
            state.cursor + 1,
            state.plan.groups.len(),
            group.label()
        );

        match updater.apply_group(&group) {
            Ok(()) => {
                state.retry_count = 0;
                Phase::Reproduce
            }
            Err(err) => {
                state.error = Some(format!(
                    "update failed for group '{}': {}",
                    group.label(),
                    err
                ));
                Phase::Complete
            }
        }
    }

    fn phase_reproduce(&self, state: &mut RunState) -> Phase {
        let pair = self
            .collab
            .runner
            .run_all(&state.config.build_command, &state.config.test_command);

        if pair.green() {
            println!("  Build and tests green.");
            state.last_outcome = Some(pair.tests);
            return Phase::Commit;
        }

        let failing = if pair.build.success {
            println!("  Tests failed (exit {}).", pair.tests.exit_code);
            pair.tests
        } else {
            println!("  Build failed (exit {}).", pair.build.exit_code);
            pair.build
        };
        state.last_outcome = Some(failing);
        Phase::Localize
    }

    /// Guard node: the retry bound is checkpointed here, so resuming
    /// after a partial Reproduce is safe.
    fn phase_localize(&self, state: &mut RunState) -> Phase {
        if !state.flags.model_enabled {
            state.error = Some(format!(
                "group '{}' broke the build and model-assisted fixing is disabled",
                state.current_group_label()
            ));
            return Phase::Complete;
        }
        if state.retry_count >= state.config.max_retries {
            state.error = Some(format!(
                "group '{}' still failing after {} fix attempt(s)",
                state.current_group_label(),
                state.retry_count
            ));
            return Phase::Complete;
        }
        Phase::Fix
    }

    async fn phase_fix(
        &self,
        state: &mut RunState,
        index: &mut RepoIndex,
        edit_engine: &mut EditEngine<'_>,
    ) -> Phase {
        let Some(client) = self.collab.client.as_ref() else {
            state.error = Some("model client unavailable".to_string());
            return Phase::Complete;
        };
        let Some(group) = state.plan.groups.get(state.cursor).cloned() else {
            state.error = Some(format!("group cursor {} out of range", state.cursor));
            return Phase::Complete;
        };
        let outcome = state
            .last_outcome
            .clone()
            .unwrap_or_else(|| TestOutcome::skipped("no recorded outcome"));
        let output = outcome.combined_output();

        // One member anchors localization and doc search: the first one
        // the failing output actually names, else the group's head.
        let Some(head) = group.members.first() else {
            state.error = Some(format!("group '{}' has no members", group.label()));
            return Phase::Complete;
        };
        let focus = group
            .members
            .iter()
            .find(|m| output.contains(&m.name))
            .unwrap_or(head);

        let candidates = Localizer::candidate_files(&output, &focus.name, index, &self.root);
        debug_log(format!(
            "fix attempt {}: {} candidate file(s) for {}",
            state.retry_count + 1,
            candidates.len(),
            focus.name
        ));

        let guides = self.collab.docs.search(focus).await;
        println!(
            "  Fix attempt {}/{}: {} guide(s), {} candidate file(s)",
            state.retry_count + 1,
            state.config.max_retries,
            guides.len(),
            candidates.len()
        );

        let files = load_candidate_files(&self.root, &candidates);
        let edits = Fixer::new(client)
            .generate_edits(focus, &outcome, &guides, &files)
            .await;
        if edits.is_empty() {
            state.error = Some(format!(
                "no fixes generated for group '{}'",
                group.label()
            ));
            return Phase::Complete;
        }

        let report = edit_engine.apply_edits_with_validation(&edits);
        for failure in &report.failures {
            eprintln!("  ! Edit rejected: {}", failure);
        }
        println!(
            "  Applied {}/{} edit(s).",
            report.applied,
            report.applied + report.failed
        );
        if report.applied == 0 {
            state.error = Some(format!(
                "no fixes could be applied for group '{}'",
                group.label()
            ));
            return Phase::Complete;
        }

        state.retry_count += 1;
        Phase::Validate
    }

    fn phase_validate(&self, state: &mut RunState) -> Phase {
        let pair = self
            .collab
            .runner
            .run_all(&state.config.build_command, &state.config.test_command);

        if pair.green() {
            println!("  Fix validated; build and tests green.");
            state.last_outcome = Some(pair.tests);
            return Phase::Commit;
        }

        let failing = if pair.build.success {
            pair.tests
        } else {
            pair.build
        };
        println!("  Still failing (exit {}).", failing.exit_code);
        state.last_outcome = Some(failing);

        if state.retry_count < state.config.max_retries {
            Phase::Localize
        } else {
            state.error = Some(format!(
                "group '{}' still failing after {} fix attempt(s)",
                state.current_group_label(),
                state.retry_count
            ));
            Phase::Complete
        }
    }

    fn phase_commit(
        &self,
        state: &mut RunState,
        updater: &mut Updater,
        edit_engine: &mut EditEngine<'_>,
    ) -> Phase {
        let Some(group) = state.plan.groups.get(state.cursor).cloned() else {
            state.error = Some(format!("group cursor {} out of range", state.cursor));
            return Phase::Complete;
        };
        let mut committed = false;

        if state.config.create_commits {
            if let Some(vcs) = self.collab.vcs.as_ref() {
                let mut paths = updater.touched_paths();
                paths.extend(edit_engine.touched_files());
                let message = group.commit_message();
                match vcs.stage(&paths).and_then(|()| vcs.commit(&message)) {
                    Ok(id) => {
                        println!("  Committed {} ({})", id, group.label());
                        committed = true;
                    }
                    Err(err) => {
                        state.error =
                            Some(format!("commit failed for group '{}': {}", group.label(), err));
                        return Phase::Complete;
                    }
                }
            }
        }
        if !committed {
            println!("  Commit skipped for {}.", group.label());
        }

        // The group is sealed: later failures must not roll it back.
        updater.clear_backup();
        edit_engine.clear_history();
        state.completed_groups.push(CompletedGroup {
            label: group.label(),
            committed,
            fix_attempts: state.retry_count,
        });

        if state.cursor + 1 < state.plan.groups.len() {
            state.cursor += 1;
            Phase::Update
        } else {
            Phase::Complete
        }
    }

    fn finish(
        &self,
        state: &RunState,
        updater: &mut Updater,
        edit_engine: &mut EditEngine<'_>,
    ) -> RunSummary {
        if let Some(error) = &state.error {
            eprintln!("  ! {}", error);
            updater.rollback();
            if let Err(err) = edit_engine.rollback() {
                eprintln!("  ! Edit rollback failed: {}", err);
            }
            eprintln!(
                "  Checkpoint kept at {}; retry with --resume.",
                self.collab.checkpointer.path().display()
            );
        } else if let Err(err) = self.collab.checkpointer.clear() {
            eprintln!("  ! Could not remove checkpoint: {}", err);
        }

        print_summary(state);
        RunSummary {
            success: state.error.is_none(),
            error: state.error.clone(),
            completed_groups: state.completed_groups.clone(),
        }
    }
}

fn print_summary(state: &RunState) {
    println!();
    if state.completed_groups.is_empty() {
        println!("  No groups upgraded.");
    } else {
        println!("  Upgraded {} group(s):", state.completed_groups.len());
        for group in &state.completed_groups {
            let how = match (group.committed, group.fix_attempts) {
                (true, 0) => "committed".to_string(),
                (true, n) => format!("committed after {} fix attempt(s)", n),
                (false, _) => "not committed".to_string(),
            };
            println!("    - {} ({})", group.label, how);
        }
    }
    if let Some(error) = &state.error {
        println!("  Result: failed - {}", error);
    } else {
        println!("  Result: success");
    }
}

/// One stdin confirmation in interactive mode; default is yes.
fn confirm_plan() -> bool {
    print!("  Proceed with this plan? [Y/n] ");
    let _ = std::io::stdout().flush();
    let mut answer = String::new();
    if std::io::stdin().read_line(&mut answer).is_err() {
        return false;
    }
    let answer = answer.trim().to_lowercase();
    answer.is_empty() || answer == "y" || answer == "yes"
}
