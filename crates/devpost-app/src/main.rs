//! devpost-upgrade - autonomous dependency upgrader.
//!
//! Discovers outdated npm packages, batches them into ordered groups,
//! upgrades each batch, runs the project's build and tests, asks a
//! model (plus fetched migration docs) for surgical fixes when the
//! upgrade breaks, and commits each healed batch atomically. Runs are
//! checkpointed and resumable.

use anyhow::{bail, Context, Result};
use clap::Parser;
use devpost_adapters::checkpoint::Checkpointer;
use devpost_adapters::config::{self, CliOverrides};
use devpost_adapters::npm::PackageManager;
use devpost_adapters::runner::CommandRunner;
use devpost_adapters::vcs::GitFacade;
use devpost_core::{RunFlags, RunState};
use devpost_engine::docsearch::DocSearch;
use devpost_engine::llm::{self, ModelClient};
use devpost_engine::orchestrator::{Collaborators, Orchestrator};
use std::path::Path;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(
    name = "devpost-upgrade",
    about = "Upgrade outdated dependencies and heal the breakage",
    version
)]
struct Args {
    /// Print the upgrade plan without changing anything
    #[arg(long)]
    dry_run: bool,

    /// Ask for confirmation before executing the plan
    #[arg(long)]
    interactive: bool,

    /// Upgrade and heal, but do not create commits
    #[arg(long)]
    no_commit: bool,

    /// Build command (default: npm run build)
    #[arg(long, value_name = "CMD")]
    build_command: Option<String>,

    /// Test command (default: npm test)
    #[arg(long, value_name = "CMD")]
    test_command: Option<String>,

    /// Fix attempts per group before rolling back
    #[arg(long, value_name = "N")]
    max_retries: Option<u32>,

    /// Extra migration doc for a package, as pkg=url (repeatable)
    #[arg(long = "migration-doc", value_name = "PKG=URL")]
    migration_doc: Vec<String>,

    /// Continue from the last checkpoint
    #[arg(long)]
    resume: bool,

    /// Delete the checkpoint file and exit
    #[arg(long)]
    clear_state: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    match run(args).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(err) => {
            eprintln!("  ! {:#}", err);
            std::process::exit(1);
        }
    }
}

async fn run(args: Args) -> Result<bool> {
    let root = std::env::current_dir().context("Cannot determine working directory")?;
    let checkpointer = Checkpointer::new(&root);

    if args.clear_state {
        checkpointer.clear()?;
        println!("  Checkpoint cleared.");
        return Ok(true);
    }

    let mut overrides = CliOverrides {
        build_command: args.build_command,
        test_command: args.test_command,
        max_retries: args.max_retries,
        no_commit: args.no_commit,
        dry_run: args.dry_run,
        interactive: args.interactive,
        migration_docs: Vec::new(),
    };
    for flag in &args.migration_doc {
        overrides
            .migration_docs
            .push(config::parse_migration_doc_flag(flag)?);
    }

    let flags = RunFlags {
        is_versioned: GitFacade::discover(&root).is_some(),
        model_enabled: llm::is_available(),
    };
    if !flags.model_enabled {
        println!(
            "  Note: {} is not set; grouping and fixing fall back to deterministic behavior.",
            llm::client::API_KEY_ENV
        );
    }

    let (state, thread_id) = if args.resume {
        let Some(record) = checkpointer.load_latest() else {
            bail!(
                "No checkpoint found at {}; nothing to resume",
                checkpointer.path().display()
            );
        };
        let mut state = record.state;
        // The checkpointed config is authoritative on resume; explicit
        // flags still win so `--resume --max-retries 5` means something.
        config::apply_cli(&mut state.config, &overrides);
        state.flags = flags;
        println!(
            "  Resuming thread {} at phase {}.",
            record.thread_id, state.phase
        );
        (state, record.thread_id)
    } else {
        let config = config::resolve(&root, &overrides)?;
        (
            RunState::new(config, flags),
            Uuid::new_v4().to_string(),
        )
    };

    if state.config.create_commits && !state.config.dry_run && !flags.is_versioned {
        bail!(
            "Not a git repository; commits were requested. Use --no-commit to upgrade without version control."
        );
    }

    println!(
        "  devpost-upgrade {} in {}",
        env!("CARGO_PKG_VERSION"),
        root.display()
    );

    let collab = build_collaborators(&root, &state, checkpointer);
    let orchestrator = Orchestrator::new(&root, collab, thread_id);
    let summary = orchestrator.run(state).await?;
    Ok(summary.success)
}

fn build_collaborators(root: &Path, state: &RunState, checkpointer: Checkpointer) -> Collaborators {
    let client = if state.flags.model_enabled {
        ModelClient::from_env(&state.config.model_name)
    } else {
        None
    };
    Collaborators {
        pm: PackageManager::new(root),
        runner: CommandRunner::new(root),
        vcs: GitFacade::discover(root),
        checkpointer,
        client,
        docs: DocSearch::new(state.config.migration_docs.clone()),
    }
}
