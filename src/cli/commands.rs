//! CLI command definitions for hall-monitor.
//!
//! `run` drives the full workflow, `check` stops after classification and
//! `update` runs the repository update driver directly.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use crate::git::{GitCli, DEFAULT_REMOTE};
use crate::report::{reconcile, unremedied_report, update_summary, ReconcileContext};
use crate::staleness::{ImageCheckResult, ImageStatus};
use crate::tekton::TektonMutator;
use crate::update::driver::{DEFAULT_CHECKOUT_BRANCH, DEFAULT_FLOATING_BRANCH};
use crate::update::{DriverConfig, RepoUpdateDriver};
use crate::workflow::{
    discover_working_copies, Coordinator, RunOptions, WorkflowConfig, DEFAULT_CONFIG_PATH,
};

/// Finds services without recent security-compliance images and repoints
/// their Tekton SC pipelines at a floating branch.
#[derive(Parser)]
#[command(name = "hall-monitor")]
#[command(about = "Detect stale SC image builds and fix pinned Tekton pipeline refs")]
#[command(version)]
#[command(
    long_about = "hall-monitor checks Quay for recent sc- image tags per service, then rewrites pinned\n\
pipeline references in each stale service's .tekton/*-sc*.yaml files, commits and pushes.\n\n\
Example usage:\n  hall-monitor run --config config.yaml --dry-run\n  hall-monitor check --days 7 --output-stale stale.txt"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Check the registry, then update stale repositories.
    Run(RunArgs),

    /// Check the registry and classify services; never touches repositories.
    Check(CheckArgs),

    /// Update the given working copies as if their services were stale.
    Update(UpdateArgs),
}

/// Options shared by `run` and `check`.
#[derive(Parser, Debug)]
pub struct InspectArgs {
    /// Path to the configuration file.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Only process these services (overrides config).
    #[arg(long, num_args = 1.., value_delimiter = ',')]
    pub services: Vec<String>,

    /// Recency window in days (overrides `quick_search_days`).
    #[arg(long)]
    pub days: Option<u32>,

    /// Print a JSON run summary instead of text reports.
    #[arg(short, long)]
    pub json: bool,

    /// Write stale service names, one per line, to this file.
    #[arg(long)]
    pub output_stale: Option<PathBuf>,
}

/// Arguments for `hall-monitor run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub inspect: InspectArgs,

    /// Plan updates without writing, committing or pushing; the branch is
    /// still checked out and a local branch ahead of the remote is reset to it.
    #[arg(long)]
    pub dry_run: bool,

    /// Stop after classification.
    #[arg(long)]
    pub check_only: bool,

    /// Branch to check out and push (overrides config).
    #[arg(long)]
    pub branch: Option<String>,
}

/// Arguments for `hall-monitor check`.
#[derive(Parser, Debug)]
pub struct CheckArgs {
    #[command(flatten)]
    pub inspect: InspectArgs,
}

/// Arguments for `hall-monitor update`.
#[derive(Parser, Debug)]
pub struct UpdateArgs {
    /// Directory containing the working copies.
    #[arg(long)]
    pub repos_dir: PathBuf,

    /// Services to update; defaults to every git working copy in the directory.
    #[arg(long, num_args = 1.., value_delimiter = ',')]
    pub services: Vec<String>,

    /// Branch to check out and push.
    #[arg(long, default_value = DEFAULT_CHECKOUT_BRANCH)]
    pub branch: String,

    /// Branch pipeline references are rewritten to.
    #[arg(long, default_value = DEFAULT_FLOATING_BRANCH)]
    pub pipeline_branch: String,

    /// Remote to fetch from and push to.
    #[arg(long, default_value = DEFAULT_REMOTE)]
    pub remote: String,

    /// Plan updates without writing, committing or pushing; the branch is
    /// still checked out and a local branch ahead of the remote is reset to it.
    #[arg(long)]
    pub dry_run: bool,
}

/// Parse CLI arguments without executing.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => {
            let check_only = args.check_only;
            let mut config = load_config(&args.inspect)?;
            if args.dry_run {
                config.dry_run = true;
            }
            if let Some(branch) = args.branch {
                config.branch = branch;
            }
            run_workflow(config, &args.inspect, check_only).await
        }
        Commands::Check(args) => {
            let config = load_config(&args.inspect)?;
            run_workflow(config, &args.inspect, true).await
        }
        Commands::Update(args) => run_update_command(args).await,
    }
}

/// File, then environment, then flags.
fn load_config(args: &InspectArgs) -> anyhow::Result<WorkflowConfig> {
    let mut config = WorkflowConfig::from_file(&args.config)?;
    config.apply_env_overrides()?;
    if !args.services.is_empty() {
        config.services = args.services.clone();
    }
    if let Some(days) = args.days {
        config.quick_search_days = days;
    }
    Ok(config)
}

async fn run_workflow(
    config: WorkflowConfig,
    args: &InspectArgs,
    check_only: bool,
) -> anyhow::Result<()> {
    if config.dry_run && !check_only {
        info!("Dry run: no files will be written, committed or pushed");
    }

    let options = RunOptions {
        check_only,
        output_stale: args.output_stale.clone(),
        print_reports: !args.json,
        today: None,
    };
    let coordinator = Coordinator::new(config);
    let report = coordinator.run(&options).await?;

    if args.json {
        let summary = report.summary(coordinator.config(), check_only);
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_stale_hint(&report.results, check_only);
        println!("\nWorkflow complete (run {})", report.run_id);
    }
    Ok(())
}

fn print_stale_hint(results: &[ImageCheckResult], check_only: bool) {
    let stale = results
        .iter()
        .filter(|r| r.status == ImageStatus::Stale)
        .count();
    if check_only && stale > 0 {
        println!("\n{stale} stale service(s); run without --check-only to update them");
    }
}

async fn run_update_command(args: UpdateArgs) -> anyhow::Result<()> {
    let mut validation = WorkflowConfig::default()
        .with_branch(args.branch.clone())
        .with_pipeline_branch(args.pipeline_branch.clone())
        .with_git_repos_dir(args.repos_dir.clone());
    validation.remote = args.remote.clone();
    validation.validate()?;
    let repos_dir = validation.require_repos_dir()?.to_path_buf();

    let services = if args.services.is_empty() {
        discover_working_copies(&repos_dir)
    } else {
        args.services.clone()
    };
    if services.is_empty() {
        println!("No git working copies found in {}", repos_dir.display());
        return Ok(());
    }
    info!(count = services.len(), "Updating working copies");

    let config = DriverConfig::new(repos_dir)
        .with_checkout_branch(args.branch.clone())
        .with_floating_branch(args.pipeline_branch.clone())
        .with_remote(args.remote)
        .with_dry_run(args.dry_run);
    let driver = RepoUpdateDriver::new(
        Arc::new(GitCli::new()),
        Arc::new(TektonMutator::new()),
        config,
    );
    let outcomes = driver.process_all(&services).await;
    print!("{}", update_summary(&outcomes, args.dry_run));

    // Every requested service is treated as stale.
    let as_stale: Vec<ImageCheckResult> = services
        .iter()
        .map(|name| ImageCheckResult {
            service_name: name.clone(),
            status: ImageStatus::Stale,
            matched_tag: None,
            matched_date: None,
            last_seen_tag: None,
            error_detail: None,
        })
        .collect();
    let context = ReconcileContext {
        checkout_branch: args.branch,
        floating_branch: args.pipeline_branch,
    };
    if let Some(text) = unremedied_report(&reconcile(&as_stale, &outcomes, &context)) {
        print!("{text}");
    }
    Ok(())
}
