//! relgate - release pipeline orchestrator CLI
//!
//! ## Commands
//!
//! - `run`: evaluate the trigger and, if admitted, build, verify, retain and publish
//! - `evaluate`: evaluate the trigger only and print the decision
//!
//! ## Exit codes
//!
//! 0 passed or skipped, 1 check failed, 2 build failed, 3 publish failed,
//! 4 retention failed, 5 cancelled, 64 configuration error, 70 internal error.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use relgate_ci::{PipelineOutcome, ReleasePipeline, RunRequest, RunVerdict};
use relgate_core::obs::RunSpan;
use relgate_core::{
    evaluate_trigger, ArtifactPublishStatus, CancellationToken, CheckOutcome, ConfigError,
    Credentials, PipelineConfig, PipelineRun, TriggerContext, TriggerEvent, CONFIG_FILE,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn, Level};

const EXIT_CONFIG: u8 = 64;
const EXIT_INTERNAL: u8 = 70;

#[derive(Parser)]
#[command(name = "relgate")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Release pipeline orchestrator", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the release pipeline for one event
    Run {
        #[command(flatten)]
        trigger: TriggerArgs,

        /// Commit being built (default: $GITHUB_SHA, then `git rev-parse HEAD`)
        #[arg(long, env = "GITHUB_SHA")]
        sha: Option<String>,

        /// Checkout to build
        #[arg(short, long, default_value = ".")]
        workspace: PathBuf,

        /// Distribution name (overrides `package.name`)
        #[arg(long)]
        package: Option<String>,

        /// Write the finished run as JSON to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Evaluate the trigger only
    Evaluate {
        #[command(flatten)]
        trigger: TriggerArgs,
    },
}

#[derive(Args)]
struct TriggerArgs {
    /// Triggering event: pull_request, push or manual_dispatch
    #[arg(long, env = "GITHUB_EVENT_NAME")]
    event: TriggerEvent,

    /// Ref being built, e.g. refs/heads/main or refs/tags/v1.2.0
    #[arg(long = "ref", env = "GITHUB_REF")]
    git_ref: String,

    /// Branch name, when it differs from the ref
    #[arg(long)]
    branch: Option<String>,

    /// Changed path (repeatable)
    #[arg(long = "changed")]
    changed: Vec<String>,

    /// File listing changed paths, one per line
    #[arg(long)]
    changed_file: Option<PathBuf>,

    /// Configuration file (default: relgate.toml in the workspace)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

impl TriggerArgs {
    fn context(&self) -> Result<TriggerContext> {
        let mut ctx = TriggerContext::new(self.event, self.git_ref.clone())
            .with_changed_paths(self.changed.iter().cloned());
        if let Some(branch) = self.branch.as_deref().filter(|b| !b.is_empty()) {
            ctx = ctx.with_branch(branch);
        }
        if let Some(path) = &self.changed_file {
            let listing = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read changed-paths file {}", path.display()))?;
            ctx = ctx.with_changed_paths(parse_changed_paths(&listing));
        }
        Ok(ctx)
    }

    fn load_config(&self, workspace: &Path) -> Result<PipelineConfig> {
        let config = match &self.config {
            Some(path) => PipelineConfig::load(path)?,
            None => PipelineConfig::load_or_default(&workspace.join(CONFIG_FILE))?,
        };
        Ok(config)
    }
}

fn parse_changed_paths(listing: &str) -> Vec<String> {
    listing
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    relgate_core::init_tracing(cli.json, level);

    let result = match cli.command {
        Commands::Run {
            trigger,
            sha,
            workspace,
            package,
            report,
        } => cmd_run(&trigger, sha, &workspace, package, report.as_deref()).await,
        Commands::Evaluate { trigger } => cmd_evaluate(&trigger),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("error: {:#}", e);
            if e.downcast_ref::<ConfigError>().is_some() {
                ExitCode::from(EXIT_CONFIG)
            } else {
                ExitCode::from(EXIT_INTERNAL)
            }
        }
    }
}

fn cmd_evaluate(trigger: &TriggerArgs) -> Result<u8> {
    let config = trigger.load_config(Path::new("."))?;
    let ctx = trigger.context()?;
    let decision = evaluate_trigger(&ctx, &config.trigger);

    println!("{}", decision);
    Ok(0)
}

async fn cmd_run(
    trigger: &TriggerArgs,
    sha: Option<String>,
    workspace: &Path,
    package: Option<String>,
    report: Option<&Path>,
) -> Result<u8> {
    let mut config = trigger.load_config(workspace)?;
    if let Some(package) = package {
        config.package.name = package;
    }

    let token = std::env::var(&config.publish.token_env)
        .ok()
        .filter(|t| !t.is_empty())
        .map(Credentials::new);
    let pipeline = ReleasePipeline::from_config(&config, workspace, token)?;

    let commit_sha = match sha.filter(|s| !s.is_empty()) {
        Some(sha) => sha,
        None => capture_head_sha(workspace).await,
    };
    let request = RunRequest {
        trigger: trigger.context()?,
        commit_sha,
        workspace: workspace.to_path_buf(),
    };

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current stage");
            on_signal.cancel();
        }
    });

    let outcome = pipeline.run(request, &cancel).await?;
    let verdict = outcome.verdict();

    match &outcome {
        PipelineOutcome::Skipped(decision) => println!("Skipped: {}", decision),
        PipelineOutcome::Ran(run) => {
            let _span = RunSpan::enter(&run.run_id.to_string(), run.git_ref.as_str());
            print_run(run, &verdict);
            info!(verdict = %verdict, exit_code = verdict.exit_code(), "run complete");
        }
    }

    if let Some(path) = report {
        write_report(path, &outcome)?;
    }

    Ok(verdict.exit_code())
}

async fn capture_head_sha(workspace: &Path) -> String {
    tokio::process::Command::new("git")
        .args(["rev-parse", "HEAD"])
        .current_dir(workspace)
        .output()
        .await
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

fn print_run(run: &PipelineRun, verdict: &RunVerdict) {
    println!("Run:     {}", run.run_id);
    println!("Ref:     {} ({})", run.git_ref, run.trigger_event);
    println!("Commit:  {}", run.commit_sha);
    for artifact in &run.artifacts {
        println!(
            "  artifact {:<8} {} ({})",
            artifact.kind.as_str(),
            artifact.filename,
            artifact.digest.short()
        );
    }
    for check in &run.check_results {
        let mark = match check.outcome {
            CheckOutcome::Passed => "passed",
            CheckOutcome::Failed => "FAILED",
            CheckOutcome::Skipped => "skipped",
        };
        match &check.detail {
            Some(detail) => println!("  check {:<22} {} - {}", check.check_name, mark, detail),
            None => println!("  check {:<22} {}", check.check_name, mark),
        }
    }
    for record in &run.publish_records {
        let status = match &record.status {
            ArtifactPublishStatus::Published => "published".to_string(),
            ArtifactPublishStatus::SkippedExisting => "already on registry".to_string(),
            ArtifactPublishStatus::Failed { detail } => format!("FAILED - {}", detail),
            ArtifactPublishStatus::NotAttempted => "not attempted".to_string(),
        };
        println!("  publish {} {}", record.filename, status);
    }
    println!("Publish: {}", run.publish_outcome.as_str());
    if let Some(failure) = &run.failure {
        println!("Failure: {}", failure);
    }
    println!("Verdict: {}", verdict);
}

fn write_report(path: &Path, outcome: &PipelineOutcome) -> Result<()> {
    let json = match outcome.run() {
        Some(run) => serde_json::to_string_pretty(run)?,
        None => serde_json::to_string_pretty(outcome)?,
    };
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write report {}", path.display()))?;
    info!(path = %path.display(), "report written");
    Ok(())
}
