// src/lib.rs

pub mod cli;
pub mod compose;
pub mod config;
pub mod endpoint;
pub mod engine;
pub mod errors;
pub mod fs;
pub mod logging;
pub mod protocol;
pub mod scoring;
pub mod types;
pub mod worker;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::cli::{ArtifactArgs, CliArgs, Command, ScoreArgs, SimulateArgs, TaskArgs};
use crate::compose::Composer;
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::engine::{
    Callbacks, Completion, HttpStatusProbe, LaunchSettings, TaskParams, TaskSupervisor,
};
use crate::fs::RealFileSystem;
use crate::scoring::ScoringService;
use crate::types::{TaskState, WorkloadKind};
use crate::worker::{run_simulated_scoring, run_simulated_training, SimulationOptions};

/// High-level entry point used by `main.rs`.
pub async fn run(args: CliArgs) -> Result<ExitCode> {
    match args.command {
        Command::Port => {
            println!("{}", endpoint::allocate()?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Simulate(sim) => simulate(sim).await,
        Command::SimulateScore(sim) => {
            run_simulated_scoring(&sim.host, sim.tracker_port, &sim.workdir).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Train(train) => {
            let (cfg, composer) = load_project(&args.config)?;
            let mut params = TaskParams::new();
            if let Some(epochs) = train.epochs {
                params.push("epochs", epochs);
            }
            if let Some(batch_size) = train.batch_size {
                params.push("batch_size", batch_size);
            }
            run_task(&cfg, composer, WorkloadKind::Training, train.task, params).await
        }
        Command::Index(task) => {
            let (cfg, composer) = load_project(&args.config)?;
            run_task(&cfg, composer, WorkloadKind::Indexing, task, TaskParams::new()).await
        }
        Command::Score(score_args) => {
            let (cfg, composer) = load_project(&args.config)?;
            score(&cfg, composer, score_args).await
        }
        Command::Artifact(artifact_args) => {
            let (_, composer) = load_project(&args.config)?;
            print_artifact(&composer, &artifact_args)
        }
        Command::Variants { kind } => {
            let (_, composer) = load_project(&args.config)?;
            print_variants(&composer, kind);
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Load and validate the config, and build the composer over the real
/// filesystem.
fn load_project(config_path: &str) -> Result<(ConfigFile, Arc<Composer>)> {
    let cfg = load_and_validate(config_path)?;
    let composer = Arc::new(Composer::from_config(&cfg, Arc::new(RealFileSystem))?);
    debug!(
        templates = ?cfg.config.templates_dir,
        workspace = ?cfg.config.workspace_dir,
        "project loaded"
    );
    Ok((cfg, composer))
}

/// Supervise one training or indexing task, printing its progress.
async fn run_task(
    cfg: &ConfigFile,
    composer: Arc<Composer>,
    kind: WorkloadKind,
    task: TaskArgs,
    mut params: TaskParams,
) -> Result<ExitCode> {
    for (name, value) in &task.args {
        params.push(name.clone(), value);
    }

    let workdir = task.workdir.clone().unwrap_or_else(|| {
        cfg.config
            .workspace_dir
            .join(format!("{}-{}", kind, task.variant))
    });
    let probe = HttpStatusProbe::new(cfg.config.host.clone(), cfg.config.poll_interval())?;
    let settings = LaunchSettings::from_config(cfg, kind);
    let mut supervisor =
        TaskSupervisor::new(kind, task.variant.clone(), workdir, composer, settings, probe);

    // Ctrl-C → cancel the child; the supervisor notices the exit itself.
    {
        let cancel = supervisor.cancel_handle();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            if !cancel.cancel() {
                debug!("Ctrl+C received with no child running");
            }
        });
    }

    let mut observer = Callbacks::new()
        .on_batch(|batch, epochs| println!("batch {batch} (epochs completed: {epochs})"))
        .on_epoch(|epochs, metrics| {
            let latest = metrics.last().map(format_metrics).unwrap_or_default();
            println!("epoch {epochs} completed {latest}");
        })
        .on_detail(|detail| match &detail.latest_item {
            Some(item) => println!("{} (latest: {item})", detail.message),
            None => println!("{}", detail.message),
        });

    let completion = supervisor.submit(&params, &mut observer).await?;
    print_completion(&completion);

    if task.keep_workdir {
        info!(workdir = ?supervisor.workdir(), "keeping working directory");
    } else if let Err(e) = supervisor.release() {
        warn!(error = %e, "failed to remove working directory");
    }

    Ok(if completion.state == TaskState::Completed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn score(cfg: &ConfigFile, composer: Arc<Composer>, args: ScoreArgs) -> Result<ExitCode> {
    let mut params = TaskParams::new();
    for (name, value) in &args.args {
        params.push(name.clone(), value);
    }
    let mut service =
        ScoringService::from_config(cfg, composer, args.kind, args.variant.clone())?.with_params(params);

    let mut failed = false;
    for key in &args.keys {
        match service.score::<serde_json::Value>(key).await {
            Ok(result) => println!("{key}\t{result}"),
            Err(e) => {
                eprintln!("{key}: {e}");
                failed = true;
            }
        }
    }
    service.close().await?;

    Ok(if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn print_artifact(composer: &Composer, args: &ArtifactArgs) -> Result<ExitCode> {
    let artifact = composer.compose(args.kind, &args.variant)?;
    print!("{}", artifact.text());
    eprintln!("digest: {}", artifact.digest());
    Ok(ExitCode::SUCCESS)
}

fn print_variants(composer: &Composer, only: Option<WorkloadKind>) {
    for kind in WorkloadKind::ALL {
        if only.is_some_and(|k| k != kind) || composer.registry().driver(kind).is_none() {
            continue;
        }
        println!("{kind}:");
        for name in composer.registry().variants(kind) {
            println!("  - {name}");
        }
    }
}

async fn simulate(args: SimulateArgs) -> Result<ExitCode> {
    if let Some(batch_size) = args.batch_size {
        debug!(batch_size, "batch size ignored by the simulated workload");
    }
    let opts = SimulationOptions {
        epochs: args.epochs,
        batches: args.batches,
        batch_delay: std::time::Duration::from_millis(args.batch_ms),
        host: args.host,
        port: args.tracker_port,
        workdir: PathBuf::from(&args.workdir),
        fail_after: args.fail_after,
    };
    let metrics = run_simulated_training(&opts).await?;
    info!(epochs = metrics.len(), "simulation finished");
    Ok(ExitCode::SUCCESS)
}

fn format_metrics(metrics: &protocol::EpochMetrics) -> String {
    metrics
        .iter()
        .map(|(name, value)| format!("{name}={value:.4}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn print_completion(completion: &Completion) {
    println!(
        "task {} (exit code: {}, status record: {})",
        completion.state,
        completion
            .exit_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "none".to_string()),
        if completion.has_record() { "yes" } else { "no" }
    );
    for (i, metrics) in completion.metrics.iter().enumerate() {
        println!("  epoch {}: {}", i + 1, format_metrics(metrics));
    }
}
