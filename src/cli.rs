// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::types::WorkloadKind;

/// Command-line arguments for `taskhost`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "taskhost",
    version,
    about = "Run training, scoring and indexing workloads in supervised child processes.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    #[arg(long, global = true, value_name = "PATH", default_value = "Taskhost.toml")]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `TASKHOST_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Train a model variant and report progress until the child exits.
    Train(TrainArgs),

    /// Load items into a search index and report progress.
    Index(TaskArgs),

    /// Start a scoring child and query it once per key.
    Score(ScoreArgs),

    /// Print the composed artifact for a workload variant.
    Artifact(ArtifactArgs),

    /// List the registered variants.
    Variants {
        /// Only list variants of this kind.
        #[arg(long, value_parser = clap::value_parser!(WorkloadKind))]
        kind: Option<WorkloadKind>,
    },

    /// Print a currently unused local port.
    Port,

    /// Child mode: run the built-in simulated training workload.
    Simulate(SimulateArgs),

    /// Child mode: serve the built-in length scorer until terminated.
    SimulateScore(SimulateScoreArgs),
}

#[derive(Debug, Clone, Args)]
pub struct TaskArgs {
    /// Variant to run.
    #[arg(long)]
    pub variant: String,

    /// Extra `name=value` parameter handed to the child as `--name value`.
    #[arg(long = "arg", value_name = "NAME=VALUE", value_parser = parse_key_value)]
    pub args: Vec<(String, String)>,

    /// Working directory of the task. Defaults to `<workspace_dir>/<kind>-<variant>`.
    #[arg(long, value_name = "DIR")]
    pub workdir: Option<PathBuf>,

    /// Keep the working directory after the task finished.
    #[arg(long)]
    pub keep_workdir: bool,
}

#[derive(Debug, Clone, Args)]
pub struct TrainArgs {
    #[command(flatten)]
    pub task: TaskArgs,

    #[arg(long)]
    pub epochs: Option<u32>,

    #[arg(long)]
    pub batch_size: Option<u32>,
}

#[derive(Debug, Clone, Args)]
pub struct ScoreArgs {
    #[arg(long)]
    pub variant: String,

    /// Item to score; may be given several times.
    #[arg(long = "key", value_name = "KEY", required = true)]
    pub keys: Vec<String>,

    /// Request/response workload to start.
    #[arg(long, default_value = "scoring", value_parser = clap::value_parser!(WorkloadKind))]
    pub kind: WorkloadKind,

    #[arg(long = "arg", value_name = "NAME=VALUE", value_parser = parse_key_value)]
    pub args: Vec<(String, String)>,
}

#[derive(Debug, Clone, Args)]
pub struct ArtifactArgs {
    #[arg(long, value_parser = clap::value_parser!(WorkloadKind))]
    pub kind: WorkloadKind,

    #[arg(long)]
    pub variant: String,
}

#[derive(Debug, Clone, Args)]
pub struct SimulateArgs {
    #[arg(long, default_value_t = 3)]
    pub epochs: usize,

    /// Batches per epoch.
    #[arg(long, default_value_t = 10)]
    pub batches: u64,

    /// Accepted for command-line compatibility with real trainers.
    #[arg(long = "batch_size", alias = "batch-size")]
    pub batch_size: Option<u32>,

    /// Delay per simulated batch.
    #[arg(long, default_value_t = 50)]
    pub batch_ms: u64,

    /// Port the status server should bind.
    #[arg(long = "tracker_port", alias = "tracker-port", default_value_t = 0)]
    pub tracker_port: u16,

    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Directory receiving the status record and handshake file.
    #[arg(long, default_value = ".")]
    pub workdir: PathBuf,

    /// Exit with an error after this many epochs, without a status record.
    #[arg(long)]
    pub fail_after: Option<usize>,
}

#[derive(Debug, Clone, Args)]
pub struct SimulateScoreArgs {
    /// Port the score server should bind.
    #[arg(long = "tracker_port", alias = "tracker-port", default_value_t = 0)]
    pub tracker_port: u16,

    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Directory receiving the handshake file.
    #[arg(long, default_value = ".")]
    pub workdir: PathBuf,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected NAME=VALUE, got '{s}'")),
    }
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
