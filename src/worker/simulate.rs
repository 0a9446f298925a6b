// src/worker/simulate.rs

//! Built-in workloads that only pretend to learn or score.
//!
//! They drive the same hooks and servers a real child would, so the
//! supervise-poll-record and score-on-demand pipelines can run without an
//! ML stack.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail};
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::info;

use crate::errors::{Result, TaskhostError};
use crate::protocol::EpochMetrics;
use crate::worker::progress::{ProgressCell, TrainingHooks};
use crate::worker::server::{ScoreServer, Scorer, StatusServer};

#[derive(Debug, Clone)]
pub struct SimulationOptions {
    pub epochs: usize,
    pub batches: u64,
    pub batch_delay: Duration,
    pub host: String,
    pub port: u16,
    pub workdir: PathBuf,
    /// Abort without a status record once this many epochs completed.
    pub fail_after: Option<usize>,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            epochs: 3,
            batches: 10,
            batch_delay: Duration::from_millis(50),
            host: "127.0.0.1".to_string(),
            port: 0,
            workdir: PathBuf::from("."),
            fail_after: None,
        }
    }
}

/// Metrics reported for the `epoch`-th completed epoch (1-based).
pub fn simulated_metrics(epoch: usize) -> EpochMetrics {
    let e = epoch as f64;
    EpochMetrics::from([
        ("loss".to_string(), 1.0 / (e + 1.0)),
        ("accuracy".to_string(), 1.0 - 1.0 / (e + 2.0)),
    ])
}

/// Run the simulated training loop to completion and return its metrics.
pub async fn run_simulated_training(opts: &SimulationOptions) -> Result<Vec<EpochMetrics>> {
    let cell = ProgressCell::new();
    let mut hooks = TrainingHooks::new(cell.clone(), &opts.workdir, Vec::new());
    let server = StatusServer::new(cell)
        .start(&opts.host, opts.port, &opts.workdir)
        .await?;
    info!(port = server.port(), epochs = opts.epochs, batches = opts.batches, "simulated training started");

    for epoch in 1..=opts.epochs {
        for batch in 1..=opts.batches {
            sleep(opts.batch_delay).await;
            hooks.on_batch_end(batch);
        }
        hooks.on_epoch_end(simulated_metrics(epoch));

        if opts.fail_after == Some(epoch) {
            server.shutdown();
            return Err(TaskhostError::Other(anyhow!(
                "simulated failure after epoch {epoch}"
            )));
        }
    }

    hooks.on_train_end()?;
    server.shutdown();
    Ok(hooks.metrics())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyScore {
    pub key: String,
    pub score: f64,
}

/// Scores a key by its length in characters, one hundredth per character.
#[derive(Debug, Clone, Copy, Default)]
pub struct LengthScorer;

impl Scorer for LengthScorer {
    type Output = KeyScore;

    fn score(&self, key: &str) -> anyhow::Result<KeyScore> {
        if key.is_empty() {
            bail!("empty key");
        }
        Ok(KeyScore {
            key: key.to_string(),
            score: key.chars().count() as f64 / 100.0,
        })
    }
}

/// Serve [`LengthScorer`] until the process is terminated.
pub async fn run_simulated_scoring(host: &str, port: u16, workdir: &Path) -> Result<()> {
    let server = ScoreServer::new(LengthScorer).start(host, port, workdir).await?;
    info!(port = server.port(), "simulated scorer serving");
    server.wait().await;
    Ok(())
}
