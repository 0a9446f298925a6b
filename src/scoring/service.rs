// src/scoring/service.rs

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use serde::de::DeserializeOwned;
use tempfile::TempDir;
use tokio::process::Child;
use tracing::{debug, info, warn};

use crate::compose::{CodeArtifact, Composer};
use crate::config::ConfigFile;
use crate::endpoint::{self, effective_port};
use crate::engine::supervisor::spawn_child;
use crate::engine::{LaunchSettings, TaskParams};
use crate::errors::{Result, TaskhostError};
use crate::scoring::client::ScoringClient;
use crate::types::WorkloadKind;

struct RunningChild {
    child: Child,
    port: u16,
    dir: TempDir,
    artifact: CodeArtifact,
}

impl RunningChild {
    fn workdir(&self) -> &Path {
        self.dir.path()
    }
}

/// A scoring (or search) child started on first use and kept alive across
/// requests.
///
/// The artifact lives in a private temporary directory. Dropping the service
/// kills the child and removes the directory; [`ScoringService::close`] does
/// the same and reports cleanup failures.
pub struct ScoringService {
    kind: WorkloadKind,
    variant: String,
    composer: Arc<Composer>,
    settings: LaunchSettings,
    params: TaskParams,
    client: ScoringClient,
    running: Option<RunningChild>,
}

impl std::fmt::Debug for ScoringService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScoringService")
            .field("kind", &self.kind)
            .field("variant", &self.variant)
            .field("port", &self.port())
            .finish_non_exhaustive()
    }
}

impl ScoringService {
    /// `kind` must be a request/response workload (scoring or indexing).
    pub fn new(
        kind: WorkloadKind,
        variant: impl Into<String>,
        composer: Arc<Composer>,
        settings: LaunchSettings,
        client: ScoringClient,
    ) -> Result<Self> {
        if kind == WorkloadKind::Training {
            return Err(TaskhostError::ConfigError(
                "training workloads are supervised, not queried".to_string(),
            ));
        }
        Ok(Self {
            kind,
            variant: variant.into(),
            composer,
            settings,
            params: TaskParams::new(),
            client,
            running: None,
        })
    }

    pub fn from_config(
        cfg: &ConfigFile,
        composer: Arc<Composer>,
        kind: WorkloadKind,
        variant: impl Into<String>,
    ) -> Result<Self> {
        let client = ScoringClient::from_config(cfg.config.host.clone(), &cfg.scoring)?;
        Self::new(
            kind,
            variant,
            composer,
            LaunchSettings::from_config(cfg, kind),
            client,
        )
    }

    /// Extra command-line parameters for the child, e.g. a model location.
    pub fn with_params(mut self, params: TaskParams) -> Self {
        self.params = params;
        self
    }

    pub fn kind(&self) -> WorkloadKind {
        self.kind
    }

    pub fn variant(&self) -> &str {
        &self.variant
    }

    /// Port the child is serving on, once started.
    pub fn port(&self) -> Option<u16> {
        self.running
            .as_ref()
            .map(|r| effective_port(r.workdir(), r.port))
    }

    pub fn artifact(&self) -> Option<&CodeArtifact> {
        self.running.as_ref().map(|r| &r.artifact)
    }

    /// Score one item, starting the child first if needed.
    pub async fn score<T: DeserializeOwned>(&mut self, key: &str) -> Result<T> {
        self.ensure_started()?;
        let running = self
            .running
            .as_ref()
            .ok_or_else(|| anyhow!("scoring child not running"))?;
        let (workdir, allocated) = (running.workdir(), running.port);
        // The handshake file may only appear once the child has bound.
        self.client
            .query_with(|| effective_port(workdir, allocated), key)
            .await
    }

    /// Working directory of the current child, once started.
    pub fn workdir(&self) -> Option<&Path> {
        self.running.as_ref().map(|r| r.workdir())
    }

    /// Whether a started child is still running. Reaps it if it exited.
    pub fn is_alive(&mut self) -> bool {
        self.running
            .as_mut()
            .is_some_and(|r| matches!(r.child.try_wait(), Ok(None)))
    }

    /// Process id of the current child, once started.
    pub fn child_id(&self) -> Option<u32> {
        self.running.as_ref().and_then(|r| r.child.id())
    }

    /// Kill the child and remove its temporary directory.
    pub async fn close(&mut self) -> Result<()> {
        let Some(mut running) = self.running.take() else {
            return Ok(());
        };
        if let Err(e) = running.child.kill().await {
            debug!(variant = %self.variant, error = %e, "scoring child already gone");
        }
        info!(variant = %self.variant, kind = %self.kind, "scoring child stopped");
        running
            .dir
            .close()
            .context("removing scoring working directory")?;
        Ok(())
    }

    fn ensure_started(&mut self) -> Result<()> {
        if let Some(running) = self.running.as_mut() {
            match running.child.try_wait() {
                Ok(None) => return Ok(()),
                Ok(Some(status)) => {
                    warn!(
                        variant = %self.variant,
                        exit_code = ?status.code(),
                        "scoring child exited; starting a new one"
                    );
                }
                Err(e) => {
                    warn!(variant = %self.variant, error = %e, "cannot query scoring child; restarting");
                }
            }
            self.running = None;
        }

        let artifact = self.composer.compose(self.kind, &self.variant)?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("taskhost-{}-", self.kind))
            .tempdir()
            .context("creating scoring working directory")?;
        let script = artifact.write_to(self.composer.file_system(), dir.path())?;

        let port = endpoint::allocate()?;
        let child = spawn_child(
            &self.settings,
            &script,
            &self.params,
            port,
            dir.path(),
            &self.variant,
        )?;
        info!(
            variant = %self.variant,
            kind = %self.kind,
            port,
            pid = ?child.id(),
            "scoring child launched"
        );

        self.running = Some(RunningChild {
            child,
            port,
            dir,
            artifact,
        });
        Ok(())
    }
}
