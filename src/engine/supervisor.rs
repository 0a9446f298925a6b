// src/engine/supervisor.rs

//! Controller-side orchestration of one task.
//!
//! This is the async IO shell around [`ProgressTracker`]: it composes the
//! artifact, launches the child, polls the child's status endpoint until the
//! process exits, and finally reads the status record.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::time::sleep;
use tracing::{debug, info, trace, warn};

use crate::compose::{CodeArtifact, Composer};
use crate::config::ConfigFile;
use crate::endpoint::{self, effective_port};
use crate::engine::cancel::CancelHandle;
use crate::engine::observer::{dispatch, Completion, TaskObserver};
use crate::engine::probe::StatusProbe;
use crate::engine::tracker::ProgressTracker;
use crate::errors::{Result, TaskhostError};
use crate::protocol::{read_status_record, EpochMetrics, ProgressRecord, ENDPOINT_FILE};
use crate::types::{TaskState, WorkloadKind};

/// Command-line parameters handed to the child, in order.
///
/// Each entry becomes `--<name> <value>`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskParams {
    args: Vec<(String, String)>,
}

impl TaskParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arg(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.args.push((name.into(), value.to_string()));
        self
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl ToString) {
        self.args.push((name.into(), value.to_string()));
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn to_args(&self) -> Vec<String> {
        self.args
            .iter()
            .flat_map(|(name, value)| [format!("--{name}"), value.clone()])
            .collect()
    }
}

/// How children are started and watched.
#[derive(Debug, Clone)]
pub struct LaunchSettings {
    pub interpreter: String,
    pub interpreter_args: Vec<String>,
    pub port_arg: String,
    pub poll_interval: Duration,
    /// `None` disables the relaunch-once rule.
    pub launch_grace: Option<Duration>,
}

impl LaunchSettings {
    pub fn from_config(cfg: &ConfigFile, kind: WorkloadKind) -> Self {
        let port_arg = cfg
            .kind_config(kind)
            .map(|k| k.port_arg.clone())
            .unwrap_or_else(|| "tracker_port".to_string());
        Self {
            interpreter: cfg.config.interpreter.clone(),
            interpreter_args: cfg.config.interpreter_args.clone(),
            port_arg,
            poll_interval: cfg.config.poll_interval(),
            launch_grace: cfg.config.launch_grace(),
        }
    }
}

/// One managed execution of a workload in a child process.
///
/// The working directory belongs to the task exclusively: it is cleared on
/// every submit and removed by [`TaskSupervisor::release`].
pub struct TaskSupervisor<P: StatusProbe> {
    kind: WorkloadKind,
    variant: String,
    workdir: PathBuf,
    composer: Arc<Composer>,
    settings: LaunchSettings,
    probe: P,
    state: TaskState,
    cancel: CancelHandle,
    port: Option<u16>,
    artifact: Option<CodeArtifact>,
    tracker: ProgressTracker,
}

impl<P: StatusProbe> std::fmt::Debug for TaskSupervisor<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskSupervisor")
            .field("kind", &self.kind)
            .field("variant", &self.variant)
            .field("workdir", &self.workdir)
            .field("state", &self.state)
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}

impl<P: StatusProbe> TaskSupervisor<P> {
    pub fn new(
        kind: WorkloadKind,
        variant: impl Into<String>,
        workdir: impl Into<PathBuf>,
        composer: Arc<Composer>,
        settings: LaunchSettings,
        probe: P,
    ) -> Self {
        Self {
            kind,
            variant: variant.into(),
            workdir: workdir.into(),
            composer,
            settings,
            probe,
            state: TaskState::Idle,
            cancel: CancelHandle::new(),
            port: None,
            artifact: None,
            tracker: ProgressTracker::new(),
        }
    }

    /// Seed the metrics cache, e.g. when continuing a previously trained model.
    pub fn with_metrics(mut self, metrics: Vec<EpochMetrics>) -> Self {
        self.tracker = ProgressTracker::with_metrics(metrics);
        self
    }

    pub fn kind(&self) -> WorkloadKind {
        self.kind
    }

    pub fn variant(&self) -> &str {
        &self.variant
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Port handed to the current child; only meaningful while it is alive.
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// The artifact of the latest launch.
    pub fn artifact(&self) -> Option<&CodeArtifact> {
        self.artifact.as_ref()
    }

    /// Latest known per-epoch metrics.
    pub fn metrics(&self) -> &[EpochMetrics] {
        self.tracker.metrics()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Request termination of the running child. See [`CancelHandle::cancel`].
    pub fn cancel(&self) -> bool {
        self.cancel.cancel()
    }

    /// Run the task to completion.
    ///
    /// Composition failures are returned before any process is started.
    /// Once the child runs, polling failures are swallowed and the call
    /// returns the [`Completion`] also handed to `observer.on_complete`.
    pub async fn submit(
        &mut self,
        params: &TaskParams,
        observer: &mut dyn TaskObserver,
    ) -> Result<Completion> {
        if !(self.state == TaskState::Idle || self.state.is_terminal()) {
            return Err(TaskhostError::Other(anyhow!(
                "task is {} and cannot be submitted again",
                self.state
            )));
        }

        let artifact = self.composer.compose(self.kind, &self.variant)?;
        self.transition(TaskState::Composed);

        let fs = self.composer.file_system();
        fs.reset_dir(&self.workdir)?;
        let script = artifact.write_to(fs, &self.workdir)?;
        self.artifact = Some(artifact);

        let (mut child, port) = match self.launch(&script, params) {
            Ok(launched) => launched,
            Err(err) => {
                self.transition(TaskState::Crashed { exit_code: None });
                return Err(err);
            }
        };
        self.port = Some(port);
        self.cancel.child_started();
        self.transition(TaskState::Launched);

        self.transition(TaskState::Running);
        let status = self
            .poll_until_exit(&mut child, &script, params, observer)
            .await;
        self.cancel.child_exited();
        self.port = None;

        let (exit_code, success) = match &status {
            Ok(status) => (status.code(), status.success()),
            Err(err) => {
                warn!(task = %self.variant, error = %err, "lost track of child process");
                (None, false)
            }
        };

        let record = match read_status_record(self.composer.file_system(), &self.workdir) {
            Ok(record) => record,
            Err(err) => {
                warn!(
                    task = %self.variant,
                    error = %err,
                    "status record present but unreadable; ignoring"
                );
                None
            }
        };

        if let Some(record) = &record {
            self.tracker.apply_final(record);
        }

        let terminal = terminal_state(success, exit_code, record.as_ref(), self.cancel.is_requested());
        self.transition(terminal);

        let completion = Completion {
            state: terminal,
            record,
            metrics: self.tracker.metrics().to_vec(),
            exit_code,
        };
        info!(
            task = %self.variant,
            kind = %self.kind,
            state = %terminal,
            exit_code = ?exit_code,
            has_record = completion.has_record(),
            epochs = completion.metrics.len(),
            "task finished"
        );
        observer.on_complete(&completion);

        Ok(completion)
    }

    /// Remove the working directory. Consumes the task.
    pub fn release(self) -> Result<()> {
        self.composer
            .file_system()
            .remove_dir_all(&self.workdir)
            .with_context(|| format!("releasing working directory {:?}", self.workdir))?;
        Ok(())
    }

    fn transition(&mut self, next: TaskState) {
        debug!(task = %self.variant, kind = %self.kind, from = %self.state, to = %next, "task state change");
        self.state = next;
    }

    /// Allocate an endpoint and start the child.
    fn launch(&self, script: &Path, params: &TaskParams) -> Result<(Child, u16)> {
        let port = endpoint::allocate()?;
        let child = spawn_child(
            &self.settings,
            script,
            params,
            port,
            &self.workdir,
            &self.variant,
        )?;
        info!(
            task = %self.variant,
            kind = %self.kind,
            port,
            pid = ?child.id(),
            "child process launched"
        );
        Ok((child, port))
    }

    /// Wait for the child in short slices, polling its endpoint in between.
    async fn poll_until_exit(
        &mut self,
        child: &mut Child,
        script: &Path,
        params: &TaskParams,
        observer: &mut dyn TaskObserver,
    ) -> std::io::Result<ExitStatus> {
        let mut launched_at = Instant::now();
        let mut reached = false;
        let mut relaunches_left = 1u32;
        let mut kill_sent = false;
        let cancel = self.cancel.clone();

        loop {
            tokio::select! {
                status = child.wait() => {
                    let status = status?;
                    debug!(task = %self.variant, ?status, "child process exited");
                    return Ok(status);
                }

                _ = cancel.requested(), if !kill_sent => {
                    info!(task = %self.variant, "cancellation requested; signalling child");
                    if let Err(e) = child.start_kill() {
                        warn!(task = %self.variant, error = %e, "failed to signal child process");
                    }
                    kill_sent = true;
                }

                _ = sleep(self.settings.poll_interval) => {
                    if self.poll_once(observer).await {
                        reached = true;
                        continue;
                    }

                    let overdue = self
                        .settings
                        .launch_grace
                        .is_some_and(|grace| launched_at.elapsed() >= grace);
                    if !reached && overdue && relaunches_left > 0 && !kill_sent {
                        relaunches_left -= 1;
                        match self.relaunch(child, script, params).await {
                            Ok(()) => launched_at = Instant::now(),
                            Err(e) => warn!(task = %self.variant, error = %e, "relaunch failed"),
                        }
                    }
                }
            }
        }
    }

    /// One status query. Returns whether the child answered.
    async fn poll_once(&mut self, observer: &mut dyn TaskObserver) -> bool {
        let Some(allocated) = self.port else {
            return false;
        };
        let port = effective_port(&self.workdir, allocated);

        match self.probe.query(port).await {
            Ok(snapshot) => {
                self.deliver(&snapshot, observer);
                true
            }
            Err(err) => {
                trace!(task = %self.variant, port, error = %err, "status query failed; retrying next tick");
                false
            }
        }
    }

    fn deliver(&mut self, snapshot: &ProgressRecord, observer: &mut dyn TaskObserver) {
        for event in self.tracker.observe(snapshot) {
            debug!(task = %self.variant, ?event, "progress event");
            dispatch(observer, &event);
        }
    }

    /// Kill a child that never became reachable and start it again on a
    /// fresh endpoint.
    async fn relaunch(&mut self, child: &mut Child, script: &Path, params: &TaskParams) -> Result<()> {
        warn!(
            task = %self.variant,
            port = ?self.port,
            "child endpoint unreachable after grace period; relaunching once"
        );
        if let Err(e) = child.kill().await {
            debug!(task = %self.variant, error = %e, "child already gone before relaunch");
        }
        let _ = std::fs::remove_file(self.workdir.join(ENDPOINT_FILE));

        let (fresh, port) = self.launch(script, params)?;
        *child = fresh;
        self.port = Some(port);
        Ok(())
    }
}

/// Terminal state from how the child exited.
///
/// A clean exit with a status record is a completion even when a cancel
/// arrived too late to matter.
pub fn terminal_state(
    success: bool,
    exit_code: Option<i32>,
    record: Option<&ProgressRecord>,
    cancel_requested: bool,
) -> TaskState {
    if success && record.is_some() {
        TaskState::Completed
    } else if cancel_requested {
        TaskState::Cancelled
    } else if success {
        TaskState::Completed
    } else {
        TaskState::Crashed { exit_code }
    }
}

/// Start `interpreter [interpreter_args] <script> [params] --<port_arg> <port>`
/// inside `workdir`.
///
/// The child is killed if its handle is dropped; its output is forwarded to
/// the log at debug level.
pub(crate) fn spawn_child(
    settings: &LaunchSettings,
    script: &Path,
    params: &TaskParams,
    port: u16,
    workdir: &Path,
    label: &str,
) -> Result<Child> {
    // The child runs inside `workdir`, so a relative script path would dangle.
    let script = std::path::absolute(script)
        .with_context(|| format!("resolving script path {:?}", script))?;

    let mut cmd = Command::new(&settings.interpreter);
    cmd.args(&settings.interpreter_args)
        .arg(&script)
        .args(params.to_args())
        .arg(format!("--{}", settings.port_arg))
        .arg(port.to_string())
        .current_dir(workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning '{}' for '{}'", settings.interpreter, label))?;

    if let Some(stdout) = child.stdout.take() {
        forward_output(label.to_string(), "stdout", stdout);
    }
    if let Some(stderr) = child.stderr.take() {
        forward_output(label.to_string(), "stderr", stderr);
    }

    Ok(child)
}

/// Drain a child output pipe into the log so its buffer never fills.
fn forward_output<R>(task: String, stream: &'static str, reader: R)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(task = %task, stream, "{}", line);
        }
    });
}
