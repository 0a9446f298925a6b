use std::collections::VecDeque;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use taskhost::errors::{Result, TaskhostError};
use taskhost::protocol::ProgressRecord;
use taskhost::engine::StatusProbe;

/// What the fake child "answers" to one status query.
#[derive(Debug, Clone)]
pub enum ProbeStep {
    Unreachable,
    Snapshot(ProgressRecord),
}

/// A fake status probe that:
/// - answers queries from a fixed script, one step per query
/// - records the port of every query
/// - once the script is used up, creates a release file (if configured) so
///   the real child process knows it may finish, and reports unreachable
///   from then on.
#[derive(Debug, Clone)]
pub struct ScriptedProbe {
    steps: Arc<Mutex<VecDeque<ProbeStep>>>,
    ports: Arc<Mutex<Vec<u16>>>,
    release_file: Option<PathBuf>,
}

impl ScriptedProbe {
    pub fn new(steps: impl IntoIterator<Item = ProbeStep>) -> Self {
        Self {
            steps: Arc::new(Mutex::new(steps.into_iter().collect())),
            ports: Arc::new(Mutex::new(Vec::new())),
            release_file: None,
        }
    }

    /// Script made only of snapshots.
    pub fn snapshots(snapshots: impl IntoIterator<Item = ProgressRecord>) -> Self {
        Self::new(snapshots.into_iter().map(ProbeStep::Snapshot))
    }

    pub fn with_release_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.release_file = Some(path.into());
        self
    }

    /// Ports queried so far, in order.
    pub fn queried_ports(&self) -> Vec<u16> {
        self.ports.lock().unwrap().clone()
    }

    pub fn remaining(&self) -> usize {
        self.steps.lock().unwrap().len()
    }

    fn next_step(&self, port: u16) -> Option<ProbeStep> {
        self.ports.lock().unwrap().push(port);
        let step = self.steps.lock().unwrap().pop_front();
        if step.is_none() {
            if let Some(path) = &self.release_file {
                if !path.exists() {
                    std::fs::write(path, b"go").expect("write release file");
                }
            }
        }
        step
    }
}

impl StatusProbe for ScriptedProbe {
    fn query(
        &mut self,
        port: u16,
    ) -> Pin<Box<dyn Future<Output = Result<ProgressRecord>> + Send + '_>> {
        let step = self.next_step(port);
        Box::pin(async move {
            match step {
                Some(ProbeStep::Snapshot(record)) => Ok(record),
                Some(ProbeStep::Unreachable) | None => Err(TaskhostError::EndpointUnreachable(
                    format!("scripted probe: port {port} not answering"),
                )),
            }
        })
    }
}
