use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The three workloads the supervisor knows how to host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkloadKind {
    Training,
    Scoring,
    Indexing,
}

impl WorkloadKind {
    pub const ALL: [WorkloadKind; 3] = [
        WorkloadKind::Training,
        WorkloadKind::Scoring,
        WorkloadKind::Indexing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadKind::Training => "training",
            WorkloadKind::Scoring => "scoring",
            WorkloadKind::Indexing => "indexing",
        }
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkloadKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "training" | "train" => Ok(WorkloadKind::Training),
            "scoring" | "score" => Ok(WorkloadKind::Scoring),
            "indexing" | "index" => Ok(WorkloadKind::Indexing),
            other => Err(format!(
                "invalid workload kind: {other} (expected \"training\", \"scoring\" or \"indexing\")"
            )),
        }
    }
}

/// Supervisor-side lifecycle of a task.
///
/// `Idle -> Composed -> Launched -> Running -> {Completed, Cancelled, Crashed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Idle,
    Composed,
    Launched,
    Running,
    Completed,
    Cancelled,
    /// Non-zero exit status, or killed by a signal nobody asked for.
    Crashed { exit_code: Option<i32> },
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Cancelled | TaskState::Crashed { .. }
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::Idle => f.write_str("idle"),
            TaskState::Composed => f.write_str("composed"),
            TaskState::Launched => f.write_str("launched"),
            TaskState::Running => f.write_str("running"),
            TaskState::Completed => f.write_str("completed"),
            TaskState::Cancelled => f.write_str("cancelled"),
            TaskState::Crashed { exit_code: Some(code) } => write!(f, "crashed (exit code {code})"),
            TaskState::Crashed { exit_code: None } => f.write_str("crashed (signal)"),
        }
    }
}
