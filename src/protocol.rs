// src/protocol.rs

//! Wire and file formats shared by the supervisor and child processes.
//!
//! A child serves a [`ProgressRecord`] as JSON on its status endpoint and,
//! on normal completion, writes the same record (with a terminal
//! [`LifecycleState`]) to [`STATUS_RECORD_FILE`] in its working directory.
//!
//! Children written in Python emit the non-standard `NaN`, `Infinity` and
//! `-Infinity` tokens for diverged metrics. [`parse_progress_record`]
//! accepts them; such metrics read back as `f64::NAN` and serialize as
//! `null`.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Deserializer, Serialize};

use crate::errors::Result;
use crate::fs::FileSystem;

/// Status record written by a child right before it exits normally.
pub const STATUS_RECORD_FILE: &str = "status.json";

/// Handshake file holding the port the child actually bound.
pub const ENDPOINT_FILE: &str = "endpoint.port";

/// Metrics of one completed epoch (e.g. `loss`, `accuracy`, `val_loss`).
pub type EpochMetrics = BTreeMap<String, f64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    #[default]
    Starting,
    Training,
    Loading,
    Trained,
    Loaded,
}

impl LifecycleState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleState::Trained | LifecycleState::Loaded)
    }
}

/// Progress of an indexing child.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LoadDetail {
    pub message: String,
    #[serde(default)]
    pub latest_item: Option<String>,
}

/// Progress snapshot served by a child, and the body of the status record.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProgressRecord {
    #[serde(default)]
    pub state: LifecycleState,

    /// Completed epochs in completion order.
    #[serde(default, deserialize_with = "deserialize_metrics")]
    pub metrics: Vec<EpochMetrics>,

    /// Batches completed in the current epoch.
    #[serde(default)]
    pub completed_batch: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<LoadDetail>,
}

impl ProgressRecord {
    pub fn epochs_completed(&self) -> usize {
        self.metrics.len()
    }
}

/// `null` stands for a value that was not finite.
fn deserialize_metrics<'de, D>(deserializer: D) -> std::result::Result<Vec<EpochMetrics>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<BTreeMap<String, Option<f64>>>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|epoch| {
            epoch
                .into_iter()
                .map(|(name, value)| (name, value.unwrap_or(f64::NAN)))
                .collect()
        })
        .collect())
}

/// Parse a snapshot or status record.
pub fn parse_progress_record(text: &str) -> Result<ProgressRecord> {
    Ok(serde_json::from_str(&normalize_non_finite(text))?)
}

/// Replace bare `NaN`, `Infinity` and `-Infinity` tokens with `null`,
/// leaving string literals untouched.
pub fn normalize_non_finite(text: &str) -> Cow<'_, str> {
    const TOKENS: [&str; 3] = ["-Infinity", "Infinity", "NaN"];

    if !TOKENS.iter().any(|t| text.contains(t)) {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut rest = text;

    while let Some(c) = rest.chars().next() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
        } else if c == '"' {
            in_string = true;
        } else if let Some(token) = TOKENS.iter().find(|t| rest.starts_with(**t)) {
            out.push_str("null");
            rest = &rest[token.len()..];
            continue;
        }
        out.push(c);
        rest = &rest[c.len_utf8()..];
    }

    Cow::Owned(out)
}

pub fn status_record_path(workdir: &Path) -> PathBuf {
    workdir.join(STATUS_RECORD_FILE)
}

/// Read the status record from a working directory.
///
/// Returns `Ok(None)` when the child never wrote one.
pub fn read_status_record(fs: &dyn FileSystem, workdir: &Path) -> Result<Option<ProgressRecord>> {
    let path = status_record_path(workdir);
    if !fs.is_file(&path) {
        return Ok(None);
    }
    let contents = fs
        .read_to_string(&path)
        .with_context(|| format!("reading status record {:?}", path))?;
    parse_progress_record(&contents).map(Some)
}

/// Write the status record into a working directory.
pub fn write_status_record(workdir: &Path, record: &ProgressRecord) -> Result<()> {
    let path = status_record_path(workdir);
    let json = serde_json::to_string(record)?;
    fs::write(&path, json).with_context(|| format!("writing status record {:?}", path))?;
    Ok(())
}

/// Port announced by the child through the handshake file, if any.
pub fn read_endpoint_handshake(workdir: &Path) -> Option<u16> {
    fs::read_to_string(workdir.join(ENDPOINT_FILE))
        .ok()
        .and_then(|s| s.trim().parse().ok())
}

pub fn write_endpoint_handshake(workdir: &Path, port: u16) -> Result<()> {
    let path = workdir.join(ENDPOINT_FILE);
    fs::write(&path, port.to_string())
        .with_context(|| format!("writing endpoint handshake {:?}", path))?;
    Ok(())
}
