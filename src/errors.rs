// src/errors.rs

//! Crate-wide error aliases and helpers.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::WorkloadKind;

#[derive(Error, Debug)]
pub enum TaskhostError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Unknown {kind} variant: {variant}")]
    UnknownVariant { kind: WorkloadKind, variant: String },

    #[error("Template unreadable: {path:?} ({reason})")]
    TemplateUnreadable { path: PathBuf, reason: String },

    #[error("Endpoint unreachable: {0}")]
    EndpointUnreachable(String),

    #[error("No response after {attempts} attempts")]
    RetryBudgetExhausted { attempts: u32 },

    #[error("Scoring request rejected with HTTP status {status}")]
    ScoreRejected { status: u16 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, TaskhostError>;
