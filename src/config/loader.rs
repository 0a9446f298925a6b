// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and validate it.
///
/// Relative `templates_dir` / `workspace_dir` entries are resolved against
/// the directory holding the config file, so a project can be driven from
/// any working directory.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let path = path.as_ref();
    let raw_config = load_from_path(path)?;
    let mut config = ConfigFile::try_from(raw_config)?;

    let root = config_root_dir(path);
    if config.config.templates_dir.is_relative() {
        config.config.templates_dir = root.join(&config.config.templates_dir);
    }
    if config.config.workspace_dir.is_relative() {
        config.config.workspace_dir = root.join(&config.config.workspace_dir);
    }

    Ok(config)
}

/// Default config path: `Taskhost.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Taskhost.toml")
}

/// Directory that relative config entries are resolved against.
///
/// A bare filename like "Taskhost.toml" (parent = "") falls back to the
/// current working directory.
fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}
