// src/config/validate.rs

use std::collections::BTreeMap;

use regex::Regex;

use crate::config::model::{ConfigFile, KindConfig, RawConfigFile, VariantConfig};
use crate::errors::{Result, TaskhostError};
use crate::types::WorkloadKind;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::TaskhostError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        let kind = parse_kinds(&raw)?;
        let variant = parse_variants(&raw)?;
        Ok(ConfigFile::new_unchecked(raw, kind, variant))
    }
}

pub fn validate_config(cfg: &RawConfigFile) -> Result<()> {
    validate_raw_config(cfg)
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_kinds(cfg)?;
    validate_global_config(cfg)?;
    validate_compose(cfg)?;
    validate_variants(cfg)?;
    Ok(())
}

fn ensure_has_kinds(cfg: &RawConfigFile) -> Result<()> {
    if cfg.kind.is_empty() {
        return Err(TaskhostError::ConfigError(
            "config must contain at least one [kind.<name>] section".to_string(),
        ));
    }
    parse_table_names(cfg.kind.keys(), "kind")?;
    for (name, kind) in cfg.kind.iter() {
        if kind.driver.as_os_str().is_empty() {
            return Err(TaskhostError::ConfigError(format!(
                "[kind.{name}].driver must not be empty"
            )));
        }
        if kind.port_arg.trim().is_empty() {
            return Err(TaskhostError::ConfigError(format!(
                "[kind.{name}].port_arg must not be empty"
            )));
        }
    }
    Ok(())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<()> {
    if cfg.config.interpreter.trim().is_empty() {
        return Err(TaskhostError::ConfigError(
            "[config].interpreter must not be empty".to_string(),
        ));
    }

    if cfg.config.poll_interval_ms == 0 {
        return Err(TaskhostError::ConfigError(
            "[config].poll_interval_ms must be >= 1 (got 0)".to_string(),
        ));
    }

    if cfg.scoring.retries == 0 {
        return Err(TaskhostError::ConfigError(
            "[scoring].retries must be >= 1 (got 0)".to_string(),
        ));
    }

    Ok(())
}

fn validate_compose(cfg: &RawConfigFile) -> Result<()> {
    let pattern = &cfg.compose.support_pattern;
    let regex = Regex::new(pattern).map_err(|e| {
        TaskhostError::ConfigError(format!(
            "[compose].support_pattern is not a valid regex: {e}"
        ))
    })?;

    if regex.captures_len() < 2 {
        return Err(TaskhostError::ConfigError(format!(
            "[compose].support_pattern '{pattern}' needs a capture group for the module path"
        )));
    }

    if cfg.compose.placeholder_module.trim().is_empty() {
        return Err(TaskhostError::ConfigError(
            "[compose].placeholder_module must not be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_variants(cfg: &RawConfigFile) -> Result<()> {
    let kinds = parse_table_names(cfg.kind.keys(), "kind")?;
    parse_table_names(cfg.variant.keys(), "variant")?;
    for (kind, variants) in cfg.variant.iter() {
        if !kinds.contains_key(&parse_kind_name(kind)?) {
            return Err(TaskhostError::ConfigError(format!(
                "variants declared for '{kind}' but there is no [kind.{kind}] section"
            )));
        }
        for (name, variant) in variants.iter() {
            if variant.module.trim().is_empty() {
                return Err(TaskhostError::ConfigError(format!(
                    "variant '{name}' of '{kind}' has an empty module path"
                )));
            }
        }
    }
    Ok(())
}

fn parse_kind_name(name: &str) -> Result<WorkloadKind> {
    name.parse::<WorkloadKind>()
        .map_err(TaskhostError::ConfigError)
}

/// Parse the table names of one section, rejecting two names (such as
/// `train` and `training`) that denote the same kind.
fn parse_table_names<'a>(
    names: impl Iterator<Item = &'a String>,
    section: &str,
) -> Result<BTreeMap<WorkloadKind, &'a str>> {
    let mut parsed: BTreeMap<WorkloadKind, &'a str> = BTreeMap::new();
    for name in names {
        let kind = parse_kind_name(name)?;
        if let Some(previous) = parsed.insert(kind, name.as_str()) {
            return Err(TaskhostError::ConfigError(format!(
                "[{section}.{previous}] and [{section}.{name}] both configure the {kind} kind"
            )));
        }
    }
    Ok(parsed)
}

fn parse_kinds(raw: &RawConfigFile) -> Result<BTreeMap<WorkloadKind, KindConfig>> {
    raw.kind
        .iter()
        .map(|(name, cfg)| Ok((parse_kind_name(name)?, cfg.clone())))
        .collect()
}

fn parse_variants(
    raw: &RawConfigFile,
) -> Result<BTreeMap<WorkloadKind, BTreeMap<String, VariantConfig>>> {
    raw.variant
        .iter()
        .map(|(name, variants)| Ok((parse_kind_name(name)?, variants.clone())))
        .collect()
}
