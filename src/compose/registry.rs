// src/compose/registry.rs

//! Variant registry: which named implementations exist for each workload.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::ConfigFile;
use crate::errors::{Result, TaskhostError};
use crate::types::WorkloadKind;

/// A resolved variant: the module that replaces the driver's placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantEntry {
    pub name: String,
    pub module: String,
}

#[derive(Debug, Clone, Default)]
pub struct VariantRegistry {
    drivers: BTreeMap<WorkloadKind, PathBuf>,
    variants: BTreeMap<WorkloadKind, BTreeMap<String, VariantEntry>>,
}

impl VariantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(cfg: &ConfigFile) -> Self {
        let mut registry = Self::new();
        for (kind, kind_cfg) in cfg.kind.iter() {
            registry.set_driver(*kind, &kind_cfg.driver);
        }
        for (kind, variants) in cfg.variant.iter() {
            for (name, variant) in variants.iter() {
                registry.register(*kind, name, &variant.module);
            }
        }
        registry
    }

    /// Set the driver template (relative to the templates root) for a kind.
    pub fn set_driver(&mut self, kind: WorkloadKind, driver: impl AsRef<Path>) {
        self.drivers.insert(kind, driver.as_ref().to_path_buf());
    }

    pub fn register(&mut self, kind: WorkloadKind, name: &str, module: &str) {
        self.variants.entry(kind).or_default().insert(
            name.to_string(),
            VariantEntry {
                name: name.to_string(),
                module: module.to_string(),
            },
        );
    }

    pub fn driver(&self, kind: WorkloadKind) -> Option<&Path> {
        self.drivers.get(&kind).map(PathBuf::as_path)
    }

    /// Resolve a variant by name, failing fast with `UnknownVariant`.
    ///
    /// A kind without a driver has no runnable variants at all.
    pub fn resolve(&self, kind: WorkloadKind, variant: &str) -> Result<&VariantEntry> {
        self.drivers
            .get(&kind)
            .and_then(|_| self.variants.get(&kind))
            .and_then(|variants| variants.get(variant))
            .ok_or_else(|| TaskhostError::UnknownVariant {
                kind,
                variant: variant.to_string(),
            })
    }

    /// Names of the variants available for a kind, sorted.
    pub fn variants(&self, kind: WorkloadKind) -> Vec<&str> {
        if !self.drivers.contains_key(&kind) {
            return Vec::new();
        }
        self.variants
            .get(&kind)
            .map(|v| v.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }
}
