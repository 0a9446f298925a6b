// src/compose/mod.rs

//! Artifact composition.
//!
//! A [`CodeArtifact`] is the single self-contained program a child process
//! runs. It is built from:
//! - the generic driver template of the workload kind,
//! - the variant module chosen through the [`VariantRegistry`], substituted
//!   for the driver's placeholder module,
//! - every shared-support module referenced (transitively), inlined once.
//!
//! The result needs nothing from the templates tree to execute, and the same
//! text is what operators see through the transparency view.

pub mod inline;
pub mod registry;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex::Regex;
use tracing::{info, warn};

use crate::config::{ComposeSection, ConfigFile};
use crate::errors::{Result, TaskhostError};
use crate::fs::FileSystem;
use crate::types::WorkloadKind;

pub use inline::{strip_header, ModuleInliner};
pub use registry::{VariantEntry, VariantRegistry};

/// Immutable, fully inlined program text for one (kind, variant) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeArtifact {
    kind: WorkloadKind,
    variant: String,
    file_name: String,
    text: Arc<str>,
    digest: String,
}

impl CodeArtifact {
    fn new(kind: WorkloadKind, variant: &str, extension: &str, text: String) -> Self {
        let digest = blake3::hash(text.as_bytes()).to_hex().to_string();
        let file_name = if extension.is_empty() {
            format!("{kind}_driver")
        } else {
            format!("{kind}_driver.{extension}")
        };
        Self {
            kind,
            variant: variant.to_string(),
            file_name,
            text: Arc::from(text),
            digest,
        }
    }

    pub fn kind(&self) -> WorkloadKind {
        self.kind
    }

    pub fn variant(&self) -> &str {
        &self.variant
    }

    /// The program text (read-only transparency view).
    pub fn text(&self) -> &str {
        &self.text
    }

    /// blake3 hex digest of the text.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Write the artifact into `dir`, returning the file path.
    pub fn write_to(&self, fs: &dyn FileSystem, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(&self.file_name);
        fs.write(&path, self.text.as_bytes())?;
        Ok(path)
    }
}

impl fmt::Display for CodeArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Builds [`CodeArtifact`]s from a templates tree.
pub struct Composer {
    fs: Arc<dyn FileSystem>,
    registry: VariantRegistry,
    templates_dir: PathBuf,
    settings: ComposeSection,
    support_pattern: Regex,
}

impl fmt::Debug for Composer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Composer")
            .field("registry", &self.registry)
            .field("templates_dir", &self.templates_dir)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Composer {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        registry: VariantRegistry,
        templates_dir: impl Into<PathBuf>,
        settings: ComposeSection,
    ) -> Result<Self> {
        let support_pattern = Regex::new(&settings.support_pattern).map_err(|e| {
            TaskhostError::ConfigError(format!("invalid support pattern: {e}"))
        })?;
        Ok(Self {
            fs,
            registry,
            templates_dir: templates_dir.into(),
            settings,
            support_pattern,
        })
    }

    pub fn from_config(cfg: &ConfigFile, fs: Arc<dyn FileSystem>) -> Result<Self> {
        Self::new(
            fs,
            VariantRegistry::from_config(cfg),
            cfg.config.templates_dir.clone(),
            cfg.compose.clone(),
        )
    }

    pub fn registry(&self) -> &VariantRegistry {
        &self.registry
    }

    pub fn file_system(&self) -> &dyn FileSystem {
        self.fs.as_ref()
    }

    /// Compose the artifact for `variant` of `kind`.
    ///
    /// Always recomposes from the current templates; nothing is cached.
    pub fn compose(&self, kind: WorkloadKind, variant: &str) -> Result<CodeArtifact> {
        let entry = self.registry.resolve(kind, variant)?;
        let driver_rel = self.registry.driver(kind).ok_or_else(|| {
            TaskhostError::UnknownVariant {
                kind,
                variant: variant.to_string(),
            }
        })?;
        let driver_path = self.templates_dir.join(driver_rel);

        let driver = self.fs.read_to_string(&driver_path).map_err(|e| {
            TaskhostError::TemplateUnreadable {
                path: driver_path.clone(),
                reason: e.to_string(),
            }
        })?;

        let specialised = self.specialise(&driver, &entry.module);
        if specialised == driver {
            warn!(
                %kind,
                variant,
                placeholder = %self.settings.placeholder_module,
                "driver template has no placeholder reference; variant module not substituted"
            );
        }

        let inliner = ModuleInliner::new(
            self.fs.as_ref(),
            &self.templates_dir,
            &self.support_pattern,
            &self.settings.comment_prefix,
            &self.settings.extension,
        );
        let text = inliner.expand(&specialised)?;

        let artifact = CodeArtifact::new(kind, variant, &self.settings.extension, text);
        info!(
            %kind,
            variant,
            module = %entry.module,
            digest = %artifact.digest(),
            "composed artifact"
        );
        Ok(artifact)
    }

    /// Point every support reference to the placeholder module at `module`.
    fn specialise(&self, driver: &str, module: &str) -> String {
        let placeholder = self.settings.placeholder_module.as_str();
        let mut lines: Vec<String> = Vec::new();

        for line in driver.lines() {
            let replaced = self
                .support_pattern
                .captures(line)
                .and_then(|c| c.get(1))
                .filter(|m| m.as_str() == placeholder)
                .map(|m| format!("{}{}{}", &line[..m.start()], module, &line[m.end()..]));
            lines.push(replaced.unwrap_or_else(|| line.to_string()));
        }

        let mut text = lines.join("\n");
        if driver.ends_with('\n') {
            text.push('\n');
        }
        text
    }
}
