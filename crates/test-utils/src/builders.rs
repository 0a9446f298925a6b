#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;
use taskhost::compose::Composer;
use taskhost::config::{
    ComposeSection, ConfigFile, ConfigSection, KindConfig, RawConfigFile, ScoringSection,
    VariantConfig,
};
use taskhost::fs::{FileSystem, RealFileSystem};
use taskhost::types::WorkloadKind;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                config: ConfigSection::default(),
                compose: ComposeSection::default(),
                scoring: ScoringSection::default(),
                kind: BTreeMap::new(),
                variant: BTreeMap::new(),
            },
        }
    }

    /// Settings for POSIX `sh` children: `. support.x` lines reference
    /// modules, sources end in `.sh`, polling is fast.
    pub fn shell() -> Self {
        Self::new()
            .interpreter("sh")
            .support_pattern(r"^\. (support\.[^ ]*)\s*$")
            .extension("sh")
            .poll_interval_ms(20)
            .launch_grace_ms(0)
    }

    pub fn with_kind(mut self, kind: WorkloadKind, driver: &str) -> Self {
        self.config.kind.insert(
            kind.to_string(),
            KindConfig {
                driver: PathBuf::from(driver),
                port_arg: "tracker_port".to_string(),
            },
        );
        self
    }

    pub fn with_variant(mut self, kind: WorkloadKind, name: &str, module: &str) -> Self {
        self.config.variant.entry(kind.to_string()).or_default().insert(
            name.to_string(),
            VariantConfig {
                module: module.to_string(),
            },
        );
        self
    }

    pub fn interpreter(mut self, interpreter: &str) -> Self {
        self.config.config.interpreter = interpreter.to_string();
        self
    }

    pub fn templates_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.config.config.templates_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn workspace_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.config.config.workspace_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.config.poll_interval_ms = ms;
        self
    }

    pub fn launch_grace_ms(mut self, ms: u64) -> Self {
        self.config.config.launch_grace_ms = ms;
        self
    }

    pub fn support_pattern(mut self, pattern: &str) -> Self {
        self.config.compose.support_pattern = pattern.to_string();
        self
    }

    pub fn extension(mut self, extension: &str) -> Self {
        self.config.compose.extension = extension.to_string();
        self
    }

    pub fn scoring(mut self, retries: u32, retry_delay_ms: u64) -> Self {
        self.config.scoring.retries = retries;
        self.config.scoring.retry_delay_ms = retry_delay_ms;
        self
    }

    pub fn build_raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A templates tree on disk plus a scratch area for task working
/// directories, removed when dropped.
pub struct TemplateTree {
    dir: TempDir,
}

impl TemplateTree {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        fs::create_dir_all(dir.path().join("templates")).expect("create templates dir");
        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn templates(&self) -> PathBuf {
        self.dir.path().join("templates")
    }

    /// A working directory for one task; not created yet.
    pub fn workdir(&self, name: &str) -> PathBuf {
        self.dir.path().join("work").join(name)
    }

    /// Write a file relative to the templates root.
    pub fn file(self, rel: &str, contents: &str) -> Self {
        RealFileSystem
            .write(&self.templates().join(rel), contents.as_bytes())
            .expect("write template file");
        self
    }

    /// Composer over this tree using `builder`'s settings.
    pub fn composer(&self, builder: ConfigFileBuilder) -> (ConfigFile, Arc<Composer>) {
        let cfg = builder
            .templates_dir(self.templates())
            .workspace_dir(self.dir.path().join("work"))
            .build();
        let composer = Composer::from_config(&cfg, Arc::new(RealFileSystem)).expect("composer");
        (cfg, Arc::new(composer))
    }
}

impl Default for TemplateTree {
    fn default() -> Self {
        Self::new()
    }
}
