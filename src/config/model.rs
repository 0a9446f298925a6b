// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::types::WorkloadKind;

/// Top-level configuration as read from a TOML file, before validation.
///
/// ```toml
/// [config]
/// interpreter = "python3"
/// templates_dir = "templates"
/// workspace_dir = "workspace"
///
/// [compose]
/// support_pattern = '^from (support\.[^ ]*) import .*'
///
/// [kind.training]
/// driver = "drivers/train.py"
///
/// [variant.training.mobilenet]
/// module = "support.keras.mobilenet"
/// ```
///
/// All sections except `[kind.*]` are optional and have defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub config: ConfigSection,

    #[serde(default)]
    pub compose: ComposeSection,

    #[serde(default)]
    pub scoring: ScoringSection,

    /// Driver template per workload kind (`training`, `scoring`, `indexing`).
    #[serde(default)]
    pub kind: BTreeMap<String, KindConfig>,

    /// Variant registry: `[variant.<kind>.<name>]`.
    #[serde(default)]
    pub variant: BTreeMap<String, BTreeMap<String, VariantConfig>>,
}

/// Validated configuration. Only obtainable through `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub compose: ComposeSection,
    pub scoring: ScoringSection,
    pub kind: BTreeMap<WorkloadKind, KindConfig>,
    pub variant: BTreeMap<WorkloadKind, BTreeMap<String, VariantConfig>>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        raw: RawConfigFile,
        kind: BTreeMap<WorkloadKind, KindConfig>,
        variant: BTreeMap<WorkloadKind, BTreeMap<String, VariantConfig>>,
    ) -> Self {
        Self {
            config: raw.config,
            compose: raw.compose,
            scoring: raw.scoring,
            kind,
            variant,
        }
    }

    pub fn kind_config(&self, kind: WorkloadKind) -> Option<&KindConfig> {
        self.kind.get(&kind)
    }
}

/// `[config]` section: how children are launched and observed.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Program that runs a composed artifact (the artifact path is its first
    /// argument after `interpreter_args`).
    #[serde(default = "default_interpreter")]
    pub interpreter: String,

    #[serde(default)]
    pub interpreter_args: Vec<String>,

    /// Root of driver, variant and support sources.
    #[serde(default = "default_templates_dir")]
    pub templates_dir: PathBuf,

    /// Parent directory of per-task working directories.
    #[serde(default = "default_workspace_dir")]
    pub workspace_dir: PathBuf,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// How long a live child may stay unreachable before it is relaunched
    /// once on a fresh port. `0` disables relaunching.
    #[serde(default = "default_launch_grace_ms")]
    pub launch_grace_ms: u64,

    #[serde(default = "default_host")]
    pub host: String,
}

fn default_interpreter() -> String {
    "python3".to_string()
}

fn default_templates_dir() -> PathBuf {
    PathBuf::from("templates")
}

fn default_workspace_dir() -> PathBuf {
    PathBuf::from("workspace")
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_launch_grace_ms() -> u64 {
    30_000
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter(),
            interpreter_args: Vec::new(),
            templates_dir: default_templates_dir(),
            workspace_dir: default_workspace_dir(),
            poll_interval_ms: default_poll_interval_ms(),
            launch_grace_ms: default_launch_grace_ms(),
            host: default_host(),
        }
    }
}

impl ConfigSection {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn launch_grace(&self) -> Option<Duration> {
        (self.launch_grace_ms > 0).then(|| Duration::from_millis(self.launch_grace_ms))
    }
}

/// `[compose]` section: how artifacts are assembled from sources.
#[derive(Debug, Clone, Deserialize)]
pub struct ComposeSection {
    /// Regex matching a line that references a shared-support module. The
    /// first capture group is the dotted module path.
    #[serde(default = "default_support_pattern")]
    pub support_pattern: String,

    /// Leading lines starting with this prefix are stripped from inlined
    /// modules (license headers and the like).
    #[serde(default = "default_comment_prefix")]
    pub comment_prefix: String,

    /// File extension of module sources.
    #[serde(default = "default_extension")]
    pub extension: String,

    /// Module path in driver templates that stands for "the variant".
    #[serde(default = "default_placeholder_module")]
    pub placeholder_module: String,
}

fn default_support_pattern() -> String {
    r"^from (support\.[^ ]*) import .*".to_string()
}

fn default_comment_prefix() -> String {
    "#".to_string()
}

fn default_extension() -> String {
    "py".to_string()
}

fn default_placeholder_module() -> String {
    "support.variant".to_string()
}

impl Default for ComposeSection {
    fn default() -> Self {
        Self {
            support_pattern: default_support_pattern(),
            comment_prefix: default_comment_prefix(),
            extension: default_extension(),
            placeholder_module: default_placeholder_module(),
        }
    }
}

/// `[scoring]` section: request/response client behaviour.
#[derive(Debug, Clone, Deserialize)]
pub struct ScoringSection {
    #[serde(default = "default_retries")]
    pub retries: u32,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_retries() -> u32 {
    5
}

fn default_retry_delay_ms() -> u64 {
    5000
}

fn default_request_timeout_ms() -> u64 {
    60_000
}

impl Default for ScoringSection {
    fn default() -> Self {
        Self {
            retries: default_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

/// `[kind.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct KindConfig {
    /// Driver template, relative to `templates_dir`.
    pub driver: PathBuf,

    /// Name of the command-line flag carrying the endpoint port.
    #[serde(default = "default_port_arg")]
    pub port_arg: String,
}

fn default_port_arg() -> String {
    "tracker_port".to_string()
}

/// `[variant.<kind>.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct VariantConfig {
    /// Dotted module path substituted for the placeholder module.
    pub module: String,
}
