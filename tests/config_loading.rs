use std::fs;
use std::time::Duration;

use taskhost::config::{load_and_validate, load_from_path, validate_config, ConfigFile};
use taskhost::errors::TaskhostError;
use taskhost::types::WorkloadKind;
use taskhost_test_utils::builders::ConfigFileBuilder;

fn write_config(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Taskhost.toml");
    fs::write(&path, contents).unwrap();
    (dir, path)
}

fn config_error(raw: taskhost::config::RawConfigFile) -> String {
    match ConfigFile::try_from(raw) {
        Err(TaskhostError::ConfigError(msg)) => msg,
        other => panic!("expected a config error, got {other:?}"),
    }
}

#[test]
fn full_config_is_loaded_with_defaults_filled_in() {
    let (dir, path) = write_config(
        r#"
[config]
interpreter = "python3"
interpreter_args = ["-u"]
poll_interval_ms = 250

[scoring]
retries = 3

[kind.training]
driver = "drivers/train.py"

[kind.scoring]
driver = "drivers/score.py"
port_arg = "port"

[variant.training.mobilenet]
module = "support.keras.mobilenet"

[variant.training.vgg16]
module = "support.keras.vgg16"
"#,
    );

    let cfg = load_and_validate(&path).unwrap();

    assert_eq!(cfg.config.interpreter_args, vec!["-u".to_string()]);
    assert_eq!(cfg.config.poll_interval(), Duration::from_millis(250));
    assert_eq!(cfg.config.launch_grace(), Some(Duration::from_secs(30)));
    assert_eq!(cfg.config.templates_dir, dir.path().join("templates"));
    assert_eq!(cfg.config.workspace_dir, dir.path().join("workspace"));
    assert_eq!(cfg.scoring.retries, 3);
    assert_eq!(cfg.scoring.retry_delay_ms, 5000);
    assert_eq!(cfg.compose.placeholder_module, "support.variant");

    let training = cfg.kind_config(WorkloadKind::Training).unwrap();
    assert_eq!(training.port_arg, "tracker_port");
    assert_eq!(cfg.kind_config(WorkloadKind::Scoring).unwrap().port_arg, "port");
    assert!(cfg.kind_config(WorkloadKind::Indexing).is_none());
    assert_eq!(cfg.variant[&WorkloadKind::Training].len(), 2);
}

#[test]
fn zero_launch_grace_disables_relaunching() {
    let cfg = ConfigFileBuilder::new()
        .with_kind(WorkloadKind::Training, "t.py")
        .launch_grace_ms(0)
        .build();
    assert_eq!(cfg.config.launch_grace(), None);
}

#[test]
fn invalid_toml_is_a_toml_error() {
    let (_dir, path) = write_config("[kind.training\ndriver = 1");
    assert!(matches!(load_from_path(&path), Err(TaskhostError::TomlError(_))));
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_and_validate(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, TaskhostError::IoError(_)));
}

#[test]
fn config_without_kinds_is_rejected() {
    let msg = config_error(ConfigFileBuilder::new().build_raw());
    assert!(msg.contains("at least one [kind"), "{msg}");
}

#[test]
fn unknown_kind_name_is_rejected() {
    let mut raw = ConfigFileBuilder::new()
        .with_kind(WorkloadKind::Training, "t.py")
        .build_raw();
    let training = raw.kind["training"].clone();
    raw.kind.insert("painting".to_string(), training);

    let msg = config_error(raw);
    assert!(msg.contains("painting"), "{msg}");
}

#[test]
fn two_names_for_one_kind_are_rejected() {
    let mut raw = ConfigFileBuilder::new()
        .with_kind(WorkloadKind::Training, "t.py")
        .build_raw();
    let training = raw.kind["training"].clone();
    raw.kind.insert("train".to_string(), training);

    let msg = config_error(raw);
    assert!(msg.contains("[kind.train] and [kind.training]"), "{msg}");
}

#[test]
fn variant_table_may_use_a_kind_alias() {
    let (_dir, path) = write_config(
        r#"
[kind.training]
driver = "drivers/train.py"

[variant.train.small]
module = "support.small"
"#,
    );
    let cfg = load_and_validate(&path).unwrap();
    assert!(cfg.variant[&WorkloadKind::Training].contains_key("small"));
}

#[test]
fn variant_without_kind_section_is_rejected() {
    let raw = ConfigFileBuilder::new()
        .with_kind(WorkloadKind::Training, "t.py")
        .with_variant(WorkloadKind::Scoring, "vgg", "support.vgg")
        .build_raw();
    let msg = config_error(raw);
    assert!(msg.contains("no [kind.scoring] section"), "{msg}");
}

#[test]
fn empty_module_path_is_rejected() {
    let raw = ConfigFileBuilder::new()
        .with_kind(WorkloadKind::Training, "t.py")
        .with_variant(WorkloadKind::Training, "blank", "  ")
        .build_raw();
    assert!(config_error(raw).contains("empty module path"));
}

#[test]
fn launch_and_retry_settings_are_checked() {
    let base = || ConfigFileBuilder::new().with_kind(WorkloadKind::Training, "t.py");

    assert!(config_error(base().poll_interval_ms(0).build_raw()).contains("poll_interval_ms"));
    assert!(config_error(base().interpreter(" ").build_raw()).contains("interpreter"));
    assert!(config_error(base().scoring(0, 10).build_raw()).contains("retries"));
}

#[test]
fn support_pattern_needs_a_valid_regex_with_a_group() {
    let base = || ConfigFileBuilder::new().with_kind(WorkloadKind::Training, "t.py");

    assert!(config_error(base().support_pattern("(unclosed").build_raw()).contains("not a valid regex"));
    assert!(config_error(base().support_pattern("^from support").build_raw()).contains("capture group"));
    assert!(validate_config(&base().build_raw()).is_ok());
}
