use std::process::Command;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use taskhost::engine::{Callbacks, HttpStatusProbe, LaunchSettings, TaskParams, TaskSupervisor};
use taskhost::errors::TaskhostError;
use taskhost::scoring::ScoringService;
use taskhost::types::{TaskState, WorkloadKind};
use taskhost::worker::{simulated_metrics, KeyScore};
use taskhost_test_utils::builders::{ConfigFileBuilder, TemplateTree};
use taskhost_test_utils::{init_tracing, with_timeout};

const BIN: &str = env!("CARGO_BIN_EXE_taskhost");

fn tree() -> TemplateTree {
    TemplateTree::new()
        .file(
            "drivers/train.sh",
            &format!(
                "#!/bin/sh\n. support.variant\nexec '{BIN}' simulate --log-level debug $SIM_ARGS \"$@\"\n"
            ),
        )
        .file("support/sim/fast.sh", "# fast\nSIM_ARGS=\"--batches 3 --batch-ms 30\"\n")
        .file(
            "support/sim/failing.sh",
            "SIM_ARGS=\"--batches 2 --batch-ms 20 --fail-after 1\"\n",
        )
}

fn supervisor(tree: &TemplateTree, variant: &str) -> TaskSupervisor<HttpStatusProbe> {
    let builder = ConfigFileBuilder::shell()
        .with_kind(WorkloadKind::Training, "drivers/train.sh")
        .with_variant(WorkloadKind::Training, "fast", "support.sim.fast")
        .with_variant(WorkloadKind::Training, "failing", "support.sim.failing");
    let (cfg, composer) = tree.composer(builder);
    let probe = HttpStatusProbe::new("127.0.0.1", Duration::from_secs(1)).unwrap();
    TaskSupervisor::new(
        WorkloadKind::Training,
        variant,
        tree.workdir(variant),
        composer,
        LaunchSettings::from_config(&cfg, WorkloadKind::Training),
        probe,
    )
}

#[tokio::test]
async fn simulated_child_runs_through_the_real_protocol() {
    init_tracing();
    let tree = tree();
    let mut task = supervisor(&tree, "fast");

    let epochs_seen = Arc::new(Mutex::new(Vec::new()));
    let seen = epochs_seen.clone();
    let mut callbacks = Callbacks::new().on_epoch(move |epochs, metrics| {
        assert_eq!(metrics.len(), epochs);
        seen.lock().unwrap().push(epochs);
    });

    let params = TaskParams::new().arg("epochs", 2);
    let completion = with_timeout(task.submit(&params, &mut callbacks))
        .await
        .unwrap();

    assert_eq!(completion.state, TaskState::Completed);
    assert!(completion.has_record());
    assert_eq!(completion.metrics, vec![simulated_metrics(1), simulated_metrics(2)]);

    let seen = epochs_seen.lock().unwrap();
    assert!(seen.windows(2).all(|w| w[0] < w[1]), "{seen:?}");
    assert!(seen.iter().all(|&e| e <= 2), "{seen:?}");
}

#[tokio::test]
async fn failing_child_is_a_crash_without_record() {
    init_tracing();
    let tree = tree();
    let mut task = supervisor(&tree, "failing");

    let completion = with_timeout(task.submit(&TaskParams::new().arg("epochs", 3), &mut ()))
        .await
        .unwrap();

    assert_eq!(completion.state, TaskState::Crashed { exit_code: Some(1) });
    assert!(!completion.has_record());
}

fn scoring_service(tree: &TemplateTree) -> ScoringService {
    let builder = ConfigFileBuilder::shell()
        .with_kind(WorkloadKind::Scoring, "drivers/score.sh")
        .with_variant(WorkloadKind::Scoring, "length", "support.score.length")
        .scoring(40, 50);
    let (cfg, composer) = tree.composer(builder);
    ScoringService::from_config(&cfg, composer, WorkloadKind::Scoring, "length").unwrap()
}

fn scoring_tree() -> TemplateTree {
    TemplateTree::new()
        .file(
            "drivers/score.sh",
            &format!("#!/bin/sh\n. support.variant\nexec '{BIN}' simulate-score $SCORE_ARGS \"$@\"\n"),
        )
        .file("support/score/length.sh", "SCORE_ARGS=\"--log-level debug\"\n")
}

#[tokio::test]
async fn scoring_child_is_started_restarted_and_cleaned_up() {
    init_tracing();
    let tree = scoring_tree();
    let mut service = scoring_service(&tree);
    assert_eq!(service.port(), None);

    let first: KeyScore = with_timeout(service.score("/data/cat.60.jpg")).await.unwrap();
    assert_eq!(
        first,
        KeyScore {
            key: "/data/cat.60.jpg".to_string(),
            score: 0.16
        }
    );
    let first_dir = service.workdir().expect("child started").to_path_buf();
    assert!(first_dir.join("scoring_driver.sh").is_file());
    assert!(first_dir.join("endpoint.port").is_file());
    assert!(service.artifact().unwrap().text().contains("simulate-score"));

    // An empty key never reaches a scorer.
    let err = with_timeout(service.score::<KeyScore>("")).await.unwrap_err();
    assert!(matches!(err, TaskhostError::ScoreRejected { .. }), "{err}");

    let pid = service.child_id().expect("pid");
    let killed = Command::new("kill").args(["-9", &pid.to_string()]).status().unwrap();
    assert!(killed.success());
    with_timeout(async {
        while service.is_alive() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;

    let second: KeyScore = with_timeout(service.score("dog.png")).await.unwrap();
    assert_eq!(second.key, "dog.png");
    assert_ne!(service.child_id(), Some(pid));
    assert!(!first_dir.exists(), "old working directory removed on restart");

    let second_dir = service.workdir().unwrap().to_path_buf();
    assert!(second_dir.is_dir());
    service.close().await.unwrap();
    assert!(!second_dir.exists());
    assert_eq!(service.port(), None);
    assert!(!service.is_alive());
}

#[test]
fn port_subcommand_prints_a_port() {
    let output = Command::new(BIN).arg("port").output().unwrap();
    assert!(output.status.success());
    let port: u16 = String::from_utf8_lossy(&output.stdout).trim().parse().unwrap();
    assert!(port > 0);
}

#[test]
fn artifact_subcommand_prints_the_composed_program() {
    let tree = tree();
    let config = tree.root().join("Taskhost.toml");
    std::fs::write(
        &config,
        r#"
[config]
interpreter = "sh"

[compose]
support_pattern = '^\. (support\.[^ ]*)\s*$'
extension = "sh"

[kind.training]
driver = "drivers/train.sh"

[variant.training.fast]
module = "support.sim.fast"
"#,
    )
    .unwrap();

    let output = Command::new(BIN)
        .args(["--config", config.to_str().unwrap(), "artifact", "--kind", "training", "--variant", "fast"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let text = String::from_utf8_lossy(&output.stdout);
    assert!(text.contains("SIM_ARGS=\"--batches 3 --batch-ms 30\""));
    assert!(!text.contains("# fast"));
    assert!(!text.contains(". support."));
    assert!(String::from_utf8_lossy(&output.stderr).contains("digest: "));

    let variants = Command::new(BIN)
        .args(["--config", config.to_str().unwrap(), "variants"])
        .output()
        .unwrap();
    assert_eq!(
        String::from_utf8_lossy(&variants.stdout),
        "training:\n  - fast\n"
    );
}

#[test]
fn unknown_variant_makes_the_cli_fail() {
    let tree = tree();
    let config = tree.root().join("Taskhost.toml");
    std::fs::write(&config, "[kind.training]\ndriver = \"drivers/train.sh\"\n").unwrap();

    let output = Command::new(BIN)
        .args(["--config", config.to_str().unwrap(), "artifact", "--kind", "training", "--variant", "nope"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Unknown training variant: nope"));
}
