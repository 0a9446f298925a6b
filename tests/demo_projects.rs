// tests/demo_projects.rs
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use taskhost::compose::Composer;
use taskhost::config::load_and_validate;
use taskhost::fs::RealFileSystem;
use taskhost::types::WorkloadKind;
use taskhost_test_utils::init_tracing;

type TestResult = Result<(), Box<dyn Error>>;

fn demo(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("demos")
        .join(name)
        .join("Taskhost.toml")
}

/// Every registered variant of the python demo composes into one flat script.
#[test]
fn python_demo_variants_compose_into_flat_scripts() -> TestResult {
    init_tracing();
    let cfg = load_and_validate(demo("python"))?;
    let composer = Composer::from_config(&cfg, Arc::new(RealFileSystem))?;

    assert_eq!(composer.registry().variants(WorkloadKind::Training), vec!["linear", "noisy"]);
    assert_eq!(composer.registry().variants(WorkloadKind::Scoring), vec!["length"]);

    for kind in [WorkloadKind::Training, WorkloadKind::Scoring] {
        for variant in composer.registry().variants(kind) {
            let artifact = composer.compose(kind, variant)?;
            let text = artifact.text();
            assert!(!text.contains("from support."), "{kind}/{variant}:\n{text}");
            assert_eq!(text.matches("def write_text(").count(), 1, "{kind}/{variant}");
            assert!(text.starts_with("#!/usr/bin/env python3\n"));
        }
    }

    let training = composer.compose(WorkloadKind::Training, "linear")?;
    assert!(training.text().contains("class Tracker:"));
    assert!(training.text().contains("def train(tracker, epochs, batch_size):"));
    Ok(())
}

#[test]
fn simulated_demo_uses_shell_modules() -> TestResult {
    init_tracing();
    let cfg = load_and_validate(demo("simulated"))?;
    assert_eq!(cfg.config.interpreter, "sh");
    assert_eq!(cfg.compose.extension, "sh");

    let composer = Composer::from_config(&cfg, Arc::new(RealFileSystem))?;
    let artifact = composer.compose(WorkloadKind::Training, "quick")?;
    assert_eq!(
        artifact.text(),
        "#!/bin/sh\nSIM_ARGS=\"--batches 10 --batch-ms 100\"\nexec taskhost simulate $SIM_ARGS \"$@\"\n"
    );
    assert_eq!(artifact.file_name(), "training_driver.sh");
    Ok(())
}

#[test]
fn simulated_demo_scores_through_the_builtin_scorer() -> TestResult {
    let cfg = load_and_validate(demo("simulated"))?;
    let composer = Composer::from_config(&cfg, Arc::new(RealFileSystem))?;
    assert_eq!(composer.registry().variants(WorkloadKind::Scoring), vec!["length"]);

    let artifact = composer.compose(WorkloadKind::Scoring, "length")?;
    assert_eq!(
        artifact.text(),
        "#!/bin/sh\nSCORE_ARGS=\"--host 127.0.0.1\"\nexec taskhost simulate-score $SCORE_ARGS \"$@\"\n"
    );
    assert_eq!(artifact.file_name(), "scoring_driver.sh");
    Ok(())
}
