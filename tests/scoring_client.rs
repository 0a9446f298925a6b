use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::bail;
use serde::{Deserialize, Serialize};
use taskhost::endpoint;
use taskhost::engine::LaunchSettings;
use taskhost::errors::TaskhostError;
use taskhost::scoring::{ScoringClient, ScoringService};
use taskhost::types::WorkloadKind;
use taskhost::worker::{ScoreServer, Scorer};
use taskhost_test_utils::builders::{ConfigFileBuilder, TemplateTree};
use taskhost_test_utils::{init_tracing, with_timeout};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Score {
    key: String,
    length: usize,
}

#[derive(Default)]
struct LengthScorer {
    calls: AtomicUsize,
}

impl Scorer for LengthScorer {
    type Output = Score;

    fn score(&self, key: &str) -> anyhow::Result<Score> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if key == "broken" {
            bail!("cannot score {key}");
        }
        Ok(Score {
            key: key.to_string(),
            length: key.len(),
        })
    }
}

fn client(retries: u32, delay_ms: u64) -> ScoringClient {
    ScoringClient::new(
        "127.0.0.1",
        retries,
        Duration::from_millis(delay_ms),
        Duration::from_secs(2),
    )
    .unwrap()
}

#[tokio::test]
async fn late_server_is_reached_within_the_retry_budget() {
    init_tracing();
    let port = endpoint::allocate().unwrap();
    let workdir = tempfile::tempdir().unwrap();
    let dir = workdir.path().to_path_buf();

    // Refuses connections for the first attempts, then comes up.
    let server = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(250)).await;
        ScoreServer::new(LengthScorer::default())
            .start("127.0.0.1", port, &dir)
            .await
            .unwrap()
    });

    let score: Score = with_timeout(client(5, 100).query(port, "cat.png"))
        .await
        .expect("scored once the server is up");
    assert_eq!(
        score,
        Score {
            key: "cat.png".to_string(),
            length: 7
        }
    );
    server.await.unwrap().shutdown();
}

#[tokio::test]
async fn exhausted_budget_reports_attempts_and_stops() {
    init_tracing();
    let port = endpoint::allocate().unwrap();
    let client = client(3, 50);

    let started = Instant::now();
    let err = with_timeout(client.query::<Score>(port, "x"))
        .await
        .unwrap_err();

    assert!(matches!(err, TaskhostError::RetryBudgetExhausted { attempts: 3 }));
    // Two delays between three attempts, none after the last.
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(100), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(1500), "{elapsed:?}");
}

#[tokio::test]
async fn scorer_failure_is_rejected_without_retry() {
    init_tracing();
    let workdir = tempfile::tempdir().unwrap();
    let scorer = LengthScorer::default();
    let server = ScoreServer::new(scorer)
        .start("127.0.0.1", 0, workdir.path())
        .await
        .unwrap();

    let err = with_timeout(client(5, 1000).query::<Score>(server.port(), "broken"))
        .await
        .unwrap_err();
    assert!(matches!(err, TaskhostError::ScoreRejected { status: 500 }));
    server.shutdown();
}

#[tokio::test]
async fn keys_reach_the_scorer_byte_for_byte() {
    init_tracing();
    let workdir = tempfile::tempdir().unwrap();
    let scorer = Arc::new(LengthScorer::default());

    struct Shared(Arc<LengthScorer>);
    impl Scorer for Shared {
        type Output = Score;
        fn score(&self, key: &str) -> anyhow::Result<Score> {
            self.0.score(key)
        }
    }

    let server = ScoreServer::new(Shared(scorer.clone()))
        .start("127.0.0.1", 0, workdir.path())
        .await
        .unwrap();
    let client = client(1, 0);

    let keys = [
        "/home/dev/data/cat.60.jpg",
        "cats/a?b.jpg",
        "cats/#1.jpg",
        "naïve 100%.png",
    ];
    for key in keys {
        let score: Score = client.query(server.port(), key).await.unwrap();
        assert_eq!(score.key, key);
    }
    assert_eq!(scorer.calls.load(Ordering::SeqCst), keys.len());

    assert_eq!(
        client.url(server.port(), "/a?b").unwrap().as_str(),
        format!("http://127.0.0.1:{}/%2Fa%3Fb", server.port())
    );
    server.shutdown();
}

#[tokio::test]
async fn port_is_resolved_again_on_every_attempt() {
    init_tracing();
    // Nothing ever listens on the allocated port; the server announces the
    // one it really bound through the handshake file.
    let allocated = endpoint::allocate().unwrap();
    let workdir = tempfile::tempdir().unwrap();
    let dir = workdir.path().to_path_buf();

    let server = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        ScoreServer::new(LengthScorer::default())
            .start("127.0.0.1", 0, &dir)
            .await
            .unwrap()
    });

    let score: Score = with_timeout(
        client(10, 100).query_with(|| endpoint::effective_port(workdir.path(), allocated), "dog.png"),
    )
    .await
    .expect("reached on the announced port");
    assert_eq!(score.length, 7);
    server.await.unwrap().shutdown();
}

#[test]
fn training_is_not_a_request_response_workload() {
    let tree = TemplateTree::new().file("drivers/train.sh", "true\n");
    let (cfg, composer) =
        tree.composer(ConfigFileBuilder::shell().with_kind(WorkloadKind::Training, "drivers/train.sh"));
    let settings = LaunchSettings::from_config(&cfg, WorkloadKind::Training);

    let err = ScoringService::new(
        WorkloadKind::Training,
        "any",
        composer,
        settings,
        client(1, 0),
    )
    .unwrap_err();
    assert!(matches!(err, TaskhostError::ConfigError(_)));
}

#[tokio::test]
async fn scoring_service_reports_unknown_variant_before_starting() {
    let tree = TemplateTree::new().file("drivers/score.sh", "true\n");
    let (cfg, composer) =
        tree.composer(ConfigFileBuilder::shell().with_kind(WorkloadKind::Scoring, "drivers/score.sh"));

    let mut service = ScoringService::from_config(&cfg, composer, WorkloadKind::Scoring, "vgg").unwrap();
    let err = service.score::<Score>("k").await.unwrap_err();
    assert!(matches!(err, TaskhostError::UnknownVariant { .. }));
    assert_eq!(service.port(), None);
    service.close().await.unwrap();
}
