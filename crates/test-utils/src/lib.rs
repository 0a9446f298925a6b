pub mod builders;
pub mod memory_store;
pub mod scripted_probe;

use std::sync::Once;
use std::time::Duration;

use taskhost::protocol::{EpochMetrics, LifecycleState, ProgressRecord};
use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 10-second timeout.
///
/// Child-process tests spawn real `sh` processes, so this is looser than a
/// pure in-memory test would need.
#[allow(dead_code)]
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(Duration::from_secs(10), f)
        .await
        .expect("Test timed out after 10 seconds")
}

/// Distinct, recognisable metrics for the `epoch`-th epoch (1-based).
pub fn epoch_metrics(epoch: usize) -> EpochMetrics {
    EpochMetrics::from([
        ("loss".to_string(), 1.0 / epoch as f64),
        ("epoch".to_string(), epoch as f64),
    ])
}

/// Training snapshot with `epochs` completed epochs and `batch` batches
/// into the current one.
pub fn training_snapshot(epochs: usize, batch: u64) -> ProgressRecord {
    ProgressRecord {
        state: LifecycleState::Training,
        metrics: (1..=epochs).map(epoch_metrics).collect(),
        completed_batch: batch,
        detail: None,
    }
}

/// Status record JSON listing `epochs` completed epochs.
pub fn trained_record_json(epochs: usize) -> String {
    let record = ProgressRecord {
        state: LifecycleState::Trained,
        metrics: (1..=epochs).map(epoch_metrics).collect(),
        completed_batch: 0,
        detail: None,
    };
    serde_json::to_string(&record).expect("status record serializes")
}
