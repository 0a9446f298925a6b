use proptest::prelude::*;

use taskhost::engine::{ProgressEvent, ProgressTracker};
use taskhost::protocol::{LoadDetail, ProgressRecord};
use taskhost_test_utils::{epoch_metrics, training_snapshot};

fn count(events: &[ProgressEvent]) -> (usize, usize) {
    let batches = events
        .iter()
        .filter(|e| matches!(e, ProgressEvent::Batch { .. }))
        .count();
    let epochs = events
        .iter()
        .filter(|e| matches!(e, ProgressEvent::Epoch { .. }))
        .count();
    (batches, epochs)
}

#[test]
fn batch_increase_within_epoch_fires_only_batch() {
    let mut tracker = ProgressTracker::new();
    tracker.observe(&training_snapshot(1, 3));

    let events = tracker.observe(&training_snapshot(1, 7));
    assert_eq!(
        events,
        vec![ProgressEvent::Batch {
            batch: 7,
            epochs_completed: 1
        }]
    );
}

#[test]
fn epoch_advance_fires_batch_then_epoch_with_new_batch_value() {
    let mut tracker = ProgressTracker::new();
    tracker.observe(&training_snapshot(0, 20));

    let events = tracker.observe(&training_snapshot(1, 5));
    assert_eq!(
        events,
        vec![
            ProgressEvent::Batch {
                batch: 5,
                epochs_completed: 1
            },
            ProgressEvent::Epoch {
                epochs_completed: 1,
                metrics: vec![epoch_metrics(1)]
            },
        ]
    );
    assert_eq!(tracker.completed_batches(), 5);
}

#[test]
fn batch_counter_is_not_carried_over_an_epoch_boundary() {
    let mut tracker = ProgressTracker::new();
    tracker.observe(&training_snapshot(0, 20));
    tracker.observe(&training_snapshot(1, 2));

    // 3 > 2 although it is below the previous epoch's 20.
    let events = tracker.observe(&training_snapshot(1, 3));
    assert_eq!(count(&events), (1, 0));
}

#[test]
fn unchanged_snapshot_fires_nothing() {
    let mut tracker = ProgressTracker::new();
    tracker.observe(&training_snapshot(2, 4));
    assert!(tracker.observe(&training_snapshot(2, 4)).is_empty());
}

#[test]
fn stale_snapshot_is_ignored() {
    let mut tracker = ProgressTracker::new();
    tracker.observe(&training_snapshot(2, 4));

    assert!(tracker.observe(&training_snapshot(1, 9)).is_empty());
    assert_eq!(tracker.completed_epochs(), 2);
    assert_eq!(tracker.metrics().len(), 2);
}

#[test]
fn coalesced_epochs_fire_a_single_epoch_event() {
    let mut tracker = ProgressTracker::new();
    tracker.observe(&training_snapshot(0, 1));

    let events = tracker.observe(&training_snapshot(3, 0));
    assert_eq!(count(&events), (1, 1));
    assert_eq!(tracker.completed_epochs(), 3);
}

#[test]
fn seeded_metrics_count_as_completed_epochs() {
    let mut tracker = ProgressTracker::with_metrics(vec![epoch_metrics(1), epoch_metrics(2)]);
    let events = tracker.observe(&training_snapshot(2, 1));
    assert_eq!(count(&events), (1, 0));
}

#[test]
fn detail_changes_fire_detail_events_once() {
    let mut tracker = ProgressTracker::new();
    let detail = LoadDetail {
        message: "Loaded 10 items".to_string(),
        latest_item: Some("a/b.png".to_string()),
    };
    let snapshot = ProgressRecord {
        detail: Some(detail.clone()),
        ..ProgressRecord::default()
    };

    assert_eq!(
        tracker.observe(&snapshot),
        vec![ProgressEvent::Detail(detail)]
    );
    assert!(tracker.observe(&snapshot).is_empty());
}

#[test]
fn final_record_overrides_polled_metrics_without_events() {
    let mut tracker = ProgressTracker::new();
    tracker.observe(&training_snapshot(1, 5));

    tracker.apply_final(&training_snapshot(3, 0));
    assert_eq!(
        tracker.metrics(),
        &[epoch_metrics(1), epoch_metrics(2), epoch_metrics(3)]
    );
    assert_eq!(tracker.completed_epochs(), 3);
}

/// Non-decreasing (epochs, batch) snapshot sequences.
fn snapshot_sequence() -> impl Strategy<Value = Vec<(usize, u64)>> {
    proptest::collection::vec((0..3usize, 0..30u64), 1..40).prop_map(|steps| {
        let mut epochs = 0usize;
        steps
            .into_iter()
            .map(|(epoch_step, batch)| {
                epochs += epoch_step;
                (epochs, batch)
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn epoch_event_fires_once_per_strict_increase(seq in snapshot_sequence()) {
        let mut tracker = ProgressTracker::new();
        let mut last_epochs = 0usize;
        let mut expected_epoch_events = 0usize;
        let mut seen_epochs = Vec::new();

        for (epochs, batch) in seq {
            if epochs > last_epochs {
                expected_epoch_events += 1;
            }
            let events = tracker.observe(&training_snapshot(epochs, batch));
            for event in &events {
                if let ProgressEvent::Epoch { epochs_completed, .. } = event {
                    seen_epochs.push(*epochs_completed);
                }
            }
            last_epochs = last_epochs.max(epochs);
        }

        prop_assert_eq!(seen_epochs.len(), expected_epoch_events);
        prop_assert!(seen_epochs.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn batch_after_epoch_increase_is_the_snapshot_value(seq in snapshot_sequence()) {
        let mut tracker = ProgressTracker::new();
        let mut last_epochs = 0usize;

        for (epochs, batch) in seq {
            let events = tracker.observe(&training_snapshot(epochs, batch));
            if epochs > last_epochs {
                prop_assert_eq!(
                    events.first(),
                    Some(&ProgressEvent::Batch { batch, epochs_completed: epochs })
                );
            }
            last_epochs = last_epochs.max(epochs);
        }
    }

    #[test]
    fn equal_epochs_never_fire_epoch_events(epochs in 0..5usize, a in 0..50u64, b in 0..50u64) {
        let mut tracker = ProgressTracker::new();
        tracker.observe(&training_snapshot(epochs, a));
        let events = tracker.observe(&training_snapshot(epochs, b));

        let (batches, epoch_events) = count(&events);
        prop_assert_eq!(epoch_events, 0);
        prop_assert_eq!(batches, usize::from(b > a));
    }
}
