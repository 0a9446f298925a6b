// src/engine/tracker.rs

//! Pure progress reconciliation.
//!
//! [`ProgressTracker`] turns a stream of polled [`ProgressRecord`]s into
//! edge-triggered [`ProgressEvent`]s. It has no channels, no Tokio types and
//! performs no IO, so the reconciliation rules can be tested on their own:
//!
//! - a batch event fires when the batch counter or the epoch count advanced;
//! - an epoch event fires only when the epoch count advanced, and the tracked
//!   batch counter restarts from the new snapshot's value;
//! - snapshots with fewer epochs than already seen are stale and ignored.
//!
//! Several epochs completing between two polls collapse into one epoch event.

use crate::protocol::{EpochMetrics, LoadDetail, ProgressRecord};

/// Something the observer should hear about, derived from one snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Batch {
        batch: u64,
        epochs_completed: usize,
    },
    Epoch {
        epochs_completed: usize,
        metrics: Vec<EpochMetrics>,
    },
    Detail(LoadDetail),
}

#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    completed_epochs: usize,
    completed_batches: u64,
    metrics: Vec<EpochMetrics>,
    detail: Option<LoadDetail>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from already known metrics (e.g. when continuing a model that
    /// was trained before).
    pub fn with_metrics(metrics: Vec<EpochMetrics>) -> Self {
        Self {
            completed_epochs: metrics.len(),
            metrics,
            ..Self::default()
        }
    }

    pub fn completed_epochs(&self) -> usize {
        self.completed_epochs
    }

    pub fn completed_batches(&self) -> u64 {
        self.completed_batches
    }

    /// Latest known per-epoch metrics.
    pub fn metrics(&self) -> &[EpochMetrics] {
        &self.metrics
    }

    pub fn detail(&self) -> Option<&LoadDetail> {
        self.detail.as_ref()
    }

    /// Reconcile one polled snapshot, returning the events to deliver in
    /// order.
    pub fn observe(&mut self, snapshot: &ProgressRecord) -> Vec<ProgressEvent> {
        let mut events = Vec::new();

        let epochs = snapshot.epochs_completed();
        if epochs < self.completed_epochs {
            return events;
        }

        let batch = snapshot.completed_batch;
        let epoch_advanced = epochs > self.completed_epochs;

        if epoch_advanced || batch > self.completed_batches {
            events.push(ProgressEvent::Batch {
                batch,
                epochs_completed: epochs,
            });
            self.completed_batches = batch;
        }

        if epoch_advanced {
            self.completed_epochs = epochs;
            self.metrics = snapshot.metrics.clone();
            events.push(ProgressEvent::Epoch {
                epochs_completed: epochs,
                metrics: self.metrics.clone(),
            });
        }

        if let Some(detail) = &snapshot.detail {
            if self.detail.as_ref() != Some(detail) {
                self.detail = Some(detail.clone());
                events.push(ProgressEvent::Detail(detail.clone()));
            }
        }

        events
    }

    /// Adopt the status record as the final word. No events are produced:
    /// the record overrides whatever was polled before.
    pub fn apply_final(&mut self, record: &ProgressRecord) {
        self.completed_epochs = record.epochs_completed();
        self.completed_batches = record.completed_batch;
        self.metrics = record.metrics.clone();
        if record.detail.is_some() {
            self.detail = record.detail.clone();
        }
    }
}
