// src/engine/observer.rs

//! Controller-supplied callbacks.

use crate::engine::tracker::ProgressEvent;
use crate::protocol::{EpochMetrics, LoadDetail, ProgressRecord};
use crate::types::TaskState;

/// Final result handed to [`TaskObserver::on_complete`].
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    /// Terminal state: `Completed`, `Cancelled` or `Crashed`.
    pub state: TaskState,
    /// The status record, if the child wrote one before exiting.
    pub record: Option<ProgressRecord>,
    /// Authoritative metrics: the record's if present, else the last polled.
    pub metrics: Vec<EpochMetrics>,
    /// Exit code of the child, `None` when it was killed by a signal.
    pub exit_code: Option<i32>,
}

impl Completion {
    /// Whether the child left terminal data behind.
    pub fn has_record(&self) -> bool {
        self.record.is_some()
    }
}

/// Receives edge-triggered progress of one task.
///
/// All methods default to doing nothing.
pub trait TaskObserver: Send {
    fn on_batch(&mut self, _batch: u64, _epochs_completed: usize) {}
    fn on_epoch(&mut self, _epochs_completed: usize, _metrics: &[EpochMetrics]) {}
    fn on_detail(&mut self, _detail: &LoadDetail) {}
    fn on_complete(&mut self, _completion: &Completion) {}
}

impl TaskObserver for () {}

/// Route a tracker event to the matching observer method.
pub fn dispatch(observer: &mut dyn TaskObserver, event: &ProgressEvent) {
    match event {
        ProgressEvent::Batch {
            batch,
            epochs_completed,
        } => observer.on_batch(*batch, *epochs_completed),
        ProgressEvent::Epoch {
            epochs_completed,
            metrics,
        } => observer.on_epoch(*epochs_completed, metrics),
        ProgressEvent::Detail(detail) => observer.on_detail(detail),
    }
}

type BatchFn = Box<dyn FnMut(u64, usize) + Send>;
type EpochFn = Box<dyn FnMut(usize, &[EpochMetrics]) + Send>;
type DetailFn = Box<dyn FnMut(&LoadDetail) + Send>;
type CompleteFn = Box<dyn FnMut(&Completion) + Send>;

/// Closure-based [`TaskObserver`].
#[derive(Default)]
pub struct Callbacks {
    batch: Option<BatchFn>,
    epoch: Option<EpochFn>,
    detail: Option<DetailFn>,
    complete: Option<CompleteFn>,
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("batch", &self.batch.is_some())
            .field("epoch", &self.epoch.is_some())
            .field("detail", &self.detail.is_some())
            .field("complete", &self.complete.is_some())
            .finish()
    }
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_batch(mut self, f: impl FnMut(u64, usize) + Send + 'static) -> Self {
        self.batch = Some(Box::new(f));
        self
    }

    pub fn on_epoch(mut self, f: impl FnMut(usize, &[EpochMetrics]) + Send + 'static) -> Self {
        self.epoch = Some(Box::new(f));
        self
    }

    pub fn on_detail(mut self, f: impl FnMut(&LoadDetail) + Send + 'static) -> Self {
        self.detail = Some(Box::new(f));
        self
    }

    pub fn on_complete(mut self, f: impl FnMut(&Completion) + Send + 'static) -> Self {
        self.complete = Some(Box::new(f));
        self
    }
}

impl TaskObserver for Callbacks {
    fn on_batch(&mut self, batch: u64, epochs_completed: usize) {
        if let Some(f) = self.batch.as_mut() {
            f(batch, epochs_completed);
        }
    }

    fn on_epoch(&mut self, epochs_completed: usize, metrics: &[EpochMetrics]) {
        if let Some(f) = self.epoch.as_mut() {
            f(epochs_completed, metrics);
        }
    }

    fn on_detail(&mut self, detail: &LoadDetail) {
        if let Some(f) = self.detail.as_mut() {
            f(detail);
        }
    }

    fn on_complete(&mut self, completion: &Completion) {
        if let Some(f) = self.complete.as_mut() {
            f(completion);
        }
    }
}
