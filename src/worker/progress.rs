// src/worker/progress.rs

//! Lock-guarded progress state shared by a child's workload loop and its
//! status server.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info};

use crate::errors::Result;
use crate::protocol::{write_status_record, EpochMetrics, LifecycleState, LoadDetail, ProgressRecord};

/// Single owned progress record; cloning yields another handle to it.
#[derive(Debug, Clone, Default)]
pub struct ProgressCell {
    inner: Arc<RwLock<ProgressRecord>>,
}

impl ProgressCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(record: ProgressRecord) -> Self {
        Self {
            inner: Arc::new(RwLock::new(record)),
        }
    }

    /// Copy of the current record.
    pub fn snapshot(&self) -> ProgressRecord {
        self.read().clone()
    }

    /// Apply `f` to the record under the write lock.
    pub fn update<R>(&self, f: impl FnOnce(&mut ProgressRecord) -> R) -> R {
        f(&mut self.write())
    }

    /// Replace the whole record.
    pub fn set(&self, record: ProgressRecord) {
        *self.write() = record;
    }

    fn read(&self) -> RwLockReadGuard<'_, ProgressRecord> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, ProgressRecord> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

/// Training-loop hooks feeding a [`ProgressCell`].
#[derive(Debug)]
pub struct TrainingHooks {
    cell: ProgressCell,
    workdir: PathBuf,
    finished: bool,
}

impl TrainingHooks {
    /// `metrics` seeds the record when training continues an earlier run.
    pub fn new(cell: ProgressCell, workdir: impl Into<PathBuf>, metrics: Vec<EpochMetrics>) -> Self {
        cell.set(ProgressRecord {
            state: LifecycleState::Training,
            metrics,
            completed_batch: 0,
            detail: None,
        });
        Self {
            cell,
            workdir: workdir.into(),
            finished: false,
        }
    }

    pub fn cell(&self) -> &ProgressCell {
        &self.cell
    }

    pub fn on_batch_end(&self, batch: u64) {
        self.cell.update(|r| r.completed_batch = batch);
    }

    /// Record a completed epoch; the batch counter starts over.
    pub fn on_epoch_end(&self, metrics: EpochMetrics) {
        let epochs = self.cell.update(|r| {
            r.metrics.push(metrics);
            r.completed_batch = 0;
            r.metrics.len()
        });
        debug!(epochs, "epoch completed");
    }

    /// Mark training finished and write the status record. Only the first
    /// call has an effect.
    pub fn on_train_end(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        let record = self.cell.update(|r| {
            r.state = LifecycleState::Trained;
            r.clone()
        });
        write_status_record(&self.workdir, &record)?;
        self.finished = true;
        info!(epochs = record.epochs_completed(), "training finished; status record written");
        Ok(())
    }

    pub fn metrics(&self) -> Vec<EpochMetrics> {
        self.cell.snapshot().metrics
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }
}

/// Bulk-loading hooks feeding a [`ProgressCell`].
#[derive(Debug)]
pub struct IndexingHooks {
    cell: ProgressCell,
    workdir: PathBuf,
    report_every: u64,
    finished: bool,
}

impl IndexingHooks {
    pub const DEFAULT_REPORT_EVERY: u64 = 10;

    pub fn new(cell: ProgressCell, workdir: impl Into<PathBuf>, report_every: u64) -> Self {
        cell.set(ProgressRecord {
            state: LifecycleState::Loading,
            ..ProgressRecord::default()
        });
        Self {
            cell,
            workdir: workdir.into(),
            report_every: report_every.max(1),
            finished: false,
        }
    }

    pub fn cell(&self) -> &ProgressCell {
        &self.cell
    }

    /// Called after the `count`-th item was stored.
    pub fn on_item(&self, count: u64, latest_item: &str) {
        if count % self.report_every != 0 {
            return;
        }
        self.cell.update(|r| {
            r.detail = Some(LoadDetail {
                message: format!("Loaded {count} items"),
                latest_item: Some(latest_item.to_string()),
            })
        });
    }

    /// Mark loading finished and write the status record. Only the first
    /// call has an effect.
    pub fn on_load_end(&mut self, total: u64) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        let record = self.cell.update(|r| {
            r.state = LifecycleState::Loaded;
            let latest_item = r.detail.take().and_then(|d| d.latest_item);
            r.detail = Some(LoadDetail {
                message: format!("Loaded {total} items"),
                latest_item,
            });
            r.clone()
        });
        write_status_record(&self.workdir, &record)?;
        self.finished = true;
        info!(total, "loading finished; status record written");
        Ok(())
    }
}
