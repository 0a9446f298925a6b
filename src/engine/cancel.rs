// src/engine/cancel.rs

use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

#[derive(Debug, Default)]
struct CancelState {
    child_present: bool,
    requested: bool,
}

#[derive(Debug, Default)]
struct CancelInner {
    state: Mutex<CancelState>,
    notify: Notify,
}

/// Cloneable handle for cancelling a running task from another thread of
/// control.
///
/// Cancelling only asks the polling loop to signal the child; the loop's own
/// exit detection performs the final state transition.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    inner: Arc<CancelInner>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request termination of the child. Returns whether a child was present.
    pub fn cancel(&self) -> bool {
        let mut state = self.inner.state.lock().unwrap_or_else(|e| e.into_inner());
        if !state.child_present {
            return false;
        }
        state.requested = true;
        // Stores a permit if the loop is not waiting right now.
        self.inner.notify.notify_one();
        true
    }

    pub fn is_requested(&self) -> bool {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .requested
    }

    pub(crate) fn child_started(&self) {
        let mut state = self.inner.state.lock().unwrap_or_else(|e| e.into_inner());
        state.child_present = true;
        state.requested = false;
    }

    pub(crate) fn child_exited(&self) {
        let mut state = self.inner.state.lock().unwrap_or_else(|e| e.into_inner());
        state.child_present = false;
    }

    /// Resolves once a cancellation has been requested.
    pub(crate) async fn requested(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_requested() {
                return;
            }
            notified.await;
        }
    }
}
