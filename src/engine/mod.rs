// src/engine/mod.rs

//! Task supervision engine.
//!
//! - [`tracker`] holds the pure snapshot reconciliation rules.
//! - [`observer`] defines the callbacks a controller registers.
//! - [`probe`] abstracts how a child's status is fetched.
//! - [`cancel`] provides the cross-thread cancellation handle.
//! - [`supervisor`] is the async IO shell that launches and watches a child.

pub mod cancel;
pub mod observer;
pub mod probe;
pub mod supervisor;
pub mod tracker;

pub use cancel::CancelHandle;
pub use observer::{Callbacks, Completion, TaskObserver};
pub use probe::{HttpStatusProbe, StatusProbe};
pub use supervisor::{terminal_state, LaunchSettings, TaskParams, TaskSupervisor};
pub use tracker::{ProgressEvent, ProgressTracker};
