// src/worker/mod.rs

//! Runtime for child processes written in Rust.
//!
//! Children written in other languages only need to speak the same
//! protocol (see [`crate::protocol`]); this module is one implementation of
//! it: a lock-guarded [`ProgressCell`] updated by workload hooks and served
//! by an embedded [`StatusServer`], or a stateless [`ScoreServer`].

pub mod indexing;
pub mod progress;
pub mod server;
pub mod simulate;

pub use indexing::{index_items, prepare_store, Embedding, SearchHit, SimilarityStore};
pub use progress::{IndexingHooks, ProgressCell, TrainingHooks};
pub use server::{ScoreServer, Scorer, ServerHandle, StatusServer};
pub use simulate::{
    run_simulated_scoring, run_simulated_training, simulated_metrics, KeyScore, LengthScorer,
    SimulationOptions,
};
