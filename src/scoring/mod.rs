// src/scoring/mod.rs

//! Request/response workloads.
//!
//! Instead of polling for progress, each call issues one request against the
//! child's score server, retrying while the child is still starting up.

pub mod client;
pub mod service;

pub use client::ScoringClient;
pub use service::ScoringService;
