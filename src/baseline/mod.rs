//! Baseline Engine - rolling multi-session statistics per instrument

pub mod engine;
pub mod stats;

pub use engine::{BaselineEngine, BaselineParams};
pub use stats::{compute_stats, percentile};
