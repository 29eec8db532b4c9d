//! Window Aggregator - per-instrument pressure records on fixed windows

pub mod window;

pub use window::WindowAggregator;
