//! Adapters Layer - External System Implementations
//!
//! This module contains implementations of the port traits:
//! - Feed: market-data sources (JSONL capture replay)
//! - Store: durable baseline history (JSON file store)
//! - Sink: signal consumers (log, JSONL capture, webhook)
//! - CLI: command-line interface definitions

pub mod cli;
pub mod feed;
pub mod sink;
pub mod store;

pub use cli::CliApp;
pub use feed::ReplayFeed;
pub use sink::{JsonlSink, LogSink, WebhookSink};
pub use store::FileBaselineStore;
