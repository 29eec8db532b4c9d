//! Ports Layer - Trait definitions for external dependencies
//!
//! This module defines the interfaces (ports) that adapters must implement.
//! Following hexagonal architecture, these traits abstract:
//! - The market-data feed (live subscription + bounded backfill)
//! - The durable baseline history store
//! - The outbound signal consumer

pub mod baseline_store;
pub mod market_data;
pub mod mocks;
pub mod signal_sink;

pub use baseline_store::{BaselineStore, StoreError};
pub use market_data::{FeedError, MarketDataPort};
pub use signal_sink::{SignalSink, SinkError};
