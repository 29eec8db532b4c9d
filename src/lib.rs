#![allow(dead_code, unused_imports, unused_variables)]
//! Flowscope - Institutional order-flow detection engine library
//!
//! Consumes a live order-level event stream for a derivatives option chain
//! and produces confidence-scored directional signals for probable
//! large-institution positioning.
//!
//! # Modules
//!
//! - `domain`: Core data model (OrderEvent, PressureRecord, BaselineSample,
//!   InstitutionalSignal, IngestionBudget, SessionCalendar)
//! - `ports`: Trait abstractions (MarketDataPort, BaselineStore, SignalSink)
//! - `stream`: Stream reliability layer (gap recovery, reconnection, budget)
//! - `aggregator`: Fixed-window pressure aggregation
//! - `baseline`: Rolling multi-session baseline statistics
//! - `signal`: Market-making detection and confidence scoring
//! - `adapters`: External implementations (replay feed, file store, sinks, CLI)
//! - `config`: Configuration loading and validation
//! - `application`: The FlowEngine orchestrator

pub mod adapters;
pub mod aggregator;
pub mod application;
pub mod baseline;
pub mod config;
pub mod domain;
pub mod ports;
pub mod signal;
pub mod stream;
