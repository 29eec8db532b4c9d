//! Market-data feed adapters

pub mod replay;

pub use replay::ReplayFeed;
