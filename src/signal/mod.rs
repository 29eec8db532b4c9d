//! Signal Engine - gating, market-making detection and confidence scoring

pub mod engine;
pub mod market_making;

pub use engine::{SignalEngine, SignalParams, Weights};
pub use market_making::{MarketMakingDetector, MarketMakingParams};
