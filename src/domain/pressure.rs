//! Windowed pressure records.
//!
//! A `PressureRecord` is the aggregate of all order events for one instrument
//! over one fixed time window. The pressure ratio (ask volume over bid volume)
//! is the core directional-aggression proxy; it is deliberately allowed to be
//! infinite when the bid side is empty.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::instrument::Instrument;

/// Upper bound applied wherever a ratio feeds statistics or persistence,
/// keeping stored distributions finite. The in-memory record keeps the
/// unbounded value.
pub const RATIO_CAP: f64 = 1e6;

/// Which side of the market dominated a window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DominantSide {
    /// Ask-side volume dominated: buyers lifting the offer
    Buy,
    /// Bid-side volume dominated: sellers hitting the bid
    Sell,
    Neutral,
}

impl DominantSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            DominantSide::Buy => "BUY",
            DominantSide::Sell => "SELL",
            DominantSide::Neutral => "NEUTRAL",
        }
    }
}

impl fmt::Display for DominantSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate of one instrument's order flow over one window.
///
/// Immutable once constructed; built only from sequence-contiguous (or
/// explicitly backfilled) events, which the stream layer guarantees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PressureRecord {
    pub instrument: Instrument,
    pub window_start: DateTime<Utc>,
    pub bid_volume: u64,
    pub ask_volume: u64,
    /// ask / bid; `f64::INFINITY` when bid is 0 and ask > 0, 0.0 when both are 0
    pub pressure_ratio: f64,
    pub trade_count: u32,
    pub avg_trade_size: f64,
    pub dominant_side: DominantSide,
    /// Aggregation confidence in [0, 1], from sample size and side skew
    pub confidence: f64,
}

impl PressureRecord {
    /// Build a record from accumulated window volumes.
    ///
    /// `full_confidence_trades` is the trade count at which the sample-size
    /// component of the confidence saturates.
    pub fn from_volumes(
        instrument: Instrument,
        window_start: DateTime<Utc>,
        bid_volume: u64,
        ask_volume: u64,
        trade_count: u32,
        full_confidence_trades: u32,
    ) -> Self {
        let pressure_ratio = Self::ratio(bid_volume, ask_volume);
        let total = bid_volume + ask_volume;

        let dominant_side = if ask_volume > bid_volume {
            DominantSide::Buy
        } else if bid_volume > ask_volume {
            DominantSide::Sell
        } else {
            DominantSide::Neutral
        };

        let avg_trade_size = if trade_count > 0 {
            total as f64 / trade_count as f64
        } else {
            0.0
        };

        Self {
            instrument,
            window_start,
            bid_volume,
            ask_volume,
            pressure_ratio,
            trade_count,
            avg_trade_size,
            dominant_side,
            confidence: aggregation_confidence(
                bid_volume,
                ask_volume,
                trade_count,
                full_confidence_trades,
            ),
        }
    }

    /// Ask/bid ratio with the degenerate cases pinned down:
    /// infinite on an empty bid side, 0 when the window saw nothing.
    pub fn ratio(bid_volume: u64, ask_volume: u64) -> f64 {
        if bid_volume == 0 {
            if ask_volume > 0 {
                f64::INFINITY
            } else {
                0.0
            }
        } else {
            ask_volume as f64 / bid_volume as f64
        }
    }

    pub fn total_volume(&self) -> u64 {
        self.bid_volume + self.ask_volume
    }

    /// Ratio clamped for statistics and persistence
    pub fn capped_ratio(&self) -> f64 {
        self.pressure_ratio.min(RATIO_CAP)
    }

    /// Share of the smaller side, in [0, 0.5]. High values mean two-sided flow.
    pub fn minority_share(&self) -> f64 {
        let total = self.total_volume();
        if total == 0 {
            return 0.0;
        }
        self.bid_volume.min(self.ask_volume) as f64 / total as f64
    }
}

/// Confidence from trade count and dominant-side skew: more trades and more
/// one-sided flow both raise it.
fn aggregation_confidence(
    bid_volume: u64,
    ask_volume: u64,
    trade_count: u32,
    full_confidence_trades: u32,
) -> f64 {
    let total = bid_volume + ask_volume;
    if total == 0 || trade_count == 0 {
        return 0.0;
    }

    let count_factor = (trade_count as f64 / full_confidence_trades.max(1) as f64).min(1.0);
    let dominant_share = bid_volume.max(ask_volume) as f64 / total as f64;

    count_factor * (0.5 + 0.5 * dominant_share)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::instrument::OptionType;
    use approx::assert_relative_eq;
    use rust_decimal_macros::dec;

    fn instrument() -> Instrument {
        Instrument::new("ES", dec!(5000), OptionType::Call)
    }

    fn record(bid: u64, ask: u64, trades: u32) -> PressureRecord {
        PressureRecord::from_volumes(instrument(), Utc::now(), bid, ask, trades, 10)
    }

    #[test]
    fn test_ratio_infinite_when_bid_empty() {
        assert_eq!(PressureRecord::ratio(0, 150), f64::INFINITY);
    }

    #[test]
    fn test_ratio_zero_when_both_empty() {
        assert_eq!(PressureRecord::ratio(0, 0), 0.0);
    }

    #[test]
    fn test_ratio_never_panics_and_is_exact() {
        assert_relative_eq!(PressureRecord::ratio(20, 150), 7.5);
        assert_relative_eq!(PressureRecord::ratio(150, 20), 20.0 / 150.0);
    }

    #[test]
    fn test_dominant_side_assignment() {
        assert_eq!(record(20, 150, 19).dominant_side, DominantSide::Buy);
        assert_eq!(record(150, 20, 19).dominant_side, DominantSide::Sell);
        assert_eq!(record(50, 50, 10).dominant_side, DominantSide::Neutral);
    }

    #[test]
    fn test_confidence_rises_with_skew() {
        let balanced = record(100, 100, 20);
        let skewed = record(20, 180, 20);

        assert!(skewed.confidence > balanced.confidence);
        assert!(balanced.confidence >= 0.5);
    }

    #[test]
    fn test_confidence_scales_with_trade_count() {
        let thin = record(20, 150, 2);
        let full = record(20, 150, 19);

        assert!(thin.confidence < full.confidence);
        // Sample factor saturates at full_confidence_trades
        let saturated = record(20, 150, 50);
        assert_relative_eq!(full.confidence, saturated.confidence);
    }

    #[test]
    fn test_benchmark_window_confidence() {
        // 150 ask-lifting vs 20 bid-hitting contracts: strongly one-sided
        let r = record(20, 150, 19);
        assert_relative_eq!(r.pressure_ratio, 7.5);
        assert_eq!(r.total_volume(), 170);
        assert!(r.confidence > 0.9, "confidence was {}", r.confidence);
    }

    #[test]
    fn test_capped_ratio_is_finite() {
        let r = record(0, 150, 10);
        assert!(r.pressure_ratio.is_infinite());
        assert!(r.capped_ratio().is_finite());
        assert_eq!(r.capped_ratio(), RATIO_CAP);
    }

    #[test]
    fn test_minority_share() {
        assert_relative_eq!(record(50, 150, 10).minority_share(), 0.25);
        assert_relative_eq!(record(0, 150, 10).minority_share(), 0.0);
        assert_relative_eq!(record(100, 100, 10).minority_share(), 0.5);
    }

    #[test]
    fn test_avg_trade_size() {
        let r = record(20, 150, 17);
        assert_relative_eq!(r.avg_trade_size, 10.0);

        let empty = PressureRecord::from_volumes(instrument(), Utc::now(), 0, 0, 0, 10);
        assert_eq!(empty.avg_trade_size, 0.0);
        assert_eq!(empty.confidence, 0.0);
    }
}
