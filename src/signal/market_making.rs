//! Market-making pattern detector.
//!
//! Liquidity provision produces two-sided volume without directional
//! conviction, the main false-positive source for flow detection. The
//! detector keeps a bounded ring of recent pressure records per underlying
//! and scores two patterns: coordinated straddles (both legs of a strike
//! active inside a short window) and volatility crush (heavy volume with no
//! net direction). The result is a probability in [0, 1] used as a scoring
//! penalty, not a hard filter.

use std::collections::VecDeque;

use crate::domain::{DominantSide, PressureRecord};

/// Bound on the recent-activity ring; pruning by window age happens first
const RECENT_CAPACITY: usize = 512;

/// Straddle-coordination contribution to the probability
const STRADDLE_WEIGHT: f64 = 0.6;

/// Volatility-crush contribution to the probability
const CRUSH_WEIGHT: f64 = 0.4;

/// Detector tuning, converted from the configuration
#[derive(Debug, Clone)]
pub struct MarketMakingParams {
    /// Two windows this close together count as simultaneous
    pub window_secs: u64,
    /// Probability above which the action is forced to IGNORE
    pub max_probability: f64,
    /// Volume a window needs before it can look like market making
    pub straddle_min_volume: u64,
    /// Minority-side share that counts as two-sided flow
    pub two_sided_share: f64,
    /// Ratio band (band⁻¹ .. band) treated as directionless
    pub crush_ratio_band: f64,
}

impl Default for MarketMakingParams {
    fn default() -> Self {
        Self {
            window_secs: 300,
            max_probability: 0.5,
            straddle_min_volume: 100,
            two_sided_share: 0.25,
            crush_ratio_band: 1.5,
        }
    }
}

/// Recent-activity detector over one underlying's strikes
#[derive(Debug)]
pub struct MarketMakingDetector {
    params: MarketMakingParams,
    recent: VecDeque<PressureRecord>,
}

impl MarketMakingDetector {
    pub fn new(params: MarketMakingParams) -> Self {
        Self {
            params,
            recent: VecDeque::with_capacity(RECENT_CAPACITY),
        }
    }

    /// Market-making probability for a record, judged against recent activity
    pub fn assess(&self, record: &PressureRecord) -> f64 {
        let mut probability = 0.0;

        if self.straddle_coordination(record) {
            probability += STRADDLE_WEIGHT;
        }
        if self.volatility_crush(record) {
            probability += CRUSH_WEIGHT;
        }

        probability.clamp(0.0, 1.0)
    }

    /// Does any correlated instrument show the same directional lean right
    /// now? Same underlying, different strike, matching non-neutral dominant
    /// side, with a gate-worthy ratio and confidence.
    pub fn coordinated(
        &self,
        record: &PressureRecord,
        min_ratio: f64,
        min_confidence: f64,
    ) -> bool {
        if record.dominant_side == DominantSide::Neutral {
            return false;
        }

        self.recent.iter().any(|other| {
            other.instrument != record.instrument
                && other.instrument.underlying == record.instrument.underlying
                && other.instrument.strike != record.instrument.strike
                && other.dominant_side == record.dominant_side
                && directional_ratio(other.pressure_ratio) >= min_ratio
                && other.confidence >= min_confidence
                && self.simultaneous(record, other)
        })
    }

    /// Add a scored record to the ring, pruning anything outside the window
    pub fn push(&mut self, record: PressureRecord) {
        let cutoff = record.window_start
            - chrono::Duration::seconds(self.params.window_secs as i64);
        self.recent.retain(|r| r.window_start >= cutoff);

        while self.recent.len() >= RECENT_CAPACITY {
            self.recent.pop_front();
        }
        self.recent.push_back(record);
    }

    pub fn recent_len(&self) -> usize {
        self.recent.len()
    }

    /// Both legs of the strike heavily active at once
    fn straddle_coordination(&self, record: &PressureRecord) -> bool {
        if !self.large_two_sided(record) {
            return false;
        }

        let sibling = record.instrument.sibling();
        self.recent.iter().any(|other| {
            other.instrument == sibling
                && self.large_two_sided(other)
                && self.simultaneous(record, other)
        })
    }

    /// Heavy volume with no net directional pressure
    fn volatility_crush(&self, record: &PressureRecord) -> bool {
        if record.total_volume() < self.params.straddle_min_volume {
            return false;
        }

        let ratio = record.pressure_ratio;
        ratio.is_finite()
            && ratio > 0.0
            && ratio <= self.params.crush_ratio_band
            && ratio >= 1.0 / self.params.crush_ratio_band
    }

    fn large_two_sided(&self, record: &PressureRecord) -> bool {
        record.total_volume() >= self.params.straddle_min_volume
            && record.minority_share() >= self.params.two_sided_share
    }

    fn simultaneous(&self, a: &PressureRecord, b: &PressureRecord) -> bool {
        (a.window_start - b.window_start)
            .num_seconds()
            .unsigned_abs()
            <= self.params.window_secs
    }
}

fn directional_ratio(ratio: f64) -> f64 {
    if ratio <= 0.0 {
        return 0.0;
    }
    ratio.max(1.0 / ratio)
}
