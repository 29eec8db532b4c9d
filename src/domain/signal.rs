//! Institutional signals: the engine's output unit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::baseline::BaselineProvenance;
use super::instrument::Instrument;
use super::pressure::DominantSide;

/// Discrete strength tier, a step function of final confidence
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SignalTier {
    Moderate,
    High,
    VeryHigh,
    Extreme,
}

impl SignalTier {
    /// Tier for a final confidence, `None` below the emission floor
    pub fn from_confidence(confidence: f64) -> Option<Self> {
        if confidence >= 0.9 {
            Some(SignalTier::Extreme)
        } else if confidence >= 0.8 {
            Some(SignalTier::VeryHigh)
        } else if confidence >= 0.7 {
            Some(SignalTier::High)
        } else if confidence >= 0.6 {
            Some(SignalTier::Moderate)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalTier::Moderate => "MODERATE",
            SignalTier::High => "HIGH",
            SignalTier::VeryHigh => "VERY_HIGH",
            SignalTier::Extreme => "EXTREME",
        }
    }
}

impl fmt::Display for SignalTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the consumer should do with the signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecommendedAction {
    StrongBuy,
    Buy,
    Sell,
    StrongSell,
    /// Directionless but notable activity
    Monitor,
    /// Forced when market-making probability is too high
    Ignore,
}

impl RecommendedAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendedAction::StrongBuy => "STRONG_BUY",
            RecommendedAction::Buy => "BUY",
            RecommendedAction::Sell => "SELL",
            RecommendedAction::StrongSell => "STRONG_SELL",
            RecommendedAction::Monitor => "MONITOR",
            RecommendedAction::Ignore => "IGNORE",
        }
    }
}

impl fmt::Display for RecommendedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The weighted sub-confidences that sum into the final score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceComponents {
    pub pressure: f64,
    pub baseline: f64,
    pub market_making: f64,
    pub coordination: f64,
}

impl ConfidenceComponents {
    pub fn total(&self) -> f64 {
        (self.pressure + self.baseline + self.market_making + self.coordination).clamp(0.0, 1.0)
    }
}

/// One confidence-scored directional signal, created once per qualifying
/// pressure record and immutable thereafter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstitutionalSignal {
    pub instrument: Instrument,
    pub ts: DateTime<Utc>,
    pub window_start: DateTime<Utc>,

    // Originating pressure record
    pub pressure_ratio: f64,
    pub total_volume: u64,
    pub dominant_side: DominantSide,
    pub aggregation_confidence: f64,

    // Baseline verdict
    pub z_score: f64,
    pub percentile: f64,
    pub anomaly: bool,
    pub baseline_provenance: BaselineProvenance,

    // Market structure
    pub mm_probability: f64,
    pub coordinated: bool,

    // Scoring
    pub components: ConfidenceComponents,
    pub confidence: f64,
    pub tier: SignalTier,
    pub action: RecommendedAction,
    pub risk_score: f64,
}

/// Statistical significance of an absolute z-score: `2 * CDF(|z|) - 1`,
/// the probability mass inside the deviation under a standard normal.
pub fn significance(z_abs: f64) -> f64 {
    use statrs::function::erf::erf;
    erf(z_abs / f64::sqrt(2.0)).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_tier_step_function() {
        assert_eq!(SignalTier::from_confidence(0.95), Some(SignalTier::Extreme));
        assert_eq!(SignalTier::from_confidence(0.9), Some(SignalTier::Extreme));
        assert_eq!(SignalTier::from_confidence(0.85), Some(SignalTier::VeryHigh));
        assert_eq!(SignalTier::from_confidence(0.75), Some(SignalTier::High));
        assert_eq!(SignalTier::from_confidence(0.65), Some(SignalTier::Moderate));
        assert_eq!(SignalTier::from_confidence(0.59), None);
    }

    #[test]
    fn test_tier_ordering() {
        assert!(SignalTier::Extreme > SignalTier::VeryHigh);
        assert!(SignalTier::VeryHigh > SignalTier::High);
        assert!(SignalTier::High > SignalTier::Moderate);
    }

    #[test]
    fn test_significance_known_values() {
        assert_relative_eq!(significance(0.0), 0.0, epsilon = 1e-9);
        assert_relative_eq!(significance(1.0), 0.6827, epsilon = 1e-3);
        assert_relative_eq!(significance(2.0), 0.9545, epsilon = 1e-3);
        assert!(significance(12.6) > 0.9999);
    }

    #[test]
    fn test_components_total_clamps() {
        let c = ConfidenceComponents {
            pressure: 0.6,
            baseline: 0.4,
            market_making: 0.2,
            coordination: 0.1,
        };
        assert_eq!(c.total(), 1.0);

        let c = ConfidenceComponents {
            pressure: 0.3,
            baseline: 0.2,
            market_making: 0.15,
            coordination: 0.0,
        };
        assert_relative_eq!(c.total(), 0.65);
    }
}
