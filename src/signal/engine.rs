//! Signal engine.
//!
//! Turns a pressure record plus its baseline verdict into a final
//! `InstitutionalSignal`, or suppresses output for the window. Gating runs
//! first; the surviving windows get a weighted confidence composed from the
//! raw pressure confidence, the baseline significance, the market-making
//! penalty and a coordination bonus.

use std::panic::{catch_unwind, AssertUnwindSafe};

use chrono::{DateTime, Utc};

use crate::domain::{
    significance, BaselineAssessment, BaselineProvenance, ConfidenceComponents, DominantSide,
    InstitutionalSignal, PressureRecord, RecommendedAction, SignalTier,
};

use super::market_making::{MarketMakingDetector, MarketMakingParams};

/// Confidence composition weights; validated at startup to sum to 1
#[derive(Debug, Clone, Copy)]
pub struct Weights {
    pub pressure: f64,
    pub baseline: f64,
    pub market_making: f64,
    pub coordination: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            pressure: 0.4,
            baseline: 0.3,
            market_making: 0.2,
            coordination: 0.1,
        }
    }
}

/// Signal engine tuning, converted from the configuration
#[derive(Debug, Clone)]
pub struct SignalParams {
    pub min_ratio: f64,
    pub min_volume: u64,
    pub min_aggregation_confidence: f64,
    pub min_final_confidence: f64,
    pub strong_action_confidence: f64,
    pub log_suppressed_anomalies: bool,
    pub weights: Weights,
    pub mm: MarketMakingParams,
}

impl Default for SignalParams {
    fn default() -> Self {
        Self {
            min_ratio: 2.0,
            min_volume: 100,
            min_aggregation_confidence: 0.8,
            min_final_confidence: 0.6,
            strong_action_confidence: 0.85,
            log_suppressed_anomalies: true,
            weights: Weights::default(),
            mm: MarketMakingParams::default(),
        }
    }
}

/// Final scoring stage of the pipeline
pub struct SignalEngine {
    params: SignalParams,
    detector: MarketMakingDetector,
    suppressed_anomalies: u64,
}

impl SignalEngine {
    pub fn new(params: SignalParams) -> Self {
        let detector = MarketMakingDetector::new(params.mm.clone());
        Self {
            params,
            detector,
            suppressed_anomalies: 0,
        }
    }

    /// Score one window. `None` means the window produced no signal; the
    /// record still feeds the recent-activity ring either way.
    pub fn evaluate(
        &mut self,
        record: &PressureRecord,
        assessment: &BaselineAssessment,
        now: DateTime<Utc>,
    ) -> Option<InstitutionalSignal> {
        let result = self.evaluate_inner(record, assessment, now);
        self.detector.push(record.clone());
        result
    }

    /// Anomalous windows seen but suppressed below the emission floor
    pub fn suppressed_anomalies(&self) -> u64 {
        self.suppressed_anomalies
    }

    fn evaluate_inner(
        &mut self,
        record: &PressureRecord,
        assessment: &BaselineAssessment,
        now: DateTime<Utc>,
    ) -> Option<InstitutionalSignal> {
        if !self.passes_gate(record) {
            self.note_suppressed(record, assessment, "below pressure gate");
            return None;
        }

        // A detector failure degrades to probability 0 rather than losing
        // the window
        let mm_probability = catch_unwind(AssertUnwindSafe(|| self.detector.assess(record)))
            .unwrap_or_else(|_| {
                tracing::warn!(
                    "market-making detector panicked for {}; assuming probability 0",
                    record.instrument
                );
                0.0
            });

        let coordinated = self.detector.coordinated(
            record,
            self.params.min_ratio,
            self.params.min_aggregation_confidence,
        );

        let baseline_confidence = match assessment.provenance {
            BaselineProvenance::InsufficientHistory => 0.0,
            _ => significance(assessment.z_score.abs()) * assessment.quality,
        };

        let w = &self.params.weights;
        let components = ConfidenceComponents {
            pressure: w.pressure * record.confidence,
            baseline: w.baseline * baseline_confidence,
            // The penalty eats into this term's full weight allocation
            market_making: w.market_making * (1.0 - mm_probability),
            coordination: w.coordination * if coordinated { 1.0 } else { 0.0 },
        };
        let confidence = components.total();

        if confidence < self.params.min_final_confidence {
            self.note_suppressed(record, assessment, "below confidence floor");
            return None;
        }
        let tier = match SignalTier::from_confidence(confidence) {
            Some(tier) => tier,
            None => {
                self.note_suppressed(record, assessment, "below tier floor");
                return None;
            }
        };

        let action = self.action_for(confidence, record.dominant_side, mm_probability);
        let risk_score = (0.4 * mm_probability
            + 0.3 * (1.0 - assessment.quality)
            + 0.3 * (1.0 - confidence))
            .clamp(0.0, 1.0);

        Some(InstitutionalSignal {
            instrument: record.instrument.clone(),
            ts: now,
            window_start: record.window_start,
            pressure_ratio: record.pressure_ratio,
            total_volume: record.total_volume(),
            dominant_side: record.dominant_side,
            aggregation_confidence: record.confidence,
            z_score: assessment.z_score,
            percentile: assessment.percentile,
            anomaly: assessment.anomaly,
            baseline_provenance: assessment.provenance,
            mm_probability,
            coordinated,
            components,
            confidence,
            tier,
            action,
            risk_score,
        })
    }

    fn passes_gate(&self, record: &PressureRecord) -> bool {
        directional_ratio(record.pressure_ratio) >= self.params.min_ratio
            && record.total_volume() >= self.params.min_volume
            && record.confidence >= self.params.min_aggregation_confidence
    }

    fn action_for(
        &self,
        confidence: f64,
        side: DominantSide,
        mm_probability: f64,
    ) -> RecommendedAction {
        if mm_probability > self.params.mm.max_probability {
            return RecommendedAction::Ignore;
        }

        let strong = confidence >= self.params.strong_action_confidence;
        match side {
            DominantSide::Buy if strong => RecommendedAction::StrongBuy,
            DominantSide::Buy => RecommendedAction::Buy,
            DominantSide::Sell if strong => RecommendedAction::StrongSell,
            DominantSide::Sell => RecommendedAction::Sell,
            DominantSide::Neutral => RecommendedAction::Monitor,
        }
    }

    fn note_suppressed(
        &mut self,
        record: &PressureRecord,
        assessment: &BaselineAssessment,
        reason: &str,
    ) {
        if !assessment.anomaly {
            return;
        }
        self.suppressed_anomalies += 1;
        if self.params.log_suppressed_anomalies {
            tracing::debug!(
                "anomalous window suppressed ({}): {} ratio {:.2} z {:.2} volume {}",
                reason,
                record.instrument,
                record.pressure_ratio,
                assessment.z_score,
                record.total_volume()
            );
        }
    }
}

/// Dominance regardless of direction: sell-side pressure (ratio « 1) is
/// judged by the reciprocal so one threshold serves both sides
fn directional_ratio(ratio: f64) -> f64 {
    if ratio <= 0.0 {
        return 0.0;
    }
    ratio.max(1.0 / ratio)
}
