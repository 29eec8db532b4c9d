//! Baseline history types.
//!
//! One `BaselineSample` summarizes one trading day of one instrument and is
//! persisted indefinitely. `BaselineStats` are the derived rolling statistics
//! over the lookback window; the percentile table is the raw sorted
//! historical distribution, with no normality assumption.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::instrument::Instrument;

/// One historical day's summary flow for one instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineSample {
    pub instrument: Instrument,
    pub date: NaiveDate,
    /// Day-level ask/bid ratio, capped to stay finite in storage
    pub pressure_ratio: f64,
    /// Total contracts traded that day
    pub volume: u64,
}

/// Rolling statistics over the most recent lookback window.
///
/// Cached in process and persisted alongside the samples so a restart never
/// needs a full historical replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineStats {
    pub mean: f64,
    pub std_dev: f64,
    /// Raw historical ratios in ascending order (the percentile table)
    pub sorted_ratios: Vec<f64>,
    pub sample_count: usize,
    /// Sample quality in [0, 1]: fraction of the lookback actually covered
    pub quality: f64,
    pub computed_at: DateTime<Utc>,
}

impl BaselineStats {
    /// Empirical-CDF percentile rank of `ratio` in [0, 100].
    ///
    /// Ties get midpoint treatment; with no history the rank is 50.
    pub fn percentile_rank(&self, ratio: f64) -> f64 {
        let n = self.sorted_ratios.len();
        if n == 0 {
            return 50.0;
        }

        let below = self.sorted_ratios.partition_point(|&r| r < ratio);
        let not_above = self.sorted_ratios.partition_point(|&r| r <= ratio);
        let equal = not_above - below;

        (below as f64 + 0.5 * equal as f64) / n as f64 * 100.0
    }

    pub fn is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        now - self.computed_at > max_age
    }
}

/// Why a baseline verdict came out the way it did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BaselineProvenance {
    /// Full history, normal statistics
    Ok,
    /// Too few samples for an anomaly call
    InsufficientHistory,
    /// Standard deviation below epsilon: z-score forced to 0
    NoVariability,
}

/// Baseline verdict for one live pressure record
#[derive(Debug, Clone, PartialEq)]
pub struct BaselineAssessment {
    pub z_score: f64,
    pub percentile: f64,
    pub anomaly: bool,
    pub provenance: BaselineProvenance,
    pub quality: f64,
}

impl BaselineAssessment {
    /// Degraded verdict when history is missing or a store lookup failed
    pub fn insufficient_history() -> Self {
        Self {
            z_score: 0.0,
            percentile: 50.0,
            anomaly: false,
            provenance: BaselineProvenance::InsufficientHistory,
            quality: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn stats(ratios: Vec<f64>) -> BaselineStats {
        let mut sorted = ratios;
        sorted.sort_by(|a, b| a.partial_cmp(b).expect("finite ratios"));
        let n = sorted.len();
        BaselineStats {
            mean: 0.0,
            std_dev: 0.0,
            sorted_ratios: sorted,
            sample_count: n,
            quality: 1.0,
            computed_at: Utc::now(),
        }
    }

    #[test]
    fn test_percentile_rank_extremes() {
        let s = stats(vec![0.8, 1.0, 1.2, 1.4, 1.6]);

        assert_relative_eq!(s.percentile_rank(0.1), 0.0);
        assert_relative_eq!(s.percentile_rank(99.0), 100.0);
    }

    #[test]
    fn test_percentile_rank_midpoint_on_ties() {
        let s = stats(vec![1.0, 1.0, 1.0, 2.0]);
        // 0 below, 3 equal of 4 -> 37.5
        assert_relative_eq!(s.percentile_rank(1.0), 37.5);
    }

    #[test]
    fn test_percentile_rank_interior() {
        let s = stats(vec![0.8, 1.0, 1.2, 1.4, 1.6]);
        assert_relative_eq!(s.percentile_rank(1.3), 60.0);
    }

    #[test]
    fn test_percentile_rank_empty_history() {
        let s = stats(vec![]);
        assert_relative_eq!(s.percentile_rank(7.5), 50.0);
    }

    #[test]
    fn test_staleness() {
        let mut s = stats(vec![1.0]);
        s.computed_at = Utc::now() - Duration::hours(30);

        assert!(s.is_stale(Utc::now(), Duration::hours(24)));
        assert!(!s.is_stale(Utc::now(), Duration::hours(48)));
    }

    #[test]
    fn test_insufficient_history_is_inert() {
        let a = BaselineAssessment::insufficient_history();
        assert_eq!(a.z_score, 0.0);
        assert!(!a.anomaly);
        assert_eq!(a.provenance, BaselineProvenance::InsufficientHistory);
    }
}
