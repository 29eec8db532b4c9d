//! Rolling baseline statistics.
//!
//! Mean and standard deviation are computed over the raw sample ratios
//! (population form); the percentile table is simply the sorted historical
//! distribution, so no normality assumption sneaks in.

use chrono::{DateTime, Utc};

use crate::domain::{BaselineSample, BaselineStats};

/// Compute rolling statistics from the most recent samples of one instrument.
///
/// `lookback` is the configured window length; quality reflects how much of
/// it the samples actually cover.
pub fn compute_stats(
    samples: &[BaselineSample],
    lookback: usize,
    now: DateTime<Utc>,
) -> BaselineStats {
    let mut ratios: Vec<f64> = samples.iter().map(|s| s.pressure_ratio).collect();
    ratios.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let n = ratios.len();
    let mean = if n > 0 {
        ratios.iter().sum::<f64>() / n as f64
    } else {
        0.0
    };

    let std_dev = if n > 0 {
        let variance = ratios
            .iter()
            .map(|&r| {
                let diff = r - mean;
                diff * diff
            })
            .sum::<f64>()
            / n as f64;
        variance.sqrt()
    } else {
        0.0
    };

    let quality = if lookback > 0 {
        (n as f64 / lookback as f64).min(1.0)
    } else {
        0.0
    };

    BaselineStats {
        mean,
        std_dev,
        sorted_ratios: ratios,
        sample_count: n,
        quality,
        computed_at: now,
    }
}

/// Nearest-rank percentile of a sorted slice, for diagnostics output
pub fn percentile(sorted: &[f64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (pct / 100.0 * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Instrument, OptionType};
    use approx::assert_relative_eq;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn samples(ratios: &[f64]) -> Vec<BaselineSample> {
        let instrument = Instrument::new("ES", dec!(5000), OptionType::Call);
        ratios
            .iter()
            .enumerate()
            .map(|(i, &r)| BaselineSample {
                instrument: instrument.clone(),
                date: NaiveDate::from_ymd_opt(2026, 7, 1 + i as u32).unwrap(),
                pressure_ratio: r,
                volume: 1000,
            })
            .collect()
    }

    #[test]
    fn test_known_mean_and_std() {
        // 10 at 0.7 and 10 at 1.7: mean 1.2, population std 0.5
        let mut ratios = vec![0.7; 10];
        ratios.extend(vec![1.7; 10]);

        let stats = compute_stats(&samples(&ratios), 20, Utc::now());
        assert_relative_eq!(stats.mean, 1.2, epsilon = 1e-12);
        assert_relative_eq!(stats.std_dev, 0.5, epsilon = 1e-12);
        assert_eq!(stats.sample_count, 20);
        assert_relative_eq!(stats.quality, 1.0);
    }

    #[test]
    fn test_quality_reflects_coverage() {
        let stats = compute_stats(&samples(&[1.0, 1.1, 1.2, 1.3, 1.4]), 20, Utc::now());
        assert_relative_eq!(stats.quality, 0.25);
    }

    #[test]
    fn test_empty_history() {
        let stats = compute_stats(&[], 20, Utc::now());
        assert_eq!(stats.sample_count, 0);
        assert_eq!(stats.mean, 0.0);
        assert_eq!(stats.std_dev, 0.0);
        assert_eq!(stats.quality, 0.0);
    }

    #[test]
    fn test_sorted_table() {
        let stats = compute_stats(&samples(&[1.4, 0.8, 1.2]), 20, Utc::now());
        assert_eq!(stats.sorted_ratios, vec![0.8, 1.2, 1.4]);
    }

    #[test]
    fn test_percentile_nearest_rank() {
        let sorted = [0.8, 1.0, 1.2, 1.4, 1.6];
        assert_relative_eq!(percentile(&sorted, 50.0), 1.2);
        assert_relative_eq!(percentile(&sorted, 90.0), 1.6);
        assert_relative_eq!(percentile(&sorted, 1.0), 0.8);
        assert_eq!(percentile(&[], 50.0), 0.0);
    }
}
