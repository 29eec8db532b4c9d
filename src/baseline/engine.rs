//! Baseline engine.
//!
//! Answers "how unusual is this window for this instrument, historically?".
//! Maintains the per-instrument daily accumulators that become persisted
//! `BaselineSample`s, and a cache of rolling `BaselineStats` recomputed
//! lazily when missing or stale. Store failures degrade to an explicit
//! insufficient-history verdict; they never propagate into the pipeline.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tokio::sync::{Mutex, RwLock};

use crate::domain::{
    BaselineAssessment, BaselineProvenance, BaselineSample, BaselineStats, Instrument,
    PressureRecord, RATIO_CAP,
};
use crate::ports::baseline_store::{BaselineStore, StoreError};

use super::stats::compute_stats;

/// Baseline engine tuning, converted from the configuration
#[derive(Debug, Clone)]
pub struct BaselineParams {
    pub lookback_days: usize,
    pub z_threshold: f64,
    pub min_samples: usize,
    pub stddev_epsilon: f64,
    pub stale_after_hours: i64,
}

impl Default for BaselineParams {
    fn default() -> Self {
        Self {
            lookback_days: 20,
            z_threshold: 2.0,
            min_samples: 5,
            stddev_epsilon: 1e-9,
            stale_after_hours: 24,
        }
    }
}

/// Volumes accumulated for one instrument over one trading day
#[derive(Debug, Clone)]
struct DayAccumulator {
    date: NaiveDate,
    bid_volume: u64,
    ask_volume: u64,
}

impl DayAccumulator {
    fn new(date: NaiveDate) -> Self {
        Self {
            date,
            bid_volume: 0,
            ask_volume: 0,
        }
    }

    fn add(&mut self, record: &PressureRecord) {
        self.bid_volume += record.bid_volume;
        self.ask_volume += record.ask_volume;
    }

    fn total(&self) -> u64 {
        self.bid_volume + self.ask_volume
    }
}

/// Multi-session baseline engine backed by a durable store
pub struct BaselineEngine {
    params: BaselineParams,
    store: Arc<dyn BaselineStore>,
    cache: RwLock<HashMap<Instrument, BaselineStats>>,
    daily: Mutex<HashMap<Instrument, DayAccumulator>>,
}

impl BaselineEngine {
    pub fn new(params: BaselineParams, store: Arc<dyn BaselineStore>) -> Self {
        Self {
            params,
            store,
            cache: RwLock::new(HashMap::new()),
            daily: Mutex::new(HashMap::new()),
        }
    }

    /// Classify a live pressure record against the instrument's baseline.
    ///
    /// Lookup failures come back as an insufficient-history verdict with the
    /// provenance tagged, so a flaky store degrades the sub-score instead of
    /// suppressing the pipeline.
    pub async fn classify(
        &self,
        record: &PressureRecord,
        now: DateTime<Utc>,
    ) -> BaselineAssessment {
        let stats = match self.stats_for(&record.instrument, now).await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::warn!(
                    "baseline lookup failed for {}: {} - degrading to insufficient history",
                    record.instrument,
                    e
                );
                return BaselineAssessment::insufficient_history();
            }
        };

        let ratio = record.capped_ratio();
        let percentile = stats.percentile_rank(ratio);

        let (z_score, no_variability) = if stats.std_dev < self.params.stddev_epsilon {
            (0.0, true)
        } else {
            ((ratio - stats.mean) / stats.std_dev, false)
        };

        let provenance = if stats.sample_count < self.params.min_samples {
            BaselineProvenance::InsufficientHistory
        } else if no_variability {
            BaselineProvenance::NoVariability
        } else {
            BaselineProvenance::Ok
        };

        let anomaly = provenance == BaselineProvenance::Ok
            && z_score.abs() > self.params.z_threshold;

        BaselineAssessment {
            z_score,
            percentile,
            anomaly,
            provenance,
            quality: stats.quality,
        }
    }

    /// Fold a record into the instrument's daily accumulator.
    ///
    /// On a trading-date rollover the finished day is persisted as one
    /// idempotent `BaselineSample` and the cached stats are invalidated.
    pub async fn record_activity(&self, record: &PressureRecord, trading_date: NaiveDate) {
        let mut daily = self.daily.lock().await;
        let acc = daily
            .entry(record.instrument.clone())
            .or_insert_with(|| DayAccumulator::new(trading_date));

        if acc.date != trading_date {
            let finished = std::mem::replace(acc, DayAccumulator::new(trading_date));
            self.persist_sample(&record.instrument, finished).await;
            self.cache.write().await.remove(&record.instrument);
            if let Some(acc) = daily.get_mut(&record.instrument) {
                acc.add(record);
            }
        } else {
            acc.add(record);
        }
    }

    /// Persist every open daily accumulator; called at session close and
    /// orderly shutdown so a partial day is never lost.
    pub async fn flush_all(&self) {
        let drained: Vec<(Instrument, DayAccumulator)> =
            self.daily.lock().await.drain().collect();

        for (instrument, acc) in drained {
            self.persist_sample(&instrument, acc).await;
            self.cache.write().await.remove(&instrument);
        }
    }

    /// Current stats for an instrument; diagnostics/pull interface
    pub async fn stats_snapshot(&self, instrument: &Instrument) -> Option<BaselineStats> {
        self.stats_for(instrument, Utc::now()).await.ok()
    }

    async fn stats_for(
        &self,
        instrument: &Instrument,
        now: DateTime<Utc>,
    ) -> Result<BaselineStats, StoreError> {
        let max_age = Duration::hours(self.params.stale_after_hours);

        {
            let cache = self.cache.read().await;
            if let Some(stats) = cache.get(instrument) {
                if !stats.is_stale(now, max_age) {
                    return Ok(stats.clone());
                }
            }
        }

        // Previously persisted stats survive restarts without a replay
        match self
            .store
            .load_stats(instrument, self.params.lookback_days)
            .await
        {
            Ok(Some(stats)) if !stats.is_stale(now, max_age) => {
                self.cache
                    .write()
                    .await
                    .insert(instrument.clone(), stats.clone());
                return Ok(stats);
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("cached stats unreadable for {}: {}", instrument, e);
            }
        }

        let samples = self
            .store
            .recent_samples(instrument, self.params.lookback_days)
            .await?;
        let stats = compute_stats(&samples, self.params.lookback_days, now);

        if let Err(e) = self
            .store
            .store_stats(instrument, self.params.lookback_days, &stats)
            .await
        {
            tracing::warn!("failed to persist stats for {}: {}", instrument, e);
        }

        self.cache
            .write()
            .await
            .insert(instrument.clone(), stats.clone());
        Ok(stats)
    }

    async fn persist_sample(&self, instrument: &Instrument, acc: DayAccumulator) {
        if acc.total() == 0 {
            return;
        }

        let sample = BaselineSample {
            instrument: instrument.clone(),
            date: acc.date,
            pressure_ratio: PressureRecord::ratio(acc.bid_volume, acc.ask_volume).min(RATIO_CAP),
            volume: acc.total(),
        };

        match self.store.upsert_sample(&sample).await {
            Ok(()) => tracing::debug!(
                "baseline sample persisted: {} {} ratio {:.3} volume {}",
                instrument,
                sample.date,
                sample.pressure_ratio,
                sample.volume
            ),
            Err(e) => tracing::warn!("failed to persist sample for {}: {}", instrument, e),
        }
    }
}
