use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{BaselineSample, BaselineStats, Instrument};

/// Durable-store error type
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("stored record is corrupted: {0}")]
    Corrupted(String),
}

/// Durable baseline history store.
///
/// Keyed access with per-key single-writer semantics: `upsert_sample` is
/// idempotent on (instrument, date) so retried writes cannot duplicate a
/// sample, and reads see writes made earlier in the same process.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BaselineStore: Send + Sync {
    /// Insert or replace the sample for (sample.instrument, sample.date)
    async fn upsert_sample(&self, sample: &BaselineSample) -> Result<(), StoreError>;

    /// Up to `limit` most recent samples for an instrument, ascending by date
    async fn recent_samples(
        &self,
        instrument: &Instrument,
        limit: usize,
    ) -> Result<Vec<BaselineSample>, StoreError>;

    /// Cached statistics for (instrument, lookback), if previously stored
    async fn load_stats(
        &self,
        instrument: &Instrument,
        lookback: usize,
    ) -> Result<Option<BaselineStats>, StoreError>;

    /// Persist freshly computed statistics for (instrument, lookback)
    async fn store_stats(
        &self,
        instrument: &Instrument,
        lookback: usize,
        stats: &BaselineStats,
    ) -> Result<(), StoreError>;
}
