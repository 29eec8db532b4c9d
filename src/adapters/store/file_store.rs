//! File-backed baseline store.
//!
//! One JSON document per instrument for samples, one per (instrument,
//! lookback) for cached stats, under a data directory. Upserts are keyed by
//! (instrument, date): rewriting the same day replaces the entry, so retried
//! writes cannot duplicate a sample.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::domain::{BaselineSample, BaselineStats, Instrument};
use crate::ports::baseline_store::{BaselineStore, StoreError};

/// JSON-file store satisfying the durable-store contract within a process
pub struct FileBaselineStore {
    data_dir: PathBuf,
}

impl FileBaselineStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    fn samples_path(&self, instrument: &Instrument) -> PathBuf {
        self.data_dir
            .join("samples")
            .join(format!("{}.json", instrument.key()))
    }

    fn stats_path(&self, instrument: &Instrument, lookback: usize) -> PathBuf {
        self.data_dir
            .join("stats")
            .join(format!("{}-{}.json", instrument.key(), lookback))
    }

    fn read_samples(&self, path: &Path) -> Result<Vec<BaselineSample>, StoreError> {
        if !path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(path).map_err(|e| StoreError::Io(e.to_string()))?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        serde_json::from_str(&content).map_err(|e| StoreError::Corrupted(e.to_string()))
    }

    fn write_json<T: serde::Serialize>(&self, path: &Path, value: &T) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::Io(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(value)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        fs::write(path, content).map_err(|e| StoreError::Io(e.to_string()))
    }
}

#[async_trait]
impl BaselineStore for FileBaselineStore {
    async fn upsert_sample(&self, sample: &BaselineSample) -> Result<(), StoreError> {
        let path = self.samples_path(&sample.instrument);
        let mut samples = self.read_samples(&path)?;

        match samples.iter_mut().find(|s| s.date == sample.date) {
            Some(existing) => *existing = sample.clone(),
            None => samples.push(sample.clone()),
        }
        samples.sort_by_key(|s| s.date);

        self.write_json(&path, &samples)
    }

    async fn recent_samples(
        &self,
        instrument: &Instrument,
        limit: usize,
    ) -> Result<Vec<BaselineSample>, StoreError> {
        let mut samples = self.read_samples(&self.samples_path(instrument))?;
        samples.sort_by_key(|s| s.date);

        let skip = samples.len().saturating_sub(limit);
        Ok(samples.split_off(skip))
    }

    async fn load_stats(
        &self,
        instrument: &Instrument,
        lookback: usize,
    ) -> Result<Option<BaselineStats>, StoreError> {
        let path = self.stats_path(instrument, lookback);
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path).map_err(|e| StoreError::Io(e.to_string()))?;
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| StoreError::Corrupted(e.to_string()))
    }

    async fn store_stats(
        &self,
        instrument: &Instrument,
        lookback: usize,
        stats: &BaselineStats,
    ) -> Result<(), StoreError> {
        self.write_json(&self.stats_path(instrument, lookback), stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OptionType;
    use chrono::{NaiveDate, Utc};
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    fn instrument() -> Instrument {
        Instrument::new("ES", dec!(5000), OptionType::Call)
    }

    fn sample(day: u32, ratio: f64) -> BaselineSample {
        BaselineSample {
            instrument: instrument(),
            date: NaiveDate::from_ymd_opt(2026, 7, day).unwrap(),
            pressure_ratio: ratio,
            volume: 1000,
        }
    }

    #[tokio::test]
    async fn test_upsert_and_read_back() {
        let dir = tempdir().unwrap();
        let store = FileBaselineStore::new(dir.path());

        store.upsert_sample(&sample(1, 1.2)).await.unwrap();
        store.upsert_sample(&sample(2, 1.4)).await.unwrap();

        let samples = store.recent_samples(&instrument(), 20).await.unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].date, NaiveDate::from_ymd_opt(2026, 7, 1).unwrap());
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = FileBaselineStore::new(dir.path());

        store.upsert_sample(&sample(1, 1.2)).await.unwrap();
        // Retried write for the same day replaces, never duplicates
        store.upsert_sample(&sample(1, 1.3)).await.unwrap();

        let samples = store.recent_samples(&instrument(), 20).await.unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].pressure_ratio, 1.3);
    }

    #[tokio::test]
    async fn test_recent_samples_windowing() {
        let dir = tempdir().unwrap();
        let store = FileBaselineStore::new(dir.path());

        for day in 1..=10 {
            store.upsert_sample(&sample(day, day as f64)).await.unwrap();
        }

        let samples = store.recent_samples(&instrument(), 3).await.unwrap();
        let days: Vec<u32> = samples
            .iter()
            .map(|s| chrono::Datelike::day(&s.date))
            .collect();
        assert_eq!(days, vec![8, 9, 10]);
    }

    #[tokio::test]
    async fn test_missing_instrument_is_empty() {
        let dir = tempdir().unwrap();
        let store = FileBaselineStore::new(dir.path());

        let samples = store.recent_samples(&instrument(), 20).await.unwrap();
        assert!(samples.is_empty());
    }

    #[tokio::test]
    async fn test_stats_roundtrip() {
        let dir = tempdir().unwrap();
        let store = FileBaselineStore::new(dir.path());

        assert!(store.load_stats(&instrument(), 20).await.unwrap().is_none());

        let stats = BaselineStats {
            mean: 1.2,
            std_dev: 0.5,
            sorted_ratios: vec![0.7, 1.7],
            sample_count: 2,
            quality: 0.1,
            computed_at: Utc::now(),
        };
        store.store_stats(&instrument(), 20, &stats).await.unwrap();

        let loaded = store.load_stats(&instrument(), 20).await.unwrap().unwrap();
        assert_eq!(loaded.mean, stats.mean);
        assert_eq!(loaded.sorted_ratios, stats.sorted_ratios);
    }

    #[tokio::test]
    async fn test_corrupted_file_reported() {
        let dir = tempdir().unwrap();
        let store = FileBaselineStore::new(dir.path());

        let path = dir.path().join("samples").join(format!("{}.json", instrument().key()));
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{ not json").unwrap();

        let result = store.recent_samples(&instrument(), 20).await;
        assert!(matches!(result, Err(StoreError::Corrupted(_))));
    }

    #[tokio::test]
    async fn test_instruments_do_not_collide() {
        let dir = tempdir().unwrap();
        let store = FileBaselineStore::new(dir.path());

        let put = instrument().sibling();
        store.upsert_sample(&sample(1, 1.2)).await.unwrap();

        let samples = store.recent_samples(&put, 20).await.unwrap();
        assert!(samples.is_empty());
    }
}
