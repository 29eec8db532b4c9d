//! Flow engine orchestrator.
//!
//! Wires the pipeline together: session gate, stream supervisor, window
//! aggregator, baseline engine, signal engine and the outbound sinks. The
//! ingestion path runs in its own tasks and hands records to a single
//! scoring worker over the bounded broadcast ring, so scoring can never
//! block ingestion.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, watch, RwLock};
use tracing::{info, warn};

use crate::aggregator::WindowAggregator;
use crate::baseline::{BaselineEngine, BaselineParams};
use crate::config::{Config, ConfigError};
use crate::domain::{IngestionBudget, PressureRecord, SessionCalendar};
use crate::ports::baseline_store::BaselineStore;
use crate::ports::market_data::MarketDataPort;
use crate::ports::signal_sink::SignalSink;
use crate::signal::{SignalEngine, SignalParams};
use crate::stream::{ConnectionStatus, IngestError, StreamSettings, StreamSupervisor};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("ingestion error: {0}")]
    Ingest(#[from] IngestError),
}

/// Counters exposed by the scoring worker
#[derive(Debug, Clone, Default)]
pub struct EngineCounters {
    pub windows_scored: u64,
    pub signals_emitted: u64,
    pub suppressed_anomalies: u64,
    pub records_dropped: u64,
}

/// Snapshot of the running engine
#[derive(Debug, Clone)]
pub struct EngineStatus {
    pub connection: ConnectionStatus,
    pub counters: EngineCounters,
}

/// Top-level engine: one tracked underlying, one pipeline
pub struct FlowEngine {
    config: Config,
    port: Arc<dyn MarketDataPort>,
    store: Arc<dyn BaselineStore>,
    sinks: Vec<Arc<dyn SignalSink>>,
    shutdown_tx: watch::Sender<bool>,
    status_rx: RwLock<Option<watch::Receiver<ConnectionStatus>>>,
    counters: Arc<RwLock<EngineCounters>>,
}

impl FlowEngine {
    pub fn new(
        config: Config,
        port: Arc<dyn MarketDataPort>,
        store: Arc<dyn BaselineStore>,
        sinks: Vec<Arc<dyn SignalSink>>,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            config,
            port,
            store,
            sinks,
            shutdown_tx,
            status_rx: RwLock::new(None),
            counters: Arc::new(RwLock::new(EngineCounters::default())),
        }
    }

    /// Run the pipeline until shutdown, source end, or a fatal error.
    ///
    /// On exit the open window is flushed, every pending record is scored and
    /// the partial baseline day is persisted before this returns.
    pub async fn run(&self) -> Result<(), EngineError> {
        let calendar = self.config.session_calendar()?;
        let budget = IngestionBudget::from(&self.config);

        let (event_tx, event_rx) = mpsc::channel(self.config.stream.channel_buffer);
        let (aggregator, records_rx) = WindowAggregator::new(
            self.config.pressure.window_secs,
            self.config.pressure.full_confidence_trades,
            self.config.stream.record_buffer,
        );

        let (supervisor, status_rx) = StreamSupervisor::new(
            StreamSettings::from(&self.config),
            Arc::clone(&self.port),
            calendar.clone(),
            budget,
            event_tx,
            self.shutdown_tx.subscribe(),
        );
        *self.status_rx.write().await = Some(status_rx);

        let baseline = BaselineEngine::new(
            BaselineParams::from(&self.config),
            Arc::clone(&self.store),
        );
        let signal_engine = SignalEngine::new(SignalParams::from(&self.config));

        info!(
            "flow engine starting: underlying {}, {}s windows, {}-session baseline",
            self.config.stream.underlying,
            self.config.pressure.window_secs,
            self.config.baseline.lookback_days
        );

        let aggregator_task = tokio::spawn(aggregator.run(event_rx));
        let worker_task = tokio::spawn(scoring_worker(
            records_rx,
            baseline,
            signal_engine,
            self.sinks.clone(),
            calendar,
            Arc::clone(&self.counters),
        ));

        let result = supervisor.run().await;

        // The supervisor dropped its event sender: the aggregator drains and
        // flushes, closing the ring, and the worker scores what remains
        if let Err(e) = aggregator_task.await {
            warn!("aggregator task failed: {}", e);
        }
        if let Err(e) = worker_task.await {
            warn!("scoring worker failed: {}", e);
        }

        let stats = result?;
        info!(
            "flow engine stopped: {} events, {} gaps ({} backfilled), {} duplicates dropped",
            stats.events_forwarded,
            stats.gaps_detected,
            stats.backfills_requested,
            stats.duplicates_dropped
        );
        Ok(())
    }

    /// Request cooperative shutdown
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
        info!("stop signal sent to flow engine");
    }

    /// Current status snapshot; never blocks the pipeline
    pub async fn status(&self) -> EngineStatus {
        let connection = match self.status_rx.read().await.as_ref() {
            Some(rx) => *rx.borrow(),
            None => ConnectionStatus::Reconnecting { attempt: 0 },
        };

        EngineStatus {
            connection,
            counters: self.counters.read().await.clone(),
        }
    }
}

/// Single scoring worker: consumes the record ring in arrival order, which
/// serializes per-instrument baseline work by construction.
async fn scoring_worker(
    mut records: broadcast::Receiver<PressureRecord>,
    baseline: BaselineEngine,
    mut signal_engine: SignalEngine,
    sinks: Vec<Arc<dyn SignalSink>>,
    calendar: SessionCalendar,
    counters: Arc<RwLock<EngineCounters>>,
) {
    loop {
        match records.recv().await {
            Ok(record) => {
                let now = Utc::now();
                let assessment = baseline.classify(&record, now).await;
                baseline
                    .record_activity(&record, calendar.trading_date(record.window_start))
                    .await;

                let emitted = signal_engine.evaluate(&record, &assessment, now);
                if let Some(signal) = &emitted {
                    for sink in &sinks {
                        if let Err(e) = sink.deliver(signal).await {
                            warn!("signal delivery via {} failed: {}", sink.name(), e);
                        }
                    }
                }

                let mut c = counters.write().await;
                c.windows_scored += 1;
                if emitted.is_some() {
                    c.signals_emitted += 1;
                }
                c.suppressed_anomalies = signal_engine.suppressed_anomalies();
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("scoring worker lagged; dropped {} oldest pressure records", n);
                counters.write().await.records_dropped += n;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }

    // Partial day survives restarts
    baseline.flush_all().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::FileBaselineStore;
    use crate::ports::mocks::{RecordingSink, ScriptedFeed};
    use tempfile::tempdir;

    fn engine_with_feed(feed: ScriptedFeed, dir: &std::path::Path) -> (FlowEngine, RecordingSink) {
        let mut config = Config::default();
        // Continuous session and fast backoff keep the test deterministic
        config.session.open_day = "Sun".to_string();
        config.session.open_time = "00:00".to_string();
        config.session.close_day = "Sun".to_string();
        config.session.close_time = "00:00".to_string();
        config.stream.backoff_base_ms = 1;
        config.stream.backoff_max_ms = 5;
        config.stream.jitter_ms = 0;

        let sink = RecordingSink::new();
        let engine = FlowEngine::new(
            config,
            Arc::new(feed),
            Arc::new(FileBaselineStore::new(dir)),
            vec![Arc::new(sink.clone())],
        );
        (engine, sink)
    }

    #[tokio::test]
    async fn test_engine_runs_empty_capture_to_completion() {
        let dir = tempdir().unwrap();
        let feed = ScriptedFeed::new(vec![]);
        let (engine, sink) = engine_with_feed(feed, dir.path());

        // Subscribe immediately reports end of stream: a clean stop
        engine.run().await.expect("clean run");
        assert!(sink.delivered().is_empty());

        let status = engine.status().await;
        assert_eq!(status.counters.windows_scored, 0);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let dir = tempdir().unwrap();
        let feed = ScriptedFeed::new(vec![]);
        let (engine, _sink) = engine_with_feed(feed, dir.path());

        engine.stop();
        engine.stop();
        engine.run().await.expect("clean run");
    }
}
