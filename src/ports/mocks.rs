//! Hand-rolled recording mocks for the port traits, used across the test
//! suites. They record every call and serve scripted responses.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::{EventSchema, Instrument, InstitutionalSignal, OrderEvent};
use crate::ports::market_data::{FeedError, MarketDataPort};
use crate::ports::signal_sink::{SignalSink, SinkError};

/// Scripted market-data feed.
///
/// Each `subscribe` call serves the next configured batch of live events and
/// then closes the stream; once the batches are exhausted, `subscribe`
/// reports end-of-stream. `backfill` answers from a separate history buffer
/// and records every request it sees.
pub struct ScriptedFeed {
    batches: Mutex<VecDeque<Vec<OrderEvent>>>,
    history: Vec<OrderEvent>,
    backfill_calls: Arc<Mutex<Vec<(Instrument, u64, u64)>>>,
    auth_failure: bool,
}

impl ScriptedFeed {
    pub fn new(batches: Vec<Vec<OrderEvent>>) -> Self {
        Self {
            batches: Mutex::new(batches.into_iter().collect()),
            history: Vec::new(),
            backfill_calls: Arc::new(Mutex::new(Vec::new())),
            auth_failure: false,
        }
    }

    /// Events the feed can serve to backfill requests
    pub fn with_history(mut self, history: Vec<OrderEvent>) -> Self {
        self.history = history;
        self
    }

    /// A feed that rejects every subscription as a credentials failure
    pub fn with_auth_failure() -> Self {
        let mut feed = Self::new(Vec::new());
        feed.auth_failure = true;
        feed
    }

    /// All backfill requests seen so far, in call order
    pub fn backfill_calls(&self) -> Vec<(Instrument, u64, u64)> {
        self.backfill_calls.lock().expect("mock lock").clone()
    }

    /// Shared handle to the call log, usable after the feed moves into an Arc
    pub fn backfill_call_log(&self) -> Arc<Mutex<Vec<(Instrument, u64, u64)>>> {
        Arc::clone(&self.backfill_calls)
    }
}

#[async_trait]
impl MarketDataPort for ScriptedFeed {
    async fn subscribe(
        &self,
        _underlying: &str,
        _schemas: &[EventSchema],
    ) -> Result<mpsc::Receiver<OrderEvent>, FeedError> {
        if self.auth_failure {
            return Err(FeedError::InvalidCredentials("scripted rejection".into()));
        }

        let batch = self
            .batches
            .lock()
            .expect("mock lock")
            .pop_front()
            .ok_or(FeedError::EndOfStream)?;

        let (tx, rx) = mpsc::channel(batch.len().max(1));
        tokio::spawn(async move {
            for event in batch {
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });

        Ok(rx)
    }

    async fn backfill(
        &self,
        instrument: &Instrument,
        start_seq: u64,
        end_seq: u64,
    ) -> Result<Vec<OrderEvent>, FeedError> {
        self.backfill_calls
            .lock()
            .expect("mock lock")
            .push((instrument.clone(), start_seq, end_seq));

        Ok(self
            .history
            .iter()
            .filter(|ev| {
                ev.instrument == *instrument && ev.seq >= start_seq && ev.seq <= end_seq
            })
            .cloned()
            .collect())
    }
}

/// Sink that records every delivered signal
#[derive(Clone, Default)]
pub struct RecordingSink {
    delivered: Arc<Mutex<Vec<InstitutionalSignal>>>,
    fail: bool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that rejects every delivery
    pub fn failing() -> Self {
        Self {
            delivered: Arc::new(Mutex::new(Vec::new())),
            fail: true,
        }
    }

    pub fn delivered(&self) -> Vec<InstitutionalSignal> {
        self.delivered.lock().expect("mock lock").clone()
    }
}

#[async_trait]
impl SignalSink for RecordingSink {
    async fn deliver(&self, signal: &InstitutionalSignal) -> Result<(), SinkError> {
        if self.fail {
            return Err(SinkError::Delivery("scripted failure".into()));
        }
        self.delivered.lock().expect("mock lock").push(signal.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}
