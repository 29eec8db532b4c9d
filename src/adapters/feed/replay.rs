//! JSONL capture replay feed.
//!
//! Serves a recorded event capture through the market-data port: the first
//! subscription streams every event of the requested underlying in order,
//! later subscriptions report end-of-stream so a replay run winds down
//! cleanly. Backfill answers from the same capture, which makes gap-recovery
//! drills deterministic.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::{EventSchema, Instrument, OrderEvent};
use crate::ports::market_data::{FeedError, MarketDataPort};

pub struct ReplayFeed {
    events: Arc<Vec<OrderEvent>>,
    served: AtomicBool,
    channel_buffer: usize,
}

impl ReplayFeed {
    /// Load a capture from a JSONL file, one `OrderEvent` per line
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, FeedError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| FeedError::Connection(format!("cannot read capture: {}", e)))?;

        let mut events = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let event: OrderEvent = serde_json::from_str(line).map_err(|e| {
                FeedError::Malformed(format!("capture line {}: {}", idx + 1, e))
            })?;
            events.push(event);
        }

        Ok(Self::from_events(events))
    }

    pub fn from_events(mut events: Vec<OrderEvent>) -> Self {
        events.sort_by(|a, b| a.ts_event.cmp(&b.ts_event).then(a.seq.cmp(&b.seq)));
        Self {
            events: Arc::new(events),
            served: AtomicBool::new(false),
            channel_buffer: 1024,
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[async_trait]
impl MarketDataPort for ReplayFeed {
    async fn subscribe(
        &self,
        underlying: &str,
        _schemas: &[EventSchema],
    ) -> Result<mpsc::Receiver<OrderEvent>, FeedError> {
        if self.served.swap(true, Ordering::SeqCst) {
            return Err(FeedError::EndOfStream);
        }

        let underlying = underlying.to_string();
        let events = Arc::clone(&self.events);
        let (tx, rx) = mpsc::channel(self.channel_buffer);

        tokio::spawn(async move {
            for event in events.iter() {
                if event.instrument.underlying != underlying {
                    continue;
                }
                if tx.send(event.clone()).await.is_err() {
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
        Ok(self
            .events
            .iter()
            .filter(|ev| {
                ev.instrument == *instrument && ev.seq >= start_seq && ev.seq <= end_seq
            })
            .cloned()
            .collect())
    }
}
