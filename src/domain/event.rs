//! Order-book events as delivered by the market-data source.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::instrument::Instrument;

/// Side of the book an event touches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BookSide {
    Bid,
    Ask,
}

impl BookSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookSide::Bid => "bid",
            BookSide::Ask => "ask",
        }
    }
}

impl fmt::Display for BookSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event schemas a subscription can request from the data source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventSchema {
    /// Market-by-order book events
    Mbo,
    /// Executed trades
    Trades,
}

/// One immutable order-book observation.
///
/// Produced by the data source, validated and possibly tagged as backfilled by
/// the stream layer, consumed exactly once by the window aggregator. `seq` is
/// monotonically increasing per instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderEvent {
    pub instrument: Instrument,
    pub side: BookSide,
    pub price: Decimal,
    /// Contracts added at the touched level
    pub size: u32,
    /// Per-instrument sequence number
    pub seq: u64,
    /// Exchange timestamp
    pub ts_event: DateTime<Utc>,
    /// Set by the stream layer when the event was recovered via backfill
    #[serde(default)]
    pub backfilled: bool,
}

impl OrderEvent {
    pub fn new(
        instrument: Instrument,
        side: BookSide,
        price: Decimal,
        size: u32,
        seq: u64,
        ts_event: DateTime<Utc>,
    ) -> Self {
        Self {
            instrument,
            side,
            price,
            size,
            seq,
            ts_event,
            backfilled: false,
        }
    }

    /// Tag this event as recovered through a backfill request
    pub fn into_backfilled(mut self) -> Self {
        self.backfilled = true;
        self
    }
}
