//! Connection state owned by the stream supervisor.
//!
//! Status transitions are observable through a watch channel but never block
//! event delivery; the per-instrument sequence ledger lives here so gap and
//! duplicate decisions stay with the connection they belong to.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use rand::Rng;

use crate::domain::Instrument;

use super::gap::SeqOutcome;

/// Connectivity status of the ingestion stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    Reconnecting { attempt: u32 },
    GapDetected,
    BudgetHalted,
    SessionClosed,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Connected => "CONNECTED",
            ConnectionStatus::Reconnecting { .. } => "RECONNECTING",
            ConnectionStatus::GapDetected => "GAP_DETECTED",
            ConnectionStatus::BudgetHalted => "BUDGET_HALTED",
            ConnectionStatus::SessionClosed => "SESSION_CLOSED",
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            ConnectionStatus::Connected | ConnectionStatus::GapDetected
        )
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exponential backoff with jitter, capped at a maximum interval
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    base_ms: u64,
    max_ms: u64,
    jitter_ms: u64,
}

impl BackoffPolicy {
    pub fn new(base_ms: u64, max_ms: u64, jitter_ms: u64) -> Self {
        Self {
            base_ms,
            max_ms,
            jitter_ms,
        }
    }

    /// Delay before reconnect attempt `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self
            .base_ms
            .saturating_mul(2u64.saturating_pow(attempt.min(10)));
        let capped = exp.min(self.max_ms);

        let jitter = if self.jitter_ms > 0 {
            rand::thread_rng().gen_range(0..=self.jitter_ms)
        } else {
            0
        };

        Duration::from_millis(capped + jitter)
    }
}

/// Ingestion counters, returned when the supervisor finishes
#[derive(Debug, Clone, Default)]
pub struct StreamStats {
    pub events_forwarded: u64,
    pub duplicates_dropped: u64,
    pub gaps_detected: u64,
    pub backfills_requested: u64,
    pub backfills_skipped: u64,
    pub reconnects: u32,
}

/// Mutable connection state, exclusively owned by the stream supervisor
#[derive(Debug)]
pub struct ConnectionState {
    last_seq: HashMap<Instrument, u64>,
    pub backoff_ms: u64,
    pub spent_usd: f64,
    pub status: ConnectionStatus,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self {
            last_seq: HashMap::new(),
            backoff_ms: 0,
            spent_usd: 0.0,
            status: ConnectionStatus::Reconnecting { attempt: 0 },
        }
    }
}

impl ConnectionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate one event's sequence number against the ledger.
    ///
    /// The first observation of an instrument seeds its sequence; from then
    /// on only `last + 1` is accepted, anything at or below `last` is a
    /// duplicate, and anything beyond opens a gap.
    pub fn observe(&mut self, instrument: &Instrument, seq: u64) -> SeqOutcome {
        match self.last_seq.get(instrument).copied() {
            None => {
                self.last_seq.insert(instrument.clone(), seq);
                SeqOutcome::Accept
            }
            Some(last) if seq == last + 1 => {
                self.last_seq.insert(instrument.clone(), seq);
                SeqOutcome::Accept
            }
            Some(last) if seq <= last => SeqOutcome::Duplicate,
            Some(last) => SeqOutcome::Gap {
                from: last + 1,
                to: seq - 1,
            },
        }
    }

    /// Skip the ledger forward, used when a missing range is abandoned
    pub fn advance_to(&mut self, instrument: &Instrument, seq: u64) {
        self.last_seq.insert(instrument.clone(), seq);
    }

    pub fn last_seq(&self, instrument: &Instrument) -> Option<u64> {
        self.last_seq.get(instrument).copied()
    }
}
