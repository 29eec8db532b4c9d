//! Window aggregator.
//!
//! Consumes the validated, sequence-ordered event stream and folds it into
//! per-instrument accumulators for the current wall-clock-aligned window.
//! When the window rolls over, one `PressureRecord` per active instrument is
//! emitted into a bounded broadcast ring; a consumer that falls behind loses
//! the oldest records and sees how many (drop-oldest, never unbounded
//! buffering), so aggregation never blocks on scoring.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc};

use crate::domain::{BookSide, Instrument, OrderEvent, PressureRecord};

/// Per-instrument volumes for the open window
#[derive(Debug, Default, Clone)]
struct WindowAcc {
    bid_volume: u64,
    ask_volume: u64,
    trade_count: u32,
}

/// Fixed-window aggregation stage
pub struct WindowAggregator {
    window_secs: i64,
    full_confidence_trades: u32,
    current_start: Option<DateTime<Utc>>,
    acc: HashMap<Instrument, WindowAcc>,
    out: broadcast::Sender<PressureRecord>,
    windows_emitted: u64,
}

impl WindowAggregator {
    /// Create the aggregator plus the first subscription to its record ring
    pub fn new(
        window_secs: u64,
        full_confidence_trades: u32,
        record_buffer: usize,
    ) -> (Self, broadcast::Receiver<PressureRecord>) {
        let (out, rx) = broadcast::channel(record_buffer.max(1));
        (
            Self {
                window_secs: window_secs as i64,
                full_confidence_trades,
                current_start: None,
                acc: HashMap::new(),
                out,
                windows_emitted: 0,
            },
            rx,
        )
    }

    /// Additional subscription to the record ring
    pub fn subscribe(&self) -> broadcast::Receiver<PressureRecord> {
        self.out.subscribe()
    }

    /// Wall-clock-aligned window start containing `ts`
    pub fn window_start_for(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let secs = ts.timestamp();
        let aligned = secs - secs.rem_euclid(self.window_secs);
        DateTime::from_timestamp(aligned, 0).unwrap_or(ts)
    }

    /// Fold one event in; returns the number of records emitted by a window
    /// rollover this event caused.
    pub fn ingest(&mut self, event: &OrderEvent) -> usize {
        let window = self.window_start_for(event.ts_event);

        let mut emitted = 0;
        match self.current_start {
            None => self.current_start = Some(window),
            Some(current) if window > current => {
                emitted = self.emit_window(current);
                self.current_start = Some(window);
            }
            Some(current) if window < current => {
                // Replayed stragglers land in the open window rather than
                // reopening a closed one
                tracing::debug!(
                    "late event for {} (seq {}) attributed to open window",
                    event.instrument,
                    event.seq
                );
            }
            Some(_) => {}
        }

        let acc = self.acc.entry(event.instrument.clone()).or_default();
        match event.side {
            BookSide::Bid => acc.bid_volume += event.size as u64,
            BookSide::Ask => acc.ask_volume += event.size as u64,
        }
        acc.trade_count += 1;

        emitted
    }

    /// Emit the open window, if any; used at session close and shutdown so
    /// in-flight aggregation completes before the pipeline stops.
    pub fn flush(&mut self) -> usize {
        match self.current_start.take() {
            Some(current) => self.emit_window(current),
            None => 0,
        }
    }

    pub fn windows_emitted(&self) -> u64 {
        self.windows_emitted
    }

    /// Drive the aggregator from the event channel until it closes, then
    /// flush the open window.
    pub async fn run(mut self, mut events: mpsc::Receiver<OrderEvent>) {
        while let Some(event) = events.recv().await {
            self.ingest(&event);
        }
        let flushed = self.flush();
        tracing::debug!(
            "aggregator drained: {} windows emitted ({} at close)",
            self.windows_emitted,
            flushed
        );
    }

    fn emit_window(&mut self, window_start: DateTime<Utc>) -> usize {
        let mut emitted = 0;
        for (instrument, acc) in self.acc.drain() {
            // Inactive instruments have no accumulator; zero-volume entries
            // cannot occur, but stay cheap to guard
            if acc.bid_volume + acc.ask_volume == 0 {
                continue;
            }

            let record = PressureRecord::from_volumes(
                instrument,
                window_start,
                acc.bid_volume,
                acc.ask_volume,
                acc.trade_count,
                self.full_confidence_trades,
            );

            // No receivers is fine; the ring itself applies drop-oldest
            let _ = self.out.send(record);
            emitted += 1;
        }

        self.windows_emitted += emitted as u64;
        emitted as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OptionType;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn instrument() -> Instrument {
        Instrument::new("ES", dec!(5000), OptionType::Call)
    }

    fn base_ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 4, 14, 0, 0).unwrap()
    }

    fn event(side: BookSide, size: u32, seq: u64, ts: DateTime<Utc>) -> OrderEvent {
        OrderEvent::new(instrument(), side, dec!(12.25), size, seq, ts)
    }

    fn drain(rx: &mut broadcast::Receiver<PressureRecord>) -> Vec<PressureRecord> {
        let mut records = Vec::new();
        while let Ok(r) = rx.try_recv() {
            records.push(r);
        }
        records
    }

    #[test]
    fn test_window_alignment() {
        let (agg, _rx) = WindowAggregator::new(300, 10, 16);
        let ts = base_ts() + Duration::seconds(437);
        let start = agg.window_start_for(ts);

        assert_eq!(start, base_ts() + Duration::seconds(300));
        assert_eq!(start.timestamp() % 300, 0);
    }

    #[test]
    fn test_volume_conservation() {
        let (mut agg, mut rx) = WindowAggregator::new(300, 10, 16);

        let mut total = 0u64;
        for seq in 0..10 {
            let size = 10 + seq as u32;
            total += size as u64;
            let side = if seq % 2 == 0 {
                BookSide::Ask
            } else {
                BookSide::Bid
            };
            agg.ingest(&event(side, size, seq, base_ts() + Duration::seconds(seq as i64)));
        }
        agg.flush();

        let records = drain(&mut rx);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].total_volume(), total);
        assert_eq!(records[0].trade_count, 10);
    }

    #[test]
    fn test_rollover_emits_completed_window() {
        let (mut agg, mut rx) = WindowAggregator::new(300, 10, 16);

        agg.ingest(&event(BookSide::Ask, 100, 1, base_ts()));
        assert!(drain(&mut rx).is_empty());

        // First event of the next window closes the previous one
        let emitted = agg.ingest(&event(BookSide::Bid, 50, 2, base_ts() + Duration::seconds(300)));
        assert_eq!(emitted, 1);

        let records = drain(&mut rx);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].ask_volume, 100);
        assert_eq!(records[0].window_start, base_ts());
    }

    #[test]
    fn test_one_record_per_active_instrument() {
        let (mut agg, mut rx) = WindowAggregator::new(300, 10, 16);

        let put = Instrument::new("ES", dec!(5000), OptionType::Put);
        agg.ingest(&event(BookSide::Ask, 100, 1, base_ts()));
        agg.ingest(&OrderEvent::new(
            put.clone(),
            BookSide::Bid,
            dec!(11.0),
            40,
            1,
            base_ts(),
        ));
        agg.flush();

        let records = drain(&mut rx);
        assert_eq!(records.len(), 2);
        assert!(records.iter().any(|r| r.instrument == put));
    }

    #[test]
    fn test_inactive_window_emits_nothing() {
        let (mut agg, mut rx) = WindowAggregator::new(300, 10, 16);
        assert_eq!(agg.flush(), 0);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_late_event_joins_open_window() {
        let (mut agg, mut rx) = WindowAggregator::new(300, 10, 16);

        agg.ingest(&event(BookSide::Ask, 100, 5, base_ts() + Duration::seconds(300)));
        // A backfill straggler stamped before the open window
        agg.ingest(&event(BookSide::Ask, 20, 4, base_ts() + Duration::seconds(250)));
        agg.flush();

        let records = drain(&mut rx);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].ask_volume, 120);
    }

    #[test]
    fn test_lagged_consumer_sees_drop_count() {
        let (mut agg, mut rx) = WindowAggregator::new(300, 10, 2);

        // Emit 4 windows into a ring of 2
        for i in 0..4 {
            agg.ingest(&event(
                BookSide::Ask,
                100,
                i,
                base_ts() + Duration::seconds(300 * i as i64),
            ));
        }
        agg.flush();

        match rx.try_recv() {
            Err(broadcast::error::TryRecvError::Lagged(n)) => assert_eq!(n, 2),
            other => panic!("expected lag, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_run_flushes_on_channel_close() {
        let (agg, mut rx) = WindowAggregator::new(300, 10, 16);
        let (tx, events) = mpsc::channel(8);

        let handle = tokio::spawn(agg.run(events));
        tx.send(event(BookSide::Ask, 150, 1, base_ts())).await.unwrap();
        tx.send(event(BookSide::Bid, 20, 2, base_ts())).await.unwrap();
        drop(tx);
        handle.await.unwrap();

        let records = drain(&mut rx);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].ask_volume, 150);
        assert_eq!(records[0].bid_volume, 20);
    }
}
