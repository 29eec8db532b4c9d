//! Gap recovery plumbing.
//!
//! When a sequence gap is detected the supervisor requests exactly one
//! bounded backfill for the missing range. The recovered events are tagged,
//! merged with whatever arrived live in the meantime, and replayed in
//! sequence order with duplicate sequences collapsed.

use crate::domain::OrderEvent;

/// Verdict on one observed sequence number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqOutcome {
    /// Next expected (or first seen) sequence
    Accept,
    /// Already delivered; drop it
    Duplicate,
    /// Missing range `from..=to` precedes this event
    Gap { from: u64, to: u64 },
}

/// Merge a gap's trigger event with the recovered range: recovered events are
/// tagged as backfilled, everything is ordered by sequence, and duplicate
/// sequences collapse to a single event.
pub fn merge_recovered(trigger: OrderEvent, recovered: Vec<OrderEvent>) -> Vec<OrderEvent> {
    let mut merged: Vec<OrderEvent> = recovered
        .into_iter()
        .map(OrderEvent::into_backfilled)
        .collect();
    merged.push(trigger);

    merged.sort_by_key(|ev| ev.seq);
    merged.dedup_by_key(|ev| ev.seq);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BookSide, Instrument, OptionType};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn event(seq: u64) -> OrderEvent {
        OrderEvent::new(
            Instrument::new("ES", dec!(5000), OptionType::Call),
            BookSide::Ask,
            dec!(12.25),
            10,
            seq,
            Utc::now(),
        )
    }

    #[test]
    fn test_merge_orders_by_sequence() {
        let merged = merge_recovered(event(7), vec![event(5), event(4), event(6)]);
        let seqs: Vec<u64> = merged.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![4, 5, 6, 7]);
    }

    #[test]
    fn test_recovered_events_are_tagged() {
        let merged = merge_recovered(event(7), vec![event(4), event(5), event(6)]);

        for ev in &merged {
            if ev.seq < 7 {
                assert!(ev.backfilled, "seq {} should be tagged", ev.seq);
            } else {
                assert!(!ev.backfilled, "trigger must stay live");
            }
        }
    }

    #[test]
    fn test_duplicate_sequences_collapse() {
        // Backfill overlapping with the trigger's sequence
        let merged = merge_recovered(event(6), vec![event(4), event(5), event(6)]);
        let seqs: Vec<u64> = merged.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![4, 5, 6]);
    }

    #[test]
    fn test_empty_backfill_keeps_trigger() {
        let merged = merge_recovered(event(9), vec![]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].seq, 9);
        assert!(!merged[0].backfilled);
    }
}
