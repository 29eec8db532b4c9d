//! Ingestion cost budget.
//!
//! Tracks estimated spend on live connection time and backfill volume against
//! a daily dollar budget. Past the soft threshold no new backfill requests are
//! issued (the live stream continues); at 100% ingestion halts until the next
//! budget day. Exhaustion is an expected terminal state for the day, not an
//! error.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default daily ingestion budget in USD
pub const DEFAULT_DAILY_BUDGET_USD: f64 = 25.0;

/// Default fraction of the budget past which backfills stop
pub const DEFAULT_SOFT_THRESHOLD: f64 = 0.8;

/// Where the budget currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BudgetStatus {
    /// Everything allowed
    Open,
    /// Soft threshold crossed: live stream continues, no new backfills
    BackfillsSuspended,
    /// Budget fully spent: ingestion halts until the next period
    Exhausted,
}

impl BudgetStatus {
    pub fn can_ingest(&self) -> bool {
        !matches!(self, BudgetStatus::Exhausted)
    }

    pub fn can_backfill(&self) -> bool {
        matches!(self, BudgetStatus::Open)
    }
}

/// Daily ingestion budget with UTC-day periods.
///
/// Timestamps are passed in rather than read from the clock so the accounting
/// is testable; callers feed `Utc::now()` in production.
#[derive(Debug, Clone)]
pub struct IngestionBudget {
    daily_usd: f64,
    soft_threshold: f64,
    live_cost_per_hour: f64,
    backfill_cost_per_thousand: f64,

    spent_usd: f64,
    period_start: NaiveDate,
}

impl IngestionBudget {
    pub fn new(
        daily_usd: f64,
        soft_threshold: f64,
        live_cost_per_hour: f64,
        backfill_cost_per_thousand: f64,
    ) -> Self {
        Self {
            daily_usd,
            soft_threshold,
            live_cost_per_hour,
            backfill_cost_per_thousand,
            spent_usd: 0.0,
            period_start: NaiveDate::MIN,
        }
    }

    /// Roll into a new budget period when the UTC date advances
    pub fn tick(&mut self, now: DateTime<Utc>) {
        let today = now.date_naive();
        if today > self.period_start {
            if self.spent_usd > 0.0 {
                tracing::info!(
                    "budget period rollover: ${:.2} spent in previous period",
                    self.spent_usd
                );
            }
            self.period_start = today;
            self.spent_usd = 0.0;
        }
    }

    /// Accrue cost for `connected` of live stream time
    pub fn record_live_time(&mut self, connected: Duration, now: DateTime<Utc>) {
        self.tick(now);
        let cost = connected.as_secs_f64() / 3600.0 * self.live_cost_per_hour;
        self.add_cost(cost);
    }

    /// Accrue cost for a backfill of `events` recovered events
    pub fn record_backfill(&mut self, events: usize, now: DateTime<Utc>) {
        self.tick(now);
        let cost = events as f64 / 1000.0 * self.backfill_cost_per_thousand;
        self.add_cost(cost);
    }

    pub fn spent_usd(&self) -> f64 {
        self.spent_usd
    }

    pub fn fraction_used(&self) -> f64 {
        if self.daily_usd <= 0.0 {
            return 1.0;
        }
        self.spent_usd / self.daily_usd
    }

    pub fn status(&self) -> BudgetStatus {
        let used = self.fraction_used();
        if used >= 1.0 {
            BudgetStatus::Exhausted
        } else if used >= self.soft_threshold {
            BudgetStatus::BackfillsSuspended
        } else {
            BudgetStatus::Open
        }
    }

    pub fn backfill_allowed(&self) -> bool {
        self.status().can_backfill()
    }

    pub fn is_exhausted(&self) -> bool {
        !self.status().can_ingest()
    }

    fn add_cost(&mut self, cost: f64) {
        let before = self.status();
        self.spent_usd += cost;
        let after = self.status();

        if before != after {
            match after {
                BudgetStatus::BackfillsSuspended => tracing::info!(
                    "ingestion budget soft threshold crossed: ${:.2} of ${:.2} spent, \
                     suspending backfills",
                    self.spent_usd,
                    self.daily_usd
                ),
                BudgetStatus::Exhausted => tracing::info!(
                    "ingestion budget exhausted: ${:.2} of ${:.2} spent, halting until \
                     next period",
                    self.spent_usd,
                    self.daily_usd
                ),
                BudgetStatus::Open => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::TimeZone;

    fn budget() -> IngestionBudget {
        // $25/day, 80% soft threshold, $1/hour live, $10 per 1000 events
        IngestionBudget::new(25.0, 0.8, 1.0, 10.0)
    }

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_fresh_budget_is_open() {
        let b = budget();
        assert_eq!(b.status(), BudgetStatus::Open);
        assert!(b.backfill_allowed());
        assert!(!b.is_exhausted());
        assert_eq!(b.spent_usd(), 0.0);
    }

    #[test]
    fn test_live_time_accrual() {
        let mut b = budget();
        b.record_live_time(Duration::from_secs(3600), at(3, 10));
        assert_relative_eq!(b.spent_usd(), 1.0);
        assert_relative_eq!(b.fraction_used(), 0.04);
    }

    #[test]
    fn test_backfill_accrual() {
        let mut b = budget();
        b.record_backfill(2500, at(3, 10));
        assert_relative_eq!(b.spent_usd(), 25.0);
    }

    #[test]
    fn test_soft_threshold_suspends_backfills() {
        let mut b = budget();
        b.record_live_time(Duration::from_secs(20 * 3600), at(3, 10)); // $20 = 80%

        assert_eq!(b.status(), BudgetStatus::BackfillsSuspended);
        assert!(!b.backfill_allowed());
        assert!(!b.is_exhausted()); // live stream continues
    }

    #[test]
    fn test_full_budget_halts_ingestion() {
        let mut b = budget();
        b.record_backfill(2500, at(3, 10)); // $25 = 100%

        assert_eq!(b.status(), BudgetStatus::Exhausted);
        assert!(b.is_exhausted());
        assert!(!b.backfill_allowed());
    }

    #[test]
    fn test_period_rollover_resets_spend() {
        let mut b = budget();
        b.record_backfill(2500, at(3, 10));
        assert!(b.is_exhausted());

        b.tick(at(4, 0));
        assert_eq!(b.status(), BudgetStatus::Open);
        assert_eq!(b.spent_usd(), 0.0);
    }

    #[test]
    fn test_same_day_does_not_reset() {
        let mut b = budget();
        b.record_live_time(Duration::from_secs(3600), at(3, 10));
        b.tick(at(3, 23));
        assert_relative_eq!(b.spent_usd(), 1.0);
    }

    #[test]
    fn test_zero_budget_is_always_exhausted() {
        let b = IngestionBudget::new(0.0, 0.8, 1.0, 10.0);
        assert!(b.is_exhausted());
    }
}
