//! Trading-session calendar (the session gate).
//!
//! Decides whether the venue is inside its weekly trading window. The stream
//! layer checks this before connecting and at the top of every ingestion
//! iteration; a close transition triggers orderly shutdown, not error
//! handling.

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, Timelike, Utc, Weekday,
};
use thiserror::Error;

const MINUTES_PER_WEEK: u32 = 7 * 24 * 60;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CalendarError {
    #[error("venue UTC offset out of range: {0} hours")]
    InvalidOffset(i32),
}

/// Weekly trading calendar in the venue's local timezone.
///
/// The window runs from (open day, open time) to (close day, close time) each
/// week. Equal open and close bounds mean a continuous session (always open),
/// which replay and tests rely on.
#[derive(Debug, Clone)]
pub struct SessionCalendar {
    offset: FixedOffset,
    open_minute: u32,
    close_minute: u32,
}

impl SessionCalendar {
    pub fn new(
        utc_offset_hours: i32,
        open_day: Weekday,
        open_time: NaiveTime,
        close_day: Weekday,
        close_time: NaiveTime,
    ) -> Result<Self, CalendarError> {
        let offset = FixedOffset::east_opt(utc_offset_hours * 3600)
            .ok_or(CalendarError::InvalidOffset(utc_offset_hours))?;

        Ok(Self {
            offset,
            open_minute: minute_of_week(open_day, open_time),
            close_minute: minute_of_week(close_day, close_time),
        })
    }

    /// Sunday 17:00 through Friday 16:00 at UTC-6, the usual futures-options
    /// week.
    pub fn weekly_default() -> Self {
        Self::new(
            -6,
            Weekday::Sun,
            NaiveTime::from_hms_opt(17, 0, 0).expect("valid time"),
            Weekday::Fri,
            NaiveTime::from_hms_opt(16, 0, 0).expect("valid time"),
        )
        .expect("valid default calendar")
    }

    /// Continuous session, for replay runs and tests
    pub fn always_open() -> Self {
        Self::new(
            0,
            Weekday::Sun,
            NaiveTime::from_hms_opt(0, 0, 0).expect("valid time"),
            Weekday::Sun,
            NaiveTime::from_hms_opt(0, 0, 0).expect("valid time"),
        )
        .expect("valid continuous calendar")
    }

    /// Is the venue open at `now`?
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&self.offset);
        let m = minute_of_week(local.weekday(), local.time());

        if self.open_minute < self.close_minute {
            m >= self.open_minute && m < self.close_minute
        } else {
            // Window wraps the week boundary; equal bounds cover everything
            m >= self.open_minute || m < self.close_minute
        }
    }

    /// Next open instant at or after `now`, at minute resolution
    pub fn next_open(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        if self.is_open(now) {
            return now;
        }

        let local = now.with_timezone(&self.offset);
        let m = minute_of_week(local.weekday(), local.time());
        let delta = (self.open_minute + MINUTES_PER_WEEK - m) % MINUTES_PER_WEEK;

        now + Duration::minutes(delta as i64) - Duration::seconds(local.second() as i64)
    }

    /// Venue-local calendar date, used as the baseline-sample day key
    pub fn trading_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.offset).date_naive()
    }
}

fn minute_of_week(day: Weekday, time: NaiveTime) -> u32 {
    day.num_days_from_sunday() * 24 * 60 + time.hour() * 60 + time.minute()
}
