use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed lookback used to fill a missing day. No leap-year correction.
pub const YEAR_LOOKBACK_DAYS: i64 = 365;

/// Closed calendar date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    /// Start date (inclusive)
    pub start: NaiveDate,
    /// End date (inclusive)
    pub end: NaiveDate,
}

impl DateRange {
    /// Creates a new DateRange.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        DateRange { start, end }
    }

    /// True when `end` falls before `start`.
    pub fn is_inverted(&self) -> bool {
        self.end < self.start
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        day >= self.start && day <= self.end
    }

    /// Number of days in the range, both endpoints included. Zero when
    /// inverted.
    pub fn num_days(&self) -> usize {
        if self.is_inverted() {
            return 0;
        }
        ((self.end - self.start).num_days() + 1) as usize
    }

    /// Every calendar day of the range in ascending order.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |day| *day <= end)
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.start, self.end)
    }
}

/// Day whose rows stand in for `day` when `day` is missing.
pub fn year_ago(day: NaiveDate) -> NaiveDate {
    day - Duration::days(YEAR_LOOKBACK_DAYS)
}
