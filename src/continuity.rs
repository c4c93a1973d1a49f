//! Calendar gap repair.
//!
//! Every day between the first and last day of a table must carry rows. A
//! missing day is filled by copying all rows from exactly
//! [`YEAR_LOOKBACK_DAYS`](crate::calendar::YEAR_LOOKBACK_DAYS) days earlier,
//! relabelled to the missing day. Copies are taken from the table as it was
//! before filling, so a fill never chains into another fill.

use crate::aggregate::{AggregateRow, AggregateTable};
use crate::calendar::year_ago;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, warn};

/// A missing day with nothing to copy a year earlier. The day stays absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnfillableGap {
    pub missing: NaiveDate,
    /// Day that was consulted for replacement rows
    pub lookback: NaiveDate,
}

impl fmt::Display for UnfillableGap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Unfillable gap: {} has no data on {} to copy from",
            self.missing, self.lookback
        )
    }
}

/// Outcome of a continuity pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FillReport {
    /// Missing days that received year-ago rows
    pub filled: Vec<NaiveDate>,
    /// Missing days that remain absent
    pub unfillable: Vec<UnfillableGap>,
    /// Number of rows copied in
    pub rows_copied: usize,
}

impl FillReport {
    /// True when every day of the span carries rows.
    pub fn is_complete(&self) -> bool {
        self.unfillable.is_empty()
    }
}

/// Fills calendar gaps with rows from the same day a year earlier.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContinuityFiller;

impl ContinuityFiller {
    pub fn new() -> Self {
        ContinuityFiller
    }

    /// Days inside `[min(day), max(day)]` that carry no rows, ascending.
    pub fn missing_days(&self, table: &AggregateTable) -> Vec<NaiveDate> {
        let Some(span) = table.date_span() else {
            return Vec::new();
        };
        let present = table.days();
        span.days().filter(|day| !present.contains(day)).collect()
    }

    /// Repairs every missing day it can and reports the rest.
    ///
    /// # Returns
    /// The table with copied rows appended and day order restored, plus a
    /// report of filled and unfillable days.
    pub fn fill(&self, table: AggregateTable) -> (AggregateTable, FillReport) {
        let missing = self.missing_days(&table);
        if missing.is_empty() {
            return (table, FillReport::default());
        }

        let mut by_day: BTreeMap<NaiveDate, Vec<&AggregateRow>> = BTreeMap::new();
        for row in table.rows() {
            by_day.entry(row.create_date).or_default().push(row);
        }

        let mut report = FillReport::default();
        let mut copies = Vec::new();

        for day in missing {
            let lookback = year_ago(day);
            match by_day.get(&lookback) {
                Some(rows) => {
                    copies.extend(rows.iter().map(|row| row.relabelled(day)));
                    report.rows_copied += rows.len();
                    report.filled.push(day);
                }
                None => {
                    let gap = UnfillableGap { missing: day, lookback };
                    warn!(missing = %gap.missing, lookback = %gap.lookback, "ContinuityFiller: unfillable gap");
                    report.unfillable.push(gap);
                }
            }
        }

        debug!(
            filled = report.filled.len(),
            unfillable = report.unfillable.len(),
            rows_copied = report.rows_copied,
            "ContinuityFiller: gaps processed"
        );

        (table.append(copies), report)
    }
}
