//! Extends the aggregate table with placeholder rows for forecast days.

use crate::aggregate::{AggregateRow, AggregateTable};
use crate::continuity::{ContinuityFiller, FillReport};
use crate::entity_key::AggregationKey;
use crate::forecast_order::ForecastOrder;
use chrono::NaiveDate;
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Result of a target expansion.
#[derive(Debug, Clone, PartialEq)]
pub struct Expansion {
    /// Historical rows, placeholders and year-ago fills, sorted by day
    pub table: AggregateTable,
    /// Number of placeholder rows added
    pub placeholders: usize,
    /// Zero-sum rows added for keys without purchases on a historical day
    pub zero_rows: usize,
    /// Historical rows dropped because their day was requested for forecast
    pub replaced: usize,
    /// Continuity pass over the extended range
    pub report: FillReport,
}

/// Appends one placeholder row per expected key for every forecast day,
/// then re-runs the continuity filler over the extended range.
///
/// Historical days are completed first, so every key of the table has a row
/// on every day and a key without purchases reads as zero. After expansion a
/// row with unset sums is therefore always a value to forecast.
#[derive(Debug, Clone, Default)]
pub struct TargetExpander {
    n_target_values: Option<usize>,
    filler: ContinuityFiller,
}

impl TargetExpander {
    /// Creates an expander.
    ///
    /// # Arguments
    /// * `n_target_values` - Aggregation keys per forecast day. `None` uses
    ///   every distinct key of the table.
    pub fn new(n_target_values: Option<usize>) -> Self {
        TargetExpander {
            n_target_values,
            filler: ContinuityFiller::new(),
        }
    }

    /// Keys that receive placeholders: the first `n_target_values` distinct
    /// keys in order of first appearance.
    pub fn placeholder_keys(&self, table: &AggregateTable) -> Vec<AggregationKey> {
        let keys = table.distinct_keys();
        match self.n_target_values {
            None => keys,
            Some(n) if n > keys.len() => {
                warn!(
                    requested = n,
                    available = keys.len(),
                    "TargetExpander: fewer distinct keys than target values"
                );
                keys
            }
            Some(n) => keys.into_iter().take(n).collect(),
        }
    }

    /// Placeholder rows for every forecast day, one per placeholder key.
    pub fn placeholders(&self, table: &AggregateTable, order: &ForecastOrder) -> Vec<AggregateRow> {
        let keys = self.placeholder_keys(table);
        let extra_columns = table.extra_columns();
        let extra_columns = &extra_columns;

        order
            .target_days()
            .into_iter()
            .flat_map(|day| {
                keys.iter()
                    .map(move |key| AggregateRow::placeholder(day, *key, extra_columns))
            })
            .collect()
    }

    /// Runs the expansion.
    ///
    /// Every historical day is first completed with a row per distinct key,
    /// and unset sums are read as zero (no purchases). Rows already dated on
    /// a forecast day are replaced by that day's placeholders.
    pub fn expand(&self, table: AggregateTable, order: &ForecastOrder) -> Expansion {
        let (table, zero_rows) = table.with_missing_keys();
        let table = table.with_unset_sums_as_zero();
        let placeholders = self.placeholders(&table, order);
        let count = placeholders.len();

        let target_days: BTreeSet<NaiveDate> = order.target_days().into_iter().collect();
        let (table, replaced) = table.without_days(&target_days);
        if replaced > 0 {
            warn!(
                rows = replaced,
                "TargetExpander: forecast days overlap history, replacing rows with placeholders"
            );
        }

        debug!(
            ranges = order.ranges().len(),
            placeholders = count,
            zero_rows,
            "TargetExpander: appending placeholder rows"
        );

        let (table, report) = self.filler.fill(table.append(placeholders));

        Expansion {
            table,
            placeholders: count,
            zero_rows,
            replaced,
            report,
        }
    }
}
