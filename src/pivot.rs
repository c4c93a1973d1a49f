//! Long-to-wide reshaping.
//!
//! Every (measure, aggregation key) pair becomes one column of a table
//! indexed by day. Column order is fixed: for each measure, markets, then
//! categories, then vendors (ids ascending), then the grand total.

use crate::aggregate::AggregateTable;
use crate::entity_key::{AggregationKey, Dimension, EntityId, Measure, SeriesKey};
use chrono::NaiveDate;
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Wide table: one row per day, one column per target series.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WideTable {
    index: Vec<NaiveDate>,
    columns: Vec<SeriesKey>,
    /// Row-major cells, `values[row][column]`
    values: Vec<Vec<Option<f64>>>,
}

impl WideTable {
    pub fn index(&self) -> &[NaiveDate] {
        &self.index
    }

    pub fn columns(&self) -> &[SeriesKey] {
        &self.columns
    }

    /// Column names in the `{market}-{category}-{vendor}-{measure}` format.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(SeriesKey::column_name).collect()
    }

    pub fn num_rows(&self) -> usize {
        self.index.len()
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Cells of the row for `day`, in column order.
    pub fn row(&self, day: NaiveDate) -> Option<&[Option<f64>]> {
        let position = self.index.binary_search(&day).ok()?;
        Some(&self.values[position])
    }

    /// Iterates `(day, cells)` in day order.
    pub fn rows(&self) -> impl Iterator<Item = (NaiveDate, &[Option<f64>])> {
        self.index
            .iter()
            .copied()
            .zip(self.values.iter().map(Vec::as_slice))
    }

    /// Cell for `day` and `series`; `None` when absent or unset.
    pub fn value(&self, day: NaiveDate, series: &SeriesKey) -> Option<f64> {
        let column = self.columns.iter().position(|c| c == series)?;
        self.row(day)?[column]
    }

    /// Full column for `series` as `(day, value)` pairs.
    pub fn series(&self, series: &SeriesKey) -> Option<Vec<(NaiveDate, Option<f64>)>> {
        let column = self.columns.iter().position(|c| c == series)?;
        Some(self.rows().map(|(day, cells)| (day, cells[column])).collect())
    }
}

/// Reshapes a long aggregate table into a [`WideTable`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Pivoter;

impl Pivoter {
    pub fn new() -> Self {
        Pivoter
    }

    /// Every target series key derivable from the identifiers present in
    /// `table`, in output column order.
    pub fn target_keys(&self, table: &AggregateTable) -> Vec<SeriesKey> {
        let ids: Vec<(Dimension, BTreeSet<EntityId>)> = Dimension::ALL
            .iter()
            .map(|dimension| (*dimension, table.observed_ids(*dimension)))
            .collect();

        let mut keys = Vec::new();
        for measure in Measure::ALL {
            for (dimension, dimension_ids) in &ids {
                keys.extend(
                    dimension_ids
                        .iter()
                        .map(|id| SeriesKey::new(measure, AggregationKey::for_dimension(*dimension, *id))),
                );
            }
            keys.push(SeriesKey::new(measure, AggregationKey::Total));
        }
        keys
    }

    /// Day-indexed values of one series. Keys match exactly, so the grand
    /// total never picks up a per-dimension row.
    pub fn extract_series(&self, table: &AggregateTable, series: &SeriesKey) -> BTreeMap<NaiveDate, Option<f64>> {
        let mut values = BTreeMap::new();
        for row in table.rows().iter().filter(|row| row.key == series.key) {
            if values.contains_key(&row.create_date) {
                warn!(
                    day = %row.create_date,
                    series = %series,
                    "Pivoter: duplicate row for series, keeping the first"
                );
                continue;
            }
            values.insert(row.create_date, row.measures.get(series.measure));
        }
        values
    }

    /// Pivots `table`. Series are extracted in parallel and outer-joined on
    /// the day index.
    pub fn pivot(&self, table: &AggregateTable) -> WideTable {
        let columns = self.target_keys(table);

        let series: Vec<BTreeMap<NaiveDate, Option<f64>>> = columns
            .par_iter()
            .map(|key| self.extract_series(table, key))
            .collect();

        let index: Vec<NaiveDate> = series
            .iter()
            .flat_map(|values| values.keys().copied())
            .collect::<BTreeSet<NaiveDate>>()
            .into_iter()
            .collect();

        let values: Vec<Vec<Option<f64>>> = index
            .iter()
            .map(|day| {
                series
                    .iter()
                    .map(|values| values.get(day).copied().flatten())
                    .collect()
            })
            .collect();

        debug!(
            rows = index.len(),
            columns = columns.len(),
            "Pivoter: wide table built"
        );

        WideTable {
            index,
            columns,
            values,
        }
    }
}
