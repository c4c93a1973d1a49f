//! Long aggregate table: one row per (day, aggregation key).

use crate::calendar::DateRange;
use crate::entity_key::{AggregationKey, Dimension, EntityId, Measure};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

pub const DATE_COLUMN: &str = "create_date";

/// Leading columns of the long table, in canonical order.
pub const KEY_COLUMNS: [&str; 4] = [DATE_COLUMN, "category_id", "market_id", "vendor_id"];

const FULL_DISCOUNT_PRICE_MEAN: &str = "full_discount_price_mean";
const FULL_PRICE_MEAN: &str = "full_price_mean";

/// Measure columns every aggregate row carries. Input columns with these
/// names cannot become extra measures.
pub const MEASURE_COLUMNS: [&str; 4] = [
    "full_discount_price",
    FULL_DISCOUNT_PRICE_MEAN,
    "full_price",
    FULL_PRICE_MEAN,
];

/// True for names already used by a built-in measure column.
pub fn is_builtin_measure(name: &str) -> bool {
    MEASURE_COLUMNS.contains(&name)
}

/// Measure columns of an aggregate row. `None` means unset: either the key
/// had no matching transactions, or the row is a placeholder to be
/// forecast.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeasureValues {
    /// Sum over the day's matching transactions
    pub full_discount_price: Option<f64>,
    /// Sum over the day's matching transactions
    pub full_price: Option<f64>,
    /// Per-transaction average
    pub full_discount_price_mean: Option<f64>,
    /// Per-transaction average
    pub full_price_mean: Option<f64>,
    /// Mean of each extra measure column
    pub extra: BTreeMap<String, Option<f64>>,
}

impl MeasureValues {
    /// All measures unset, with the given extra columns present.
    pub fn unset<'a>(extra_columns: impl IntoIterator<Item = &'a String>) -> Self {
        MeasureValues {
            extra: extra_columns.into_iter().map(|name| (name.clone(), None)).collect(),
            ..Default::default()
        }
    }

    /// Same schema with every value unset.
    pub fn cleared(&self) -> Self {
        Self::unset(self.extra.keys())
    }

    /// Target value (the sum) for `measure`.
    pub fn get(&self, measure: Measure) -> Option<f64> {
        match measure {
            Measure::FullDiscountPrice => self.full_discount_price,
            Measure::FullPrice => self.full_price,
        }
    }

    pub fn is_unset(&self) -> bool {
        self.full_discount_price.is_none()
            && self.full_price.is_none()
            && self.full_discount_price_mean.is_none()
            && self.full_price_mean.is_none()
            && self.extra.values().all(Option::is_none)
    }

    /// `(column, value)` pairs sorted by column name.
    pub fn columns(&self) -> Vec<(String, Option<f64>)> {
        let mut columns: Vec<(String, Option<f64>)> = vec![
            (Measure::FullDiscountPrice.name().to_string(), self.full_discount_price),
            (FULL_DISCOUNT_PRICE_MEAN.to_string(), self.full_discount_price_mean),
            (Measure::FullPrice.name().to_string(), self.full_price),
            (FULL_PRICE_MEAN.to_string(), self.full_price_mean),
        ];
        columns.extend(self.extra.iter().map(|(name, value)| (name.clone(), *value)));
        columns.sort_by(|a, b| a.0.cmp(&b.0));
        columns
    }

    /// Value of a measure column by name.
    pub fn get_column(&self, column: &str) -> Option<f64> {
        match column {
            "full_discount_price" => self.full_discount_price,
            "full_price" => self.full_price,
            FULL_DISCOUNT_PRICE_MEAN => self.full_discount_price_mean,
            FULL_PRICE_MEAN => self.full_price_mean,
            other => self.extra.get(other).copied().flatten(),
        }
    }

    /// Sets a measure by column name. Unknown names become extra columns.
    pub fn set(&mut self, column: &str, value: Option<f64>) {
        match column {
            "full_discount_price" => self.full_discount_price = value,
            "full_price" => self.full_price = value,
            FULL_DISCOUNT_PRICE_MEAN => self.full_discount_price_mean = value,
            FULL_PRICE_MEAN => self.full_price_mean = value,
            other => {
                self.extra.insert(other.to_string(), value);
            }
        }
    }
}

/// Statistics for one calendar day and one aggregation key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRow {
    pub create_date: NaiveDate,
    pub key: AggregationKey,
    pub measures: MeasureValues,
}

impl AggregateRow {
    pub fn new(create_date: NaiveDate, key: AggregationKey, measures: MeasureValues) -> Self {
        AggregateRow {
            create_date,
            key,
            measures,
        }
    }

    /// Copy of this row relabelled to `day`.
    pub fn relabelled(&self, day: NaiveDate) -> Self {
        AggregateRow {
            create_date: day,
            key: self.key,
            measures: self.measures.clone(),
        }
    }

    /// Row for `day` and `key` with every measure unset.
    pub fn placeholder<'a>(
        day: NaiveDate,
        key: AggregationKey,
        extra_columns: impl IntoIterator<Item = &'a String>,
    ) -> Self {
        AggregateRow::new(day, key, MeasureValues::unset(extra_columns))
    }
}

/// Long table of aggregate rows, kept sorted by day.
///
/// Sorting is stable, so rows of the same day keep the order they were
/// produced in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateTable {
    rows: Vec<AggregateRow>,
}

impl AggregateTable {
    pub fn new(mut rows: Vec<AggregateRow>) -> Self {
        rows.sort_by_key(|row| row.create_date);
        AggregateTable { rows }
    }

    /// Concatenates independently produced batches once, then re-imposes day
    /// order.
    pub fn from_batches(batches: Vec<Vec<AggregateRow>>) -> Self {
        Self::new(batches.into_iter().flatten().collect())
    }

    pub fn rows(&self) -> &[AggregateRow] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<AggregateRow> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// `[min(day), max(day)]`, or `None` for an empty table.
    pub fn date_span(&self) -> Option<DateRange> {
        let first = self.rows.first()?.create_date;
        let last = self.rows.last()?.create_date;
        Some(DateRange::new(first, last))
    }

    /// Distinct days carrying at least one row.
    pub fn days(&self) -> BTreeSet<NaiveDate> {
        self.rows.iter().map(|row| row.create_date).collect()
    }

    pub fn rows_on(&self, day: NaiveDate) -> impl Iterator<Item = &AggregateRow> {
        self.rows.iter().filter(move |row| row.create_date == day)
    }

    /// Distinct aggregation keys in order of first appearance.
    pub fn distinct_keys(&self) -> Vec<AggregationKey> {
        let mut seen = HashSet::new();
        self.rows
            .iter()
            .map(|row| row.key)
            .filter(|key| seen.insert(*key))
            .collect()
    }

    /// Identifiers present along `dimension`, ascending.
    pub fn observed_ids(&self, dimension: Dimension) -> BTreeSet<EntityId> {
        self.rows.iter().filter_map(|row| row.key.id_for(dimension)).collect()
    }

    /// Extra measure columns used by any row.
    pub fn extra_columns(&self) -> BTreeSet<String> {
        self.rows
            .iter()
            .flat_map(|row| row.measures.extra.keys().cloned())
            .collect()
    }

    /// Every column of the long layout in canonical order: the day, the three
    /// identifier columns, then measure columns alphabetically.
    pub fn column_names(&self) -> Vec<String> {
        let measures = MeasureValues::unset(&self.extra_columns());
        KEY_COLUMNS
            .iter()
            .map(|name| name.to_string())
            .chain(measures.columns().into_iter().map(|(name, _)| name))
            .collect()
    }

    /// Treats unset sums as zero: a key with no purchases on a day sold
    /// nothing. Means stay unset.
    pub fn with_unset_sums_as_zero(mut self) -> Self {
        for row in &mut self.rows {
            let measures = &mut row.measures;
            measures.full_discount_price = Some(measures.full_discount_price.unwrap_or(0.0));
            measures.full_price = Some(measures.full_price.unwrap_or(0.0));
        }
        self
    }

    /// Adds an all-unset row for every `(day, key)` pair that has none, over
    /// the days already present and the table's distinct keys. Each day's
    /// rows are then put in canonical key order.
    ///
    /// # Returns
    /// The completed table and the number of rows added.
    pub fn with_missing_keys(mut self) -> (Self, usize) {
        let keys = self.distinct_keys();
        let extra_columns = self.extra_columns();
        let present: HashSet<(NaiveDate, AggregationKey)> =
            self.rows.iter().map(|row| (row.create_date, row.key)).collect();

        let missing: Vec<AggregateRow> = self
            .days()
            .into_iter()
            .flat_map(|day| keys.iter().map(move |key| (day, *key)))
            .filter(|pair| !present.contains(pair))
            .map(|(day, key)| AggregateRow::placeholder(day, key, &extra_columns))
            .collect();
        let added = missing.len();

        if added > 0 {
            self.rows.extend(missing);
            self.rows.sort_by_key(|row| (row.create_date, row.key));
        }
        (self, added)
    }

    /// Drops every row dated on one of `days`.
    ///
    /// # Returns
    /// The remaining table and the number of rows dropped.
    pub fn without_days(mut self, days: &BTreeSet<NaiveDate>) -> (Self, usize) {
        let before = self.rows.len();
        self.rows.retain(|row| !days.contains(&row.create_date));
        let dropped = before - self.rows.len();
        (self, dropped)
    }

    /// Appends rows and restores day order.
    pub fn append(mut self, rows: Vec<AggregateRow>) -> Self {
        self.rows.extend(rows);
        self.rows.sort_by_key(|row| row.create_date);
        self
    }
}
