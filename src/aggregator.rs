//! Daily hierarchical aggregation.
//!
//! For every day present in the transaction table this computes one
//! aggregate per market, per category and per vendor (each dimension grouped
//! independently) plus one grand total over all of that day's transactions.
//! Days are independent, so they are aggregated in parallel and concatenated
//! once at the end.

use crate::aggregate::{AggregateRow, AggregateTable, MeasureValues};
use crate::entity_key::{AggregationKey, Dimension, EntityId};
use crate::transaction::{Transaction, TransactionTable};
use crate::universe::{IdentifierUniverse, KeyCoverage};
use chrono::NaiveDate;
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Statistics over one group of transactions.
///
/// Holds the count and the quantity figures as well, which only serve the
/// grouping and are dropped by [`GroupStats::into_measures`].
#[derive(Debug, Clone, PartialEq)]
pub struct GroupStats {
    pub count: usize,
    pub full_price_sum: f64,
    pub full_discount_price_sum: f64,
    pub quantity_sum: i64,
    pub full_price_mean: f64,
    pub full_discount_price_mean: f64,
    pub quantity_mean: f64,
    /// Mean of each extra column over the transactions that carry it
    pub extra_means: BTreeMap<String, Option<f64>>,
}

impl GroupStats {
    /// Computes statistics for a non-empty group. Returns `None` for an
    /// empty one.
    pub fn compute(transactions: &[&Transaction], extra_columns: &BTreeSet<String>) -> Option<Self> {
        if transactions.is_empty() {
            return None;
        }

        let count = transactions.len();
        let n = count as f64;
        let full_price_sum: f64 = transactions.iter().map(|tx| tx.full_price).sum();
        let full_discount_price_sum: f64 = transactions.iter().map(|tx| tx.full_discount_price).sum();
        let quantity_sum: i64 = transactions.iter().map(|tx| tx.quantity).sum();

        let extra_means = extra_columns
            .iter()
            .map(|column| {
                let values: Vec<f64> = transactions
                    .iter()
                    .filter_map(|tx| tx.extra.get(column).copied())
                    .filter(|v| !v.is_nan())
                    .collect();
                let mean = if values.is_empty() {
                    None
                } else {
                    Some(values.iter().sum::<f64>() / values.len() as f64)
                };
                (column.clone(), mean)
            })
            .collect();

        Some(GroupStats {
            count,
            full_price_sum,
            full_discount_price_sum,
            quantity_sum,
            full_price_mean: full_price_sum / n,
            full_discount_price_mean: full_discount_price_sum / n,
            quantity_mean: quantity_sum as f64 / n,
            extra_means,
        })
    }

    /// Output measures: the plain measure name carries the sum, `_mean` the
    /// per-transaction average.
    pub fn into_measures(self) -> MeasureValues {
        MeasureValues {
            full_discount_price: Some(self.full_discount_price_sum),
            full_price: Some(self.full_price_sum),
            full_discount_price_mean: Some(self.full_discount_price_mean),
            full_price_mean: Some(self.full_price_mean),
            extra: self.extra_means,
        }
    }
}

/// Builds the long aggregate table from cleaned transactions.
#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    universe: IdentifierUniverse,
    coverage: KeyCoverage,
}

impl Aggregator {
    /// Creates an aggregator.
    ///
    /// # Arguments
    /// * `universe` - Identifiers to group by; others are ignored by the
    ///   per-dimension groups but still count toward the grand total
    /// * `coverage` - Whether identifiers without purchases get rows
    pub fn new(universe: IdentifierUniverse, coverage: KeyCoverage) -> Self {
        Aggregator { universe, coverage }
    }

    pub fn universe(&self) -> &IdentifierUniverse {
        &self.universe
    }

    /// Aggregates every day of `table`.
    ///
    /// A day without transactions produces no rows; the continuity filler
    /// repairs it downstream.
    pub fn aggregate(&self, table: &TransactionTable) -> AggregateTable {
        let extra_columns = table.extra_columns();
        let domains = self.key_domains(table);
        let days: Vec<(NaiveDate, Vec<&Transaction>)> = table.by_day().into_iter().collect();

        debug!(
            days = days.len(),
            transactions = table.len(),
            coverage = ?self.coverage,
            "Aggregator: aggregating transactions"
        );

        let batches: Vec<Vec<AggregateRow>> = days
            .par_iter()
            .map(|(day, transactions)| self.aggregate_day(*day, transactions, extra_columns, domains.as_ref()))
            .collect();

        let aggregated = AggregateTable::from_batches(batches);

        debug!(
            rows = aggregated.len(),
            keys = aggregated.distinct_keys().len(),
            "Aggregator: aggregation complete"
        );

        aggregated
    }

    /// Rows for a single day: markets, categories, vendors, then the grand
    /// total.
    pub fn aggregate_day(
        &self,
        day: NaiveDate,
        transactions: &[&Transaction],
        extra_columns: &BTreeSet<String>,
        domains: Option<&BTreeMap<Dimension, BTreeSet<EntityId>>>,
    ) -> Vec<AggregateRow> {
        let mut rows = Vec::new();

        for dimension in Dimension::ALL {
            let mut groups: BTreeMap<EntityId, Vec<&Transaction>> = BTreeMap::new();
            for tx in transactions {
                if let Some(id) = tx.id(dimension) {
                    if self.universe.allows(dimension, id) {
                        groups.entry(id).or_default().push(*tx);
                    }
                }
            }

            match domains.and_then(|domains| domains.get(&dimension)) {
                Some(domain) => {
                    for id in domain {
                        let key = AggregationKey::for_dimension(dimension, *id);
                        let measures = groups
                            .get(id)
                            .and_then(|group| GroupStats::compute(group, extra_columns))
                            .map(GroupStats::into_measures)
                            .unwrap_or_else(|| MeasureValues::unset(extra_columns));
                        rows.push(AggregateRow::new(day, key, measures));
                    }
                }
                None => {
                    for (id, group) in &groups {
                        if let Some(stats) = GroupStats::compute(group, extra_columns) {
                            let key = AggregationKey::for_dimension(dimension, *id);
                            rows.push(AggregateRow::new(day, key, stats.into_measures()));
                        }
                    }
                }
            }
        }

        if let Some(stats) = GroupStats::compute(transactions, extra_columns) {
            rows.push(AggregateRow::new(day, AggregationKey::Total, stats.into_measures()));
        }

        rows
    }

    /// Identifiers that get a row every day under `KeyCoverage::Universe`.
    fn key_domains(&self, table: &TransactionTable) -> Option<BTreeMap<Dimension, BTreeSet<EntityId>>> {
        match self.coverage {
            KeyCoverage::Observed => None,
            KeyCoverage::Universe => Some(
                Dimension::ALL
                    .iter()
                    .map(|dimension| {
                        let ids = match self.universe.allowed(*dimension) {
                            Some(allowed) => allowed.clone(),
                            None => table.observed_ids(*dimension),
                        };
                        (*dimension, ids)
                    })
                    .collect(),
            ),
        }
    }
}
