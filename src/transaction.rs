use crate::aggregate::is_builtin_measure;
use crate::entity_key::{Dimension, EntityId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One cleaned purchase line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Calendar day of the purchase
    pub create_date: NaiveDate,
    pub market_id: Option<EntityId>,
    pub category_id: Option<EntityId>,
    pub vendor_id: Option<EntityId>,
    /// Price without discount
    pub full_price: f64,
    /// Price with discount applied
    pub full_discount_price: f64,
    pub quantity: i64,
    /// Additional numeric measures, aggregated by mean only
    pub extra: BTreeMap<String, f64>,
}

impl Transaction {
    /// Creates a transaction with no entity identifiers and no extra measures.
    pub fn new(create_date: NaiveDate, full_price: f64, full_discount_price: f64, quantity: i64) -> Self {
        Transaction {
            create_date,
            market_id: None,
            category_id: None,
            vendor_id: None,
            full_price,
            full_discount_price,
            quantity,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_market(mut self, id: EntityId) -> Self {
        self.market_id = Some(id);
        self
    }

    pub fn with_category(mut self, id: EntityId) -> Self {
        self.category_id = Some(id);
        self
    }

    pub fn with_vendor(mut self, id: EntityId) -> Self {
        self.vendor_id = Some(id);
        self
    }

    pub fn with_measure(mut self, name: impl Into<String>, value: f64) -> Self {
        self.extra.insert(name.into(), value);
        self
    }

    /// Identifier of this transaction along `dimension`.
    pub fn id(&self, dimension: Dimension) -> Option<EntityId> {
        match dimension {
            Dimension::Market => self.market_id,
            Dimension::Category => self.category_id,
            Dimension::Vendor => self.vendor_id,
        }
    }
}

/// Cleaned transaction table handed to the aggregator.
///
/// Carries the names of the extra measure columns so that every aggregate row
/// ends up with the same schema, even on days where a column has no values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionTable {
    rows: Vec<Transaction>,
    extra_columns: BTreeSet<String>,
}

impl TransactionTable {
    /// Builds a table whose extra columns are every extra measure name seen
    /// in `rows`.
    pub fn new(rows: Vec<Transaction>) -> Self {
        let extra_columns = rows
            .iter()
            .flat_map(|row| row.extra.keys().cloned())
            .filter(|name| !is_builtin_measure(name))
            .collect();
        TransactionTable { rows, extra_columns }
    }

    /// Builds a table with an explicit extra-column schema. Names used by
    /// rows are added to it.
    pub fn with_extra_columns(rows: Vec<Transaction>, columns: impl IntoIterator<Item = String>) -> Self {
        let mut table = Self::new(rows);
        table
            .extra_columns
            .extend(columns.into_iter().filter(|name| !is_builtin_measure(name)));
        table
    }

    pub fn rows(&self) -> &[Transaction] {
        &self.rows
    }

    pub fn extra_columns(&self) -> &BTreeSet<String> {
        &self.extra_columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows grouped by calendar day, days ascending.
    pub fn by_day(&self) -> BTreeMap<NaiveDate, Vec<&Transaction>> {
        let mut days: BTreeMap<NaiveDate, Vec<&Transaction>> = BTreeMap::new();
        for row in &self.rows {
            days.entry(row.create_date).or_default().push(row);
        }
        days
    }

    /// Distinct identifiers seen along `dimension`, ascending.
    pub fn observed_ids(&self, dimension: Dimension) -> BTreeSet<EntityId> {
        self.rows.iter().filter_map(|row| row.id(dimension)).collect()
    }
}
