pub mod error;
pub mod entity_key;
pub mod calendar;
pub mod transaction;
pub mod universe;
pub mod aggregate;
pub mod aggregator;
pub mod continuity;
pub mod forecast_order;
pub mod target_expander;
pub mod pivot;
pub mod csv_io;
pub mod sqlite_store;
pub mod pipeline;

#[cfg(test)]
mod integration_tests;

pub use error::PipelineError;
pub use entity_key::{AggregationKey, Dimension, EntityId, KeyError, Measure, SeriesKey};
pub use calendar::{year_ago, DateRange, YEAR_LOOKBACK_DAYS};
pub use transaction::{Transaction, TransactionTable};
pub use universe::{IdentifierUniverse, KeyCoverage};
pub use aggregate::{AggregateRow, AggregateTable, MeasureValues};
pub use aggregator::{Aggregator, GroupStats};
pub use continuity::{ContinuityFiller, FillReport, UnfillableGap};
pub use forecast_order::ForecastOrder;
pub use target_expander::{Expansion, TargetExpander};
pub use pivot::{Pivoter, WideTable};
pub use csv_io::{
    read_forecast_order,
    read_forecast_order_file,
    read_transactions,
    read_transactions_file,
    write_aggregates,
    write_aggregates_file,
    write_wide,
    write_wide_file,
};
pub use sqlite_store::SqliteAggregateStore;
pub use pipeline::{run, PipelineConfig, PipelineOutput};
