//! End-to-end driver: aggregate, repair gaps, expand for the forecast
//! order, pivot.

use crate::aggregate::AggregateTable;
use crate::aggregator::Aggregator;
use crate::continuity::{ContinuityFiller, FillReport};
use crate::forecast_order::ForecastOrder;
use crate::pivot::{Pivoter, WideTable};
use crate::target_expander::{Expansion, TargetExpander};
use crate::transaction::TransactionTable;
use crate::universe::{IdentifierUniverse, KeyCoverage};
use tracing::{info, warn};

/// Settings shared by every stage of a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineConfig {
    /// Identifiers to group by
    pub universe: IdentifierUniverse,
    /// Whether identifiers without purchases get rows
    pub coverage: KeyCoverage,
    /// Aggregation keys per forecast day; `None` uses every distinct key
    pub n_target_values: Option<usize>,
}

impl PipelineConfig {
    pub fn new(universe: IdentifierUniverse, coverage: KeyCoverage, n_target_values: Option<usize>) -> Self {
        PipelineConfig {
            universe,
            coverage,
            n_target_values,
        }
    }
}

/// Every intermediate table of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutput {
    /// Aggregator output
    pub aggregated: AggregateTable,
    /// Aggregated table after year-ago gap repair
    pub continuous: AggregateTable,
    pub continuity_report: FillReport,
    /// Continuous table extended with forecast placeholders
    pub expansion: Expansion,
    /// Wide table pivoted from the expanded table
    pub wide: WideTable,
}

impl PipelineOutput {
    /// True when neither continuity pass left a day unfilled.
    pub fn is_complete(&self) -> bool {
        self.continuity_report.is_complete() && self.expansion.report.is_complete()
    }
}

/// Runs the four stages in order.
///
/// # Arguments
/// * `transactions` - Validated purchase transactions
/// * `order` - Day ranges to create placeholder rows for
/// * `config` - Stage settings
///
/// # Returns
/// Each intermediate table together with both fill reports. Unfillable gaps
/// are reported, never raised.
pub fn run(transactions: &TransactionTable, order: &ForecastOrder, config: &PipelineConfig) -> PipelineOutput {
    info!(
        transactions = transactions.len(),
        forecast_ranges = order.ranges().len(),
        "Pipeline: starting run"
    );

    let aggregator = Aggregator::new(config.universe.clone(), config.coverage);
    let aggregated = aggregator.aggregate(transactions);

    let (continuous, continuity_report) = ContinuityFiller::new().fill(aggregated.clone());

    let expansion = TargetExpander::new(config.n_target_values).expand(continuous.clone(), order);

    let wide = Pivoter::new().pivot(&expansion.table);

    let output = PipelineOutput {
        aggregated,
        continuous,
        continuity_report,
        expansion,
        wide,
    };

    if !output.is_complete() {
        warn!(
            unfillable = output.continuity_report.unfillable.len() + output.expansion.report.unfillable.len(),
            "Pipeline: some days could not be filled"
        );
    }

    info!(
        aggregated_rows = output.aggregated.len(),
        filled_days = output.continuity_report.filled.len(),
        placeholders = output.expansion.placeholders,
        wide_rows = output.wide.num_rows(),
        wide_columns = output.wide.num_columns(),
        "Pipeline: run complete"
    );

    output
}
