//! Purchase series batch binary
//!
//! Run with: `cargo run --bin purchase-series`
//!
//! Reads transactions and a forecast order, writes the wide series table.

use purchase_series::{
    read_forecast_order_file, read_transactions_file, run, write_aggregates_file, write_wide_file,
    IdentifierUniverse, KeyCoverage, PipelineConfig, PipelineError, SqliteAggregateStore,
};
use tracing_subscriber::EnvFilter;

fn main() {
    // Set RUST_LOG to control log level:
    //   RUST_LOG=debug cargo run --bin purchase-series
    //   RUST_LOG=purchase_series::continuity=debug cargo run --bin purchase-series
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    if let Err(e) = run_batch() {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run_batch() -> Result<(), PipelineError> {
    let transactions_path = env_or("TRANSACTIONS_PATH", "transactions.csv");
    let forecast_order_path = env_or("FORECAST_ORDER_PATH", "forecast_order.csv");
    let output_path = env_or("OUTPUT_PATH", "series.csv");
    let aggregates_path = std::env::var("AGGREGATES_PATH").ok();
    let universe_path = std::env::var("UNIVERSE_PATH").ok();
    let database_path = std::env::var("DATABASE_PATH").ok();

    let n_target_values = match std::env::var("N_TARGET_VALUES") {
        Ok(value) => Some(
            value
                .trim()
                .parse::<usize>()
                .map_err(|e| PipelineError::Config(format!("N_TARGET_VALUES '{}': {}", value, e)))?,
        ),
        Err(_) => None,
    };
    let coverage = match std::env::var("KEY_COVERAGE") {
        Ok(value) => KeyCoverage::from_str(&value)?,
        Err(_) => KeyCoverage::default(),
    };
    let universe = match &universe_path {
        Some(path) => IdentifierUniverse::from_json_file(path)?,
        None => IdentifierUniverse::unrestricted(),
    };

    println!("Building purchase series...");
    println!("   Transactions:   {}", transactions_path);
    println!("   Forecast order: {}", forecast_order_path);
    println!("   Output:         {}", output_path);
    println!("   Key coverage:   {:?}", coverage);
    if let Some(n) = n_target_values {
        println!("   Target values:  {}", n);
    }
    println!();

    let transactions = read_transactions_file(&transactions_path)?;
    let order = read_forecast_order_file(&forecast_order_path)?;
    let config = PipelineConfig::new(universe, coverage, n_target_values);

    let output = run(&transactions, &order, &config);

    for gap in output
        .continuity_report
        .unfillable
        .iter()
        .chain(&output.expansion.report.unfillable)
    {
        println!("   {}", gap);
    }

    if let Some(path) = &aggregates_path {
        write_aggregates_file(&output.expansion.table, path)?;
    }
    if let Some(path) = &database_path {
        let mut store = SqliteAggregateStore::new(path)?;
        store.save(&output.expansion.table)?;
    }
    write_wide_file(&output.wide, &output_path)?;

    println!(
        "Wrote {} days x {} series to {}",
        output.wide.num_rows(),
        output.wide.num_columns(),
        output_path
    );

    Ok(())
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}
