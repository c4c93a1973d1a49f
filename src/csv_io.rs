//! CSV boundary of the pipeline.
//!
//! Reading enforces the documented input schema and nothing more: required
//! columns must exist and coerce to their semantic type. Cleaning,
//! renaming and outlier filtering happen upstream.

use crate::aggregate::{is_builtin_measure, AggregateTable, DATE_COLUMN};
use crate::entity_key::{Dimension, EntityId};
use crate::error::PipelineError;
use crate::forecast_order::ForecastOrder;
use crate::pivot::WideTable;
use crate::transaction::{Transaction, TransactionTable};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use csv::StringRecord;
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

/// Columns every transaction table must carry.
pub const REQUIRED_COLUMNS: [&str; 7] = [
    DATE_COLUMN,
    "market_id",
    "category_id",
    "vendor_id",
    "full_price",
    "full_discount_price",
    "quantity",
];

/// Column of the forecast order holding `"(start,end)"` entries.
pub const ORDER_COLUMN: &str = "dates";

/// Reads a transaction table.
///
/// Columns outside [`REQUIRED_COLUMNS`] whose values are all numeric (or
/// empty) become extra mean-aggregated measures; other columns are ignored.
///
/// # Errors
/// `PipelineError::Schema` when a required column is missing or a value
/// cannot be coerced; `PipelineError::Csv` on malformed CSV.
pub fn read_transactions<R: Read>(reader: R) -> Result<TransactionTable, PipelineError> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let headers = reader.headers()?.clone();
    let header_map = build_header_map(&headers);

    for column in REQUIRED_COLUMNS {
        if !header_map.contains_key(column) {
            return Err(PipelineError::Schema(format!("missing required column '{}'", column)));
        }
    }

    let records: Vec<StringRecord> = reader.records().collect::<Result<_, _>>()?;

    let extra_columns: Vec<(String, usize)> = headers
        .iter()
        .enumerate()
        .filter(|(_, name)| !REQUIRED_COLUMNS.contains(name))
        .filter(|(_, name)| {
            let builtin = is_builtin_measure(name);
            if builtin {
                log::info!("Ignoring column '{}': name of a built-in measure", name);
            }
            !builtin
        })
        .filter_map(|(idx, name)| {
            let numeric = records
                .iter()
                .all(|record| parse_optional_f64(record.get(idx).unwrap_or("")).is_ok());
            if numeric {
                Some((name.to_string(), idx))
            } else {
                log::info!("Ignoring non-numeric column '{}'", name);
                None
            }
        })
        .collect();

    let mut rows = Vec::with_capacity(records.len());
    for (idx, record) in records.iter().enumerate() {
        // +2: one-based lines, header on line 1
        let line = idx + 2;
        let mut tx = parse_transaction(record, &header_map)
            .map_err(|msg| PipelineError::Schema(format!("line {}: {}", line, msg)))?;
        for (name, column) in &extra_columns {
            let raw = record.get(*column).unwrap_or("");
            if let Ok(Some(value)) = parse_optional_f64(raw) {
                tx.extra.insert(name.clone(), value);
            }
        }
        rows.push(tx);
    }

    log::info!(
        "Read {} transactions ({} extra measure columns)",
        rows.len(),
        extra_columns.len()
    );

    Ok(TransactionTable::with_extra_columns(
        rows,
        extra_columns.into_iter().map(|(name, _)| name),
    ))
}

pub fn read_transactions_file<P: AsRef<Path>>(path: P) -> Result<TransactionTable, PipelineError> {
    read_transactions(open(path.as_ref())?)
}

/// Reads a forecast order from a CSV with a [`ORDER_COLUMN`] column.
pub fn read_forecast_order<R: Read>(reader: R) -> Result<ForecastOrder, PipelineError> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let headers = reader.headers()?.clone();
    let column = headers
        .iter()
        .position(|name| name == ORDER_COLUMN)
        .ok_or_else(|| PipelineError::Schema(format!("missing required column '{}'", ORDER_COLUMN)))?;

    let mut entries = Vec::new();
    for record in reader.records() {
        let record = record?;
        if let Some(entry) = record.get(column) {
            if !entry.is_empty() {
                entries.push(entry.to_string());
            }
        }
    }

    let order = ForecastOrder::from_entries(entries)?;
    log::info!(
        "Read forecast order: {} ranges, {} days",
        order.ranges().len(),
        order.target_days().len()
    );
    Ok(order)
}

pub fn read_forecast_order_file<P: AsRef<Path>>(path: P) -> Result<ForecastOrder, PipelineError> {
    read_forecast_order(open(path.as_ref())?)
}

/// Writes the long aggregate table in canonical column order. Unset values
/// are written as empty cells.
pub fn write_aggregates<W: Write>(table: &AggregateTable, writer: W) -> Result<(), PipelineError> {
    let mut writer = csv::Writer::from_writer(writer);
    let columns = table.column_names();
    writer.write_record(&columns)?;

    let measure_columns = &columns[4..];
    for row in table.rows() {
        let mut record = vec![
            row.create_date.to_string(),
            render_id(row.key.id_for(Dimension::Category)),
            render_id(row.key.id_for(Dimension::Market)),
            render_id(row.key.id_for(Dimension::Vendor)),
        ];
        record.extend(
            measure_columns
                .iter()
                .map(|column| render_value(row.measures.get_column(column))),
        );
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_aggregates_file<P: AsRef<Path>>(table: &AggregateTable, path: P) -> Result<(), PipelineError> {
    let path = path.as_ref();
    write_aggregates(table, create(path)?)?;
    log::info!("Wrote {} aggregate rows to {}", table.len(), path.display());
    Ok(())
}

/// Writes the wide table: a `create_date` column followed by one column
/// per target series.
pub fn write_wide<W: Write>(wide: &WideTable, writer: W) -> Result<(), PipelineError> {
    let mut writer = csv::Writer::from_writer(writer);
    let mut header = vec![DATE_COLUMN.to_string()];
    header.extend(wide.column_names());
    writer.write_record(&header)?;

    for (day, cells) in wide.rows() {
        let mut record = Vec::with_capacity(cells.len() + 1);
        record.push(day.to_string());
        record.extend(cells.iter().map(|cell| render_value(*cell)));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_wide_file<P: AsRef<Path>>(wide: &WideTable, path: P) -> Result<(), PipelineError> {
    let path = path.as_ref();
    write_wide(wide, create(path)?)?;
    log::info!(
        "Wrote wide table ({} days x {} series) to {}",
        wide.num_rows(),
        wide.num_columns(),
        path.display()
    );
    Ok(())
}

fn open(path: &Path) -> Result<File, PipelineError> {
    File::open(path).map_err(|e| PipelineError::Io(format!("Failed to open '{}': {}", path.display(), e)))
}

fn create(path: &Path) -> Result<File, PipelineError> {
    File::create(path).map_err(|e| PipelineError::Io(format!("Failed to create '{}': {}", path.display(), e)))
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (name.to_string(), idx))
        .collect()
}

fn parse_transaction(record: &StringRecord, header_map: &HashMap<String, usize>) -> Result<Transaction, String> {
    let field = |name: &str| field_value(record, header_map, name);

    let create_date = parse_date(field(DATE_COLUMN))?;
    let full_price = parse_required_f64("full_price", field("full_price"))?;
    let full_discount_price = parse_required_f64("full_discount_price", field("full_discount_price"))?;
    let quantity = parse_quantity(field("quantity"))?;

    let mut tx = Transaction::new(create_date, full_price, full_discount_price, quantity);
    tx.market_id = parse_id(Dimension::Market, field("market_id"))?;
    tx.category_id = parse_id(Dimension::Category, field("category_id"))?;
    tx.vendor_id = parse_id(Dimension::Vendor, field("vendor_id"))?;
    Ok(tx)
}

fn field_value<'a>(record: &'a StringRecord, header_map: &HashMap<String, usize>, name: &str) -> &'a str {
    header_map
        .get(name)
        .and_then(|idx| record.get(*idx))
        .unwrap_or("")
}

/// Accepts a date or a date-time; the time of day is dropped.
fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date);
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(datetime.date());
        }
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|datetime| datetime.date_naive())
        .map_err(|_| format!("invalid {} '{}'", DATE_COLUMN, raw))
}

fn is_missing(raw: &str) -> bool {
    raw.is_empty() || raw.eq_ignore_ascii_case("nan")
}

/// Empty, `nan` and `0` are unset; `104448.0` is accepted as `104448`.
fn parse_id(dimension: Dimension, raw: &str) -> Result<Option<EntityId>, String> {
    if is_missing(raw) {
        return Ok(None);
    }
    let id = match raw.parse::<EntityId>() {
        Ok(id) => id,
        Err(_) => match raw.parse::<f64>() {
            Ok(value) if value >= 0.0 && value.fract() == 0.0 && value <= u64::MAX as f64 => value as EntityId,
            _ => return Err(format!("invalid {} '{}'", dimension, raw)),
        },
    };
    Ok(if id == 0 { None } else { Some(id) })
}

fn parse_required_f64(column: &str, raw: &str) -> Result<f64, String> {
    match parse_optional_f64(raw) {
        Ok(Some(value)) => Ok(value),
        Ok(None) => Err(format!("missing value for {}", column)),
        Err(()) => Err(format!("invalid {} '{}'", column, raw)),
    }
}

fn parse_optional_f64(raw: &str) -> Result<Option<f64>, ()> {
    if is_missing(raw) {
        return Ok(None);
    }
    raw.parse::<f64>().map(Some).map_err(|_| ())
}

fn parse_quantity(raw: &str) -> Result<i64, String> {
    if let Ok(quantity) = raw.parse::<i64>() {
        return Ok(quantity);
    }
    match raw.parse::<f64>() {
        Ok(value) if value.fract() == 0.0 => Ok(value as i64),
        _ => Err(format!("invalid quantity '{}'", raw)),
    }
}

fn render_id(id: Option<EntityId>) -> String {
    id.map(|id| id.to_string()).unwrap_or_default()
}

fn render_value(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{AggregateRow, MeasureValues};
    use crate::entity_key::AggregationKey;
    use crate::pivot::Pivoter;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    const TRANSACTIONS: &str = "\
create_date,market_id,category_id,vendor_id,full_price,full_discount_price,quantity,rating,comment
2023-01-01,276,128,17,100,90,1,4.5,ok
2023-01-01 13:45:00,276.0,,0,200,150,2,,fine
2023-01-03,,8,,50,50,1,3,
";

    #[test]
    fn test_read_transactions() {
        let table = read_transactions(TRANSACTIONS.as_bytes()).unwrap();
        assert_eq!(table.len(), 3);

        let rows = table.rows();
        assert_eq!(rows[0].market_id, Some(276));
        assert_eq!(rows[0].extra.get("rating"), Some(&4.5));
        assert_eq!(rows[1].create_date, date(2023, 1, 1));
        assert_eq!(rows[1].market_id, Some(276));
        assert_eq!(rows[1].category_id, None);
        assert_eq!(rows[1].vendor_id, None);
        assert!(rows[1].extra.get("rating").is_none());
        assert_eq!(rows[2].create_date, date(2023, 1, 3));

        let extra: Vec<&String> = table.extra_columns().iter().collect();
        assert_eq!(extra, vec!["rating"]);
    }

    #[test]
    fn test_builtin_measure_names_are_not_extra_columns() {
        let data = "\
create_date,market_id,category_id,vendor_id,full_price,full_discount_price,quantity,full_price_mean,full_discount_price_mean,rating
2023-01-01,1,,,10,9,1,99,98,4
";
        let table = read_transactions(data.as_bytes()).unwrap();
        let extra: Vec<&String> = table.extra_columns().iter().collect();
        assert_eq!(extra, vec!["rating"]);
        assert!(!table.rows()[0].extra.contains_key("full_price_mean"));

        let aggregated = crate::aggregator::Aggregator::default().aggregate(&table);
        let columns = aggregated.column_names();
        let mut unique = columns.clone();
        unique.dedup();
        assert_eq!(columns, unique);
        let total = aggregated.rows().iter().find(|r| r.key.is_total()).unwrap();
        assert_eq!(total.measures.get_column("full_price_mean"), Some(10.0));
    }

    #[test]
    fn test_missing_required_column() {
        let data = "create_date,market_id,category_id,vendor_id,full_price,quantity\n";
        let err = read_transactions(data.as_bytes()).unwrap_err();
        assert_eq!(
            err,
            PipelineError::Schema("missing required column 'full_discount_price'".to_string())
        );
    }

    #[test]
    fn test_uncoercible_values() {
        let header = "create_date,market_id,category_id,vendor_id,full_price,full_discount_price,quantity\n";
        for bad in [
            "yesterday,1,,,1,1,1",
            "2023-01-01,abc,,,1,1,1",
            "2023-01-01,1,,,free,1,1",
            "2023-01-01,1,,,1,,1",
            "2023-01-01,1,,,1,1,1.5",
        ] {
            let data = format!("{}{}\n", header, bad);
            let result = read_transactions(data.as_bytes());
            assert!(
                matches!(result, Err(PipelineError::Schema(ref msg)) if msg.starts_with("line 2")),
                "{} should fail: {:?}",
                bad,
                result
            );
        }
    }

    #[test]
    fn test_read_forecast_order() {
        let data = "id,dates\n1,\"(2023-02-01,2023-02-02)\"\n2,\"(2023-02-01,2023-02-02)\"\n";
        let order = read_forecast_order(data.as_bytes()).unwrap();
        assert_eq!(order.ranges().len(), 1);
        assert_eq!(order.target_days(), vec![date(2023, 2, 1), date(2023, 2, 2)]);
    }

    #[test]
    fn test_forecast_order_missing_column() {
        let result = read_forecast_order("id,range\n1,x\n".as_bytes());
        assert!(matches!(result, Err(PipelineError::Schema(_))));
    }

    #[test]
    fn test_forecast_order_inverted_entry() {
        let data = "dates\n\"(2023-02-02,2023-02-01)\"\n";
        let result = read_forecast_order(data.as_bytes());
        assert!(matches!(result, Err(PipelineError::EmptyRange { .. })));
    }

    #[test]
    fn test_write_aggregates() {
        let mut measures = MeasureValues::default();
        measures.full_price = Some(500.0);
        measures.full_discount_price = Some(450.5);
        let table = AggregateTable::new(vec![
            AggregateRow::new(date(2023, 1, 2), AggregationKey::Market(276), measures),
            AggregateRow::placeholder(date(2023, 1, 3), AggregationKey::Total, std::iter::empty()),
        ]);

        let mut out = Vec::new();
        write_aggregates(&table, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "create_date,category_id,market_id,vendor_id,full_discount_price,full_discount_price_mean,full_price,full_price_mean"
        );
        assert_eq!(lines[1], "2023-01-02,,276,,450.5,,500,");
        assert_eq!(lines[2], "2023-01-03,,,,,,,");
    }

    #[test]
    fn test_write_wide() {
        let mut measures = MeasureValues::default();
        measures.full_price = Some(10.0);
        measures.full_discount_price = Some(9.0);
        let table = AggregateTable::new(vec![AggregateRow::new(
            date(2023, 1, 1),
            AggregationKey::Total,
            measures,
        )]);
        let wide = Pivoter::new().pivot(&table);

        let mut out = Vec::new();
        write_wide(&wide, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "create_date,nan-nan-nan-full_discount_price,nan-nan-nan-full_price\n2023-01-01,9,10\n"
        );
    }
}
