// Integration tests for end-to-end runs over realistic transaction histories

#[cfg(test)]
mod integration_tests {
    use crate::aggregate::AggregateTable;
    use crate::calendar::DateRange;
    use crate::csv_io::{read_forecast_order, read_transactions, write_aggregates, write_wide};
    use crate::entity_key::{AggregationKey, Dimension, Measure, SeriesKey};
    use crate::forecast_order::ForecastOrder;
    use crate::pipeline::{run, PipelineConfig};
    use crate::pivot::Pivoter;
    use crate::sqlite_store::SqliteAggregateStore;
    use crate::transaction::{Transaction, TransactionTable};
    use crate::universe::{IdentifierUniverse, KeyCoverage};
    use chrono::NaiveDate;

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// One purchase per day for market 1 over `range`, except on `skip`.
    /// 2022-01-02 is priced at 500, every other day at 10.
    fn daily_history(range: DateRange, skip: Option<NaiveDate>) -> TransactionTable {
        let rows = range
            .days()
            .filter(|day| Some(*day) != skip)
            .map(|day| {
                let price = if day == date(2022, 1, 2) { 500.0 } else { 10.0 };
                Transaction::new(day, price, price * 0.9, 1).with_market(1)
            })
            .collect();
        TransactionTable::new(rows)
    }

    /// A day missing a year after the fact is repaired from the year-ago row.
    #[test]
    fn test_missing_day_is_copied_from_a_year_earlier() {
        init_logging();
        let history = daily_history(DateRange::new(date(2022, 1, 1), date(2023, 1, 3)), Some(date(2023, 1, 2)));
        let output = run(&history, &ForecastOrder::default(), &PipelineConfig::default());

        assert_eq!(output.continuity_report.filled, vec![date(2023, 1, 2)]);
        assert!(output.is_complete());

        let filled: Vec<_> = output.continuous.rows_on(date(2023, 1, 2)).collect();
        assert_eq!(filled.len(), 2);
        let market = filled
            .iter()
            .find(|row| row.key == AggregationKey::Market(1))
            .unwrap();
        assert_eq!(market.measures.full_price, Some(500.0));

        // Every day of the span now has rows
        let span = output.continuous.date_span().unwrap();
        assert_eq!(output.continuous.days().len(), span.num_days());
    }

    /// Forecast days get placeholders which surface as unset cells in the
    /// wide table, while historical cells keep their values.
    #[test]
    fn test_forecast_placeholders_reach_the_wide_table() {
        init_logging();
        let history = TransactionTable::new(vec![
            Transaction::new(date(2023, 1, 30), 10.0, 9.0, 1).with_market(1).with_category(2),
            Transaction::new(date(2023, 1, 30), 30.0, 27.0, 3).with_vendor(3),
            Transaction::new(date(2023, 1, 31), 20.0, 18.0, 2).with_market(1),
        ]);
        let order = ForecastOrder::from_entries(["(2023-02-01,2023-02-02)"]).unwrap();
        let config = PipelineConfig::new(IdentifierUniverse::unrestricted(), KeyCoverage::Observed, Some(3));
        let output = run(&history, &order, &config);

        // Distinct keys in first-appearance order: M1, C2, V3, Total
        assert_eq!(output.expansion.placeholders, 6);
        assert_eq!(output.wide.num_rows(), 4);

        let market = SeriesKey::new(Measure::FullPrice, AggregationKey::Market(1));
        let total = SeriesKey::new(Measure::FullPrice, AggregationKey::Total);
        assert_eq!(output.wide.value(date(2023, 1, 31), &market), Some(20.0));
        assert_eq!(output.wide.value(date(2023, 1, 30), &total), Some(40.0));
        assert_eq!(output.wide.value(date(2023, 2, 1), &market), None);
        // Total was not among the first three keys, so it has no forecast rows
        assert_eq!(output.wide.value(date(2023, 2, 2), &total), None);

        // A key without purchases on a historical day reads as zero, so only
        // forecast cells are unset
        let vendor = SeriesKey::new(Measure::FullPrice, AggregationKey::Vendor(3));
        assert_eq!(output.wide.value(date(2023, 1, 31), &vendor), Some(0.0));
        assert_eq!(output.expansion.zero_rows, 2);
        for (day, cells) in output.wide.rows().filter(|(day, _)| *day < date(2023, 2, 1)) {
            assert!(cells.iter().all(Option::is_some), "{}", day);
        }
    }

    /// Every wide cell equals the value of the matching long row.
    #[test]
    fn test_pivot_round_trip_over_expanded_table() {
        init_logging();
        let history = daily_history(DateRange::new(date(2023, 1, 1), date(2023, 1, 10)), Some(date(2023, 1, 5)));
        let order = ForecastOrder::from_entries(["(2023-01-11,2023-01-12)"]).unwrap();
        let output = run(&history, &order, &PipelineConfig::default());

        let long = &output.expansion.table;
        let wide = Pivoter::new().pivot(long);
        assert_eq!(wide, output.wide);

        for row in long.rows() {
            for measure in Measure::ALL {
                let series = SeriesKey::new(measure, row.key);
                assert_eq!(
                    wide.value(row.create_date, &series),
                    row.measures.get(measure),
                    "{} on {}",
                    series,
                    row.create_date
                );
            }
        }
        assert_eq!(output.continuity_report.unfillable.len(), 1);
        assert_eq!(output.continuity_report.unfillable[0].missing, date(2023, 1, 5));
    }

    /// Dense coverage emits every allow-listed identifier every day, so the
    /// placeholder count is the allow-list size plus the grand total.
    #[test]
    fn test_universe_coverage_with_allow_list() {
        init_logging();
        let universe = IdentifierUniverse::unrestricted()
            .with_dimension(Dimension::Market, [1, 2])
            .with_dimension(Dimension::Category, [7])
            .with_dimension(Dimension::Vendor, [3, 4]);
        let history = TransactionTable::new(vec![
            Transaction::new(date(2023, 3, 1), 10.0, 10.0, 1).with_market(1).with_vendor(3),
            Transaction::new(date(2023, 3, 1), 5.0, 4.0, 1).with_market(99),
        ]);
        let order = ForecastOrder::from_entries(["(2023-03-02,2023-03-02)"]).unwrap();
        let config = PipelineConfig::new(universe, KeyCoverage::Universe, Some(6));
        let output = run(&history, &order, &config);

        assert_eq!(output.aggregated.len(), 6);
        assert_eq!(output.expansion.placeholders, 6);

        let idle_market = SeriesKey::new(Measure::FullPrice, AggregationKey::Market(2));
        assert_eq!(output.wide.value(date(2023, 3, 1), &idle_market), Some(0.0));
        let total = SeriesKey::new(Measure::FullPrice, AggregationKey::Total);
        assert_eq!(output.wide.value(date(2023, 3, 1), &total), Some(15.0));
        assert!(output
            .wide
            .columns()
            .iter()
            .all(|series| series.key != AggregationKey::Market(99)));
    }

    /// CSV in, CSV out.
    #[test]
    fn test_csv_to_wide_csv() {
        init_logging();
        let transactions = "\
create_date,market_id,category_id,vendor_id,full_price,full_discount_price,quantity,basket_size
2023-01-01,1,,,10.0,9.0,1,2
2023-01-01,,5,,20.0,18.0,2,4
2023-01-02 13:45:00,1.0,,,30.0,27.0,1,
";
        let orders = "dates\n\"(2023-01-03,2023-01-03)\"\n";

        let table = read_transactions(transactions.as_bytes()).unwrap();
        let order = read_forecast_order(orders.as_bytes()).unwrap();
        let output = run(&table, &order, &PipelineConfig::default());

        let mut buffer = Vec::new();
        write_wide(&output.wide, &mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(
            lines[0],
            "create_date,1-nan-nan-full_discount_price,nan-5-nan-full_discount_price,\
nan-nan-nan-full_discount_price,1-nan-nan-full_price,nan-5-nan-full_price,nan-nan-nan-full_price"
        );
        assert_eq!(lines[1], "2023-01-01,9,18,27,10,20,30");
        assert_eq!(lines[2], "2023-01-02,27,0,27,30,0,30");
        assert_eq!(lines[3], "2023-01-03,,,,,,");
        assert_eq!(lines.len(), 4);

        let mut long = Vec::new();
        write_aggregates(&output.aggregated, &mut long).unwrap();
        let long = String::from_utf8(long).unwrap();
        assert!(long.starts_with(
            "create_date,category_id,market_id,vendor_id,basket_size,full_discount_price"
        ));
    }

    /// Aggregates saved to the store reload into an identical pipeline tail.
    #[test]
    fn test_stored_aggregates_reproduce_the_wide_table() {
        init_logging();
        let history = daily_history(DateRange::new(date(2023, 1, 1), date(2023, 1, 4)), None);
        let output = run(&history, &ForecastOrder::default(), &PipelineConfig::default());

        let mut store = SqliteAggregateStore::new_in_memory().unwrap();
        store.save(&output.continuous).unwrap();
        let reloaded: AggregateTable = store.load().unwrap();

        assert_eq!(reloaded, output.continuous);
        assert_eq!(Pivoter::new().pivot(&reloaded), output.wide);
    }
}
