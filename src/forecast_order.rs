//! Forecast order: the day ranges a forecast is requested for.

use crate::calendar::DateRange;
use crate::error::PipelineError;
use chrono::NaiveDate;
use std::collections::HashSet;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Set of closed date ranges requiring a forecast.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForecastOrder {
    ranges: Vec<DateRange>,
}

impl ForecastOrder {
    /// Builds an order from already-parsed ranges.
    ///
    /// # Errors
    /// Returns `PipelineError::EmptyRange` for the first inverted range.
    pub fn new(ranges: Vec<DateRange>) -> Result<Self, PipelineError> {
        for range in &ranges {
            if range.is_inverted() {
                return Err(PipelineError::EmptyRange {
                    entry: range.to_string(),
                    reason: "end date before start date".to_string(),
                });
            }
        }
        Ok(ForecastOrder { ranges })
    }

    /// Parses order entries of the form `"(start_date,end_date)"`.
    ///
    /// Repeated entries are kept once, in order of first occurrence.
    ///
    /// # Examples
    /// ```
    /// use purchase_series::ForecastOrder;
    ///
    /// let order = ForecastOrder::from_entries(["(2023-02-01,2023-02-02)"]).unwrap();
    /// assert_eq!(order.target_days().len(), 2);
    /// ```
    pub fn from_entries<I, S>(entries: I) -> Result<Self, PipelineError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut ranges = Vec::new();
        for entry in entries {
            let entry = entry.as_ref().trim();
            if !seen.insert(entry.to_string()) {
                continue;
            }
            ranges.push(parse_entry(entry)?);
        }
        Ok(ForecastOrder { ranges })
    }

    pub fn ranges(&self) -> &[DateRange] {
        &self.ranges
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Every requested day, each once, in range order.
    pub fn target_days(&self) -> Vec<NaiveDate> {
        let mut seen = HashSet::new();
        self.ranges
            .iter()
            .flat_map(|range| range.days())
            .filter(|day| seen.insert(*day))
            .collect()
    }
}

/// Parses a single `"(start_date,end_date)"` entry into a closed range.
///
/// # Errors
/// Returns `PipelineError::EmptyRange` naming the entry if it is malformed or
/// its end falls before its start.
pub fn parse_entry(entry: &str) -> Result<DateRange, PipelineError> {
    let malformed = |reason: &str| PipelineError::EmptyRange {
        entry: entry.to_string(),
        reason: reason.to_string(),
    };

    let inner = entry
        .trim()
        .strip_prefix('(')
        .and_then(|rest| rest.strip_suffix(')'))
        .ok_or_else(|| malformed("expected \"(start_date,end_date)\""))?;

    let (start, end) = inner
        .split_once(',')
        .ok_or_else(|| malformed("expected two comma-separated dates"))?;

    let start = NaiveDate::parse_from_str(start.trim(), DATE_FORMAT)
        .map_err(|e| malformed(&format!("invalid start date: {}", e)))?;
    let end = NaiveDate::parse_from_str(end.trim(), DATE_FORMAT)
        .map_err(|e| malformed(&format!("invalid end date: {}", e)))?;

    let range = DateRange::new(start, end);
    if range.is_inverted() {
        return Err(malformed("end date before start date"));
    }
    Ok(range)
}
