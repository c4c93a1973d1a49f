//! Identifier allow-list.
//!
//! The set of market/category/vendor identifiers the pipeline is configured
//! to aggregate and forecast. It is owned by whoever runs the pipeline; the
//! aggregator only consults it.

use crate::entity_key::{Dimension, EntityId};
use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// Allowed identifiers per dimension. `None` leaves a dimension unrestricted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierUniverse {
    #[serde(default, rename = "market_id")]
    pub markets: Option<BTreeSet<EntityId>>,
    #[serde(default, rename = "category_id")]
    pub categories: Option<BTreeSet<EntityId>>,
    #[serde(default, rename = "vendor_id")]
    pub vendors: Option<BTreeSet<EntityId>>,
}

impl IdentifierUniverse {
    /// Universe that accepts every identifier.
    pub fn unrestricted() -> Self {
        Self::default()
    }

    /// Restricts `dimension` to `ids`.
    pub fn with_dimension(mut self, dimension: Dimension, ids: impl IntoIterator<Item = EntityId>) -> Self {
        let ids = Some(ids.into_iter().collect());
        match dimension {
            Dimension::Market => self.markets = ids,
            Dimension::Category => self.categories = ids,
            Dimension::Vendor => self.vendors = ids,
        }
        self
    }

    /// Allow-list for `dimension`, `None` if unrestricted.
    pub fn allowed(&self, dimension: Dimension) -> Option<&BTreeSet<EntityId>> {
        match dimension {
            Dimension::Market => self.markets.as_ref(),
            Dimension::Category => self.categories.as_ref(),
            Dimension::Vendor => self.vendors.as_ref(),
        }
    }

    pub fn allows(&self, dimension: Dimension, id: EntityId) -> bool {
        self.allowed(dimension).map_or(true, |ids| ids.contains(&id))
    }

    /// Parses a universe from JSON such as
    /// `{"market_id": [276, 299], "vendor_id": [17]}`.
    ///
    /// # Errors
    /// Returns `PipelineError::Config` on malformed JSON or a zero identifier.
    pub fn from_json_str(json: &str) -> Result<Self, PipelineError> {
        let universe: IdentifierUniverse = serde_json::from_str(json)?;
        universe.validate()?;
        Ok(universe)
    }

    /// Reads a universe from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::Io(format!("{}: {}", path.display(), e)))?;
        let universe = Self::from_json_str(&text)?;
        log::info!(
            "Loaded identifier universe from {} ({} markets, {} categories, {} vendors)",
            path.display(),
            describe(universe.markets.as_ref()),
            describe(universe.categories.as_ref()),
            describe(universe.vendors.as_ref())
        );
        Ok(universe)
    }

    fn validate(&self) -> Result<(), PipelineError> {
        for dimension in Dimension::ALL {
            if let Some(ids) = self.allowed(dimension) {
                if ids.contains(&0) {
                    return Err(PipelineError::Config(format!(
                        "{} allow-list contains identifier 0",
                        dimension
                    )));
                }
            }
        }
        Ok(())
    }
}

fn describe(ids: Option<&BTreeSet<EntityId>>) -> String {
    match ids {
        Some(ids) => ids.len().to_string(),
        None => "all".to_string(),
    }
}

/// Which aggregation keys the aggregator emits for a day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyCoverage {
    /// Only keys with at least one matching transaction that day
    #[default]
    Observed,
    /// Also every allowed identifier without purchases, with unset measures.
    /// Unrestricted dimensions fall back to identifiers seen anywhere in the
    /// input.
    Universe,
}

impl KeyCoverage {
    pub fn from_str(value: &str) -> Result<Self, PipelineError> {
        match value.trim().to_lowercase().as_str() {
            "observed" => Ok(KeyCoverage::Observed),
            "universe" | "dense" => Ok(KeyCoverage::Universe),
            other => Err(PipelineError::Config(format!("Unknown key coverage: {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unrestricted_allows_everything() {
        let universe = IdentifierUniverse::unrestricted();
        assert!(universe.allows(Dimension::Market, 12345));
        assert!(universe.allowed(Dimension::Vendor).is_none());
    }

    #[test]
    fn test_restricted_dimension() {
        let universe = IdentifierUniverse::unrestricted().with_dimension(Dimension::Vendor, [17, 19]);
        assert!(universe.allows(Dimension::Vendor, 17));
        assert!(!universe.allows(Dimension::Vendor, 18));
        assert!(universe.allows(Dimension::Market, 18));
    }

    #[test]
    fn test_from_json_partial() {
        let universe = IdentifierUniverse::from_json_str(r#"{"market_id": [299, 276]}"#).unwrap();
        let markets: Vec<EntityId> = universe.markets.clone().unwrap().into_iter().collect();
        assert_eq!(markets, vec![276, 299]);
        assert!(universe.categories.is_none());
    }

    #[test]
    fn test_from_json_rejects_zero() {
        let result = IdentifierUniverse::from_json_str(r#"{"vendor_id": [0, 17]}"#);
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_key_coverage_parse() {
        assert_eq!(KeyCoverage::from_str("Universe").unwrap(), KeyCoverage::Universe);
        assert_eq!(KeyCoverage::from_str("observed").unwrap(), KeyCoverage::Observed);
        assert!(KeyCoverage::from_str("sparse").is_err());
    }
}
