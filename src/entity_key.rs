use serde::{Deserialize, Serialize};
use std::fmt;

/// Market, category or vendor identifier.
pub type EntityId = u64;

/// Token written in place of an unset entity position in a series column name.
pub const UNSET_SENTINEL: &str = "nan";

/// One of the three entity dimensions a transaction can be grouped by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Dimension {
    Market,
    Category,
    Vendor,
}

impl Dimension {
    /// All dimensions, in grouping order.
    pub const ALL: [Dimension; 3] = [Dimension::Market, Dimension::Category, Dimension::Vendor];

    /// Name of the table column holding this dimension's identifier.
    pub fn column_name(&self) -> &'static str {
        match self {
            Dimension::Market => "market_id",
            Dimension::Category => "category_id",
            Dimension::Vendor => "vendor_id",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.column_name())
    }
}

/// Aggregation key of an aggregate row.
///
/// At most one entity dimension is ever filtered on, so the key is a tagged
/// variant rather than a triple of nullable identifiers. `Total` is the
/// grand total across every transaction of a day.
///
/// The derived ordering (markets, categories, vendors, then the total; ids
/// ascending inside each dimension) is the canonical row order within a day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AggregationKey {
    Market(EntityId),
    Category(EntityId),
    Vendor(EntityId),
    Total,
}

impl AggregationKey {
    /// Creates a key filtering on a single dimension.
    ///
    /// # Errors
    /// Returns `KeyError::ZeroIdentifier` if `id` is zero; identifiers are
    /// strictly positive.
    pub fn new(dimension: Dimension, id: EntityId) -> Result<Self, KeyError> {
        if id == 0 {
            return Err(KeyError::ZeroIdentifier);
        }
        Ok(Self::for_dimension(dimension, id))
    }

    pub(crate) fn for_dimension(dimension: Dimension, id: EntityId) -> Self {
        match dimension {
            Dimension::Market => AggregationKey::Market(id),
            Dimension::Category => AggregationKey::Category(id),
            Dimension::Vendor => AggregationKey::Vendor(id),
        }
    }

    /// Rebuilds a key from the three nullable identifier columns of the
    /// long table layout.
    ///
    /// # Errors
    /// Returns `KeyError::MultipleDimensions` if more than one column is set
    /// and `KeyError::ZeroIdentifier` if the set column holds zero.
    pub fn from_columns(
        market_id: Option<EntityId>,
        category_id: Option<EntityId>,
        vendor_id: Option<EntityId>,
    ) -> Result<Self, KeyError> {
        match (market_id, category_id, vendor_id) {
            (None, None, None) => Ok(AggregationKey::Total),
            (Some(id), None, None) => Self::new(Dimension::Market, id),
            (None, Some(id), None) => Self::new(Dimension::Category, id),
            (None, None, Some(id)) => Self::new(Dimension::Vendor, id),
            _ => Err(KeyError::MultipleDimensions),
        }
    }

    /// The dimension this key filters on, `None` for the grand total.
    pub fn dimension(&self) -> Option<Dimension> {
        match self {
            AggregationKey::Market(_) => Some(Dimension::Market),
            AggregationKey::Category(_) => Some(Dimension::Category),
            AggregationKey::Vendor(_) => Some(Dimension::Vendor),
            AggregationKey::Total => None,
        }
    }

    /// Identifier for `dimension`, `None` when the key does not filter on it.
    pub fn id_for(&self, dimension: Dimension) -> Option<EntityId> {
        match (self, dimension) {
            (AggregationKey::Market(id), Dimension::Market)
            | (AggregationKey::Category(id), Dimension::Category)
            | (AggregationKey::Vendor(id), Dimension::Vendor) => Some(*id),
            _ => None,
        }
    }

    pub fn market_id(&self) -> Option<EntityId> {
        self.id_for(Dimension::Market)
    }

    pub fn category_id(&self) -> Option<EntityId> {
        self.id_for(Dimension::Category)
    }

    pub fn vendor_id(&self) -> Option<EntityId> {
        self.id_for(Dimension::Vendor)
    }

    pub fn is_total(&self) -> bool {
        matches!(self, AggregationKey::Total)
    }
}

impl fmt::Display for AggregationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.dimension() {
            Some(dimension) => {
                let id = self.id_for(dimension).unwrap_or_default();
                write!(f, "{}={}", dimension, id)
            }
            None => write!(f, "total"),
        }
    }
}

/// Measure that becomes a forecast target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Measure {
    FullDiscountPrice,
    FullPrice,
}

impl Measure {
    /// Target measures, in output column order.
    pub const ALL: [Measure; 2] = [Measure::FullDiscountPrice, Measure::FullPrice];

    pub fn name(&self) -> &'static str {
        match self {
            Measure::FullDiscountPrice => "full_discount_price",
            Measure::FullPrice => "full_price",
        }
    }
}

impl fmt::Display for Measure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Identifies one output column of the wide table: a measure paired with an
/// aggregation key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeriesKey {
    pub measure: Measure,
    pub key: AggregationKey,
}

impl SeriesKey {
    pub fn new(measure: Measure, key: AggregationKey) -> Self {
        SeriesKey { measure, key }
    }

    /// Column name consumed by the forecasting model:
    /// `{market}-{category}-{vendor}-{measure}`, unset positions rendered as
    /// [`UNSET_SENTINEL`].
    ///
    /// # Examples
    /// ```
    /// use purchase_series::{AggregationKey, Measure, SeriesKey};
    ///
    /// let key = SeriesKey::new(Measure::FullPrice, AggregationKey::Market(104448));
    /// assert_eq!(key.column_name(), "104448-nan-nan-full_price");
    /// ```
    pub fn column_name(&self) -> String {
        format!(
            "{}-{}-{}-{}",
            render_id(self.key.market_id()),
            render_id(self.key.category_id()),
            render_id(self.key.vendor_id()),
            self.measure.name()
        )
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.column_name())
    }
}

fn render_id(id: Option<EntityId>) -> String {
    match id {
        Some(id) => id.to_string(),
        None => UNSET_SENTINEL.to_string(),
    }
}

/// Errors that can occur when building an aggregation key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// Identifiers must be strictly positive
    ZeroIdentifier,
    /// More than one entity dimension was set
    MultipleDimensions,
}

impl fmt::Display for KeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyError::ZeroIdentifier => write!(f, "Entity identifier must be positive"),
            KeyError::MultipleDimensions => {
                write!(f, "Aggregation key may set at most one entity dimension")
            }
        }
    }
}

impl std::error::Error for KeyError {}
