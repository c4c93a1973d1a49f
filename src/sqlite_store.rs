use crate::aggregate::{AggregateRow, AggregateTable, MeasureValues};
use crate::entity_key::{AggregationKey, EntityId};
use crate::error::PipelineError;
use chrono::NaiveDate;
use rusqlite::{params, Connection, Result as SqliteResult};
use std::collections::BTreeMap;
use std::path::Path;

/// SQLite-backed store for a long aggregate table.
///
/// Keeps the latest saved table in a single `aggregates` table, so a
/// downstream forecasting run can reload it without re-aggregating the raw
/// transactions. Automatically creates schema on first use.
#[derive(Debug)]
pub struct SqliteAggregateStore {
    conn: Connection,
}

impl SqliteAggregateStore {
    /// Opens a file-based store.
    ///
    /// # Arguments
    /// * `db_path` - Path to the SQLite database file. Created if missing.
    ///
    /// # Errors
    /// Returns an error if the connection cannot be established or the
    /// schema cannot be created.
    pub fn new<P: AsRef<Path>>(db_path: P) -> SqliteResult<Self> {
        let conn = Connection::open(db_path)?;
        let store = SqliteAggregateStore { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    /// Opens a store backed by an in-memory database.
    pub fn new_in_memory() -> SqliteResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = SqliteAggregateStore { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    /// Creates the `aggregates` table and its day index if they don't exist.
    fn ensure_schema(&self) -> SqliteResult<()> {
        // row_order keeps the within-day order of the saved table
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS aggregates (
                row_order INTEGER PRIMARY KEY,
                create_date TEXT NOT NULL,
                market_id INTEGER,
                category_id INTEGER,
                vendor_id INTEGER,
                full_discount_price REAL,
                full_price REAL,
                full_discount_price_mean REAL,
                full_price_mean REAL,
                extra TEXT NOT NULL
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_aggregates_create_date ON aggregates(create_date)",
            [],
        )?;

        Ok(())
    }

    /// Checks if a table exists in the database.
    pub fn table_exists(&self, table_name: &str) -> SqliteResult<bool> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' AND name=?1")?;
        stmt.exists([table_name])
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Replaces the stored contents with `table` in one transaction.
    ///
    /// # Errors
    /// Returns `PipelineError::Storage` if any statement fails; the previous
    /// contents are kept in that case.
    pub fn save(&mut self, table: &AggregateTable) -> Result<(), PipelineError> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM aggregates", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO aggregates (
                    row_order, create_date, market_id, category_id, vendor_id,
                    full_discount_price, full_price, full_discount_price_mean, full_price_mean,
                    extra
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )?;

            for (position, row) in table.rows().iter().enumerate() {
                let measures = &row.measures;
                let extra = serde_json::to_string(&measures.extra)?;
                stmt.execute(params![
                    position as i64,
                    row.create_date,
                    to_sql_id(row.key.market_id()),
                    to_sql_id(row.key.category_id()),
                    to_sql_id(row.key.vendor_id()),
                    measures.full_discount_price,
                    measures.full_price,
                    measures.full_discount_price_mean,
                    measures.full_price_mean,
                    extra,
                ])?;
            }
        }
        tx.commit()?;

        log::info!("Saved {} aggregate rows", table.len());
        Ok(())
    }

    /// Loads the stored table, sorted by day with within-day order as saved.
    ///
    /// # Errors
    /// Returns `PipelineError::Storage` for query failures and for rows whose
    /// identifier columns don't form a valid aggregation key.
    pub fn load(&self) -> Result<AggregateTable, PipelineError> {
        let mut stmt = self.conn.prepare(
            "SELECT create_date, market_id, category_id, vendor_id,
                    full_discount_price, full_price, full_discount_price_mean, full_price_mean,
                    extra
             FROM aggregates
             ORDER BY create_date, row_order",
        )?;

        let stored = stmt.query_map([], |row| {
            Ok(StoredRow {
                create_date: row.get(0)?,
                market_id: row.get(1)?,
                category_id: row.get(2)?,
                vendor_id: row.get(3)?,
                full_discount_price: row.get(4)?,
                full_price: row.get(5)?,
                full_discount_price_mean: row.get(6)?,
                full_price_mean: row.get(7)?,
                extra: row.get(8)?,
            })
        })?;

        let mut rows = Vec::new();
        for stored in stored {
            rows.push(stored?.into_row()?);
        }

        log::info!("Loaded {} aggregate rows", rows.len());
        Ok(AggregateTable::new(rows))
    }
}

/// Raw column values of one `aggregates` row.
struct StoredRow {
    create_date: NaiveDate,
    market_id: Option<i64>,
    category_id: Option<i64>,
    vendor_id: Option<i64>,
    full_discount_price: Option<f64>,
    full_price: Option<f64>,
    full_discount_price_mean: Option<f64>,
    full_price_mean: Option<f64>,
    extra: String,
}

impl StoredRow {
    fn into_row(self) -> Result<AggregateRow, PipelineError> {
        let key = AggregationKey::from_columns(
            from_sql_id(self.market_id)?,
            from_sql_id(self.category_id)?,
            from_sql_id(self.vendor_id)?,
        )
        .map_err(|e| PipelineError::Storage(format!("row for {}: {}", self.create_date, e)))?;

        let extra: BTreeMap<String, Option<f64>> = serde_json::from_str(&self.extra)
            .map_err(|e| PipelineError::Storage(format!("extra measures for {}: {}", self.create_date, e)))?;

        let measures = MeasureValues {
            full_discount_price: self.full_discount_price,
            full_price: self.full_price,
            full_discount_price_mean: self.full_discount_price_mean,
            full_price_mean: self.full_price_mean,
            extra,
        };
        Ok(AggregateRow::new(self.create_date, key, measures))
    }
}

fn to_sql_id(id: Option<EntityId>) -> Option<i64> {
    id.map(|id| id as i64)
}

fn from_sql_id(id: Option<i64>) -> Result<Option<EntityId>, PipelineError> {
    id.map(|id| {
        EntityId::try_from(id).map_err(|_| PipelineError::Storage(format!("negative identifier {}", id)))
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sample_table() -> AggregateTable {
        let mut market = MeasureValues::default();
        market.full_price = Some(100.0);
        market.full_discount_price = Some(90.0);
        market.full_price_mean = Some(50.0);
        market.set("basket_size", Some(2.5));

        let mut total = MeasureValues::default();
        total.full_price = Some(150.0);
        total.full_discount_price = Some(120.0);
        total.set("basket_size", None);

        AggregateTable::new(vec![
            AggregateRow::new(date(2023, 1, 2), AggregationKey::Market(276), market.clone()),
            AggregateRow::new(date(2023, 1, 2), AggregationKey::Total, total.clone()),
            AggregateRow::new(date(2023, 1, 1), AggregationKey::Vendor(104448), market),
            AggregateRow::new(date(2023, 1, 1), AggregationKey::Total, total),
        ])
    }

    #[test]
    fn test_schema_creation_in_memory() {
        let store = SqliteAggregateStore::new_in_memory().unwrap();
        assert!(store.table_exists("aggregates").unwrap());
        assert!(!store.table_exists("nonexistent_table").unwrap());
    }

    #[test]
    fn test_schema_creation_idempotent() {
        let store = SqliteAggregateStore::new_in_memory().unwrap();
        store.ensure_schema().unwrap();
        assert!(store.table_exists("aggregates").unwrap());
    }

    #[test]
    fn test_index_created() {
        let store = SqliteAggregateStore::new_in_memory().unwrap();
        let mut stmt = store
            .connection()
            .prepare("SELECT name FROM sqlite_master WHERE type='index' AND name LIKE 'idx_aggregates%'")
            .unwrap();
        let names: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(names, vec!["idx_aggregates_create_date".to_string()]);
    }

    #[test]
    fn test_save_then_load_preserves_rows() {
        let mut store = SqliteAggregateStore::new_in_memory().unwrap();
        let table = sample_table();
        store.save(&table).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded, table);
        assert_eq!(loaded.rows()[0].key, AggregationKey::Vendor(104448));
        assert_eq!(
            loaded.rows()[0].measures.get_column("basket_size"),
            Some(2.5)
        );
    }

    #[test]
    fn test_save_replaces_previous_contents() {
        let mut store = SqliteAggregateStore::new_in_memory().unwrap();
        store.save(&sample_table()).unwrap();

        let smaller = AggregateTable::new(vec![AggregateRow::placeholder(
            date(2023, 2, 1),
            AggregationKey::Total,
            std::iter::empty(),
        )]);
        store.save(&smaller).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded.rows()[0].measures.is_unset());
    }

    #[test]
    fn test_load_empty_store() {
        let store = SqliteAggregateStore::new_in_memory().unwrap();
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_invalid_key_columns_are_reported() {
        let store = SqliteAggregateStore::new_in_memory().unwrap();
        store
            .connection()
            .execute(
                "INSERT INTO aggregates (row_order, create_date, market_id, category_id, extra)
                 VALUES (0, '2023-01-01', 1, 2, '{}')",
                [],
            )
            .unwrap();

        match store.load() {
            Err(PipelineError::Storage(msg)) => assert!(msg.contains("2023-01-01"), "{}", msg),
            other => panic!("Unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_file_store_persists_across_connections() {
        let path = std::env::temp_dir().join(format!(
            "purchase_series_store_{}.db",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);

        {
            let mut store = SqliteAggregateStore::new(&path).unwrap();
            store.save(&sample_table()).unwrap();
        }
        let reopened = SqliteAggregateStore::new(&path).unwrap();
        assert_eq!(reopened.load().unwrap().len(), 4);

        drop(reopened);
        let _ = std::fs::remove_file(&path);
    }
}
