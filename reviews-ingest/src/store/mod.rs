//! Store clients
//!
//! [`ReviewStore`] is the seam between the loader/analytics and the database.
//! Two backends implement it:
//! - [`SqliteStore`]: local SQLite file via sqlx
//! - [`ClickHouseStore`]: ClickHouse HTTP interface via reqwest

pub mod clickhouse;
pub mod sqlite;

pub use clickhouse::{ClickHouseConfig, ClickHouseStore};
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use reviews_common::config::{Backend, Settings};
use reviews_common::{Dialect, NaturalKey, Result, Review};
use std::collections::HashSet;

/// One cell of a query result row
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl SqlValue {
    /// Integer view (floats truncate, numeric text is parsed)
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Int(i) => Some(*i),
            SqlValue::Float(f) => Some(*f as i64),
            SqlValue::Text(s) => s.parse().ok(),
            SqlValue::Null => None,
        }
    }

    /// Float view (numeric text is parsed)
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SqlValue::Int(i) => Some(*i as f64),
            SqlValue::Float(f) => Some(*f),
            SqlValue::Text(s) => s.parse().ok(),
            SqlValue::Null => None,
        }
    }

    /// Text view of any non-null value
    pub fn as_text(&self) -> Option<String> {
        match self {
            SqlValue::Text(s) => Some(s.clone()),
            SqlValue::Int(i) => Some(i.to_string()),
            SqlValue::Float(f) => Some(f.to_string()),
            SqlValue::Null => None,
        }
    }
}

/// Rows returned by [`ReviewStore::execute_query`], one tuple per row
pub type QueryRows = Vec<Vec<SqlValue>>;

/// Store client operations used by the loader and the analytics queries
#[async_trait]
pub trait ReviewStore: Send + Sync {
    /// SQL dialect, used to pick analytics query variants
    fn dialect(&self) -> Dialect;

    /// Run a DDL/DML statement that returns no rows
    async fn execute_command(&self, sql: &str) -> Result<()>;

    /// Run a query; each tuple matches the `SELECT` column list
    async fn execute_query(&self, sql: &str) -> Result<QueryRows>;

    /// Write all rows in one bulk operation
    ///
    /// `columns` must be exactly [`reviews_common::COLUMN_ORDER`]. Returns the
    /// number of rows written.
    async fn bulk_insert(&self, table: &str, rows: &[Review], columns: &[&str]) -> Result<u64>;

    /// Which of `keys` are already stored
    ///
    /// One logical lookup per call with bound parameters; key values never
    /// become part of the SQL text.
    async fn existing_keys(&self, table: &str, keys: &[NaturalKey]) -> Result<HashSet<NaturalKey>>;

    /// Create the review table if missing
    async fn ensure_schema(&self, table: &str) -> Result<()>;

    /// Drop and recreate the review table
    async fn reset_schema(&self, table: &str) -> Result<()>;
}

/// Open the configured backend
pub async fn open_store(settings: &Settings) -> Result<Box<dyn ReviewStore>> {
    match settings.backend {
        Backend::Sqlite => {
            tracing::info!("Database path: {}", settings.sqlite_path.display());
            let store = SqliteStore::connect(&settings.sqlite_path).await?;
            Ok(Box::new(store))
        }
        Backend::Clickhouse => {
            tracing::info!(
                url = %settings.clickhouse.url,
                database = %settings.clickhouse.database,
                "Connecting to ClickHouse"
            );
            let store = ClickHouseStore::connect(ClickHouseConfig::from(&settings.clickhouse)).await?;
            Ok(Box::new(store))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_value_views() {
        assert_eq!(SqlValue::Int(3).as_f64(), Some(3.0));
        assert_eq!(SqlValue::Float(4.9).as_i64(), Some(4));
        assert_eq!(SqlValue::Text("17".to_string()).as_i64(), Some(17));
        assert_eq!(SqlValue::Int(5).as_text().as_deref(), Some("5"));
        assert_eq!(SqlValue::Null.as_f64(), None);
        assert_eq!(SqlValue::Null.as_text(), None);
    }
}
