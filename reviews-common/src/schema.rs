//! `reviews` table schema
//!
//! Single source of truth for the ten review columns. Each backend renders its
//! own DDL from [`REVIEW_COLUMNS`], so column order and naming cannot drift
//! between the SQLite and ClickHouse tables.

use crate::{Error, Result};

/// Default table name
pub const REVIEWS_TABLE: &str = "reviews";

/// Column order used for every bulk write
pub const COLUMN_ORDER: [&str; 10] = [
    "rating",
    "title",
    "text",
    "images",
    "asin",
    "parent_asin",
    "user_id",
    "timestamp",
    "helpful_vote",
    "verified_purchase",
];

/// Records per flush unless configured otherwise
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Natural-key columns, also the ClickHouse sort key
pub const NATURAL_KEY_COLUMNS: [&str; 3] = ["asin", "user_id", "timestamp"];

/// SQL dialect of a store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    ClickHouse,
}

/// Column definition with per-dialect types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDefinition {
    /// Column name
    pub name: &'static str,
    /// SQLite type and constraints
    pub sqlite_type: &'static str,
    /// ClickHouse type
    pub clickhouse_type: &'static str,
}

impl ColumnDefinition {
    const fn new(
        name: &'static str,
        sqlite_type: &'static str,
        clickhouse_type: &'static str,
    ) -> Self {
        Self {
            name,
            sqlite_type,
            clickhouse_type,
        }
    }

    /// Type for the given dialect
    pub fn sql_type(&self, dialect: Dialect) -> &'static str {
        match dialect {
            Dialect::Sqlite => self.sqlite_type,
            Dialect::ClickHouse => self.clickhouse_type,
        }
    }
}

/// The ten review columns, in [`COLUMN_ORDER`]
pub const REVIEW_COLUMNS: [ColumnDefinition; 10] = [
    ColumnDefinition::new("rating", "REAL NOT NULL DEFAULT 0", "Float32"),
    ColumnDefinition::new("title", "TEXT NOT NULL DEFAULT ''", "String"),
    ColumnDefinition::new("text", "TEXT NOT NULL DEFAULT ''", "String"),
    ColumnDefinition::new("images", "TEXT NOT NULL DEFAULT '[]'", "String"),
    ColumnDefinition::new("asin", "TEXT NOT NULL DEFAULT ''", "String"),
    ColumnDefinition::new("parent_asin", "TEXT NOT NULL DEFAULT ''", "String"),
    ColumnDefinition::new("user_id", "TEXT NOT NULL DEFAULT ''", "String"),
    // Epoch milliseconds in SQLite
    ColumnDefinition::new("timestamp", "INTEGER NOT NULL DEFAULT 0", "DateTime64(3, 'UTC')"),
    ColumnDefinition::new(
        "helpful_vote",
        "INTEGER NOT NULL DEFAULT 0 CHECK (helpful_vote >= 0)",
        "UInt32",
    ),
    ColumnDefinition::new(
        "verified_purchase",
        "INTEGER NOT NULL DEFAULT 0 CHECK (verified_purchase IN (0, 1))",
        "UInt8",
    ),
];

/// Reject anything but plain identifiers before they are spliced into SQL text
pub fn validate_identifier(name: &str) -> Result<&str> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);
    if valid_start && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(name)
    } else {
        Err(Error::InvalidInput(format!("invalid table identifier: {:?}", name)))
    }
}

/// Bulk writes must use exactly [`COLUMN_ORDER`]
pub fn check_column_order(columns: &[&str]) -> Result<()> {
    if columns == COLUMN_ORDER {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "bulk insert columns {:?} do not match table column order {:?}",
            columns, COLUMN_ORDER
        )))
    }
}

/// Comma-separated column list
pub fn column_list() -> String {
    COLUMN_ORDER.join(", ")
}

/// `CREATE TABLE IF NOT EXISTS` statement for the review table
///
/// SQLite gets a plain table plus a separate natural-key index (see
/// [`sqlite_natural_key_index`]); ClickHouse gets a `ReplacingMergeTree`
/// ordered by the natural key.
pub fn create_table_sql(table: &str, dialect: Dialect) -> Result<String> {
    let table = validate_identifier(table)?;
    let columns = REVIEW_COLUMNS
        .iter()
        .map(|c| format!("    {} {}", c.name, c.sql_type(dialect)))
        .collect::<Vec<_>>()
        .join(",\n");

    Ok(match dialect {
        Dialect::Sqlite => format!("CREATE TABLE IF NOT EXISTS {} (\n{}\n)", table, columns),
        Dialect::ClickHouse => format!(
            "CREATE TABLE IF NOT EXISTS {} (\n{}\n) ENGINE = ReplacingMergeTree()\nORDER BY ({})",
            table,
            columns,
            NATURAL_KEY_COLUMNS.join(", ")
        ),
    })
}

/// Non-unique index backing the SQLite existence check
pub fn sqlite_natural_key_index(table: &str) -> Result<String> {
    let table = validate_identifier(table)?;
    Ok(format!(
        "CREATE INDEX IF NOT EXISTS idx_{}_natural_key ON {} ({})",
        table,
        table,
        NATURAL_KEY_COLUMNS.join(", ")
    ))
}

/// `DROP TABLE IF EXISTS` statement
pub fn drop_table_sql(table: &str) -> Result<String> {
    Ok(format!("DROP TABLE IF EXISTS {}", validate_identifier(table)?))
}
