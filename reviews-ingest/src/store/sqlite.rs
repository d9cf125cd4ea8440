//! SQLite review store
//!
//! Timestamps are stored as INTEGER epoch milliseconds and
//! `verified_purchase` as INTEGER 0/1. The natural key is indexed but not
//! unique, so a bulk insert never fails on an existing key; deduplication is
//! entirely the loader's job.

use super::{QueryRows, ReviewStore, SqlValue};
use async_trait::async_trait;
use reviews_common::schema::{
    check_column_order, column_list, create_table_sql, drop_table_sql, sqlite_natural_key_index,
    validate_identifier,
};
use reviews_common::{Dialect, Error, NaturalKey, Result, Review};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, TypeInfo, ValueRef};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

/// Keys per lookup statement; SQLite caps bound parameters at 32766
const MAX_KEYS_PER_QUERY: usize = 10_000;

/// SQLite-backed [`ReviewStore`]
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a database file
    pub async fn connect(db_path: &Path) -> Result<Self> {
        let newly_created = !db_path.exists();

        // Ensure parent directory exists
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        // mode=rwc: read, write, create
        let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
        debug!("Connecting to database: {}", db_url);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect(&db_url)
            .await
            .map_err(|e| {
                Error::StoreConnectivity(format!(
                    "cannot open SQLite database {}: {}",
                    db_path.display(),
                    e
                ))
            })?;

        if newly_created {
            info!("Initialized new database: {}", db_path.display());
        } else {
            info!("Opened existing database: {}", db_path.display());
        }

        // WAL keeps report queries from blocking on a running load
        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&pool)
            .await?;

        Ok(Self { pool })
    }

    /// Private in-memory database
    ///
    /// Pinned to one connection that never expires: every new `:memory:`
    /// connection would otherwise be a separate, empty database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| Error::StoreConnectivity(format!("cannot open in-memory SQLite: {}", e)))?;

        Ok(Self { pool })
    }

    /// Underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl ReviewStore for SqliteStore {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn execute_command(&self, sql: &str) -> Result<()> {
        sqlx::query(sql).execute(&self.pool).await?;
        Ok(())
    }

    async fn execute_query(&self, sql: &str) -> Result<QueryRows> {
        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;
        rows.iter().map(decode_row).collect()
    }

    async fn bulk_insert(&self, table: &str, rows: &[Review], columns: &[&str]) -> Result<u64> {
        let table = validate_identifier(table)?;
        check_column_order(columns)?;
        if rows.is_empty() {
            return Ok(0);
        }

        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            column_list(),
            placeholders
        );

        // One transaction per batch: either every row lands or none does
        let mut tx = self.pool.begin().await?;
        for review in rows {
            sqlx::query(&sql)
                .bind(f64::from(review.rating))
                .bind(&review.title)
                .bind(&review.text)
                .bind(&review.images)
                .bind(&review.asin)
                .bind(&review.parent_asin)
                .bind(&review.user_id)
                .bind(review.timestamp)
                .bind(i64::from(review.helpful_vote))
                .bind(i64::from(review.verified_flag()))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        Ok(rows.len() as u64)
    }

    async fn existing_keys(&self, table: &str, keys: &[NaturalKey]) -> Result<HashSet<NaturalKey>> {
        let table = validate_identifier(table)?;
        let mut found = HashSet::new();

        for chunk in keys.chunks(MAX_KEYS_PER_QUERY) {
            let tuples = vec!["(?, ?, ?)"; chunk.len()].join(", ");
            let sql = format!(
                "SELECT asin, user_id, timestamp FROM {} \
                 WHERE (asin, user_id, timestamp) IN (VALUES {})",
                table, tuples
            );

            let mut query = sqlx::query_as::<_, (String, String, i64)>(&sql);
            for key in chunk {
                query = query.bind(&key.asin).bind(&key.user_id).bind(key.timestamp);
            }

            for (asin, user_id, timestamp) in query.fetch_all(&self.pool).await? {
                found.insert(NaturalKey {
                    asin,
                    user_id,
                    timestamp,
                });
            }
        }

        Ok(found)
    }

    async fn ensure_schema(&self, table: &str) -> Result<()> {
        self.execute_command(&create_table_sql(table, Dialect::Sqlite)?)
            .await?;
        self.execute_command(&sqlite_natural_key_index(table)?).await?;
        info!("Table '{}' ready", table);
        Ok(())
    }

    async fn reset_schema(&self, table: &str) -> Result<()> {
        info!("Dropping table '{}' if it exists...", table);
        self.execute_command(&drop_table_sql(table)?).await?;
        self.ensure_schema(table).await
    }
}

/// Decode a row by the storage class of each value
fn decode_row(row: &SqliteRow) -> Result<Vec<SqlValue>> {
    let mut values = Vec::with_capacity(row.len());
    for idx in 0..row.len() {
        let (is_null, type_name) = {
            let raw = row.try_get_raw(idx)?;
            (raw.is_null(), raw.type_info().name().to_string())
        };

        let value = if is_null {
            SqlValue::Null
        } else {
            match type_name.as_str() {
                "INTEGER" | "BOOLEAN" => SqlValue::Int(row.try_get::<i64, _>(idx)?),
                "REAL" => SqlValue::Float(row.try_get::<f64, _>(idx)?),
                "BLOB" => {
                    let bytes: Vec<u8> = row.try_get(idx)?;
                    SqlValue::Text(String::from_utf8_lossy(&bytes).into_owned())
                }
                _ => SqlValue::Text(row.try_get::<String, _>(idx)?),
            }
        };
        values.push(value);
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_decode_row_storage_classes() {
        let store = SqliteStore::in_memory().await.unwrap();

        let rows = store
            .execute_query("SELECT 1, 2.5, 'text', NULL")
            .await
            .unwrap();

        assert_eq!(
            rows,
            vec![vec![
                SqlValue::Int(1),
                SqlValue::Float(2.5),
                SqlValue::Text("text".to_string()),
                SqlValue::Null,
            ]]
        );
    }

    #[tokio::test]
    async fn test_in_memory_store_keeps_data_between_calls() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.ensure_schema("reviews").await.unwrap();

        store
            .execute_command("INSERT INTO reviews (asin, user_id, timestamp) VALUES ('A', 'U', 1)")
            .await
            .unwrap();

        let rows = store.execute_query("SELECT COUNT(*) FROM reviews").await.unwrap();
        assert_eq!(rows[0][0], SqlValue::Int(1));
    }
}
