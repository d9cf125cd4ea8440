//! ClickHouse review store over the HTTP interface
//!
//! The table is a `ReplacingMergeTree` ordered by the natural key, but merges
//! run in the background and are never relied on before the next read. The
//! loader's own existence check is what keeps the table duplicate-free.
//!
//! Key values for the existence check travel as server-side query parameters
//! (`param_*` URL arguments), never as part of the SQL text.

use super::{QueryRows, ReviewStore, SqlValue};
use async_trait::async_trait;
use chrono::DateTime;
use reviews_common::config::ClickHouseSettings;
use reviews_common::schema::{
    check_column_order, column_list, create_table_sql, drop_table_sql, validate_identifier,
};
use reviews_common::{Dialect, Error, NaturalKey, Result, Review};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info};

const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Connection settings for [`ClickHouseStore`]
#[derive(Debug, Clone)]
pub struct ClickHouseConfig {
    /// HTTP interface URL, e.g. `http://localhost:8123`
    pub url: String,
    pub user: String,
    pub password: String,
    pub database: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl From<&ClickHouseSettings> for ClickHouseConfig {
    fn from(settings: &ClickHouseSettings) -> Self {
        Self {
            url: settings.url.clone(),
            user: settings.user.clone(),
            password: settings.password.clone(),
            database: settings.database.clone(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// ClickHouse-backed [`ReviewStore`]
pub struct ClickHouseStore {
    client: reqwest::Client,
    config: ClickHouseConfig,
}

/// `FORMAT JSONCompact` response body
#[derive(Debug, Deserialize)]
struct JsonCompactResponse {
    data: Vec<Vec<Value>>,
}

/// One row in `FORMAT JSONEachRow`, matching the table column order
#[derive(Debug, Serialize)]
struct InsertRow<'a> {
    rating: f32,
    title: &'a str,
    text: &'a str,
    images: &'a str,
    asin: &'a str,
    parent_asin: &'a str,
    user_id: &'a str,
    timestamp: String,
    helpful_vote: u32,
    verified_purchase: u8,
}

impl<'a> InsertRow<'a> {
    fn from_review(review: &'a Review) -> Result<Self> {
        Ok(Self {
            rating: review.rating,
            title: &review.title,
            text: &review.text,
            images: &review.images,
            asin: &review.asin,
            parent_asin: &review.parent_asin,
            user_id: &review.user_id,
            timestamp: format_datetime64(review.timestamp)?,
            helpful_vote: review.helpful_vote,
            verified_purchase: review.verified_flag(),
        })
    }
}

impl ClickHouseStore {
    /// Build the HTTP client and verify the server answers `SELECT 1`
    ///
    /// Any failure here is a [`Error::StoreConnectivity`]: there is no point
    /// starting a load against a store that cannot be reached.
    pub async fn connect(config: ClickHouseConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::StoreConnectivity(format!("cannot build HTTP client: {}", e)))?;

        let store = Self { client, config };
        store.execute_query("SELECT 1").await.map_err(|e| {
            Error::StoreConnectivity(format!(
                "ClickHouse at {} is not reachable: {}",
                store.config.url, e
            ))
        })?;

        info!(url = %store.config.url, "✓ Connected to ClickHouse");
        Ok(store)
    }

    /// POST `body` with the given URL parameters and return the response text
    async fn post(&self, params: &[(String, String)], body: String) -> Result<String> {
        let response = self
            .client
            .post(&self.config.url)
            .header("X-ClickHouse-User", &self.config.user)
            .header("X-ClickHouse-Key", &self.config.password)
            .query(&[("database", self.config.database.as_str())])
            .query(params)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    Error::StoreConnectivity(e.to_string())
                } else {
                    Error::Http(e.to_string())
                }
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::Http(format!("reading response body failed: {}", e)))?;

        if status.is_success() {
            Ok(text)
        } else if status == reqwest::StatusCode::UNAUTHORIZED
            || status == reqwest::StatusCode::FORBIDDEN
        {
            Err(Error::StoreConnectivity(format!(
                "ClickHouse rejected credentials ({}): {}",
                status,
                text.trim()
            )))
        } else {
            Err(Error::Http(format!(
                "ClickHouse returned {}: {}",
                status,
                text.trim()
            )))
        }
    }

    /// Run a query in `JSONCompact` format with 64-bit integers unquoted
    async fn query_compact(&self, sql: &str, mut params: Vec<(String, String)>) -> Result<QueryRows> {
        params.push(("default_format".to_string(), "JSONCompact".to_string()));
        params.push((
            "output_format_json_quote_64bit_integers".to_string(),
            "0".to_string(),
        ));

        let body = self.post(&params, sql.to_string()).await?;
        let response: JsonCompactResponse = serde_json::from_str(&body)?;
        Ok(response
            .data
            .into_iter()
            .map(|row| row.into_iter().map(json_to_sql_value).collect())
            .collect())
    }
}

#[async_trait]
impl ReviewStore for ClickHouseStore {
    fn dialect(&self) -> Dialect {
        Dialect::ClickHouse
    }

    async fn execute_command(&self, sql: &str) -> Result<()> {
        self.post(&[], sql.to_string()).await?;
        Ok(())
    }

    async fn execute_query(&self, sql: &str) -> Result<QueryRows> {
        self.query_compact(sql, Vec::new()).await
    }

    async fn bulk_insert(&self, table: &str, rows: &[Review], columns: &[&str]) -> Result<u64> {
        let table = validate_identifier(table)?;
        check_column_order(columns)?;
        if rows.is_empty() {
            return Ok(0);
        }

        let mut body = String::new();
        for review in rows {
            body.push_str(&serde_json::to_string(&InsertRow::from_review(review)?)?);
            body.push('\n');
        }

        let query = format!("INSERT INTO {} ({}) FORMAT JSONEachRow", table, column_list());
        debug!(rows = rows.len(), bytes = body.len(), "Sending bulk insert");
        self.post(&[("query".to_string(), query)], body).await?;

        Ok(rows.len() as u64)
    }

    async fn existing_keys(&self, table: &str, keys: &[NaturalKey]) -> Result<HashSet<NaturalKey>> {
        let table = validate_identifier(table)?;
        if keys.is_empty() {
            return Ok(HashSet::new());
        }

        let sql = format!(
            "SELECT asin, user_id, toUnixTimestamp64Milli(timestamp) \
             FROM {} \
             WHERE (asin, user_id, timestamp) IN ( \
                 SELECT k.1, k.2, fromUnixTimestamp64Milli(k.3, 'UTC') \
                 FROM (SELECT arrayJoin(arrayZip( \
                     {{asins:Array(String)}}, {{users:Array(String)}}, {{stamps:Array(Int64)}})) AS k))",
            table
        );

        let params = vec![
            (
                "param_asins".to_string(),
                string_array_param(keys.iter().map(|k| k.asin.as_str())),
            ),
            (
                "param_users".to_string(),
                string_array_param(keys.iter().map(|k| k.user_id.as_str())),
            ),
            (
                "param_stamps".to_string(),
                int_array_param(keys.iter().map(|k| k.timestamp)),
            ),
        ];

        let rows = self.query_compact(&sql, params).await?;
        rows.into_iter()
            .map(|row| match row.as_slice() {
                [asin, user_id, timestamp] => Ok(NaturalKey {
                    asin: asin.as_text().unwrap_or_default(),
                    user_id: user_id.as_text().unwrap_or_default(),
                    timestamp: timestamp.as_i64().ok_or_else(|| {
                        Error::Internal("existence check returned a non-integer timestamp".to_string())
                    })?,
                }),
                other => Err(Error::Internal(format!(
                    "existence check returned {} columns, expected 3",
                    other.len()
                ))),
            })
            .collect()
    }

    async fn ensure_schema(&self, table: &str) -> Result<()> {
        self.execute_command(&create_table_sql(table, Dialect::ClickHouse)?)
            .await?;
        info!("Table '{}' ready", table);
        Ok(())
    }

    async fn reset_schema(&self, table: &str) -> Result<()> {
        info!("Dropping table '{}' if it exists...", table);
        self.execute_command(&drop_table_sql(table)?).await?;
        self.ensure_schema(table).await
    }
}

/// Epoch milliseconds as a `DateTime64(3)` literal in UTC
fn format_datetime64(millis: i64) -> Result<String> {
    DateTime::from_timestamp_millis(millis)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
        .ok_or_else(|| Error::InvalidInput(format!("timestamp {} is out of range", millis)))
}

/// Quote a string for the query-parameter text format
fn quote_param_string(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '\'' => quoted.push_str("\\'"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            '\0' => quoted.push_str("\\0"),
            other => quoted.push(other),
        }
    }
    quoted.push('\'');
    quoted
}

/// `Array(String)` parameter value
fn string_array_param<'a>(values: impl Iterator<Item = &'a str>) -> String {
    let items: Vec<String> = values.map(quote_param_string).collect();
    format!("[{}]", items.join(","))
}

/// `Array(Int64)` parameter value
fn int_array_param(values: impl Iterator<Item = i64>) -> String {
    let items: Vec<String> = values.map(|v| v.to_string()).collect();
    format!("[{}]", items.join(","))
}

fn json_to_sql_value(value: Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Int(i64::from(b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Int(i),
            None => SqlValue::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => SqlValue::Text(s),
        other => SqlValue::Text(other.to_string()),
    }
}
