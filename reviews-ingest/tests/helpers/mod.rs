//! Shared integration test utilities

#![allow(dead_code)]

pub mod faulty_store;

pub use faulty_store::FaultyStore;

use reviews_common::REVIEWS_TABLE;
use reviews_ingest::store::{ReviewStore, SqliteStore};
use reviews_ingest::JsonLineSource;
use serde_json::json;
use std::io::Cursor;
use std::path::{Path, PathBuf};

/// In-memory SQLite store with the review table created
pub async fn create_test_store() -> SqliteStore {
    let store = SqliteStore::in_memory().await.unwrap();
    store.ensure_schema(REVIEWS_TABLE).await.unwrap();
    store
}

/// One NDJSON review line with the natural key and rating set
pub fn review_line(asin: &str, user_id: &str, timestamp: i64, rating: f64) -> String {
    json!({
        "asin": asin,
        "user_id": user_id,
        "timestamp": timestamp,
        "rating": rating,
        "title": format!("Review of {}", asin),
        "text": "Works as described",
        "images": [],
        "parent_asin": format!("P-{}", asin),
        "helpful_vote": 0,
        "verified_purchase": true
    })
    .to_string()
}

/// `count` lines with pairwise distinct natural keys
pub fn distinct_lines(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| review_line(&format!("A{}", i), &format!("U{}", i % 7), 1_600_000_000_000 + i as i64, 4.0))
        .collect()
}

/// Source over in-memory NDJSON text
pub fn source_of(lines: &[String]) -> JsonLineSource<Cursor<String>> {
    let mut text = lines.join("\n");
    text.push('\n');
    JsonLineSource::new(Cursor::new(text))
}

/// Write lines to `dir/name` as an NDJSON file
pub fn write_jsonl(dir: &Path, name: &str, lines: &[String]) -> PathBuf {
    let path = dir.join(name);
    let mut text = lines.join("\n");
    text.push('\n');
    std::fs::write(&path, text).unwrap();
    path
}

/// Row count of the review table
pub async fn count_rows<S: ReviewStore + ?Sized>(store: &S) -> i64 {
    let rows = store
        .execute_query(&format!("SELECT COUNT(*) FROM {}", REVIEWS_TABLE))
        .await
        .unwrap();
    rows[0][0].as_i64().unwrap()
}
