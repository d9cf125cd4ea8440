//! SQLite store schema and lookup tests

mod helpers;

use helpers::{count_rows, create_test_store};
use reviews_common::{Error, NaturalKey, Review, COLUMN_ORDER, REVIEWS_TABLE};
use reviews_ingest::store::{ReviewStore, SqliteStore};
use tempfile::TempDir;

fn review(asin: &str, user_id: &str, timestamp: i64) -> Review {
    Review {
        asin: asin.to_string(),
        user_id: user_id.to_string(),
        timestamp,
        rating: 3.0,
        ..Review::default()
    }
}

/// Column names from PRAGMA table_info, in table order
async fn table_columns(store: &SqliteStore) -> Vec<String> {
    store
        .execute_query(&format!("PRAGMA table_info({})", REVIEWS_TABLE))
        .await
        .unwrap()
        .iter()
        .map(|row| row[1].as_text().unwrap())
        .collect()
}

#[tokio::test]
async fn test_schema_has_ten_columns_in_order() {
    let store = create_test_store().await;
    assert_eq!(table_columns(&store).await, COLUMN_ORDER.to_vec());
}

#[tokio::test]
async fn test_ensure_schema_is_idempotent() {
    let store = create_test_store().await;
    store
        .bulk_insert(REVIEWS_TABLE, &[review("A", "U", 1)], &COLUMN_ORDER)
        .await
        .unwrap();

    store.ensure_schema(REVIEWS_TABLE).await.unwrap();

    assert_eq!(count_rows(&store).await, 1);
}

#[tokio::test]
async fn test_reset_schema_empties_table() {
    let store = create_test_store().await;
    store
        .bulk_insert(REVIEWS_TABLE, &[review("A", "U", 1), review("B", "U", 2)], &COLUMN_ORDER)
        .await
        .unwrap();

    store.reset_schema(REVIEWS_TABLE).await.unwrap();

    assert_eq!(count_rows(&store).await, 0);
    assert_eq!(table_columns(&store).await, COLUMN_ORDER.to_vec());
}

#[tokio::test]
async fn test_bulk_insert_rejects_other_column_order() {
    let store = create_test_store().await;
    let mut columns = COLUMN_ORDER.to_vec();
    columns.swap(0, 1);

    let result = store
        .bulk_insert(REVIEWS_TABLE, &[review("A", "U", 1)], &columns)
        .await;

    assert!(matches!(result, Err(Error::InvalidInput(_))));
    assert_eq!(count_rows(&store).await, 0);
}

#[tokio::test]
async fn test_bulk_insert_empty_rows() {
    let store = create_test_store().await;
    let written = store.bulk_insert(REVIEWS_TABLE, &[], &COLUMN_ORDER).await.unwrap();
    assert_eq!(written, 0);
}

#[tokio::test]
async fn test_identity_is_not_store_enforced() {
    let store = create_test_store().await;
    let rows = [review("A", "U", 1), review("A", "U", 1)];

    // Deduplication is the loader's job; the table accepts repeated keys
    store.bulk_insert(REVIEWS_TABLE, &rows, &COLUMN_ORDER).await.unwrap();

    assert_eq!(count_rows(&store).await, 2);
}

#[tokio::test]
async fn test_existing_keys_spans_lookup_chunks() {
    let store = create_test_store().await;
    store
        .bulk_insert(
            REVIEWS_TABLE,
            &[review("K0", "U", 0), review("K10049", "U", 10_049)],
            &COLUMN_ORDER,
        )
        .await
        .unwrap();

    let keys: Vec<NaturalKey> = (0..10_050)
        .map(|i| NaturalKey::new(format!("K{}", i), "U", i))
        .collect();
    let found = store.existing_keys(REVIEWS_TABLE, &keys).await.unwrap();

    assert_eq!(found.len(), 2);
    assert!(found.contains(&NaturalKey::new("K0", "U", 0)));
    assert!(found.contains(&NaturalKey::new("K10049", "U", 10_049)));
}

#[tokio::test]
async fn test_existing_keys_matches_whole_key_only() {
    let store = create_test_store().await;
    store
        .bulk_insert(REVIEWS_TABLE, &[review("A", "U", 1)], &COLUMN_ORDER)
        .await
        .unwrap();

    let keys = [
        NaturalKey::new("A", "U", 2),
        NaturalKey::new("A", "V", 1),
        NaturalKey::new("B", "U", 1),
    ];
    let found = store.existing_keys(REVIEWS_TABLE, &keys).await.unwrap();

    assert!(found.is_empty());
}

#[tokio::test]
async fn test_invalid_table_name_is_rejected() {
    let store = create_test_store().await;
    let result = store
        .existing_keys("reviews WHERE 1=1 --", &[NaturalKey::new("A", "U", 1)])
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_on_disk_database_persists() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("nested").join("reviews.db");

    {
        let store = SqliteStore::connect(&db_path).await.unwrap();
        store.ensure_schema(REVIEWS_TABLE).await.unwrap();
        store
            .bulk_insert(REVIEWS_TABLE, &[review("A", "U", 1)], &COLUMN_ORDER)
            .await
            .unwrap();
        store.pool().close().await;
    }

    assert!(db_path.exists());
    let reopened = SqliteStore::connect(&db_path).await.unwrap();
    let found = reopened
        .existing_keys(REVIEWS_TABLE, &[NaturalKey::new("A", "U", 1)])
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
}
