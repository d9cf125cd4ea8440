//! Read-side review analytics
//!
//! Five parameterless aggregations over the review table. Each query has a
//! SQLite and a ClickHouse rendition; the store's [`Dialect`] picks one.

pub mod charts;

use crate::store::{ReviewStore, SqlValue};
use reviews_common::schema::validate_identifier;
use reviews_common::{Dialect, Error, Result};
use std::fmt;

/// Rows shown by the product and reviewer rankings
pub const TOP_LIMIT: usize = 10;

/// Product ranked by review count
#[derive(Debug, Clone, PartialEq)]
pub struct ProductSummary {
    pub asin: String,
    pub reviews: u64,
    /// Mean rating rounded to 2 decimals
    pub avg_rating: f64,
}

/// One bar of the rating histogram
#[derive(Debug, Clone, PartialEq)]
pub struct RatingBucket {
    pub rating: f64,
    pub count: u64,
}

/// Reviews posted in one calendar month
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthlyCount {
    /// First day of the month, `YYYY-MM-01`
    pub month: String,
    pub reviews: u64,
}

/// Reviewer ranked by review count
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewerSummary {
    pub user_id: String,
    pub reviews: u64,
}

fn text_at(row: &[SqlValue], idx: usize, what: &str) -> Result<String> {
    row.get(idx)
        .and_then(SqlValue::as_text)
        .ok_or_else(|| Error::Internal(format!("{}: missing text column {}", what, idx)))
}

fn count_at(row: &[SqlValue], idx: usize, what: &str) -> Result<u64> {
    row.get(idx)
        .and_then(SqlValue::as_i64)
        .and_then(|n| u64::try_from(n).ok())
        .ok_or_else(|| Error::Internal(format!("{}: missing count column {}", what, idx)))
}

fn float_at(row: &[SqlValue], idx: usize, what: &str) -> Result<f64> {
    row.get(idx)
        .and_then(SqlValue::as_f64)
        .ok_or_else(|| Error::Internal(format!("{}: missing numeric column {}", what, idx)))
}

/// Top products by review count, with average rating
pub async fn top_products<S: ReviewStore + ?Sized>(
    store: &S,
    table: &str,
    limit: usize,
) -> Result<Vec<ProductSummary>> {
    let table = validate_identifier(table)?;
    let sql = match store.dialect() {
        Dialect::Sqlite => format!(
            "SELECT asin, COUNT(*) AS reviews, ROUND(AVG(rating), 2) AS avg_rating \
             FROM {} GROUP BY asin ORDER BY reviews DESC, asin LIMIT {}",
            table, limit
        ),
        Dialect::ClickHouse => format!(
            "SELECT asin, count() AS reviews, round(avg(rating), 2) AS avg_rating \
             FROM {} GROUP BY asin ORDER BY reviews DESC, asin LIMIT {}",
            table, limit
        ),
    };

    store
        .execute_query(&sql)
        .await?
        .iter()
        .map(|row| {
            Ok(ProductSummary {
                asin: text_at(row, 0, "top_products")?,
                reviews: count_at(row, 1, "top_products")?,
                avg_rating: float_at(row, 2, "top_products")?,
            })
        })
        .collect()
}

/// Review count per rating value, ascending by rating
pub async fn rating_distribution<S: ReviewStore + ?Sized>(
    store: &S,
    table: &str,
) -> Result<Vec<RatingBucket>> {
    let table = validate_identifier(table)?;
    let sql = match store.dialect() {
        Dialect::Sqlite => format!(
            "SELECT rating, COUNT(*) AS cnt FROM {} GROUP BY rating ORDER BY rating",
            table
        ),
        Dialect::ClickHouse => format!(
            "SELECT rating, count() AS cnt FROM {} GROUP BY rating ORDER BY rating",
            table
        ),
    };

    store
        .execute_query(&sql)
        .await?
        .iter()
        .map(|row| {
            Ok(RatingBucket {
                rating: float_at(row, 0, "rating_distribution")?,
                count: count_at(row, 1, "rating_distribution")?,
            })
        })
        .collect()
}

/// Percentage of verified-purchase reviews, rounded to 2 decimals
///
/// Returns 0.0 for an empty table.
pub async fn verified_purchase_pct<S: ReviewStore + ?Sized>(store: &S, table: &str) -> Result<f64> {
    let table = validate_identifier(table)?;
    let sql = match store.dialect() {
        Dialect::Sqlite => format!(
            "SELECT ROUND(100.0 * SUM(verified_purchase) / COUNT(*), 2) AS pct_verified FROM {}",
            table
        ),
        Dialect::ClickHouse => format!(
            "SELECT if(count() = 0, 0, round(100 * sum(verified_purchase) / count(), 2)) \
             AS pct_verified FROM {}",
            table
        ),
    };

    let rows = store.execute_query(&sql).await?;
    let pct = rows
        .first()
        .and_then(|row| row.first())
        .and_then(SqlValue::as_f64)
        .filter(|pct| pct.is_finite())
        .unwrap_or(0.0);
    Ok(pct)
}

/// Review count per calendar month, ascending
pub async fn monthly_reviews<S: ReviewStore + ?Sized>(
    store: &S,
    table: &str,
) -> Result<Vec<MonthlyCount>> {
    let table = validate_identifier(table)?;
    let sql = match store.dialect() {
        // timestamp is stored as epoch milliseconds
        Dialect::Sqlite => format!(
            "SELECT strftime('%Y-%m-01', timestamp / 1000, 'unixepoch') AS month, COUNT(*) AS reviews \
             FROM {} GROUP BY month ORDER BY month",
            table
        ),
        Dialect::ClickHouse => format!(
            "SELECT toString(toStartOfMonth(timestamp)) AS month, count() AS reviews \
             FROM {} GROUP BY month ORDER BY month",
            table
        ),
    };

    store
        .execute_query(&sql)
        .await?
        .iter()
        .map(|row| {
            Ok(MonthlyCount {
                month: text_at(row, 0, "monthly_reviews")?,
                reviews: count_at(row, 1, "monthly_reviews")?,
            })
        })
        .collect()
}

/// Most active reviewers by review count
pub async fn top_reviewers<S: ReviewStore + ?Sized>(
    store: &S,
    table: &str,
    limit: usize,
) -> Result<Vec<ReviewerSummary>> {
    let table = validate_identifier(table)?;
    let sql = match store.dialect() {
        Dialect::Sqlite => format!(
            "SELECT user_id, COUNT(*) AS reviews FROM {} \
             GROUP BY user_id ORDER BY reviews DESC, user_id LIMIT {}",
            table, limit
        ),
        Dialect::ClickHouse => format!(
            "SELECT user_id, count() AS reviews FROM {} \
             GROUP BY user_id ORDER BY reviews DESC, user_id LIMIT {}",
            table, limit
        ),
    };

    store
        .execute_query(&sql)
        .await?
        .iter()
        .map(|row| {
            Ok(ReviewerSummary {
                user_id: text_at(row, 0, "top_reviewers")?,
                reviews: count_at(row, 1, "top_reviewers")?,
            })
        })
        .collect()
}

/// All five aggregations, as printed by `reviews-ingest report`
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub top_products: Vec<ProductSummary>,
    pub ratings: Vec<RatingBucket>,
    pub verified_pct: f64,
    pub monthly: Vec<MonthlyCount>,
    pub top_reviewers: Vec<ReviewerSummary>,
}

impl Report {
    pub async fn collect<S: ReviewStore + ?Sized>(store: &S, table: &str) -> Result<Self> {
        Ok(Self {
            top_products: top_products(store, table, TOP_LIMIT).await?,
            ratings: rating_distribution(store, table).await?,
            verified_pct: verified_purchase_pct(store, table).await?,
            monthly: monthly_reviews(store, table).await?,
            top_reviewers: top_reviewers(store, table, TOP_LIMIT).await?,
        })
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Top {} Products by Number of Reviews:", TOP_LIMIT)?;
        writeln!(f, "{:<16} {:>10} {:>10}", "asin", "reviews", "avg_rating")?;
        for p in &self.top_products {
            writeln!(f, "{:<16} {:>10} {:>10.2}", p.asin, p.reviews, p.avg_rating)?;
        }

        writeln!(f)?;
        writeln!(f, "Rating Distribution:")?;
        writeln!(f, "{:<8} {:>10}", "rating", "count")?;
        for r in &self.ratings {
            writeln!(f, "{:<8.1} {:>10}", r.rating, r.count)?;
        }

        writeln!(f)?;
        writeln!(f, "Percentage of Verified Purchases: {:.2}%", self.verified_pct)?;

        writeln!(f)?;
        writeln!(f, "Reviews Over Time:")?;
        writeln!(f, "{:<12} {:>10}", "month", "reviews")?;
        for m in &self.monthly {
            writeln!(f, "{:<12} {:>10}", m.month, m.reviews)?;
        }

        writeln!(f)?;
        writeln!(f, "Top {} Reviewers by Number of Reviews:", TOP_LIMIT)?;
        writeln!(f, "{:<32} {:>10}", "user_id", "reviews")?;
        for u in &self.top_reviewers {
            writeln!(f, "{:<32} {:>10}", u.user_id, u.reviews)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_accessors() {
        let row = vec![
            SqlValue::Text("B00X".to_string()),
            SqlValue::Int(7),
            SqlValue::Float(4.25),
            SqlValue::Null,
        ];
        assert_eq!(text_at(&row, 0, "t").unwrap(), "B00X");
        assert_eq!(count_at(&row, 1, "t").unwrap(), 7);
        assert_eq!(float_at(&row, 2, "t").unwrap(), 4.25);
        assert!(float_at(&row, 3, "t").is_err());
        assert!(text_at(&row, 9, "t").is_err());
    }

    #[test]
    fn test_negative_count_is_rejected() {
        let row = vec![SqlValue::Int(-1)];
        assert!(count_at(&row, 0, "t").is_err());
    }

    #[test]
    fn test_report_display_sections() {
        let report = Report {
            top_products: vec![ProductSummary {
                asin: "A1".to_string(),
                reviews: 3,
                avg_rating: 4.33,
            }],
            ratings: vec![RatingBucket { rating: 5.0, count: 2 }],
            verified_pct: 66.67,
            monthly: vec![MonthlyCount {
                month: "2023-01-01".to_string(),
                reviews: 3,
            }],
            top_reviewers: vec![ReviewerSummary {
                user_id: "U1".to_string(),
                reviews: 3,
            }],
        };

        let text = report.to_string();
        assert!(text.contains("Top 10 Products by Number of Reviews:"));
        assert!(text.contains("4.33"));
        assert!(text.contains("Percentage of Verified Purchases: 66.67%"));
        assert!(text.contains("2023-01-01"));
        assert!(text.contains("U1"));
    }
}
