//! # Reviews Common Library
//!
//! Shared code for the review ingestion tools including:
//! - Review record model and normalization of raw JSON lines
//! - `reviews` table schema definition
//! - Configuration loading (TOML bootstrap + environment)
//! - Common error types

pub mod config;
pub mod error;
pub mod record;
pub mod schema;

pub use error::{Error, Result};
pub use record::{normalize, NaturalKey, NormalizeError, Review};
pub use schema::{Dialect, COLUMN_ORDER, REVIEWS_TABLE};
