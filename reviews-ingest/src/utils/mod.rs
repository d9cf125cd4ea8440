//! Utility modules for reviews-ingest

pub mod retry;

pub use retry::{retry_store_op, RetryPolicy};
