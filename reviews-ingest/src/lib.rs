//! reviews-ingest library interface
//!
//! Deduplicating NDJSON review loader, store clients and read-side
//! analytics. The `reviews-ingest` binary wires these to the CLI; the
//! integration tests use them directly.

pub mod analytics;
pub mod loader;
pub mod source;
pub mod store;
pub mod utils;

pub use loader::{BatchLoader, LoadOptions, LoadStats};
pub use source::{JsonLineSource, SourceLine};
pub use store::{open_store, ReviewStore};
