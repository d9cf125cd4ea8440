//! Common error types for the review ingestion tools

use thiserror::Error;

/// Common result type for review ingestion operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the ingestion crates
#[derive(Error, Debug)]
pub enum Error {
    /// Input line is not valid JSON or a field cannot be coerced to its column type
    #[error("Malformed record at line {line}: {reason}")]
    MalformedRecord { line: usize, reason: String },

    /// Connection or authentication failure against the store
    #[error("Store connectivity error: {0}")]
    StoreConnectivity(String),

    /// Batched natural-key lookup failed for a batch
    #[error("Existence check failed for batch at lines {first_line}-{last_line}: {source}")]
    ExistenceCheck {
        first_line: usize,
        last_line: usize,
        source: Box<Error>,
    },

    /// Bulk write failed for a batch
    #[error("Bulk insert failed for batch at lines {first_line}-{last_line}: {source}")]
    BulkInsert {
        first_line: usize,
        last_line: usize,
        source: Box<Error>,
    },

    /// Database operation error (wraps sqlx::Error)
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// HTTP store returned an error response or the request failed mid-flight
    #[error("HTTP error: {0}")]
    Http(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding/decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid caller input (bad column list, identifier, batch size)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether retrying the same store call could plausibly succeed.
    ///
    /// Input and configuration errors are deterministic and never retried.
    /// Database errors count only when they are lock, busy, pool or I/O
    /// failures; constraint violations and decode errors fail the same way
    /// every time. Batch errors defer to the store error they wrap.
    pub fn is_transient(&self) -> bool {
        match self {
            #[cfg(feature = "sqlx")]
            Error::Database(db_err) => is_transient_sqlx(db_err),
            Error::StoreConnectivity(_) | Error::Http(_) | Error::Io(_) => true,
            Error::ExistenceCheck { source, .. } | Error::BulkInsert { source, .. } => {
                source.is_transient()
            }
            _ => false,
        }
    }
}

#[cfg(feature = "sqlx")]
fn is_transient_sqlx(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Database(db_err) => {
            // SQLITE_BUSY (5) and SQLITE_LOCKED (6)
            let message = db_err.message();
            matches!(db_err.code().as_deref(), Some("5") | Some("6"))
                || message.contains("database is locked")
                || message.contains("database is busy")
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrapped_batch_error_reports_line_range() {
        let err = Error::BulkInsert {
            first_line: 501,
            last_line: 1000,
            source: Box::new(Error::Http("503 Service Unavailable".to_string())),
        };
        let msg = err.to_string();
        assert!(msg.contains("501-1000"), "{}", msg);
        assert!(msg.contains("503 Service Unavailable"), "{}", msg);
    }

    #[test]
    fn test_transient_classification() {
        assert!(Error::Http("timeout".to_string()).is_transient());
        assert!(Error::StoreConnectivity("refused".to_string()).is_transient());
        assert!(!Error::InvalidInput("bad column".to_string()).is_transient());
        assert!(!Error::MalformedRecord {
            line: 3,
            reason: "x".to_string()
        }
        .is_transient());
    }

    #[test]
    fn test_batch_error_follows_wrapped_source() {
        let lost_ack = Error::BulkInsert {
            first_line: 1,
            last_line: 2,
            source: Box::new(Error::Http("operation timed out".to_string())),
        };
        let bad_input = Error::ExistenceCheck {
            first_line: 1,
            last_line: 2,
            source: Box::new(Error::InvalidInput("bad table".to_string())),
        };
        assert!(lost_ack.is_transient());
        assert!(!bad_input.is_transient());
    }

    #[cfg(feature = "sqlx")]
    #[test]
    fn test_only_recoverable_database_errors_are_transient() {
        assert!(Error::Database(sqlx::Error::PoolTimedOut).is_transient());
        assert!(Error::Database(sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "disk went away"
        )))
        .is_transient());
        assert!(!Error::Database(sqlx::Error::RowNotFound).is_transient());
        assert!(!Error::Database(sqlx::Error::ColumnNotFound("rating".to_string())).is_transient());
    }
}
