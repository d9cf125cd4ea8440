//! Batch Deduplicating Loader
//!
//! Streams records from a [`JsonLineSource`](crate::source::JsonLineSource),
//! normalizes them, buffers them into batches and flushes each batch:
//!
//! 1. Collect the batch's distinct natural keys
//! 2. One batched existence lookup against the store
//! 3. Partition into new / duplicate (first occurrence within a batch wins)
//! 4. One bulk insert of the new records, in table column order
//! 5. Count inserted rows only once the write succeeded
//!
//! **Failure policy:** a flush that fails with a transient store error is
//! retried as a whole, with bounded backoff. Each retry repeats the existence
//! lookup, so rows written by an insert whose acknowledgement was lost are
//! seen as stored and not sent again. When retries run out the batch is
//! logged with its line range and dropped, and the run continues with the
//! next batch.
//!
//! **Malformed lines:** handled per [`MalformedPolicy`]: `abort` stops the run
//! at the offending line (batches flushed before it stay inserted), `skip`
//! logs and counts the line and moves on.

mod batch;
mod stats;

pub use batch::{Batch, BatchEntry, Partition};
pub use stats::{FlushOutcome, FlushReport, FlushStep, LoadStats};

use crate::source::SourceLine;
use crate::store::ReviewStore;
use crate::utils::{retry_store_op, RetryPolicy};
use reviews_common::config::{MalformedPolicy, Settings};
use reviews_common::schema::{validate_identifier, DEFAULT_BATCH_SIZE};
use reviews_common::{normalize, Error, NaturalKey, Result, Review, COLUMN_ORDER, REVIEWS_TABLE};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Loader settings
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Records per flush (at least 1)
    pub batch_size: usize,
    pub on_malformed: MalformedPolicy,
    pub retry: RetryPolicy,
    /// Target table
    pub table: String,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            on_malformed: MalformedPolicy::default(),
            retry: RetryPolicy::default(),
            table: REVIEWS_TABLE.to_string(),
        }
    }
}

impl LoadOptions {
    /// Loader settings from resolved configuration
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            batch_size: settings.batch_size,
            on_malformed: settings.on_malformed,
            retry: RetryPolicy::with_max_retries(settings.max_retries),
            ..Self::default()
        }
    }
}

/// Deduplicating batch loader
///
/// Owns the buffer and running totals for one run; nothing is shared between
/// loader instances.
pub struct BatchLoader<'a, S: ReviewStore + ?Sized> {
    store: &'a S,
    options: LoadOptions,
    buffer: Batch,
    stats: LoadStats,
}

impl<'a, S: ReviewStore + ?Sized> BatchLoader<'a, S> {
    /// Create a loader writing to `store`
    pub fn new(store: &'a S, options: LoadOptions) -> Result<Self> {
        if options.batch_size == 0 {
            return Err(Error::InvalidInput("batch size must be at least 1".to_string()));
        }
        validate_identifier(&options.table)?;

        Ok(Self {
            store,
            buffer: Batch::with_capacity(options.batch_size),
            options,
            stats: LoadStats::default(),
        })
    }

    /// Consume `source` and return the run totals
    ///
    /// # Errors
    /// - `Error::MalformedRecord` under the `abort` policy
    /// - `Error::Io` if the input cannot be read
    ///
    /// Store failures during a flush do not end the run.
    pub async fn run<I>(mut self, source: I) -> Result<LoadStats>
    where
        I: IntoIterator<Item = Result<SourceLine>>,
    {
        let started = Instant::now();
        info!(
            batch_size = self.options.batch_size,
            table = %self.options.table,
            "Starting data ingestion..."
        );

        for item in source {
            match item {
                Ok(line) => {
                    self.stats.lines_read += 1;
                    match normalize(&line.value) {
                        Ok(review) => {
                            self.buffer.push(line.line_number, review);
                            self.stats.records += 1;
                        }
                        Err(e) => self.handle_malformed(e.at_line(line.line_number))?,
                    }
                }
                Err(err @ Error::MalformedRecord { .. }) => {
                    self.stats.lines_read += 1;
                    self.handle_malformed(err)?;
                }
                Err(err) => return Err(err),
            }

            if self.buffer.len() >= self.options.batch_size {
                self.flush().await;
            }
        }

        if !self.buffer.is_empty() {
            self.flush().await;
        }

        self.stats.elapsed = started.elapsed();
        if self.stats.failed_batches > 0 {
            warn!(
                failed_batches = self.stats.failed_batches,
                failed_rows = self.stats.failed_rows,
                "Some batches were dropped after store failures"
            );
        }
        info!(
            "Data ingestion finished. Total rows inserted: {}",
            self.stats.inserted
        );

        Ok(self.stats)
    }

    fn handle_malformed(&mut self, err: Error) -> Result<()> {
        match self.options.on_malformed {
            MalformedPolicy::Abort => {
                error!("{} (aborting run)", err);
                Err(err)
            }
            MalformedPolicy::Skip => {
                warn!("{} (skipped)", err);
                self.stats.malformed_lines += 1;
                Ok(())
            }
        }
    }

    async fn flush(&mut self) {
        let batch = std::mem::replace(
            &mut self.buffer,
            Batch::with_capacity(self.options.batch_size),
        );
        let report = self.flush_batch(batch).await;
        self.stats.record_flush(report);
    }

    async fn flush_batch(&self, batch: Batch) -> FlushReport {
        let (first_line, last_line) = batch.line_range();
        let size = batch.len();
        let keys = batch.distinct_keys();
        let state = FlushState::default();

        let result = retry_store_op("batch flush", &self.options.retry, || {
            self.attempt_flush(&batch, &keys, &state)
        })
        .await;

        match result {
            Ok(attempt) if attempt.inserted == 0 => {
                info!(
                    "Skipped batch ending at line {}, all rows already exist ({} duplicates)",
                    last_line, attempt.duplicates
                );
                FlushReport {
                    first_line,
                    last_line,
                    size,
                    duplicates: attempt.duplicates,
                    outcome: FlushOutcome::AllDuplicates,
                }
            }
            Ok(attempt) => {
                info!(
                    "Inserted batch at lines {}-{} ({} new, {} duplicates), total inserted: {}",
                    first_line,
                    last_line,
                    attempt.inserted,
                    attempt.duplicates,
                    self.stats.inserted + attempt.inserted
                );
                FlushReport {
                    first_line,
                    last_line,
                    size,
                    duplicates: attempt.duplicates,
                    outcome: FlushOutcome::Inserted {
                        rows: attempt.inserted,
                    },
                }
            }
            Err(err) => {
                let step = match err {
                    Error::ExistenceCheck { .. } => FlushStep::ExistenceCheck,
                    _ => FlushStep::BulkInsert,
                };
                error!("{}; batch dropped", err);
                FlushReport {
                    first_line,
                    last_line,
                    size,
                    duplicates: state.duplicates.load(Ordering::SeqCst),
                    outcome: FlushOutcome::Failed {
                        step,
                        error: err.to_string(),
                    },
                }
            }
        }
    }

    /// One lookup, partition and insert pass over `batch`
    ///
    /// A retry always starts again from the lookup: an insert that failed
    /// after the store had written the rows would otherwise be sent twice.
    async fn attempt_flush(
        &self,
        batch: &Batch,
        keys: &[NaturalKey],
        state: &FlushState,
    ) -> Result<FlushAttempt> {
        let (first_line, last_line) = batch.line_range();
        let table = self.options.table.as_str();

        let existing = if keys.is_empty() {
            HashSet::new()
        } else {
            self.store
                .existing_keys(table, keys)
                .await
                .map_err(|source| Error::ExistenceCheck {
                    first_line,
                    last_line,
                    source: Box::new(source),
                })?
        };

        let partition = batch.partition(&existing);
        // Rows an earlier attempt sent that reached the store after all
        let recovered = state
            .sent_keys()
            .iter()
            .filter(|key| existing.contains(*key))
            .count();
        let duplicates = partition.duplicates.len().saturating_sub(recovered);
        state.duplicates.store(duplicates, Ordering::SeqCst);
        debug!(
            first_line,
            last_line,
            stored_duplicates = partition.stored_duplicates,
            in_batch_duplicates = partition.in_batch_duplicates,
            recovered,
            "Batch partitioned"
        );

        if partition.new.is_empty() {
            return Ok(FlushAttempt {
                inserted: recovered,
                duplicates,
            });
        }

        state
            .sent_keys()
            .extend(partition.new.iter().map(Review::natural_key));
        self.store
            .bulk_insert(table, &partition.new, &COLUMN_ORDER)
            .await
            .map_err(|source| Error::BulkInsert {
                first_line,
                last_line,
                source: Box::new(source),
            })?;

        Ok(FlushAttempt {
            inserted: partition.new.len() + recovered,
            duplicates,
        })
    }
}

/// Counts from a flush attempt that reached the store
struct FlushAttempt {
    inserted: usize,
    duplicates: usize,
}

/// What retried attempts of one flush share
#[derive(Default)]
struct FlushState {
    /// Keys sent in inserts whose outcome is unknown
    sent: Mutex<HashSet<NaturalKey>>,
    /// Duplicates counted by the latest partition
    duplicates: AtomicUsize,
}

impl FlushState {
    fn sent_keys(&self) -> MutexGuard<'_, HashSet<NaturalKey>> {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
